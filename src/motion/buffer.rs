//! Circular event buffer bookkeeping.
//!
//! Frames are written to slot `cursor` of a ring of capacity `L`. When motion
//! is confirmed the current slot becomes the onset; capture then continues for
//! `L - O - 1` further frames so the ring holds `O` frames before the onset
//! and `L - O` from the onset on. Reassembly maps each slot to its position in
//! playback order, with position 0 being `O` frames before the onset.

#[derive(Clone, Debug)]
pub struct MotionBuffer {
    capacity: usize,
    offset: usize,
    cursor: usize,
    onset: Option<usize>,
    post_event: usize,
}

impl MotionBuffer {
    /// Ring of `capacity` (L) frames keeping `offset` (O) pre-event frames.
    ///
    /// Panics if `offset >= capacity`; configuration validation rules that out.
    pub fn new(capacity: usize, offset: usize) -> Self {
        assert!(
            offset < capacity,
            "pre-event offset {} must be below capacity {}",
            offset,
            capacity
        );
        Self {
            capacity,
            offset,
            cursor: 0,
            onset: None,
            post_event: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Slot the next frame is written to. Always `< capacity`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn onset(&self) -> Option<usize> {
        self.onset
    }

    /// Move to the next slot after a frame was written.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Account for the frame just written at `cursor()` while motion is
    /// confirmed. The first call marks the onset. Returns `true` once the
    /// post-event frames are complete.
    pub fn record_event_frame(&mut self) -> bool {
        match self.onset {
            None => {
                self.onset = Some(self.cursor);
                self.post_event = 0;
            }
            Some(_) => self.post_event += 1,
        }
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.onset.is_some() && self.post_event >= self.capacity - self.offset - 1
    }

    /// Playback position of ring slot `slot`, relative to the onset.
    pub fn output_index(&self, slot: usize) -> usize {
        let onset = self.onset.unwrap_or(0) as i64;
        let first = onset - self.offset as i64;
        (slot as i64 - first).rem_euclid(self.capacity as i64) as usize
    }

    /// `(slot, position)` pairs for every ring slot.
    pub fn reorder_plan(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.capacity).map(move |slot| (slot, self.output_index(slot)))
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.onset = None;
        self.post_event = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_onset(capacity: usize, offset: usize, onset: usize) -> MotionBuffer {
        let mut buf = MotionBuffer::new(capacity, offset);
        for _ in 0..onset {
            buf.advance();
        }
        assert!(!buf.record_event_frame());
        buf
    }

    #[test]
    fn onset_lands_at_offset_position() {
        let buf = with_onset(60, 6, 40);
        assert_eq!(buf.onset(), Some(40));
        assert_eq!(buf.output_index(40), 6);
        assert_eq!(buf.output_index(39), 5);
        assert_eq!(buf.output_index(34), 0);
        assert_eq!(buf.output_index(33), 59);
    }

    #[test]
    fn wraps_for_onset_near_start_and_end() {
        let early = with_onset(60, 6, 2);
        assert_eq!(early.output_index(2), 6);
        assert_eq!(early.output_index(0), 4);
        assert_eq!(early.output_index(59), 3);
        assert_eq!(early.output_index(56), 0);

        let late = with_onset(60, 6, 59);
        assert_eq!(late.output_index(59), 6);
        assert_eq!(late.output_index(0), 7);
        assert_eq!(late.output_index(53), 0);
    }

    #[test]
    fn reorder_plan_is_a_permutation() {
        let buf = with_onset(60, 6, 17);
        let mut positions: Vec<usize> = buf.reorder_plan().map(|(_, p)| p).collect();
        positions.sort_unstable();
        assert_eq!(positions, (0..60).collect::<Vec<_>>());
    }

    #[test]
    fn completes_after_capacity_minus_offset_frames() {
        let mut buf = MotionBuffer::new(10, 3);
        buf.advance();
        let mut frames_from_onset = 0;
        loop {
            frames_from_onset += 1;
            let done = buf.record_event_frame();
            buf.advance();
            if done {
                break;
            }
        }
        assert_eq!(frames_from_onset, 7);
        assert!(buf.is_complete());
        assert!(buf.cursor() < buf.capacity());

        buf.reset();
        assert_eq!(buf.onset(), None);
        assert_eq!(buf.cursor(), 0);
    }
}
