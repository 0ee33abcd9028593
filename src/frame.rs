//! Frames and the producer/consumer handoff.
//!
//! - `Frame`: decoded RGB image, monotonic sequence number, brightness.
//! - `FrameSlot`: single-slot handoff between the decoding producer and the
//!   control loop. Holds at most one unread frame; a newer frame replaces an
//!   unread one (drop-oldest, never queues).
//!
//! The slot mutex only guards the swap of the stored frame. Decoding and all
//! image processing happen outside the lock.

use image::RgbImage;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A decoded camera frame.
///
/// Frames are moved, not shared: ownership passes from the producer into the
/// slot and from the slot to whichever stage takes it.
#[derive(Debug)]
pub struct Frame {
    image: RgbImage,
    /// Assigned by the producer, strictly increasing per capture.
    pub seq: u64,
    /// Mean of the HSV value channel, 0..=255.
    pub brightness: f64,
}

impl Frame {
    /// Wrap a decoded image, computing its brightness.
    pub fn new(image: RgbImage, seq: u64) -> Self {
        let brightness = brightness(&image);
        Self {
            image,
            seq,
            brightness,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Mutable access for annotation before the frame is persisted.
    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Mean of the HSV value channel. V is `max(r, g, b)` per pixel.
pub fn brightness(image: &RgbImage) -> f64 {
    let pixels = u64::from(image.width()) * u64::from(image.height());
    if pixels == 0 {
        return 0.0;
    }
    let total: u64 = image
        .pixels()
        .map(|p| u64::from(p.0[0].max(p.0[1]).max(p.0[2])))
        .sum();
    total as f64 / pixels as f64
}

// ----------------------------------------------------------------------------
// FrameSlot
// ----------------------------------------------------------------------------

struct SlotState {
    frame: Option<Frame>,
    published: u64,
}

/// Single-slot, overwrite-if-unread frame handoff.
pub struct FrameSlot {
    state: Mutex<SlotState>,
    available: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                frame: None,
                published: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A panicking holder cannot leave the slot half-written: every critical
        // section is a single assignment.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `frame`, replacing any unread frame. Returns the replaced frame
    /// so the caller decides where it is dropped (outside the lock).
    pub fn publish(&self, frame: Frame) -> Option<Frame> {
        let replaced = {
            let mut state = self.lock();
            state.published += 1;
            state.frame.replace(frame)
        };
        self.available.notify_one();
        replaced
    }

    /// Take the unread frame if there is one. Never blocks on frame arrival.
    pub fn try_take(&self) -> Option<Frame> {
        self.lock().frame.take()
    }

    /// Take the unread frame, waiting up to `timeout` for one to be published.
    pub fn wait_take(&self, timeout: Duration) -> Option<Frame> {
        let state = self.lock();
        let (mut state, _) = self
            .available
            .wait_timeout_while(state, timeout, |s| s.frame.is_none())
            .unwrap_or_else(|e| e.into_inner());
        state.frame.take()
    }

    /// Drop any unread frame, e.g. after an actuator move so the next frame
    /// reflects the new pose.
    pub fn clear(&self) {
        let stale = self.lock().frame.take();
        drop(stale);
    }

    /// Number of frames published since creation.
    pub fn published(&self) -> u64 {
        self.lock().published
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
