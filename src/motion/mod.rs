//! Autonomous surveillance: motion classification and event clip capture.
//!
//! - `classifier`: per-frame background difference and confirmation debounce
//! - `buffer`: circular buffer indices and onset-relative reordering
//!
//! `MotionEngine` runs one session over a frame feed. Every frame is staged
//! into the ring; once motion is confirmed the session keeps recording until
//! the ring holds the pre-event frames plus the post-event remainder, then
//! renames the staged frames into playback order. The session also services
//! snapshot requests and yields to interactive mode between frames.

pub mod buffer;
pub mod classifier;

use anyhow::Result;
use std::time::Duration;

use crate::actuation::Peripherals;
use crate::channel::CommandChannel;
use crate::config::SentryConfig;
use crate::frame::Frame;
use crate::ingest::FrameFeed;
use crate::sequence::{FrameSequence, FrameStore};
use crate::vision::annotate::{draw_rect, YELLOW};

pub use buffer::MotionBuffer;
pub use classifier::{Debounce, Measurement, MotionClassifier, MotionParams, Observation};

const SNAPSHOT_CAPTION: &str = "Here is your picture!";
const FRAME_WAIT: Duration = Duration::from_millis(100);

/// How a motion session ended.
#[derive(Debug, PartialEq, Eq)]
pub enum MotionOutcome {
    /// A complete event clip, reordered and ready for encoding.
    Event(FrameSequence),
    /// Interactive mode or shutdown took over; partial frames are discarded.
    Interrupted,
}

/// Result of processing one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Complete,
}

#[derive(Debug, Default)]
struct SnapshotState {
    light_on: bool,
    settle_remaining: u32,
}

pub struct MotionEngine {
    classifier: MotionClassifier,
    buffer: MotionBuffer,
    store: FrameStore,
    observe_only: bool,
    motion_detected: bool,
    paused: bool,
    brightness_threshold: f64,
    snapshot_name: String,
    settle_frames: u32,
    snapshot: SnapshotState,
}

impl MotionEngine {
    pub fn new(config: &SentryConfig, store: FrameStore) -> Self {
        let fps = config.stream.fps_low;
        Self {
            classifier: MotionClassifier::new(MotionParams::from(&config.motion)),
            buffer: MotionBuffer::new(
                config.motion.buffer_len(fps),
                config.motion.pre_event_len(fps),
            ),
            store,
            observe_only: config.motion.observe_only,
            motion_detected: false,
            paused: false,
            brightness_threshold: config.control.brightness_threshold,
            snapshot_name: config.storage.snapshot_name.clone(),
            settle_frames: config.motion.snapshot_settle_frames,
            snapshot: SnapshotState::default(),
        }
    }

    pub fn buffer(&self) -> &MotionBuffer {
        &self.buffer
    }

    pub fn motion_detected(&self) -> bool {
        self.motion_detected
    }

    /// Forget the classifier history and any partially captured event.
    pub fn reset(&mut self) {
        self.classifier.reset();
        self.buffer.reset();
        self.motion_detected = false;
    }

    /// Run a session until an event clip is complete or the session is
    /// interrupted. Staged files from an earlier session are removed first.
    pub fn run(
        &mut self,
        feed: &mut dyn FrameFeed,
        channel: &CommandChannel,
        peripherals: &mut Peripherals,
    ) -> Result<MotionOutcome> {
        self.store.clear()?;
        self.reset();
        log::info!(
            "motion session started (buffer {} frames, {} pre-event)",
            self.buffer.capacity(),
            self.buffer.offset()
        );
        loop {
            if channel.is_interactive() || channel.is_shutdown() {
                log::info!("motion session interrupted");
                self.reset();
                return Ok(MotionOutcome::Interrupted);
            }
            let Some(frame) = feed.next_frame(FRAME_WAIT)? else {
                continue;
            };
            let step = self.process_frame(frame, channel, peripherals)?;
            feed.discard_pending();
            if step == Step::Complete {
                break;
            }
        }
        let sequence = self.finish()?;
        Ok(MotionOutcome::Event(sequence))
    }

    /// Handle one frame: snapshot servicing, classification, staging and
    /// event bookkeeping.
    pub fn process_frame(
        &mut self,
        frame: Frame,
        channel: &CommandChannel,
        peripherals: &mut Peripherals,
    ) -> Result<Step> {
        self.service_snapshot(&frame, channel, peripherals)?;

        if !channel.motion_detection_enabled() {
            if !self.paused {
                log::info!("motion detection disabled");
                self.paused = true;
            }
            self.reset();
            return Ok(Step::Continue);
        }
        if self.paused {
            log::info!("motion detection enabled");
            self.paused = false;
        }

        let mut image = frame.into_image();
        let observation = self.classifier.observe(&image);
        log::trace!("motion measurement {:?}", observation.measurement);
        if observation.confirmed {
            if let Measurement::Changed { bbox, .. } = observation.measurement {
                draw_rect(&mut image, &bbox, YELLOW, 2);
            }
            if !self.observe_only {
                self.motion_detected = true;
            }
        }

        self.store.write_stage(self.buffer.cursor(), &image)?;
        let mut complete = false;
        if self.motion_detected {
            if self.buffer.onset().is_none() {
                log::info!("motion confirmed at buffer slot {}", self.buffer.cursor());
            }
            complete = self.buffer.record_event_frame();
        }
        self.buffer.advance();

        Ok(if complete {
            Step::Complete
        } else {
            Step::Continue
        })
    }

    /// Rename the staged ring into playback order and list the result.
    pub fn finish(&mut self) -> Result<FrameSequence> {
        let mut missing = 0usize;
        for (slot, position) in self.buffer.reorder_plan() {
            if !self.store.promote(slot, position)? {
                missing += 1;
            }
        }
        if missing > 0 {
            log::debug!("{} buffer slots were never written", missing);
        }
        let sequence = self.store.sequence()?;
        log::info!(
            "motion event captured: {} frames in {}",
            sequence.len(),
            sequence.dir.display()
        );
        self.reset();
        Ok(sequence)
    }

    fn service_snapshot(
        &mut self,
        frame: &Frame,
        channel: &CommandChannel,
        peripherals: &mut Peripherals,
    ) -> Result<()> {
        if !channel.snapshot_requested() {
            return Ok(());
        }
        if frame.brightness < self.brightness_threshold && !self.snapshot.light_on {
            log::debug!("dark scene ({:.1}), light on for snapshot", frame.brightness);
            peripherals.actuator.set_light(true)?;
            self.snapshot.light_on = true;
            self.snapshot.settle_remaining = self.settle_frames;
        }
        if self.snapshot.settle_remaining > 0 {
            self.snapshot.settle_remaining -= 1;
            return Ok(());
        }

        let path = self.store.write_named(&self.snapshot_name, frame.image())?;
        peripherals.notifier.send_image(&path, SNAPSHOT_CAPTION)?;
        channel.clear_snapshot();
        peripherals.actuator.set_light(false)?;
        self.snapshot.light_on = false;
        log::info!("snapshot sent: {}", path.display());
        Ok(())
    }
}
