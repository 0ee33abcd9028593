//! Visual docking.
//!
//! - `pairing`: marker triple search over detected blobs
//! - `steering`: pure steering decisions and the approach correction moves
//!
//! `HomingController` runs one docking session over a frame feed. Each frame
//! is searched for the dock markers and drives exactly one maneuver; the feed
//! then discards whatever was captured during that maneuver so the next
//! decision sees the result of this one. Every processed frame is annotated
//! and persisted in capture order.

pub mod pairing;
pub mod steering;

use anyhow::Result;
use std::time::Duration;

use crate::actuation::{Direction, Peripherals};
use crate::channel::CommandChannel;
use crate::config::SentryConfig;
use crate::frame::Frame;
use crate::ingest::FrameFeed;
use crate::sequence::FrameStore;
use crate::vision::annotate::{draw_circle, draw_rect, GREEN, YELLOW};
use crate::vision::{to_gray, BlobDetector, BlobParams};

pub use pairing::{pair_blobs, validate_pair, BlobTriple};
pub use steering::{correction_moves, steer, Calibration, Maneuver, SteeringDecision};

use steering::{
    DOCK_BACKWARD_STEP, DOCK_BACKWARD_STEPS, DOCK_FORWARD, DOCK_ROTATION_DEG, MOVE_DURATION_SECS,
    SEARCH_TURN, TILT_DURATION_SECS,
};

const FRAME_WAIT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomingOutcome {
    Docked,
    /// Aborted by the stop signal or shutdown.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomingStep {
    Continue,
    Docked,
}

pub struct HomingController {
    detector: BlobDetector,
    calibration: Calibration,
    dimensions: (u32, u32),
    store: FrameStore,
    frame_count: usize,
    frame_wrap: usize,
    pending_correction: Option<f64>,
    brightness_threshold: f64,
}

impl HomingController {
    pub fn new(config: &SentryConfig, store: FrameStore) -> Self {
        let (width, height) = (config.stream.width, config.stream.height);
        Self {
            detector: BlobDetector::new(BlobParams::for_frame(width, height)),
            calibration: Calibration::for_frame(width, height),
            dimensions: (width, height),
            store,
            frame_count: 0,
            frame_wrap: (config.stream.fps_low as usize * 300).max(1),
            pending_correction: None,
            brightness_threshold: config.control.brightness_threshold,
        }
    }

    /// Index the next persisted frame is written to.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn pending_correction(&self) -> Option<f64> {
        self.pending_correction
    }

    /// Drive toward the dock until docked or stopped. The camera is lowered
    /// before the first frame and again on exit; the light is switched on for
    /// a dark scene and always switched off on exit.
    pub fn run(
        &mut self,
        feed: &mut dyn FrameFeed,
        channel: &CommandChannel,
        peripherals: &mut Peripherals,
    ) -> Result<HomingOutcome> {
        self.store.clear()?;
        self.frame_count = 0;
        self.pending_correction = None;
        peripherals
            .actuator
            .move_camera_absolute(0.0, TILT_DURATION_SECS)?;
        log::info!("docking started");

        let mut light_checked = false;
        let outcome = loop {
            if channel.stop_requested() || channel.is_shutdown() {
                log::info!("docking stopped");
                break HomingOutcome::Stopped;
            }
            let Some(frame) = feed.next_frame(FRAME_WAIT)? else {
                continue;
            };
            if !light_checked {
                light_checked = true;
                if frame.brightness < self.brightness_threshold {
                    log::debug!("dark scene ({:.1}), light on", frame.brightness);
                    peripherals.actuator.set_light(true)?;
                }
            }
            let step = self.process_frame(frame, peripherals)?;
            feed.discard_pending();
            if step == HomingStep::Docked {
                break HomingOutcome::Docked;
            }
        };

        peripherals
            .actuator
            .move_camera_absolute(0.0, TILT_DURATION_SECS)?;
        peripherals.actuator.set_light(false)?;
        Ok(outcome)
    }

    /// Decide and execute one maneuver from `frame`, then persist it.
    pub fn process_frame(
        &mut self,
        frame: Frame,
        peripherals: &mut Peripherals,
    ) -> Result<HomingStep> {
        self.calibrate(frame.width(), frame.height());
        let blobs = self.detector.detect(&to_gray(frame.image()));
        let triple = pair_blobs(&blobs);
        let mut step = HomingStep::Continue;

        if let Some(correction) = self.pending_correction.take() {
            log::info!("approach correction {:.1}", correction);
            for (direction, magnitude, duration) in correction_moves(correction) {
                peripherals.actuator.move_by(direction, magnitude, duration)?;
            }
        } else if let Some(triple) = triple.as_ref() {
            let decision = steer(triple, &self.calibration);
            log::debug!(
                "markers at x={:.1}..{:.1} size {:.1}: {:?}",
                triple.left.x,
                triple.right.x,
                triple.avg_size(),
                decision.maneuver
            );
            peripherals
                .actuator
                .move_camera_relative(decision.tilt, TILT_DURATION_SECS)?;
            match decision.maneuver {
                Maneuver::Turn {
                    direction,
                    magnitude,
                } => peripherals
                    .actuator
                    .move_by(direction, magnitude, MOVE_DURATION_SECS)?,
                Maneuver::ArmCorrection => self.pending_correction = Some(decision.correction),
                Maneuver::Forward { magnitude } => peripherals.actuator.move_by(
                    Direction::Forward,
                    magnitude,
                    MOVE_DURATION_SECS,
                )?,
                Maneuver::Dock => {
                    dock(peripherals)?;
                    step = HomingStep::Docked;
                }
            }
        } else {
            log::debug!("{} blobs, no marker set; searching", blobs.len());
            peripherals
                .actuator
                .move_by(Direction::Left, SEARCH_TURN, MOVE_DURATION_SECS)?;
        }

        let mut image = frame.into_image();
        for blob in &blobs {
            draw_circle(&mut image, blob.x, blob.y, blob.size, GREEN, 2);
        }
        if let Some(triple) = triple {
            let bbox = triple.bounding_box(image.width(), image.height());
            draw_rect(&mut image, &bbox, YELLOW, 2);
        }
        self.store.write_frame(self.frame_count, &image)?;
        self.frame_count = (self.frame_count + 1) % self.frame_wrap;
        Ok(step)
    }

    fn calibrate(&mut self, width: u32, height: u32) {
        if self.dimensions != (width, height) {
            self.detector = BlobDetector::new(BlobParams::for_frame(width, height));
            self.calibration = Calibration::for_frame(width, height);
            self.dimensions = (width, height);
        }
    }
}

/// Final maneuver: the light relay disturbs the compass, so it goes off
/// before the turn.
fn dock(peripherals: &mut Peripherals) -> Result<()> {
    peripherals.actuator.set_light(false)?;
    peripherals
        .actuator
        .move_by(Direction::Forward, DOCK_FORWARD, MOVE_DURATION_SECS)?;
    peripherals
        .heading
        .rotate_to_relative_heading(DOCK_ROTATION_DEG)?;
    for _ in 0..DOCK_BACKWARD_STEPS {
        peripherals
            .actuator
            .move_by(Direction::Backward, DOCK_BACKWARD_STEP, MOVE_DURATION_SECS)?;
    }
    log::info!("Home found!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::{Action, Recorder};
    use crate::ingest::QueuedFeed;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn config() -> SentryConfig {
        let mut cfg = SentryConfig::default();
        cfg.stream.width = 640;
        cfg.stream.height = 480;
        cfg
    }

    fn disc(image: &mut RgbImage, cx: f64, cy: f64, r: f64) {
        for y in 0..image.height() {
            for x in 0..image.width() {
                let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                if dx * dx + dy * dy <= r * r {
                    image.put_pixel(x, y, Rgb([10, 10, 10]));
                }
            }
        }
    }

    /// Two equal markers of radius `r` centred on `xmid`, three diameters apart.
    fn markers(seq: u64, xmid: f64, r: f64) -> Frame {
        let mut image = RgbImage::from_pixel(640, 480, Rgb([230, 230, 230]));
        let half = 3.0 * r;
        disc(&mut image, xmid - half, 240.0, r);
        disc(&mut image, xmid + half, 240.0, r);
        Frame::new(image, seq)
    }

    fn blank(seq: u64) -> Frame {
        Frame::new(RgbImage::from_pixel(640, 480, Rgb([230, 230, 230])), seq)
    }

    fn moves(actions: &[Action]) -> Vec<(Direction, f64)> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Move {
                    direction,
                    magnitude,
                    ..
                } => Some((*direction, *magnitude)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn no_markers_searches_left() {
        let dir = tempdir().unwrap();
        let mut homing = HomingController::new(&config(), FrameStore::open(dir.path()).unwrap());
        let recorder = Recorder::new();
        let mut peripherals = Peripherals::recorded(&recorder);

        let step = homing.process_frame(blank(1), &mut peripherals).unwrap();
        assert_eq!(step, HomingStep::Continue);
        assert_eq!(moves(&recorder.actions()), vec![(Direction::Left, SEARCH_TURN)]);
        assert!(dir.path().join("frame_000000.jpg").exists());
        assert_eq!(homing.frame_count(), 1);
    }

    #[test]
    fn centred_markers_drive_forward() {
        let dir = tempdir().unwrap();
        let mut homing = HomingController::new(&config(), FrameStore::open(dir.path()).unwrap());
        let recorder = Recorder::new();
        let mut peripherals = Peripherals::recorded(&recorder);

        homing
            .process_frame(markers(1, 320.0, 16.0), &mut peripherals)
            .unwrap();
        assert_eq!(
            moves(&recorder.actions()),
            vec![(Direction::Forward, steering::FORWARD_NEAR)]
        );
    }

    #[test]
    fn off_centre_markers_turn() {
        let dir = tempdir().unwrap();
        let mut homing = HomingController::new(&config(), FrameStore::open(dir.path()).unwrap());
        let recorder = Recorder::new();
        let mut peripherals = Peripherals::recorded(&recorder);

        homing
            .process_frame(markers(1, 150.0, 16.0), &mut peripherals)
            .unwrap();
        assert_eq!(
            moves(&recorder.actions()),
            vec![(Direction::Left, steering::LARGE_TURN)]
        );
    }

    #[test]
    fn run_docks_and_restores_camera_and_light() {
        let dir = tempdir().unwrap();
        let mut homing = HomingController::new(&config(), FrameStore::open(dir.path()).unwrap());
        let recorder = Recorder::new();
        let mut peripherals = Peripherals::recorded(&recorder);
        let channel = CommandChannel::default();
        let mut feed = QueuedFeed::new(vec![blank(1), markers(2, 320.0, 33.0), blank(3)]);

        let outcome = homing.run(&mut feed, &channel, &mut peripherals).unwrap();
        assert_eq!(outcome, HomingOutcome::Docked);
        assert_eq!(feed.remaining(), 1);

        let actions = recorder.actions();
        assert_eq!(
            actions.first(),
            Some(&Action::CameraAbsolute {
                angle: 0.0,
                duration_secs: TILT_DURATION_SECS
            })
        );
        assert!(actions.contains(&Action::Rotate { degrees: 180.0 }));
        let backward = moves(&actions)
            .into_iter()
            .filter(|(d, _)| *d == Direction::Backward)
            .count();
        assert_eq!(backward, DOCK_BACKWARD_STEPS);
        assert_eq!(actions.last(), Some(&Action::Light { on: false }));
        assert!(dir.path().join("frame_000001.jpg").exists());
    }

    #[test]
    fn stop_signal_aborts_run() {
        let dir = tempdir().unwrap();
        let mut homing = HomingController::new(&config(), FrameStore::open(dir.path()).unwrap());
        let recorder = Recorder::new();
        let mut peripherals = Peripherals::recorded(&recorder);
        let channel = CommandChannel::default();
        channel.request_stop();
        let mut feed = QueuedFeed::new(vec![blank(1)]);

        let outcome = homing.run(&mut feed, &channel, &mut peripherals).unwrap();
        assert_eq!(outcome, HomingOutcome::Stopped);
        assert_eq!(feed.remaining(), 1);
        // The stop signal is left for the command loop to handle.
        assert!(channel.stop_requested());
    }

    #[test]
    fn armed_correction_runs_on_next_frame() {
        let dir = tempdir().unwrap();
        let mut homing = HomingController::new(&config(), FrameStore::open(dir.path()).unwrap());
        homing.pending_correction = Some(3.0);
        let recorder = Recorder::new();
        let mut peripherals = Peripherals::recorded(&recorder);

        homing.process_frame(blank(1), &mut peripherals).unwrap();
        assert_eq!(
            moves(&recorder.actions()),
            vec![
                (Direction::Left, 109.0),
                (Direction::Forward, 9.0),
                (Direction::Right, 112.0),
            ]
        );
        assert_eq!(homing.pending_correction(), None);
    }
}
