//! Dock Sentry
//!
//! Perception and control core of a small surveillance robot. A live MJPEG
//! camera stream feeds two behaviours that share the same actuators:
//!
//! - **Surveillance** (autonomous mode): background-difference motion
//!   detection with a circular buffer that keeps a few seconds before the
//!   event, producing a reordered clip for encoding and delivery.
//! - **Docking** (interactive command): closed-loop visual homing on three
//!   dark markers on the charging dock, ending in a reverse-in maneuver.
//!
//! # Module Structure
//!
//! - `ingest`: MJPEG scanning, the producer thread and frame feeds
//! - `frame`: decoded frames and the single-slot producer/consumer handoff
//! - `vision`: grayscale helpers, connected regions, blob detection, overlays
//! - `motion`: classifier, event buffer and the surveillance session
//! - `homing`: marker pairing, steering and the docking session
//! - `control`: command parsing, mode arbitration and the main loop
//! - `actuation`: collaborator traits (motors, heading, notifications, stream)
//! - `sequence`: numbered frame files handed to the external encoder
//! - `channel`: shared state written by remote inputs
//! - `config`: file and environment configuration
//! - `clock`: time source, replaceable in tests

pub mod actuation;
pub mod channel;
pub mod clock;
pub mod config;
pub mod control;
pub mod frame;
pub mod homing;
pub mod ingest;
pub mod motion;
pub mod sequence;
pub mod vision;

pub use actuation::{
    Action, Actuator, ClipEncoder, Direction, DriveCommand, Heading, Notifier, Peripherals,
    Recorder, StreamControl, StreamQuality,
};
pub use channel::CommandChannel;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SentryConfig;
pub use control::{Command, CommandParseError, Controller, Mode, ModeArbiter};
pub use frame::{Frame, FrameSlot};
pub use homing::{pair_blobs, BlobTriple, HomingController, HomingOutcome};
pub use ingest::{FeedSource, FrameFeed, HttpStreamOpener, LiveFeed, QueuedFeed, StreamFeedSource};
pub use motion::{MotionBuffer, MotionEngine, MotionOutcome};
pub use sequence::{FrameSequence, FrameStore};
pub use vision::{Blob, BlobDetector, BlobParams};
