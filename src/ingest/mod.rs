//! Frame ingestion.
//!
//! - `mjpeg`: delimiter scanning and JPEG decoding
//! - `capture`: stream openers and the producer thread feeding `FrameSlot`
//! - `feed`: the consumer side used by motion detection and docking
//!
//! The ingestion layer is responsible for:
//! - Splitting the byte stream into JPEG chunks
//! - Decoding and tagging each frame with its brightness
//! - Publishing the newest frame, overwriting an unread one
//!
//! Malformed chunks are skipped. Stream failures end the producer and are
//! reported to the owning loop.

pub mod capture;
pub mod feed;
pub mod mjpeg;

pub use capture::{Capture, CaptureStats, HttpStreamOpener, StreamOpener};
pub use feed::{FeedSource, FrameFeed, LiveFeed, QueuedFeed, StreamFeedSource};
pub use mjpeg::{decode_jpeg, find_jpeg_bounds, MjpegStream};
