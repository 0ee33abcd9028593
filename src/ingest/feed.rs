//! Consumer side of frame capture.
//!
//! Motion detection and docking pull frames through `FrameFeed`. The live
//! implementation wraps a producer thread and its `FrameSlot`; `QueuedFeed`
//! replays frames already in memory.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::capture::{Capture, CaptureStats, StreamOpener};
use crate::frame::{Frame, FrameSlot};

pub trait FrameFeed: Send {
    /// Next unconsumed frame, waiting up to `timeout`. `Ok(None)` on timeout.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Drop a frame published while the consumer was busy, so the next frame
    /// is captured after whatever the consumer just did.
    fn discard_pending(&mut self);

    /// Release the underlying stream.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens a fresh feed each time the stream is (re)started.
pub trait FeedSource: Send + Sync {
    fn open_feed(&self) -> Result<Box<dyn FrameFeed>>;
}

/// Live capture: producer thread plus single-frame slot.
pub struct LiveFeed {
    slot: Arc<FrameSlot>,
    capture: Capture,
}

impl LiveFeed {
    pub fn start(opener: &dyn StreamOpener) -> Result<Self> {
        let slot = Arc::new(FrameSlot::new());
        let capture = Capture::start(opener, slot.clone())?;
        Ok(Self { slot, capture })
    }

    pub fn stop(self) -> Result<CaptureStats> {
        self.capture.stop()
    }
}

impl FrameFeed for LiveFeed {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        self.capture.check()?;
        Ok(self.slot.wait_take(timeout))
    }

    fn discard_pending(&mut self) {
        self.slot.clear();
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.stop().map(|_| ())
    }
}

/// Feed source backed by a stream opener.
pub struct StreamFeedSource {
    opener: Arc<dyn StreamOpener>,
}

impl StreamFeedSource {
    pub fn new(opener: Arc<dyn StreamOpener>) -> Self {
        Self { opener }
    }
}

impl FeedSource for StreamFeedSource {
    fn open_feed(&self) -> Result<Box<dyn FrameFeed>> {
        Ok(Box::new(LiveFeed::start(self.opener.as_ref())?))
    }
}

/// Replays a fixed list of frames, one per call, then reports the stream as
/// ended. Every replayed frame is consumed, so `discard_pending` is a no-op.
#[derive(Debug, Default)]
pub struct QueuedFeed {
    frames: VecDeque<Frame>,
}

impl QueuedFeed {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameFeed for QueuedFeed {
    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => Err(anyhow!("frame queue exhausted")),
        }
    }

    fn discard_pending(&mut self) {}

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
