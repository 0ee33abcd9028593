//! Frame capture producer.
//!
//! `Capture::start` opens the byte stream on the calling thread, so an open
//! failure is returned to the caller, then spawns the producer. The producer
//! decodes frames and publishes them into the shared `FrameSlot` until its
//! continuation flag is cleared, then drops the stream.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use url::Url;

use super::mjpeg::{decode_jpeg, MjpegStream};
use crate::frame::{Frame, FrameSlot};

/// Opens the raw frame byte stream.
pub trait StreamOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn Read + Send>>;

    /// Human readable source description for logs.
    fn describe(&self) -> String;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP MJPEG endpoint (e.g. `http://localhost:44445/?action=stream`).
///
/// A read that stalls longer than the read timeout fails the stream, which
/// ends the producer with an error.
#[derive(Clone, Debug)]
pub struct HttpStreamOpener {
    url: String,
    agent: ureq::Agent,
}

impl HttpStreamOpener {
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).context("parse stream url")?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self {
                url: url.to_string(),
                agent: agent(READ_TIMEOUT),
            }),
            other => Err(anyhow!(
                "unsupported stream scheme '{}'; expected http(s)",
                other
            )),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.agent = agent(timeout);
        self
    }
}

fn agent(read_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(read_timeout)
        .build()
}

impl StreamOpener for HttpStreamOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("connect to mjpeg stream {}", self.url))?;
        Ok(response.into_reader())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Statistics reported by a finished producer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_published: u64,
    pub chunks_skipped: u64,
}

/// Handle to a running producer thread.
pub struct Capture {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<CaptureStats>>>,
    source: String,
}

impl Capture {
    pub fn start(opener: &dyn StreamOpener, slot: Arc<FrameSlot>) -> Result<Self> {
        let source = opener.describe();
        let reader = opener
            .open()
            .with_context(|| format!("open frame stream {}", source))?;
        log::info!("frame stream opened: {}", source);

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = std::thread::Builder::new()
            .name("frame-producer".into())
            .spawn(move || run_producer(MjpegStream::new(reader), &slot, &thread_running))
            .context("spawn frame producer")?;

        Ok(Self {
            running,
            handle: Some(handle),
            source,
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Surface a producer failure without stopping a healthy producer.
    pub fn check(&mut self) -> Result<()> {
        let finished = self.handle.as_ref().is_some_and(|h| h.is_finished());
        if finished {
            let stats = self.join()?;
            return Err(anyhow!(
                "frame producer for {} exited after {} frames",
                self.source,
                stats.frames_published
            ));
        }
        Ok(())
    }

    /// Clear the continuation flag and wait for the producer to release the
    /// stream. A producer that already failed reports its error here.
    pub fn stop(mut self) -> Result<CaptureStats> {
        self.running.store(false, Ordering::SeqCst);
        let stats = self.join()?;
        log::info!(
            "frame stream closed: {} ({} frames, {} skipped chunks)",
            self.source,
            stats.frames_published,
            stats.chunks_skipped
        );
        Ok(stats)
    }

    fn join(&mut self) -> Result<CaptureStats> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("frame producer thread panicked"))?,
            None => Ok(CaptureStats::default()),
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Producer loop: decode every delimited chunk and publish it.
///
/// A chunk that fails to decode is skipped. Stream read errors and an
/// unexpected end of stream end the producer with an error.
pub fn run_producer(
    mut stream: MjpegStream,
    slot: &FrameSlot,
    running: &AtomicBool,
) -> Result<CaptureStats> {
    let mut stats = CaptureStats::default();
    let mut seq = 0u64;
    while running.load(Ordering::SeqCst) {
        let Some(jpeg) = stream.read_next_jpeg()? else {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            return Err(anyhow!(
                "mjpeg stream ended after {} frames",
                stats.frames_published
            ));
        };
        let image = match decode_jpeg(&jpeg) {
            Ok(image) => image,
            Err(e) => {
                stats.chunks_skipped += 1;
                log::debug!("skipping malformed frame chunk: {:#}", e);
                continue;
            }
        };
        seq += 1;
        let frame = Frame::new(image, seq);
        log::trace!("frame {} brightness {:.1}", seq, frame.brightness);
        // The replaced frame, if any, is dropped here outside the slot lock.
        drop(slot.publish(frame));
        stats.frames_published += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    fn jpeg_bytes(value: u8) -> Vec<u8> {
        let image = RgbImage::from_pixel(16, 8, Rgb([value, value, value]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&image)
            .expect("encode jpeg");
        out
    }

    struct CursorOpener(Vec<u8>);

    impl StreamOpener for CursorOpener {
        fn open(&self) -> Result<Box<dyn Read + Send>> {
            Ok(Box::new(Cursor::new(self.0.clone())))
        }

        fn describe(&self) -> String {
            "cursor".into()
        }
    }

    struct FailingOpener;

    impl StreamOpener for FailingOpener {
        fn open(&self) -> Result<Box<dyn Read + Send>> {
            Err(anyhow!("connection refused"))
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    #[test]
    fn producer_skips_malformed_chunks_and_keeps_newest() {
        let mut data = b"--boundary\r\n".to_vec();
        data.extend(jpeg_bytes(40));
        data.extend(b"\r\n--boundary\r\n\xFF\xD8garbage\xFF\xD9\r\n");
        data.extend(jpeg_bytes(200));

        let slot = FrameSlot::new();
        let running = AtomicBool::new(true);
        let result = run_producer(MjpegStream::new(Box::new(Cursor::new(data))), &slot, &running);

        // Stream end while still running is an error, but frames got through.
        assert!(result.is_err());
        let frame = slot.try_take().expect("latest frame");
        assert_eq!(frame.seq, 2);
        assert!(frame.brightness > 150.0);
        assert_eq!(slot.published(), 2);
    }

    #[test]
    fn producer_exits_cleanly_when_flag_cleared() {
        let slot = FrameSlot::new();
        let running = AtomicBool::new(false);
        let stats = run_producer(
            MjpegStream::new(Box::new(Cursor::new(jpeg_bytes(10)))),
            &slot,
            &running,
        )
        .expect("clean exit");
        assert_eq!(stats, CaptureStats::default());
        assert!(slot.try_take().is_none());
    }

    #[test]
    fn open_failure_is_surfaced_to_caller() {
        let slot = Arc::new(FrameSlot::new());
        let err = Capture::start(&FailingOpener, slot).err().expect("open error");
        assert!(format!("{:#}", err).contains("connection refused"));
    }

    #[test]
    fn ended_stream_is_reported_by_check() {
        let slot = Arc::new(FrameSlot::new());
        let mut capture = Capture::start(&CursorOpener(jpeg_bytes(90)), slot.clone()).unwrap();
        let frame = slot.wait_take(Duration::from_secs(5)).expect("frame");
        assert_eq!(frame.seq, 1);
        while capture.is_running() {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(capture.check().is_err());
    }

    #[test]
    fn http_opener_rejects_other_schemes() {
        assert!(HttpStreamOpener::new("rtsp://camera").is_err());
        assert!(HttpStreamOpener::new("http://localhost:44445/?action=stream").is_ok());
    }

    #[test]
    fn stalled_http_stream_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = conn.read(&mut request);
            conn.write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n\
                  --frame\r\n",
            )
            .unwrap();
            std::thread::sleep(Duration::from_secs(3));
        });

        let opener = HttpStreamOpener::new(&format!("http://{}/?action=stream", addr))
            .unwrap()
            .with_read_timeout(Duration::from_millis(200));
        let mut reader = opener.open().expect("stream opens");
        let started = Instant::now();
        let mut buf = [0u8; 64];
        let result = loop {
            match reader.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) => break Err(e),
            }
        };
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
        server.join().unwrap();
    }
}
