//! MJPEG byte-stream framing.
//!
//! An MJPEG HTTP stream is consumed as an unbounded byte sequence. Each JPEG
//! image is delimited by the SOI marker `FF D8` and the EOI marker `FF D9`;
//! multipart headers between images are skipped by the scan.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::io::Read;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK_BYTES: usize = 1024;

/// Splits a byte stream into encoded JPEG chunks.
pub struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Read until one complete SOI..EOI chunk is buffered and return it.
    ///
    /// Returns `Ok(None)` when the stream ends. Read errors are returned as-is:
    /// they are fatal for the stream.
    pub fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                // Keep the tail so a marker split across reads still matches.
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Locate the first `FF D8` and the first `FF D9` after it.
pub fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

/// Decode one JPEG chunk into an RGB image.
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg chunk"));
    }
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .context("decode jpeg")?;
    Ok(image.into_rgb8())
}
