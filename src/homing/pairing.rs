//! Dock marker pairing.
//!
//! The dock carries two equal dark markers with a smaller one between them,
//! spaced about three marker diameters apart. `pair_blobs` scans detected
//! blobs left to right and returns the first window that matches that
//! geometry.

use crate::vision::{Blob, BoundingBox};

/// Maximum relative size difference between the outer markers.
pub const MAX_SIZE_DIFF: f64 = 0.3;
/// Maximum relative deviation of the outer spacing from three average sizes.
pub const MAX_SPACING_DIFF: f64 = 0.3;
/// Expected outer spacing in average marker sizes.
pub const SPACING_RATIO: f64 = 3.0;

/// A validated marker set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlobTriple {
    pub left: Blob,
    pub middle: Option<Blob>,
    pub right: Blob,
}

impl BlobTriple {
    pub fn avg_size(&self) -> f64 {
        (self.left.size + self.right.size) / 2.0
    }

    pub fn spacing(&self) -> f64 {
        self.right.x - self.left.x
    }

    /// Midpoint between the outer markers.
    pub fn midpoint(&self) -> (f64, f64) {
        (
            (self.left.x + self.right.x) / 2.0,
            (self.left.y + self.right.y) / 2.0,
        )
    }

    /// Box enclosing every marker of the set, clipped to the frame.
    pub fn bounding_box(&self, width: u32, height: u32) -> BoundingBox {
        let blobs = [Some(self.left), self.middle, Some(self.right)];
        let mut x0 = f64::MAX;
        let mut y0 = f64::MAX;
        let mut x1 = f64::MIN;
        let mut y1 = f64::MIN;
        for blob in blobs.iter().flatten() {
            let r = blob.size / 2.0;
            x0 = x0.min(blob.x - r);
            y0 = y0.min(blob.y - r);
            x1 = x1.max(blob.x + r);
            y1 = y1.max(blob.y + r);
        }
        let clip = |v: f64, max: u32| v.max(0.0).min(f64::from(max)) as u32;
        BoundingBox {
            x0: clip(x0.floor(), width),
            y0: clip(y0.floor(), height),
            x1: clip(x1.ceil(), width),
            y1: clip(y1.ceil(), height),
        }
    }
}

/// Outer marker check: similar sizes, spacing near three sizes.
pub fn validate_pair(left: &Blob, right: &Blob) -> bool {
    let dist = right.x - left.x;
    let avg = (left.size + right.size) / 2.0;
    if avg <= 0.0 {
        return false;
    }
    let expected = avg * SPACING_RATIO;
    let size_ok = ((left.size - right.size) / avg).abs() < MAX_SIZE_DIFF;
    let spacing_ok = ((dist - expected) / ((dist + expected) / 2.0)).abs() < MAX_SPACING_DIFF;
    size_ok && spacing_ok
}

fn is_middle_candidate(left: &Blob, blob: &Blob) -> bool {
    blob.size > left.size / 4.0 && blob.size < left.size / 2.0
}

/// Greedy left-to-right scan for the first valid marker window.
///
/// `blobs` must be sorted by ascending x. A blob becomes the middle marker
/// when no middle is held yet and its size is strictly between a quarter and
/// half of the left marker; otherwise it is tried as the right marker unless
/// it is smaller than half the left one, in which case it is skipped. When a
/// candidate pair fails validation the window slides by one: the middle (or,
/// without a middle, the right) becomes the new left.
pub fn pair_blobs(blobs: &[Blob]) -> Option<BlobTriple> {
    let mut left: Option<Blob> = None;
    let mut middle: Option<Blob> = None;

    for blob in blobs {
        let Some(l) = left else {
            left = Some(*blob);
            continue;
        };
        if middle.is_none() && is_middle_candidate(&l, blob) {
            middle = Some(*blob);
            continue;
        }
        if blob.size < l.size / 2.0 {
            continue;
        }
        let right = *blob;
        if validate_pair(&l, &right) {
            return Some(BlobTriple {
                left: l,
                middle,
                right,
            });
        }
        log::trace!(
            "marker pair rejected: left x={:.1} size={:.1}, right x={:.1} size={:.1}",
            l.x,
            l.size,
            right.x,
            right.size
        );
        match middle.take() {
            Some(m) => {
                left = Some(m);
                middle = Some(right);
            }
            None => left = Some(right),
        }
    }
    None
}
