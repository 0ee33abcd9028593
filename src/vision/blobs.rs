//! Multi-threshold blob detection for the docking markers.
//!
//! The grayscale frame is binarised at a ladder of thresholds. At each level
//! the dark 8-connected regions are filtered by area and circularity (not by
//! convexity or inertia). Centres that line up across levels are grouped, and
//! a group seen at enough levels becomes one blob whose position is the mean
//! of its members and whose size is twice the median member radius.

use image::GrayImage;

use super::regions::find_regions;

/// A detected blob. `size` is a keypoint diameter in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blob {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl Blob {
    pub fn new(x: f64, y: f64, size: f64) -> Self {
        Self { x, y, size }
    }
}

#[derive(Clone, Debug)]
pub struct BlobParams {
    pub min_threshold: u8,
    pub max_threshold: u8,
    pub threshold_step: u8,
    pub min_area: f64,
    pub max_area: f64,
    pub min_circularity: f64,
    pub min_dist_between_blobs: f64,
    pub min_repeatability: usize,
}

impl BlobParams {
    /// Marker parameters calibrated at 640x480 and scaled to `width x height`.
    pub fn for_frame(width: u32, height: u32) -> Self {
        let area_factor = f64::from(width) * f64::from(height) / (640.0 * 480.0);
        Self {
            min_area: 100.0 * area_factor,
            max_area: 100_000.0 * area_factor,
            ..Self::default()
        }
    }
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            min_threshold: 20,
            max_threshold: 200,
            threshold_step: 10,
            min_area: 100.0,
            max_area: 100_000.0,
            min_circularity: 0.80,
            min_dist_between_blobs: 10.0,
            min_repeatability: 2,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Center {
    x: f64,
    y: f64,
    radius: f64,
}

pub struct BlobDetector {
    params: BlobParams,
}

impl BlobDetector {
    pub fn new(params: BlobParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BlobParams {
        &self.params
    }

    /// Detect blobs, returned sorted by ascending x.
    pub fn detect(&self, gray: &GrayImage) -> Vec<Blob> {
        let p = &self.params;
        let step = p.threshold_step.max(1);
        // Groups of centres, each kept sorted by radius.
        let mut groups: Vec<Vec<Center>> = Vec::new();

        let mut threshold = p.min_threshold;
        while threshold < p.max_threshold {
            let level = self.centers_at(gray, threshold);
            let mut new_groups = Vec::new();
            for center in level {
                let matched = groups.iter_mut().find(|group| {
                    let mid = group[group.len() / 2];
                    let dist = (mid.x - center.x).hypot(mid.y - center.y);
                    dist < p.min_dist_between_blobs || dist < mid.radius || dist < center.radius
                });
                match matched {
                    Some(group) => {
                        let at = group.partition_point(|c| c.radius < center.radius);
                        group.insert(at, center);
                    }
                    None => new_groups.push(vec![center]),
                }
            }
            groups.extend(new_groups);
            threshold = match threshold.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }

        let mut blobs: Vec<Blob> = groups
            .into_iter()
            .filter(|group| group.len() >= p.min_repeatability)
            .map(|group| {
                let n = group.len() as f64;
                let x = group.iter().map(|c| c.x).sum::<f64>() / n;
                let y = group.iter().map(|c| c.y).sum::<f64>() / n;
                Blob::new(x, y, group[group.len() / 2].radius * 2.0)
            })
            .collect();
        blobs.sort_by(|a, b| a.x.total_cmp(&b.x));
        blobs
    }

    fn centers_at(&self, gray: &GrayImage, threshold: u8) -> Vec<Center> {
        let p = &self.params;
        let mask: Vec<bool> = gray.pixels().map(|px| px.0[0] <= threshold).collect();
        find_regions(&mask, gray.width(), gray.height())
            .into_iter()
            .filter(|r| {
                let area = r.area as f64;
                area >= p.min_area && area < p.max_area
            })
            .filter(|r| r.circularity() >= p.min_circularity)
            .filter(|r| {
                // Dark blobs only: the centre itself must be below threshold.
                let cx = (r.centroid.0.round() as u32).min(gray.width() - 1);
                let cy = (r.centroid.1.round() as u32).min(gray.height() - 1);
                gray.get_pixel(cx, cy).0[0] <= threshold
            })
            .map(|r| Center {
                x: r.centroid.0,
                y: r.centroid.1,
                radius: r.equivalent_radius(),
            })
            .collect()
    }
}
