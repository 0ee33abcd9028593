//! Background-difference motion classifier.
//!
//! Each frame is converted to grayscale and blurred, differenced against the
//! previous blurred frame and thresholded. The external regions of the
//! difference mask are filtered by area and merged into one bounding box. A
//! frame qualifies when that box covers less than `max_box_fraction` of the
//! frame; motion is confirmed after `confirm_frames` qualifying frames in a
//! row.

use image::{GrayImage, RgbImage};

use crate::config::MotionSettings;
use crate::vision::{abs_diff, blur, find_regions, threshold_mask, to_gray, BoundingBox};

/// Per-frame outcome of the difference analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Measurement {
    /// First frame after a reset; nothing to difference against.
    Warmup,
    /// Too many regions: sensor noise or a global lighting change.
    Noise { regions: usize },
    /// No region survived the area filter.
    Quiet,
    /// Union box of the surviving regions.
    Changed { bbox: BoundingBox, qualifies: bool },
}

impl Measurement {
    pub fn qualifies(&self) -> bool {
        matches!(self, Measurement::Changed { qualifies: true, .. })
    }
}

#[derive(Clone, Debug)]
pub struct MotionParams {
    pub blur_sigma: f32,
    pub diff_threshold: u8,
    pub max_regions: usize,
    /// Minimum region area at 640x480.
    pub min_region_area: f64,
    pub max_box_fraction: f64,
    pub confirm_frames: u32,
}

impl From<&MotionSettings> for MotionParams {
    fn from(s: &MotionSettings) -> Self {
        Self {
            blur_sigma: s.blur_sigma,
            diff_threshold: s.diff_threshold,
            max_regions: s.max_contours,
            min_region_area: s.min_contour_area,
            max_box_fraction: s.max_box_fraction,
            confirm_frames: s.confirm_frames,
        }
    }
}

/// Compare two blurred grayscale frames.
pub fn measure(prev: &GrayImage, cur: &GrayImage, params: &MotionParams) -> Measurement {
    let (w, h) = cur.dimensions();
    let frame_area = f64::from(w) * f64::from(h);
    let min_area = params.min_region_area * frame_area / (640.0 * 480.0);

    let mask = threshold_mask(&abs_diff(cur, prev), params.diff_threshold);
    let regions = find_regions(&mask, w, h);
    if regions.len() >= params.max_regions {
        return Measurement::Noise {
            regions: regions.len(),
        };
    }

    let bbox = regions
        .iter()
        .filter(|r| r.area as f64 > min_area)
        .map(|r| r.bbox)
        .reduce(|a, b| a.union(&b));
    match bbox {
        None => Measurement::Quiet,
        Some(bbox) => Measurement::Changed {
            bbox,
            qualifies: (bbox.area() as f64) < frame_area * params.max_box_fraction,
        },
    }
}

/// Consecutive-frame confirmation counter.
#[derive(Clone, Debug)]
pub struct Debounce {
    required: u32,
    count: u32,
}

impl Debounce {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            count: 0,
        }
    }

    /// Record one frame; any non-qualifying frame restarts the run.
    pub fn update(&mut self, qualifies: bool) -> bool {
        if qualifies {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 0;
        }
        self.is_confirmed()
    }

    pub fn is_confirmed(&self) -> bool {
        self.count >= self.required
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    pub measurement: Measurement,
    pub confirmed: bool,
}

pub struct MotionClassifier {
    params: MotionParams,
    prev: Option<GrayImage>,
    debounce: Debounce,
}

impl MotionClassifier {
    pub fn new(params: MotionParams) -> Self {
        let debounce = Debounce::new(params.confirm_frames);
        Self {
            params,
            prev: None,
            debounce,
        }
    }

    pub fn observe(&mut self, image: &RgbImage) -> Observation {
        let gray = blur(&to_gray(image), self.params.blur_sigma);
        let measurement = match self.prev.as_ref() {
            Some(prev) if prev.dimensions() == gray.dimensions() => {
                measure(prev, &gray, &self.params)
            }
            _ => Measurement::Warmup,
        };
        self.prev = Some(gray);

        let confirmed = match measurement {
            Measurement::Warmup => self.debounce.is_confirmed(),
            other => self.debounce.update(other.qualifies()),
        };
        Observation {
            measurement,
            confirmed,
        }
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.debounce.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn params() -> MotionParams {
        MotionParams::from(&crate::config::SentryConfig::default().motion)
    }

    /// 160x120 frame, mid-gray background with a bright 20x20 square at `x`.
    fn frame_with_square(x: Option<u32>) -> RgbImage {
        let mut image = RgbImage::from_pixel(160, 120, Rgb([40, 40, 40]));
        if let Some(x0) = x {
            for y in 50..70 {
                for x in x0..x0 + 20 {
                    image.put_pixel(x, y, Rgb([250, 250, 250]));
                }
            }
        }
        image
    }

    #[test]
    fn debounce_requires_consecutive_frames() {
        let mut d = Debounce::new(3);
        assert!(!d.update(true));
        assert!(!d.update(true));
        assert!(!d.update(false));
        assert!(!d.update(true));
        assert!(!d.update(true));
        assert!(d.update(true));
        assert_eq!(d.count(), 3);
    }

    #[test]
    fn identical_frames_are_quiet() {
        let gray = to_gray(&frame_with_square(Some(10)));
        assert_eq!(measure(&gray, &gray, &params()), Measurement::Quiet);
    }

    #[test]
    fn moving_square_qualifies() {
        let p = params();
        let a = blur(&to_gray(&frame_with_square(Some(10))), p.blur_sigma);
        let b = blur(&to_gray(&frame_with_square(Some(60))), p.blur_sigma);
        match measure(&a, &b, &p) {
            Measurement::Changed { bbox, qualifies } => {
                assert!(qualifies);
                assert!(bbox.x0 < 30 && bbox.x1 > 60);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn whole_frame_change_does_not_qualify() {
        let p = params();
        let dark = to_gray(&RgbImage::from_pixel(160, 120, Rgb([10, 10, 10])));
        let bright = to_gray(&RgbImage::from_pixel(160, 120, Rgb([240, 240, 240])));
        assert_eq!(
            measure(&dark, &bright, &p),
            Measurement::Changed {
                bbox: BoundingBox {
                    x0: 0,
                    y0: 0,
                    x1: 160,
                    y1: 120
                },
                qualifies: false
            }
        );
    }

    #[test]
    fn speckle_noise_is_rejected() {
        let mut p = params();
        p.max_regions = 5;
        let base = GrayImage::from_pixel(40, 40, image::Luma([0]));
        let mut noisy = base.clone();
        for i in 0..6 {
            noisy.put_pixel(i * 6, 3, image::Luma([255]));
        }
        assert_eq!(measure(&base, &noisy, &p), Measurement::Noise { regions: 6 });
    }

    #[test]
    fn classifier_confirms_on_third_moving_frame() {
        let mut classifier = MotionClassifier::new(params());
        let first = classifier.observe(&frame_with_square(None));
        assert_eq!(first.measurement, Measurement::Warmup);

        assert!(!classifier.observe(&frame_with_square(Some(10))).confirmed);
        assert!(!classifier.observe(&frame_with_square(Some(50))).confirmed);
        assert!(classifier.observe(&frame_with_square(Some(90))).confirmed);
    }

    #[test]
    fn still_frame_breaks_the_run() {
        let mut classifier = MotionClassifier::new(params());
        classifier.observe(&frame_with_square(None));
        assert!(!classifier.observe(&frame_with_square(Some(10))).confirmed);
        assert!(!classifier.observe(&frame_with_square(Some(50))).confirmed);
        assert!(!classifier.observe(&frame_with_square(Some(50))).confirmed);
        assert!(!classifier.observe(&frame_with_square(Some(90))).confirmed);
    }
}
