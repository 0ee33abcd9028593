//! Connected foreground regions of a binary mask.
//!
//! Regions are 8-connected. Each region carries its pixel area, bounding box,
//! centroid and the length of its traced outer contour, which is what the
//! motion engine (bounding boxes) and blob detector (circularity) need.

use std::f64::consts::SQRT_2;

/// Axis-aligned box, `x1`/`y1` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Region {
    /// Pixel count.
    pub area: usize,
    pub bbox: BoundingBox,
    pub centroid: (f64, f64),
    /// Outer contour length through boundary pixel centres.
    pub perimeter: f64,
}

impl Region {
    /// `4πA / P²`; 1.0 for a disc. Single pixels and lines report 0.
    pub fn circularity(&self) -> f64 {
        if self.perimeter <= 0.0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area as f64 / (self.perimeter * self.perimeter)
    }

    /// Radius of the disc with the same area.
    pub fn equivalent_radius(&self) -> f64 {
        (self.area as f64 / std::f64::consts::PI).sqrt()
    }
}

// Clockwise on screen (y grows downwards), starting east.
const DIRS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Label the 8-connected regions of `mask` (row-major, `width * height`).
///
/// Regions are returned in raster order of their top-left-most pixel.
pub fn find_regions(mask: &[bool], width: u32, height: u32) -> Vec<Region> {
    let (w, h) = (width as usize, height as usize);
    debug_assert_eq!(mask.len(), w * h);
    let mut labels = vec![0u32; w * h];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for start in 0..w * h {
        if !mask[start] || labels[start] != 0 {
            continue;
        }
        let label = regions.len() as u32 + 1;
        labels[start] = label;
        stack.push(start);

        let mut area = 0usize;
        let (mut sum_x, mut sum_y) = (0u64, 0u64);
        let (sx, sy) = ((start % w) as u32, (start / w) as u32);
        let mut bbox = BoundingBox {
            x0: sx,
            y0: sy,
            x1: sx + 1,
            y1: sy + 1,
        };

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            area += 1;
            sum_x += x as u64;
            sum_y += y as u64;
            bbox.x0 = bbox.x0.min(x as u32);
            bbox.y0 = bbox.y0.min(y as u32);
            bbox.x1 = bbox.x1.max(x as u32 + 1);
            bbox.y1 = bbox.y1.max(y as u32 + 1);

            for (dx, dy) in DIRS {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if mask[n] && labels[n] == 0 {
                    labels[n] = label;
                    stack.push(n);
                }
            }
        }

        let perimeter = trace_perimeter(&labels, label, w, h, (sx as i64, sy as i64));
        regions.push(Region {
            area,
            bbox,
            centroid: (sum_x as f64 / area as f64, sum_y as f64 / area as f64),
            perimeter,
        });
    }
    regions
}

/// Radial-sweep trace of the outer contour starting from the region's first
/// raster pixel. Axis steps count 1, diagonal steps √2.
fn trace_perimeter(labels: &[u32], label: u32, w: usize, h: usize, start: (i64, i64)) -> f64 {
    let inside = |(x, y): (i64, i64)| {
        x >= 0 && y >= 0 && x < w as i64 && y < h as i64 && labels[y as usize * w + x as usize] == label
    };

    let mut cur = start;
    // Pointer to the previous contour pixel; the start's west side is outside.
    let mut back = 4usize;
    let mut first_dir = None;
    let mut perimeter = 0.0;
    // Every contour pixel is entered at most from each of its 8 sides.
    let max_steps = 8 * w * h + 8;

    for _ in 0..max_steps {
        let Some(dir) = (1..=8)
            .map(|k| (back + k) % 8)
            .find(|&d| inside((cur.0 + DIRS[d].0, cur.1 + DIRS[d].1)))
        else {
            // Isolated pixel.
            return 0.0;
        };

        if cur == start {
            match first_dir {
                Some(first) if first == dir => break,
                None => first_dir = Some(dir),
                _ => {}
            }
        }

        perimeter += if dir % 2 == 0 { 1.0 } else { SQRT_2 };
        cur = (cur.0 + DIRS[dir].0, cur.1 + DIRS[dir].1);
        back = (dir + 4) % 8;
    }
    perimeter
}
