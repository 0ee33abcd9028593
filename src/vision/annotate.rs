//! Overlay drawing for persisted frames.

use image::{Rgb, RgbImage};

use super::regions::BoundingBox;

pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Circle outline of `thickness` pixels, clipped to the image.
pub fn draw_circle(image: &mut RgbImage, cx: f64, cy: f64, radius: f64, color: Rgb<u8>, thickness: u32) {
    if radius <= 0.0 {
        return;
    }
    let outer = radius + f64::from(thickness) / 2.0;
    let inner = (radius - f64::from(thickness) / 2.0).max(0.0);
    let (x0, x1) = ((cx - outer).floor() as i64, (cx + outer).ceil() as i64);
    let (y0, y1) = ((cy - outer).floor() as i64, (cy + outer).ceil() as i64);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let d = (x as f64 - cx).hypot(y as f64 - cy);
            if d >= inner && d <= outer {
                put(image, x, y, color);
            }
        }
    }
}

/// Rectangle outline along the inside of `bbox`.
pub fn draw_rect(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    if bbox.width() == 0 || bbox.height() == 0 {
        return;
    }
    let (x0, y0) = (i64::from(bbox.x0), i64::from(bbox.y0));
    let (x1, y1) = (i64::from(bbox.x1) - 1, i64::from(bbox.y1) - 1);
    for t in 0..i64::from(thickness) {
        for x in x0..=x1 {
            put(image, x, y0 + t, color);
            put(image, x, y1 - t, color);
        }
        for y in y0..=y1 {
            put(image, x0 + t, y, color);
            put(image, x1 - t, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_outline_leaves_interior_untouched() {
        let mut image = RgbImage::new(10, 10);
        let bbox = BoundingBox {
            x0: 2,
            y0: 2,
            x1: 8,
            y1: 8,
        };
        draw_rect(&mut image, &bbox, YELLOW, 1);
        assert_eq!(*image.get_pixel(2, 2), YELLOW);
        assert_eq!(*image.get_pixel(7, 7), YELLOW);
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(8, 8), Rgb([0, 0, 0]));
    }

    #[test]
    fn circle_is_clipped_at_edges() {
        let mut image = RgbImage::new(10, 10);
        draw_circle(&mut image, 0.0, 0.0, 5.0, GREEN, 2);
        assert_eq!(*image.get_pixel(5, 0), GREEN);
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
    }
}
