//! Procedural stand-ins for the image assets, used when a host ships none.

use image::{Rgba, RgbaImage};

/// Grid control texture for the plane shader. Red marks dots at grid
/// intersections, green marks the lines between them.
pub fn trigrid_image(size: u32, cell: u32) -> RgbaImage {
    let cell = cell.max(2);
    let dot_radius = (cell / 8).max(1) as i64;
    RgbaImage::from_fn(size, size, |x, y| {
        let (cx, cy) = (x % cell, y % cell);
        let dx = nearest_edge(cx, cell);
        let dy = nearest_edge(cy, cell);
        let dot = dx * dx + dy * dy <= dot_radius * dot_radius;
        let line = dx == 0 || dy == 0 || cx == cy;
        Rgba([if dot { 255 } else { 0 }, if line { 255 } else { 0 }, 0, 255])
    })
}

fn nearest_edge(offset: u32, cell: u32) -> i64 {
    let offset = offset as i64;
    offset.min(cell as i64 - offset)
}

/// One-row color ramp for depth: near is blue, middle is green, far is red.
pub fn depth_palette_image(width: u32) -> RgbaImage {
    let span = width.saturating_sub(1).max(1) as f32;
    RgbaImage::from_fn(width, 1, |x, _| {
        let t = x as f32 / span;
        let (r, g, b) = if t < 0.5 {
            let k = t * 2.0;
            (0.0, k, 1.0 - k)
        } else {
            let k = (t - 0.5) * 2.0;
            (k, 1.0 - k, 0.0)
        };
        Rgba([to_byte(r), to_byte(g), to_byte(b), 255])
    })
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigrid_marks_intersections() {
        let img = trigrid_image(64, 16);
        assert_eq!(img.dimensions(), (64, 64));
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 0, 255]);
        assert_eq!(img.get_pixel(16, 16).0[0], 255);
        // Off-diagonal cell interior: neither dot nor line.
        assert_eq!(img.get_pixel(8, 5).0, [0, 0, 0, 255]);
        // Along an edge but far from a corner: line only.
        assert_eq!(img.get_pixel(8, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_depth_palette_ramp() {
        let img = depth_palette_image(256);
        assert_eq!(img.dimensions(), (256, 1));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(img.get_pixel(255, 0).0, [255, 0, 0, 255]);
        let mid = img.get_pixel(128, 0).0;
        assert!(mid[1] > 240 && mid[0] < 10);
    }
}
