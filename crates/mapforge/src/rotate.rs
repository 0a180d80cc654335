//! Arbitrary-angle rotation with an expanded canvas
//!
//! Rotation is clockwise, about the image center. The output canvas grows to
//! the bounding box of the rotated image and uncovered pixels are fully
//! transparent. Quarter turns take the exact pixel-copy path.

use image::{Rgba, RgbaImage, imageops};

/// Tolerance for snapping an angle to a quarter turn
const QUARTER_TURN_EPSILON: f64 = 1e-9;

/// Rotate `image` clockwise by `degrees`
pub fn rotate_expand(image: &RgbaImage, degrees: f64) -> RgbaImage {
    let turn = degrees.rem_euclid(360.0);
    let near = |target: f64| (turn - target).abs() < QUARTER_TURN_EPSILON;

    if near(0.0) || near(360.0) {
        return image.clone();
    }
    if near(90.0) {
        return imageops::rotate90(image);
    }
    if near(180.0) {
        return imageops::rotate180(image);
    }
    if near(270.0) {
        return imageops::rotate270(image);
    }

    let (sin, cos) = turn.to_radians().sin_cos();
    let (src_w, src_h) = (image.width() as f64, image.height() as f64);
    let out_w = (src_w * cos.abs() + src_h * sin.abs()).ceil().max(1.0) as u32;
    let out_h = (src_w * sin.abs() + src_h * cos.abs()).ceil().max(1.0) as u32;

    let (src_cx, src_cy) = (src_w / 2.0, src_h / 2.0);
    let (out_cx, out_cy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    RgbaImage::from_fn(out_w, out_h, |x, y| {
        let dx = x as f64 + 0.5 - out_cx;
        let dy = y as f64 + 0.5 - out_cy;
        // inverse of the clockwise rotation (y axis points down)
        let sx = dx * cos + dy * sin + src_cx - 0.5;
        let sy = -dx * sin + dy * cos + src_cy - 0.5;
        sample_bilinear(image, sx, sy)
    })
}

fn texel(image: &RgbaImage, x: i64, y: i64) -> [f64; 4] {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return [0.0; 4];
    }
    let Rgba([r, g, b, a]) = *image.get_pixel(x as u32, y as u32);
    let alpha = a as f64 / 255.0;
    // premultiplied so transparent neighbours do not darken edges
    [r as f64 * alpha, g as f64 * alpha, b as f64 * alpha, a as f64]
}

fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let corners = [
        (texel(image, x0, y0), (1.0 - fx) * (1.0 - fy)),
        (texel(image, x0 + 1, y0), fx * (1.0 - fy)),
        (texel(image, x0, y0 + 1), (1.0 - fx) * fy),
        (texel(image, x0 + 1, y0 + 1), fx * fy),
    ];

    let mut acc = [0.0f64; 4];
    for (value, weight) in corners {
        for (slot, channel) in acc.iter_mut().zip(value) {
            *slot += channel * weight;
        }
    }

    let alpha = acc[3];
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let unpremultiply = |c: f64| (c * 255.0 / alpha).round().clamp(0.0, 255.0) as u8;
    Rgba([
        unpremultiply(acc[0]),
        unpremultiply(acc[1]),
        unpremultiply(acc[2]),
        alpha.round().clamp(0.0, 255.0) as u8,
    ])
}
