//! Small software rasterizer used for both the frame overlay and the
//! histogram figure. Everything clips against the image bounds.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};

pub const GLYPH_SIZE: i32 = 8;

pub fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| (f64::from(d) * inv + f64::from(s) * a).round().clamp(0.0, 255.0) as u8;
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * (1.0 - f64::from(dst[3]) / 255.0))
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

fn blend_at(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(img.width()) || y >= i64::from(img.height()) {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    let dst = *img.get_pixel(x, y);
    img.put_pixel(x, y, blend_pixel(dst, color));
}

/// Fills the half-open rectangle `[x0, x1) x [y0, y1)`; corner order does not
/// matter.
pub fn fill_rect_alpha(img: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let w = i64::from(img.width());
    let h = i64::from(img.height());
    let min_x = x0.min(x1).clamp(0, w);
    let max_x = x0.max(x1).clamp(0, w);
    let min_y = y0.min(y1).clamp(0, h);
    let max_y = y0.max(y1).clamp(0, h);
    for y in min_y..max_y {
        for x in min_x..max_x {
            blend_at(img, x, y, color);
        }
    }
}

/// Outlines `[left, right] x [top, bottom]`, growing the stroke outward by
/// `thickness - 1` pixels. A zero-width or zero-height rect draws a line.
pub fn stroke_rect(
    img: &mut RgbaImage,
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
    color: Rgba<u8>,
    thickness: u32,
) {
    let (x0, x1) = (left.min(right), left.max(right));
    let (y0, y1) = (top.min(bottom), top.max(bottom));
    let (w, h) = (i64::from(img.width()), i64::from(img.height()));
    for t in 0..i64::from(thickness.max(1)) {
        let (tx0, ty0) = (x0.saturating_sub(t), y0.saturating_sub(t));
        let (tx1, ty1) = (x1.saturating_add(t), y1.saturating_add(t));
        for x in tx0.max(0)..=tx1.min(w - 1) {
            blend_at(img, x, ty0, color);
            if ty1 != ty0 {
                blend_at(img, x, ty1, color);
            }
        }
        for y in ty0.saturating_add(1).max(0)..ty1.min(h) {
            blend_at(img, tx0, y, color);
            if tx1 != tx0 {
                blend_at(img, tx1, y, color);
            }
        }
    }
}

pub fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    if radius <= 0.1 {
        blend_at(img, cx.round() as i64, cy.round() as i64, color);
        return;
    }
    let min_x = (cx - radius).floor() as i64;
    let max_x = (cx + radius).ceil() as i64;
    let min_y = (cy - radius).floor() as i64;
    let max_y = (cy + radius).ceil() as i64;
    let r2 = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            if dx * dx + dy * dy <= r2 {
                blend_at(img, x, y, color);
            }
        }
    }
}

pub fn draw_thick_line(
    img: &mut RgbaImage,
    (x1, y1): (f64, f64),
    (x2, y2): (f64, f64),
    color: Rgba<u8>,
    width: f64,
) {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let steps = (dx * dx + dy * dy).sqrt().max(1.0).ceil() as i64;
    let radius = (width.max(1.0) / 2.0).max(0.6);
    for step in 0..=steps {
        let t = step as f64 / steps as f64;
        draw_disc(img, x1 + dx * t, y1 + dy * t, radius, color);
    }
}

/// Axis-aligned dashed line with `dash` pixels on, `gap` pixels off.
#[allow(clippy::too_many_arguments)]
pub fn draw_dashed_line(
    img: &mut RgbaImage,
    (x1, y1): (i64, i64),
    (x2, y2): (i64, i64),
    color: Rgba<u8>,
    thickness: u32,
    dash: u32,
    gap: u32,
) {
    let len = (x2 - x1).abs().max((y2 - y1).abs());
    let period = i64::from(dash.max(1) + gap);
    let half = i64::from(thickness.max(1)) / 2;
    let horizontal = y1 == y2;
    for i in 0..=len {
        if i % period >= i64::from(dash.max(1)) {
            continue;
        }
        let t = if len == 0 { 0.0 } else { i as f64 / len as f64 };
        let x = x1 + ((x2 - x1) as f64 * t).round() as i64;
        let y = y1 + ((y2 - y1) as f64 * t).round() as i64;
        for w in 0..i64::from(thickness.max(1)) {
            if horizontal {
                blend_at(img, x, y - half + w, color);
            } else {
                blend_at(img, x - half + w, y, color);
            }
        }
    }
}

pub fn draw_bitmap_text(img: &mut RgbaImage, x: i64, y: i64, text: &str, color: Rgba<u8>, scale: u32) {
    let scale_i = i64::from(scale.max(1));
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += i64::from(GLYPH_SIZE) * scale_i;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col_idx in 0..GLYPH_SIZE {
                if (*row >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + i64::from(col_idx) * scale_i;
                let py = y + row_idx as i64 * scale_i;
                for sy in 0..scale_i {
                    for sx in 0..scale_i {
                        blend_at(img, px + sx, py + sy, color);
                    }
                }
            }
        }
        cursor_x += i64::from(GLYPH_SIZE) * scale_i;
    }
}

pub fn text_width(text: &str, scale: u32) -> i64 {
    text.chars().count() as i64 * i64::from(GLYPH_SIZE) * i64::from(scale.max(1))
}
