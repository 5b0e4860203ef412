//! Composition of one displayed frame: the decoded raster letterboxed into
//! the viewport with both box sets painted on top.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::corpus::DetBox;
use crate::draw::{fill_rect_alpha, stroke_rect};
use crate::error::ReviewError;
use crate::overlay::{fit, ScreenRect, ViewportTransform};

const LETTERBOX: Rgba<u8> = Rgba([32, 32, 32, 255]);
const OLD_FILL: Rgba<u8> = Rgba([0, 255, 0, 80]);
const NEW_OUTLINE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const NEW_OUTLINE_WIDTH: u32 = 2;

/// Scales `frame` into a `viewport_w x viewport_h` canvas and draws both box
/// sets on top: `old` as translucent green fills, `new` as black outlines.
pub fn compose_view(
    frame: &RgbaImage,
    (viewport_w, viewport_h): (u32, u32),
    old: &[DetBox],
    new: &[DetBox],
) -> Result<(RgbaImage, ViewportTransform), ReviewError> {
    let transform = fit(
        i64::from(frame.width()),
        i64::from(frame.height()),
        i64::from(viewport_w),
        i64::from(viewport_h),
    )?;

    let mut canvas = RgbaImage::from_pixel(viewport_w, viewport_h, LETTERBOX);
    if transform.dest_w > 0 && transform.dest_h > 0 {
        let (dest_w, dest_h) = (transform.dest_w as u32, transform.dest_h as u32);
        if (dest_w, dest_h) == frame.dimensions() {
            imageops::overlay(&mut canvas, frame, transform.offset_x, transform.offset_y);
        } else {
            let scaled = imageops::resize(frame, dest_w, dest_h, FilterType::Triangle);
            imageops::overlay(&mut canvas, &scaled, transform.offset_x, transform.offset_y);
        }
    }

    for rect in transform.project_all(old) {
        fill_box(&mut canvas, &rect);
    }
    for rect in transform.project_all(new) {
        stroke_rect(
            &mut canvas,
            rect.left,
            rect.top,
            rect.right,
            rect.bottom,
            NEW_OUTLINE,
            NEW_OUTLINE_WIDTH,
        );
    }

    Ok((canvas, transform))
}

fn fill_box(canvas: &mut RgbaImage, rect: &ScreenRect) {
    if rect.is_empty() {
        // Nothing to fill; keep the box visible as a hairline.
        stroke_rect(canvas, rect.left, rect.top, rect.right, rect.bottom, OLD_FILL, 1);
    } else {
        fill_rect_alpha(canvas, rect.left, rect.top, rect.right, rect.bottom, OLD_FILL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn frame_is_centred_in_viewport() {
        let frame = RgbaImage::from_pixel(640, 480, WHITE);
        let (canvas, t) = compose_view(&frame, (1280, 480), &[], &[]).unwrap();
        assert_eq!(canvas.dimensions(), (1280, 480));
        assert_eq!(*canvas.get_pixel(100, 100), LETTERBOX);
        assert_eq!(*canvas.get_pixel(320, 0), WHITE);
        assert_eq!(*canvas.get_pixel(959, 479), WHITE);
        assert_eq!(*canvas.get_pixel(960, 240), LETTERBOX);
        assert_eq!(t.offset_x, 320);
    }

    #[test]
    fn boxes_land_at_projected_positions() {
        let frame = RgbaImage::from_pixel(640, 480, WHITE);
        let old = [DetBox::new(100.0, 100.0, 200.0, 150.0)];
        let new = [DetBox::new(200.0, 150.0, 100.0, 100.0)];
        let (canvas, _) = compose_view(&frame, (1280, 480), &old, &new).unwrap();

        let inside = *canvas.get_pixel(470, 125);
        assert!(inside[1] == 255 && inside[0] < 255 && inside[2] < 255);
        assert_eq!(*canvas.get_pixel(420, 100), NEW_OUTLINE);
        assert_eq!(*canvas.get_pixel(520, 150), NEW_OUTLINE);
        assert_eq!(*canvas.get_pixel(600, 300), WHITE);
    }

    #[test]
    fn zero_area_old_box_stays_visible() {
        let frame = RgbaImage::from_pixel(10, 10, WHITE);
        let (canvas, _) =
            compose_view(&frame, (10, 10), &[DetBox::new(5.0, 2.0, 5.0, 8.0)], &[]).unwrap();
        assert_ne!(*canvas.get_pixel(5, 4), WHITE);
    }

    #[test]
    fn huge_coordinates_do_not_overflow() {
        let frame = RgbaImage::from_pixel(10, 10, WHITE);
        let old = [DetBox::new(-1e30, 0.0, 1e30, 5.0)];
        let new = [DetBox::new(-1e30, -1e30, 1e30, 1e30)];
        let (canvas, _) = compose_view(&frame, (20, 20), &old, &new).unwrap();
        assert_ne!(*canvas.get_pixel(0, 5), WHITE);
        assert_ne!(*canvas.get_pixel(19, 9), WHITE);
        assert_eq!(*canvas.get_pixel(10, 15), WHITE);
    }

    #[test]
    fn zero_viewport_is_degenerate() {
        let frame = RgbaImage::from_pixel(10, 10, WHITE);
        assert!(matches!(
            compose_view(&frame, (0, 10), &[], &[]),
            Err(ReviewError::DegenerateViewport { .. })
        ));
    }
}
