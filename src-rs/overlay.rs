//! Image-space to viewport-space mapping: uniform scale that fits the whole
//! image, centred in the viewport.

use serde::Serialize;

use crate::corpus::DetBox;
use crate::error::ReviewError;

/// Projected corners are held inside `±COORD_LIMIT` so arithmetic on a
/// rectangle can never overflow, whatever the corpus contains.
pub const COORD_LIMIT: i64 = 1 << 31;

/// Scale + translate from image pixels to viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportTransform {
    pub scale: f64,
    pub dest_w: i64,
    pub dest_h: i64,
    pub offset_x: i64,
    pub offset_y: i64,
}

/// Projected box in viewport pixels, corners ordered so `left <= right` and
/// `top <= bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenRect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl ScreenRect {
    pub fn width(&self) -> i64 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i64 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

pub fn fit(image_w: i64, image_h: i64, viewport_w: i64, viewport_h: i64) -> Result<ViewportTransform, ReviewError> {
    if image_w <= 0 || image_h <= 0 || viewport_w <= 0 || viewport_h <= 0 {
        return Err(ReviewError::DegenerateViewport {
            image_w,
            image_h,
            viewport_w,
            viewport_h,
        });
    }

    let scale = (viewport_w as f64 / image_w as f64).min(viewport_h as f64 / image_h as f64);
    let dest_w = (image_w as f64 * scale).round() as i64;
    let dest_h = (image_h as f64 * scale).round() as i64;
    Ok(ViewportTransform {
        scale,
        dest_w,
        dest_h,
        offset_x: (viewport_w - dest_w).div_euclid(2),
        offset_y: (viewport_h - dest_h).div_euclid(2),
    })
}

impl ViewportTransform {
    pub fn map_point(&self, x: f64, y: f64) -> (i64, i64) {
        let place = |v: f64, offset: i64| {
            ((v * self.scale + offset as f64).round() as i64).clamp(-COORD_LIMIT, COORD_LIMIT)
        };
        (place(x, self.offset_x), place(y, self.offset_y))
    }

    pub fn project(&self, det: &DetBox) -> ScreenRect {
        let (ax, ay) = self.map_point(det.x1, det.y1);
        let (bx, by) = self.map_point(det.x2, det.y2);
        ScreenRect {
            left: ax.min(bx),
            top: ay.min(by),
            right: ax.max(bx),
            bottom: ay.max(by),
        }
    }

    pub fn project_all(&self, boxes: &[DetBox]) -> Vec<ScreenRect> {
        boxes.iter().map(|det| self.project(det)).collect()
    }
}

/// Free-function form of [`ViewportTransform::project`].
pub fn project(det: &DetBox, transform: &ViewportTransform) -> ScreenRect {
    transform.project(det)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_viewport_pillarboxes() {
        let t = fit(640, 480, 1280, 480).unwrap();
        assert_eq!(t.scale, 1.0);
        assert_eq!((t.dest_w, t.dest_h), (640, 480));
        assert_eq!((t.offset_x, t.offset_y), (320, 0));
    }

    #[test]
    fn tall_viewport_letterboxes_and_downscales() {
        let t = fit(1920, 1080, 960, 1000).unwrap();
        assert_eq!(t.scale, 0.5);
        assert_eq!((t.dest_w, t.dest_h), (960, 540));
        assert_eq!((t.offset_x, t.offset_y), (0, 230));
    }

    #[test]
    fn odd_slack_floors_offset() {
        let t = fit(100, 100, 101, 100).unwrap();
        assert_eq!(t.offset_x, 0);
        let t = fit(100, 100, 103, 100).unwrap();
        assert_eq!(t.offset_x, 1);
    }

    #[test]
    fn projects_with_offset() {
        let t = fit(640, 480, 1280, 480).unwrap();
        let rect = project(&DetBox::new(100.0, 100.0, 200.0, 150.0), &t);
        assert_eq!(
            rect,
            ScreenRect { left: 420, top: 100, right: 520, bottom: 150 }
        );
        assert_eq!((rect.width(), rect.height()), (100, 50));
    }

    #[test]
    fn reversed_box_normalizes_to_same_rect() {
        let t = fit(640, 480, 1280, 480).unwrap();
        let forward = t.project(&DetBox::new(100.0, 100.0, 200.0, 150.0));
        let reversed = t.project(&DetBox::new(200.0, 150.0, 100.0, 100.0));
        assert_eq!(forward, reversed);
        let mixed = t.project(&DetBox::new(200.0, 100.0, 100.0, 150.0));
        assert_eq!(forward, mixed);
    }

    #[test]
    fn zero_area_box_is_kept() {
        let t = fit(10, 10, 20, 20).unwrap();
        let rect = t.project(&DetBox::new(3.0, 3.0, 3.0, 7.0));
        assert!(rect.is_empty());
        assert_eq!(rect.height(), 8);
    }

    #[test]
    fn extreme_corners_stay_in_band() {
        let t = fit(10, 10, 20, 20).unwrap();
        let rect = t.project(&DetBox::new(-1e30, 0.0, 1e30, 5.0));
        assert_eq!((rect.left, rect.right), (-COORD_LIMIT, COORD_LIMIT));
        assert_eq!(rect.width(), 2 * COORD_LIMIT);
        assert!(!rect.is_empty());
        let reversed = t.project(&DetBox::new(1e30, 1e30, -1e30, -1e30));
        assert_eq!(reversed.height(), 2 * COORD_LIMIT);
    }

    #[test]
    fn degenerate_dimensions_are_rejected() {
        for (iw, ih, vw, vh) in [(0, 10, 10, 10), (10, 0, 10, 10), (10, 10, 0, 10), (10, 10, 10, -4)] {
            assert!(matches!(
                fit(iw, ih, vw, vh),
                Err(ReviewError::DegenerateViewport { .. })
            ));
        }
    }

    #[test]
    fn scales_box_corners() {
        let t = fit(200, 100, 400, 400).unwrap();
        assert_eq!(t.scale, 2.0);
        assert_eq!((t.offset_x, t.offset_y), (0, 100));
        let rects = t.project_all(&[DetBox::new(10.0, 10.0, 20.25, 30.0)]);
        assert_eq!(rects, vec![ScreenRect { left: 20, top: 120, right: 41, bottom: 160 }]);
    }
}
