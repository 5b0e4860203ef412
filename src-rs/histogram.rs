//! Histogram of per-frame box counts: the drawable model (domains, marker)
//! and a raster figure of it.

use image::{Rgba, RgbaImage};
use serde::Serialize;

use crate::corpus::AnnotationStore;
use crate::counts::{CountAggregator, SeriesPair};
use crate::draw::{
    draw_bitmap_text, draw_dashed_line, draw_thick_line, fill_rect_alpha, stroke_rect, text_width,
};

/// Smallest upper bound of the y axis, so quiet videos still get a readable
/// chart.
pub const MIN_Y_UPPER: usize = 5;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const AXIS: Rgba<u8> = Rgba([40, 40, 40, 255]);
const GRID: Rgba<u8> = Rgba([0, 0, 0, 40]);
const OLD_FILL: Rgba<u8> = Rgba([135, 206, 235, 153]);
const NEW_LINE: Rgba<u8> = Rgba([255, 165, 0, 255]);
const MARKER: Rgba<u8> = Rgba([220, 20, 20, 255]);

/// Fixed y-domain: `[0, max(5, observed max)]`.
pub fn y_domain(series: &SeriesPair) -> (usize, usize) {
    (0, series.max().max(MIN_Y_UPPER))
}

/// x coordinate of the current-frame indicator for a 0-based frame index.
pub fn marker_position(current_frame: usize) -> usize {
    current_frame + 1
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramModel {
    pub video_id: String,
    pub series: SeriesPair,
    pub x_domain: (usize, usize),
    pub y_domain: (usize, usize),
}

impl HistogramModel {
    pub fn new(video_id: &str, series: SeriesPair) -> Self {
        Self {
            video_id: video_id.to_string(),
            x_domain: (1, series.frame_count()),
            y_domain: y_domain(&series),
            series,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.series.frame_count()
    }

    /// An empty video has nothing to chart.
    pub fn is_renderable(&self) -> bool {
        self.frame_count() > 0
    }
}

/// Both count series for a video, paired with their domains.
pub fn series_for(
    aggregator: &mut CountAggregator,
    store: &AnnotationStore,
    video_id: &str,
    frame_count: usize,
) -> HistogramModel {
    HistogramModel::new(video_id, aggregator.build(video_id, frame_count, store))
}

#[derive(Debug, Clone, Copy)]
struct PlotArea {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
    x_max: f64,
    y_max: f64,
}

impl PlotArea {
    fn px_x(&self, x: f64) -> f64 {
        self.left as f64 + x / self.x_max * (self.right - self.left) as f64
    }

    fn px_y(&self, y: f64) -> f64 {
        self.bottom as f64 - y / self.y_max * (self.bottom - self.top) as f64
    }
}

/// Rendered chart without the marker. Moving the marker only copies this
/// image and draws one line.
#[derive(Debug, Clone)]
pub struct HistogramFigure {
    base: RgbaImage,
    plot: PlotArea,
}

impl HistogramFigure {
    /// `None` when the model has no frames.
    pub fn render(model: &HistogramModel, width: u32, height: u32, title: &str) -> Option<Self> {
        if !model.is_renderable() || width < 120 || height < 80 {
            return None;
        }
        let mut img = RgbaImage::from_pixel(width, height, BACKGROUND);
        let plot = PlotArea {
            left: 56,
            top: 30,
            right: i64::from(width) - 16,
            bottom: i64::from(height) - 36,
            // Leave one empty frame slot on each side of the bars.
            x_max: (model.frame_count() + 1) as f64,
            y_max: model.y_domain.1 as f64,
        };

        let title_x = (i64::from(width) - text_width(title, 1)) / 2;
        draw_bitmap_text(&mut img, title_x.max(4), 10, title, AXIS, 1);

        draw_y_axis(&mut img, &plot, model.y_domain.1);
        draw_x_axis(&mut img, &plot, model.frame_count());

        for (idx, count) in model.series.old.as_slice().iter().enumerate() {
            if *count == 0 {
                continue;
            }
            let frame = (idx + 1) as f64;
            fill_rect_alpha(
                &mut img,
                plot.px_x(frame - 0.5).round() as i64,
                plot.px_y(*count as f64).round() as i64,
                plot.px_x(frame + 0.5).round() as i64,
                plot.bottom,
                OLD_FILL,
            );
        }

        let points: Vec<(f64, f64)> = model
            .series
            .new
            .as_slice()
            .iter()
            .enumerate()
            .map(|(idx, count)| (plot.px_x((idx + 1) as f64), plot.px_y(*count as f64)))
            .collect();
        if let [only] = points.as_slice() {
            draw_thick_line(&mut img, *only, *only, NEW_LINE, 1.5);
        }
        for pair in points.windows(2) {
            draw_thick_line(&mut img, pair[0], pair[1], NEW_LINE, 1.5);
        }

        stroke_rect(&mut img, plot.left, plot.top, plot.right, plot.bottom, AXIS, 1);
        draw_legend(&mut img, &plot);

        Some(Self { base: img, plot })
    }

    pub fn base(&self) -> &RgbaImage {
        &self.base
    }

    pub fn into_base(self) -> RgbaImage {
        self.base
    }

    /// Copy of the chart with a dashed vertical marker at `x` (1-based frame).
    pub fn with_marker(&self, x: usize) -> RgbaImage {
        let mut img = self.base.clone();
        let px = self.plot.px_x(x as f64).round() as i64;
        draw_dashed_line(
            &mut img,
            (px, self.plot.top),
            (px, self.plot.bottom),
            MARKER,
            2,
            6,
            4,
        );
        img
    }
}

/// Step between ticks: 1, 2 or 5 times a power of ten, giving at most
/// `max_ticks` intervals over `span`.
fn tick_step(span: usize, max_ticks: usize) -> usize {
    let mut magnitude = 1usize;
    loop {
        for factor in [1usize, 2, 5] {
            let step = factor * magnitude;
            if span.div_ceil(step) <= max_ticks.max(1) {
                return step;
            }
        }
        magnitude = magnitude.saturating_mul(10);
    }
}

fn draw_y_axis(img: &mut RgbaImage, plot: &PlotArea, y_upper: usize) {
    let step = tick_step(y_upper, 6);
    let mut tick = 0usize;
    while tick <= y_upper {
        let py = plot.px_y(tick as f64).round() as i64;
        if tick > 0 {
            draw_dashed_line(img, (plot.left, py), (plot.right, py), GRID, 1, 4, 4);
        }
        let label = tick.to_string();
        draw_bitmap_text(img, plot.left - 6 - text_width(&label, 1), py - 4, &label, AXIS, 1);
        tick += step;
    }
    draw_bitmap_text(img, 4, plot.top - 12, "Box Count", AXIS, 1);
}

fn draw_x_axis(img: &mut RgbaImage, plot: &PlotArea, frame_count: usize) {
    let step = tick_step(frame_count, 8);
    let mut tick = step;
    while tick <= frame_count {
        let px = plot.px_x(tick as f64).round() as i64;
        fill_rect_alpha(img, px, plot.bottom, px + 1, plot.bottom + 4, AXIS);
        let label = tick.to_string();
        draw_bitmap_text(img, px - text_width(&label, 1) / 2, plot.bottom + 7, &label, AXIS, 1);
        tick += step;
    }
    let label = "Frame Number";
    let cx = (plot.left + plot.right) / 2;
    draw_bitmap_text(img, cx - text_width(label, 1) / 2, plot.bottom + 22, label, AXIS, 1);
}

fn draw_legend(img: &mut RgbaImage, plot: &PlotArea) {
    let x = plot.right - 72;
    let y = plot.top + 8;
    fill_rect_alpha(img, x - 6, y - 4, plot.right - 6, y + 28, Rgba([255, 255, 255, 220]));
    stroke_rect(img, x - 6, y - 4, plot.right - 6, y + 28, GRID, 1);

    fill_rect_alpha(img, x, y, x + 16, y + 8, OLD_FILL);
    draw_bitmap_text(img, x + 22, y, "Old", AXIS, 1);

    let line_y = (y + 18) as f64;
    draw_thick_line(img, (x as f64, line_y), ((x + 16) as f64, line_y), NEW_LINE, 1.5);
    draw_bitmap_text(img, x + 22, y + 14, "New", AXIS, 1);
}
