//! Non-interactive histogram export for every video in a folder.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::corpus::AnnotationStore;
use crate::counts::SeriesPair;
use crate::frames::SourceOpener;
use crate::histogram::{HistogramFigure, HistogramModel};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedVideo {
    pub video_id: String,
    pub frame_count: usize,
    pub old_total: usize,
    pub new_total: usize,
    pub y_max: usize,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedVideo {
    pub video_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub generated_at: String,
    pub video_dir: String,
    pub out_dir: String,
    pub exported: Vec<ExportedVideo>,
    pub skipped: Vec<SkippedVideo>,
}

/// Output file for a video: `<stem>_histogram.png`.
pub fn histogram_file_name(video_id: &str) -> String {
    let stem = Path::new(video_id)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(video_id);
    format!("{stem}_histogram.png")
}

pub struct BatchExporter<'a> {
    pub store: &'a AnnotationStore,
    pub opener: &'a dyn SourceOpener,
    pub video_ext: &'a str,
    pub out_dir: &'a Path,
    pub figure: (u32, u32),
}

impl BatchExporter<'_> {
    /// Videos are handled one at a time and nothing derived from one video is
    /// kept once its PNG is written. A video that cannot be opened is skipped.
    pub fn run(&self, video_dir: &Path) -> Result<BatchReport> {
        let videos = crate::frames::list_videos(video_dir, self.video_ext)
            .with_context(|| format!("video folder not readable: {}", video_dir.display()))?;
        fs::create_dir_all(self.out_dir)
            .with_context(|| format!("failed to create output directory: {}", self.out_dir.display()))?;

        let mut report = BatchReport {
            generated_at: Utc::now().to_rfc3339(),
            video_dir: video_dir.display().to_string(),
            out_dir: self.out_dir.display().to_string(),
            exported: Vec::new(),
            skipped: Vec::new(),
        };
        if videos.is_empty() {
            warn!(dir = %video_dir.display(), ext = self.video_ext, "no videos found");
            return Ok(report);
        }

        info!(count = videos.len(), "starting histogram export");
        for (i, video_id) in videos.iter().enumerate() {
            info!("[{}/{}] Processing {video_id}", i + 1, videos.len());
            match self.export_one(&video_dir.join(video_id), video_id) {
                Ok(exported) => {
                    info!(output = %exported.output, "saved histogram");
                    report.exported.push(exported);
                }
                Err(reason) => {
                    warn!(video_id = %video_id, %reason, "skipping video");
                    report.skipped.push(SkippedVideo {
                        video_id: video_id.clone(),
                        reason,
                    });
                }
            }
        }
        info!(
            exported = report.exported.len(),
            skipped = report.skipped.len(),
            out_dir = %self.out_dir.display(),
            "batch export complete"
        );
        Ok(report)
    }

    /// Series, figure and source all live only for this call.
    fn export_one(&self, path: &Path, video_id: &str) -> Result<ExportedVideo, String> {
        // Only the frame count is needed; the source is released right away.
        let frame_count = self
            .opener
            .open(path)
            .map_err(|err| err.to_string())?
            .frame_count();
        if frame_count == 0 {
            return Err("invalid frame count (0)".to_string());
        }

        let model = HistogramModel::new(video_id, SeriesPair::build(video_id, frame_count, self.store));
        let title = format!("Detection Boxes Histogram - {video_id}");
        let figure = HistogramFigure::render(&model, self.figure.0, self.figure.1, &title)
            .ok_or_else(|| format!("figure size {}x{} is too small", self.figure.0, self.figure.1))?;

        let output: PathBuf = self.out_dir.join(histogram_file_name(video_id));
        figure
            .into_base()
            .save(&output)
            .map_err(|err| format!("failed to save {}: {err}", output.display()))?;

        Ok(ExportedVideo {
            video_id: video_id.to_string(),
            frame_count,
            old_total: model.series.old.total(),
            new_total: model.series.new.total(),
            y_max: model.y_domain.1,
            output: output.display().to_string(),
        })
    }
}
