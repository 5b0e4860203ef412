//! Interactive review state: one folder of videos, at most one open video,
//! both corpora, and the derived frame view and histogram.
//!
//! Every action runs to completion before returning, so the most recent
//! navigation always decides what is shown.

use image::RgbaImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::compose::compose_view;
use crate::config::Settings;
use crate::corpus::{AnnotationStore, CorpusName, CorpusStatus};
use crate::counts::CountAggregator;
use crate::error::ReviewError;
use crate::frame_index::{FrameIndex, Navigation};
use crate::frames::{list_videos, video_id_of, FrameSource, SourceOpener};
use crate::histogram::{marker_position, series_for, HistogramFigure, HistogramModel};

/// One opened video and its navigation state.
pub struct VideoSession {
    video_id: String,
    path: PathBuf,
    index: FrameIndex,
    source: Box<dyn FrameSource>,
}

impl VideoSession {
    pub fn open(path: &Path, opener: &dyn SourceOpener) -> Result<Self, ReviewError> {
        let source = opener.open(path)?;
        let video_id = video_id_of(path);
        let frame_count = source.frame_count();
        if frame_count == 0 {
            return Err(ReviewError::VideoUnusable {
                video_id,
                reason: "frame count is 0".to_string(),
            });
        }
        let mut index = FrameIndex::new();
        index.bind(frame_count);
        Ok(Self {
            video_id,
            path: path.to_path_buf(),
            index,
            source,
        })
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> usize {
        self.index.frame_count()
    }

    pub fn current_frame(&self) -> usize {
        self.index.current()
    }

    pub fn frame_number(&self) -> usize {
        self.index.frame_number()
    }

    pub fn index(&self) -> &FrameIndex {
        &self.index
    }
}

/// Read-only snapshot of what the review surface displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub folder: Option<String>,
    pub video_id: Option<String>,
    pub frame_number: Option<usize>,
    pub frame_count: usize,
    pub shown_frame_number: Option<usize>,
    pub old: CorpusStatus,
    pub new: CorpusStatus,
    pub old_has_video: bool,
    pub new_has_video: bool,
    pub message: String,
}

impl SessionStatus {
    /// One-line summary such as `Old JSON Loaded | New JSON Missing`.
    pub fn corpus_line(&self) -> String {
        let describe = |label: &str, status: CorpusStatus, has_video: bool| match status {
            CorpusStatus::Loaded if has_video || self.video_id.is_none() => {
                format!("{label} JSON Loaded")
            }
            CorpusStatus::Loaded => format!("{label} JSON Loaded (no entry for this video)"),
            CorpusStatus::Missing => format!("{label} JSON Missing"),
            CorpusStatus::Malformed => format!("{label} JSON Malformed"),
        };
        format!(
            "{} | {}",
            describe("Old", self.old, self.old_has_video),
            describe("New", self.new, self.new_has_video)
        )
    }
}

struct ShownFrame {
    index: usize,
    image: RgbaImage,
}

pub struct ReviewSession<O: SourceOpener> {
    opener: O,
    store: AnnotationStore,
    aggregator: CountAggregator,
    video_ext: String,
    viewport: (u32, u32),
    figure_size: (u32, u32),
    folder: Option<PathBuf>,
    videos: Vec<String>,
    video: Option<VideoSession>,
    shown: Option<ShownFrame>,
    histogram: Option<HistogramModel>,
    figure: Option<HistogramFigure>,
    message: String,
}

impl<O: SourceOpener> ReviewSession<O> {
    pub fn new(opener: O, settings: &Settings) -> Self {
        Self {
            opener,
            store: AnnotationStore::new(),
            aggregator: CountAggregator::new(),
            video_ext: settings.video_ext.clone(),
            viewport: settings.viewport,
            figure_size: (settings.figure.0, settings.figure.1.min(200)),
            folder: None,
            videos: Vec::new(),
            video: None,
            shown: None,
            histogram: None,
            figure: None,
            message: "Ready".to_string(),
        }
    }

    pub fn with_store(mut self, store: AnnotationStore) -> Self {
        self.store = store;
        self
    }

    /// Startup load of both corpora. Missing or malformed files leave the
    /// corresponding corpus empty.
    pub fn load_default_corpora(&mut self, settings: &Settings) {
        for name in CorpusName::ALL {
            self.store.load_file_or_empty(name, settings.corpus_path(name));
        }
        self.message = self.status().corpus_line();
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn videos(&self) -> &[String] {
        &self.videos
    }

    pub fn video(&self) -> Option<&VideoSession> {
        self.video.as_ref()
    }

    pub fn histogram(&self) -> Option<&HistogramModel> {
        self.histogram.as_ref()
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn select_folder(&mut self, folder: &Path) -> std::io::Result<usize> {
        let videos = match list_videos(folder, &self.video_ext) {
            Ok(videos) => videos,
            Err(err) => {
                self.message = format!("Cannot scan folder {}: {err}", folder.display());
                return Err(err);
            }
        };

        self.folder = Some(folder.to_path_buf());
        self.videos = videos;
        info!(folder = %folder.display(), videos = self.videos.len(), "selected folder");

        if self.videos.is_empty() {
            self.close_video();
            self.message = format!("No .{} files found in {}", self.video_ext, folder.display());
            return Ok(0);
        }
        // Opening the first video mirrors what the list selection does.
        if let Err(err) = self.select_video_at(0) {
            debug!(error = %err, "first video in folder did not open");
        }
        Ok(self.videos.len())
    }

    pub fn select_video_at(&mut self, position: usize) -> Result<(), ReviewError> {
        let Some(name) = self.videos.get(position).cloned() else {
            self.message = format!("No video at position {}", position + 1);
            return Err(ReviewError::NoActiveVideo);
        };
        let path = match &self.folder {
            Some(folder) => folder.join(&name),
            None => PathBuf::from(&name),
        };
        self.open_video(&path)
    }

    /// Selects by exact name, falling back to a 1-based list position.
    pub fn select_video(&mut self, selector: &str) -> Result<(), ReviewError> {
        if let Some(position) = self.videos.iter().position(|name| name == selector) {
            return self.select_video_at(position);
        }
        match selector.trim().parse::<usize>() {
            Ok(number) if number >= 1 => self.select_video_at(number - 1),
            _ => {
                self.message = format!("Unknown video: {selector}");
                Err(ReviewError::NoActiveVideo)
            }
        }
    }

    pub fn open_video(&mut self, path: &Path) -> Result<(), ReviewError> {
        self.close_video();
        let video = match VideoSession::open(path, &self.opener) {
            Ok(video) => video,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot open video");
                self.message = format!("Cannot open video: {err}");
                return Err(err);
            }
        };
        info!(
            video_id = video.video_id(),
            frame_count = video.frame_count(),
            "opened video"
        );
        self.video = Some(video);
        self.rebuild_histogram();
        self.show_current();
        if self.shown.is_some() {
            self.message = self.status().corpus_line();
        }
        Ok(())
    }

    fn close_video(&mut self) {
        self.video = None;
        self.shown = None;
        self.histogram = None;
        self.figure = None;
    }

    /// Jumps to a 1-based frame number; out-of-range requests clamp.
    pub fn goto(&mut self, frame_number: i64) -> Result<Navigation, ReviewError> {
        let nav = self.navigate(|index| index.goto(frame_number))?;
        if nav.clamped && self.shown.as_ref().map(|s| s.index) == Some(nav.index) {
            self.message = format!("Frame {frame_number} is out of range; showing {}", nav.frame_number());
        }
        Ok(nav)
    }

    /// Moves one frame back (`-1`) or forward (`+1`); never wraps.
    pub fn step(&mut self, delta: i64) -> Result<Navigation, ReviewError> {
        self.navigate(|index| index.step(delta))
    }

    fn navigate(
        &mut self,
        action: impl FnOnce(&mut FrameIndex) -> Result<Navigation, ReviewError>,
    ) -> Result<Navigation, ReviewError> {
        let Some(video) = self.video.as_mut() else {
            self.message = "No video is open".to_string();
            return Err(ReviewError::NoActiveVideo);
        };
        let nav = action(&mut video.index)?;
        self.show_current();
        Ok(nav)
    }

    fn show_current(&mut self) {
        let Some(video) = self.video.as_mut() else {
            return;
        };
        let index = video.index.current();
        if self.shown.as_ref().map(|s| s.index) == Some(index) {
            return;
        }
        match video.source.seek_and_decode(index) {
            Ok(image) => {
                self.shown = Some(ShownFrame { index, image });
                self.message = format!("Frame {} / {}", index + 1, video.frame_count());
            }
            Err(err) => {
                warn!(video_id = video.video_id(), error = %err, "frame decode failed");
                self.message = format!("Cannot read frame {}", index + 1);
            }
        }
    }

    /// Replaces one corpus from disk and rebuilds everything derived from it.
    pub fn reload_corpus(&mut self, name: CorpusName, path: &Path) -> Result<CorpusStatus, ReviewError> {
        let result = self.store.load_file(name, path);
        self.rebuild_histogram();
        match &result {
            Ok(CorpusStatus::Missing) => {
                self.message = format!("{name} corpus not found: {}", path.display())
            }
            Ok(_) => self.message = format!("{name} corpus loaded from {}", path.display()),
            Err(err) => {
                warn!(corpus = %name, error = %err, "corpus reload failed; using an empty corpus");
                self.message = format!("Failed to load {name} corpus: {err}");
            }
        }
        result
    }

    fn rebuild_histogram(&mut self) {
        self.histogram = None;
        self.figure = None;
        let Some(video) = &self.video else {
            return;
        };
        let model = series_for(
            &mut self.aggregator,
            &self.store,
            video.video_id(),
            video.frame_count(),
        );
        let title = format!("Detection Boxes Histogram - {}", video.video_id());
        self.figure = HistogramFigure::render(&model, self.figure_size.0, self.figure_size.1, &title);
        self.histogram = Some(model);
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    /// Frame with both overlays, or `None` when nothing can be painted.
    pub fn render_view(&mut self) -> Option<RgbaImage> {
        let video = self.video.as_ref()?;
        let shown = self.shown.as_ref()?;
        let frame_number = shown.index + 1;
        let old = self.store.boxes_for(CorpusName::Old, video.video_id(), frame_number);
        let new = self.store.boxes_for(CorpusName::New, video.video_id(), frame_number);
        match compose_view(&shown.image, self.viewport, old, new) {
            Ok((canvas, _)) => Some(canvas),
            Err(err) => {
                self.message = format!("Paint skipped: {err}");
                None
            }
        }
    }

    /// Cached histogram with the marker on the frame being shown, which lags
    /// the index after a decode failure.
    pub fn render_histogram(&self) -> Option<RgbaImage> {
        let shown = self.shown.as_ref()?;
        let figure = self.figure.as_ref()?;
        Some(figure.with_marker(marker_position(shown.index)))
    }

    pub fn status(&self) -> SessionStatus {
        let video_id = self.video.as_ref().map(|v| v.video_id().to_string());
        let has_video = |name| {
            video_id
                .as_deref()
                .map(|id| self.store.corpus(name).contains_video(id))
                .unwrap_or(false)
        };
        SessionStatus {
            folder: self.folder.as_ref().map(|p| p.display().to_string()),
            frame_number: self.video.as_ref().map(VideoSession::frame_number),
            frame_count: self.video.as_ref().map(VideoSession::frame_count).unwrap_or(0),
            shown_frame_number: self.shown.as_ref().map(|s| s.index + 1),
            old: self.store.status(CorpusName::Old),
            new: self.store.status(CorpusName::New),
            old_has_video: has_video(CorpusName::Old),
            new_has_video: has_video(CorpusName::New),
            message: self.message.clone(),
            video_id,
        }
    }
}
