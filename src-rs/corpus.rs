//! Annotation corpora and the two-slot store that answers per-frame box
//! queries.
//!
//! A corpus file is `{ video_id: { "1": [[x1, y1, x2, y2, ...], ...], ... } }`.
//! Absent videos and absent frame keys both mean "zero boxes".

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::ReviewError;

/// Logical name of one of the two compared corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusName {
    Old,
    New,
}

impl CorpusName {
    pub const ALL: [CorpusName; 2] = [CorpusName::Old, CorpusName::New];

    pub fn as_str(self) -> &'static str {
        match self {
            CorpusName::Old => "old",
            CorpusName::New => "new",
        }
    }
}

impl fmt::Display for CorpusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorpusName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "old" => Ok(CorpusName::Old),
            "new" => Ok(CorpusName::New),
            other => Err(format!("unknown corpus '{other}' (expected old or new)")),
        }
    }
}

/// Axis-aligned box in source-image pixels. Corners are stored as given;
/// `x1 > x2` or `y1 > y2` is legal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl DetBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Reads the first four numeric fields; anything after them is ignored.
    fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_array()?;
        if fields.len() < 4 {
            return None;
        }
        let x1 = fields[0].as_f64()?;
        let y1 = fields[1].as_f64()?;
        let x2 = fields[2].as_f64()?;
        let y2 = fields[3].as_f64()?;
        Some(Self { x1, y1, x2, y2 })
    }
}

/// Boxes recorded for one frame. `recorded` is the length of the list as
/// written; `boxes` holds only the entries with four numeric fields.
#[derive(Debug, Clone, Default, PartialEq)]
struct FrameEntry {
    boxes: Vec<DetBox>,
    recorded: usize,
}

type FrameBoxes = HashMap<String, FrameEntry>;

/// One immutable corpus: video id -> frame key -> boxes.
#[derive(Debug, Clone, Default)]
pub struct AnnotationCorpus {
    videos: HashMap<String, FrameBoxes>,
    degraded_frames: usize,
    skipped_boxes: usize,
}

impl AnnotationCorpus {
    /// Structural validation only: the document must be an object of objects.
    /// A frame entry that is not a list is kept as an empty frame; a list
    /// entry that is not a box still counts but is never drawn.
    pub fn from_value(name: CorpusName, data: &Value) -> Result<Self, ReviewError> {
        let top = data.as_object().ok_or_else(|| ReviewError::MalformedCorpus {
            corpus: name,
            reason: format!("expected an object keyed by video id, found {}", kind_of(data)),
        })?;

        let mut videos = HashMap::with_capacity(top.len());
        let mut degraded_frames = 0usize;
        let mut skipped_boxes = 0usize;

        for (video_id, frames) in top {
            let frames = frames
                .as_object()
                .ok_or_else(|| ReviewError::MalformedCorpus {
                    corpus: name,
                    reason: format!(
                        "entry for video '{video_id}' must be an object keyed by frame number, found {}",
                        kind_of(frames)
                    ),
                })?;

            let mut per_frame = FrameBoxes::with_capacity(frames.len());
            for (frame_key, raw_boxes) in frames {
                let entry = match decode_frame(raw_boxes) {
                    Some(entry) => entry,
                    None => {
                        degraded_frames += 1;
                        FrameEntry::default()
                    }
                };
                skipped_boxes += entry.recorded - entry.boxes.len();
                per_frame.insert(frame_key.clone(), entry);
            }
            videos.insert(video_id.clone(), per_frame);
        }

        if degraded_frames > 0 {
            warn!(
                corpus = %name,
                degraded_frames,
                "frame entries that are not lists were treated as empty"
            );
        }
        if skipped_boxes > 0 {
            warn!(
                corpus = %name,
                skipped_boxes,
                "boxes with fewer than four numeric fields are counted but not drawn"
            );
        }

        Ok(Self {
            videos,
            degraded_frames,
            skipped_boxes,
        })
    }

    fn entry(&self, video_id: &str, frame_number: usize) -> Option<&FrameEntry> {
        self.videos
            .get(video_id)
            .and_then(|frames| frames.get(&frame_number.to_string()))
    }

    /// Drawable boxes of a frame.
    pub fn boxes_for(&self, video_id: &str, frame_number: usize) -> &[DetBox] {
        self.entry(video_id, frame_number)
            .map(|entry| entry.boxes.as_slice())
            .unwrap_or(&[])
    }

    /// Number of entries recorded for a frame, drawable or not.
    pub fn count_for(&self, video_id: &str, frame_number: usize) -> usize {
        self.entry(video_id, frame_number)
            .map(|entry| entry.recorded)
            .unwrap_or(0)
    }

    pub fn contains_video(&self, video_id: &str) -> bool {
        self.videos.contains_key(video_id)
    }

    pub fn video_count(&self) -> usize {
        self.videos.len()
    }

    pub fn degraded_frames(&self) -> usize {
        self.degraded_frames
    }

    pub fn skipped_boxes(&self) -> usize {
        self.skipped_boxes
    }
}

fn decode_frame(value: &Value) -> Option<FrameEntry> {
    let raw = value.as_array()?;
    Some(FrameEntry {
        boxes: raw.iter().filter_map(DetBox::from_value).collect(),
        recorded: raw.len(),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Load state of one corpus slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusStatus {
    Missing,
    Loaded,
    Malformed,
}

impl fmt::Display for CorpusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CorpusStatus::Missing => "missing",
            CorpusStatus::Loaded => "loaded",
            CorpusStatus::Malformed => "malformed",
        })
    }
}

#[derive(Debug, Clone)]
struct CorpusSlot {
    corpus: AnnotationCorpus,
    status: CorpusStatus,
    source: Option<PathBuf>,
}

impl Default for CorpusSlot {
    fn default() -> Self {
        Self {
            corpus: AnnotationCorpus::default(),
            status: CorpusStatus::Missing,
            source: None,
        }
    }
}

/// Holds the `old` and `new` corpora. An unset slot answers every query with
/// an empty list.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    old: CorpusSlot,
    new: CorpusSlot,
    generation: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: CorpusName) -> &CorpusSlot {
        match name {
            CorpusName::Old => &self.old,
            CorpusName::New => &self.new,
        }
    }

    fn slot_mut(&mut self, name: CorpusName) -> &mut CorpusSlot {
        match name {
            CorpusName::Old => &mut self.old,
            CorpusName::New => &mut self.new,
        }
    }

    fn replace(&mut self, name: CorpusName, slot: CorpusSlot) {
        *self.slot_mut(name) = slot;
        self.generation += 1;
    }

    /// Replaces the named corpus wholesale. On failure the slot is left empty
    /// and marked malformed.
    pub fn load(&mut self, name: CorpusName, data: &Value) -> Result<(), ReviewError> {
        self.load_with_source(name, data, None)
    }

    fn load_with_source(
        &mut self,
        name: CorpusName,
        data: &Value,
        source: Option<PathBuf>,
    ) -> Result<(), ReviewError> {
        match AnnotationCorpus::from_value(name, data) {
            Ok(corpus) => {
                self.replace(
                    name,
                    CorpusSlot {
                        corpus,
                        status: CorpusStatus::Loaded,
                        source,
                    },
                );
                Ok(())
            }
            Err(err) => {
                self.mark_malformed(name, source);
                Err(err)
            }
        }
    }

    fn mark_malformed(&mut self, name: CorpusName, source: Option<PathBuf>) {
        self.replace(
            name,
            CorpusSlot {
                corpus: AnnotationCorpus::default(),
                status: CorpusStatus::Malformed,
                source,
            },
        );
    }

    /// Reads a corpus file. A file that does not exist leaves the slot empty
    /// with status `missing`; that is not an error.
    pub fn load_file(&mut self, name: CorpusName, path: &Path) -> Result<CorpusStatus, ReviewError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(corpus = %name, path = %path.display(), "corpus file not found");
                self.replace(
                    name,
                    CorpusSlot {
                        source: Some(path.to_path_buf()),
                        ..CorpusSlot::default()
                    },
                );
                return Ok(CorpusStatus::Missing);
            }
            Err(err) => {
                self.mark_malformed(name, Some(path.to_path_buf()));
                return Err(ReviewError::MalformedCorpus {
                    corpus: name,
                    reason: format!("failed to read {}: {err}", path.display()),
                });
            }
        };

        let data: Value = match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(err) => {
                self.mark_malformed(name, Some(path.to_path_buf()));
                return Err(ReviewError::MalformedCorpus {
                    corpus: name,
                    reason: format!("invalid JSON in {}: {err}", path.display()),
                });
            }
        };

        self.load_with_source(name, &data, Some(path.to_path_buf()))?;
        let corpus = &self.slot(name).corpus;
        info!(
            corpus = %name,
            path = %path.display(),
            videos = corpus.video_count(),
            "loaded corpus"
        );
        Ok(CorpusStatus::Loaded)
    }

    /// Loads a file and downgrades a malformed corpus to an empty one with a
    /// warning, which is how startup treats both corpora.
    pub fn load_file_or_empty(&mut self, name: CorpusName, path: &Path) -> CorpusStatus {
        match self.load_file(name, path) {
            Ok(status) => status,
            Err(err) => {
                warn!(corpus = %name, error = %err, "corpus treated as empty");
                CorpusStatus::Malformed
            }
        }
    }

    pub fn boxes_for(&self, name: CorpusName, video_id: &str, frame_number: usize) -> &[DetBox] {
        self.slot(name).corpus.boxes_for(video_id, frame_number)
    }

    pub fn count_for(&self, name: CorpusName, video_id: &str, frame_number: usize) -> usize {
        self.slot(name).corpus.count_for(video_id, frame_number)
    }

    pub fn corpus(&self, name: CorpusName) -> &AnnotationCorpus {
        &self.slot(name).corpus
    }

    pub fn status(&self, name: CorpusName) -> CorpusStatus {
        self.slot(name).status
    }

    pub fn source(&self, name: CorpusName) -> Option<&Path> {
        self.slot(name).source.as_deref()
    }

    /// Bumped on every load, successful or not.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn absent_video_and_frame_yield_empty_lists() {
        let mut store = AnnotationStore::new();
        store
            .load(CorpusName::Old, &json!({"v.avi": {"1": [[0, 0, 1, 1]]}}))
            .unwrap();

        assert!(store.boxes_for(CorpusName::Old, "other.avi", 1).is_empty());
        assert!(store.boxes_for(CorpusName::Old, "v.avi", 2).is_empty());
        assert!(store.boxes_for(CorpusName::Old, "v.avi", 0).is_empty());
        assert_eq!(store.boxes_for(CorpusName::Old, "v.avi", 1).len(), 1);
    }

    #[test]
    fn unset_corpus_behaves_as_empty() {
        let store = AnnotationStore::new();
        for name in CorpusName::ALL {
            assert_eq!(store.status(name), CorpusStatus::Missing);
            assert!(store.boxes_for(name, "v.avi", 1).is_empty());
        }
    }

    #[test]
    fn extra_box_fields_are_ignored() {
        let mut store = AnnotationStore::new();
        store
            .load(
                CorpusName::New,
                &json!({"v.avi": {"3": [[10, 20, 30, 40, 0.97, "person"]]}}),
            )
            .unwrap();
        assert_eq!(
            store.boxes_for(CorpusName::New, "v.avi", 3),
            &[DetBox::new(10.0, 20.0, 30.0, 40.0)]
        );
    }

    #[test]
    fn non_mapping_document_is_malformed_and_empties_slot() {
        let mut store = AnnotationStore::new();
        store
            .load(CorpusName::Old, &json!({"v.avi": {"1": [[0, 0, 1, 1]]}}))
            .unwrap();

        let err = store.load(CorpusName::Old, &json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, ReviewError::MalformedCorpus { corpus: CorpusName::Old, .. }));
        assert_eq!(store.status(CorpusName::Old), CorpusStatus::Malformed);
        assert!(store.boxes_for(CorpusName::Old, "v.avi", 1).is_empty());

        let err = store
            .load(CorpusName::Old, &json!({"v.avi": [[0, 0, 1, 1]]}))
            .unwrap_err();
        assert!(matches!(err, ReviewError::MalformedCorpus { .. }));
    }

    #[test]
    fn non_list_frame_degrades_to_zero_boxes() {
        let mut store = AnnotationStore::new();
        store
            .load(
                CorpusName::Old,
                &json!({"v.avi": {"1": "oops", "2": {"x": 1}, "3": [[1, 2, 3, 4]]}}),
            )
            .unwrap();
        assert!(store.boxes_for(CorpusName::Old, "v.avi", 1).is_empty());
        assert_eq!(store.count_for(CorpusName::Old, "v.avi", 1), 0);
        assert_eq!(store.count_for(CorpusName::Old, "v.avi", 2), 0);
        assert_eq!(store.boxes_for(CorpusName::Old, "v.avi", 3).len(), 1);
        assert_eq!(store.corpus(CorpusName::Old).degraded_frames(), 2);
    }

    #[test]
    fn short_boxes_count_but_are_not_drawn() {
        let mut store = AnnotationStore::new();
        store
            .load(
                CorpusName::Old,
                &json!({"v.avi": {"1": [[0, 0, 10, 10], [1, 2, 3, 4], [0, 0]], "2": ["x"]}}),
            )
            .unwrap();
        assert_eq!(store.count_for(CorpusName::Old, "v.avi", 1), 3);
        assert_eq!(
            store.boxes_for(CorpusName::Old, "v.avi", 1),
            &[DetBox::new(0.0, 0.0, 10.0, 10.0), DetBox::new(1.0, 2.0, 3.0, 4.0)]
        );
        assert_eq!(store.count_for(CorpusName::Old, "v.avi", 2), 1);
        assert!(store.boxes_for(CorpusName::Old, "v.avi", 2).is_empty());
        assert_eq!(store.corpus(CorpusName::Old).skipped_boxes(), 2);
        assert_eq!(store.corpus(CorpusName::Old).degraded_frames(), 0);
    }

    #[test]
    fn reload_replaces_whole_corpus() {
        let mut store = AnnotationStore::new();
        store
            .load(CorpusName::New, &json!({"a.avi": {"1": [[0, 0, 1, 1]]}}))
            .unwrap();
        let first = store.generation();
        store
            .load(CorpusName::New, &json!({"b.avi": {"1": [[0, 0, 1, 1]]}}))
            .unwrap();

        assert!(store.generation() > first);
        assert!(store.boxes_for(CorpusName::New, "a.avi", 1).is_empty());
        assert!(!store.corpus(CorpusName::New).contains_video("a.avi"));
        assert_eq!(store.boxes_for(CorpusName::New, "b.avi", 1).len(), 1);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let mut store = AnnotationStore::new();
        let status = store
            .load_file(CorpusName::Old, &dir.path().join("absent.json"))
            .unwrap();
        assert_eq!(status, CorpusStatus::Missing);
        assert_eq!(store.status(CorpusName::Old), CorpusStatus::Missing);
    }

    #[test]
    fn invalid_json_file_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let mut store = AnnotationStore::new();
        assert_eq!(
            store.load_file_or_empty(CorpusName::New, &path),
            CorpusStatus::Malformed
        );
        assert_eq!(store.source(CorpusName::New), Some(path.as_path()));
    }

    #[test]
    fn loads_corpus_file_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("annotations_old.json");
        fs::write(&path, r#"{"cam1.avi": {"5": [[1, 1, 9, 9], [2, 2, 4, 4]]}}"#).unwrap();

        let mut store = AnnotationStore::new();
        assert_eq!(
            store.load_file(CorpusName::Old, &path).unwrap(),
            CorpusStatus::Loaded
        );
        assert_eq!(store.boxes_for(CorpusName::Old, "cam1.avi", 5).len(), 2);
    }

    #[test]
    fn corpus_name_parses_case_insensitively() {
        assert_eq!("OLD".parse::<CorpusName>(), Ok(CorpusName::Old));
        assert_eq!(" new ".parse::<CorpusName>(), Ok(CorpusName::New));
        assert!("mid".parse::<CorpusName>().is_err());
    }
}
