//! Frame-aligned comparison of two object-detection annotation corpora.
//!
//! The `old` and `new` corpora map a video id and a 1-based frame number to a
//! list of boxes. This crate aligns them with the frames of a video, projects
//! the boxes onto a display viewport, and builds per-frame count histograms.

pub mod batch;
pub mod compose;
pub mod config;
pub mod corpus;
pub mod counts;
pub mod draw;
pub mod error;
pub mod frame_index;
pub mod frames;
pub mod histogram;
pub mod overlay;
pub mod session;

pub use corpus::{AnnotationCorpus, AnnotationStore, CorpusName, CorpusStatus, DetBox};
pub use counts::{CountAggregator, CountSeries, SeriesPair};
pub use error::ReviewError;
pub use frame_index::{FrameIndex, Navigation};
pub use frames::{FrameSource, SourceOpener};
pub use histogram::{HistogramModel, MIN_Y_UPPER};
pub use overlay::{fit, project, ScreenRect, ViewportTransform};
pub use session::{ReviewSession, SessionStatus, VideoSession};
