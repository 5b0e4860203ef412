use crate::corpus::CorpusName;

/// Recoverable failures of the review core. None of these are fatal: each
/// one degrades to "no annotation / no marker / no repaint".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReviewError {
    #[error("malformed {corpus} corpus: {reason}")]
    MalformedCorpus { corpus: CorpusName, reason: String },

    #[error("no active video")]
    NoActiveVideo,

    #[error("failed to decode frame {frame_number}: {reason}")]
    DecodeFailure { frame_number: usize, reason: String },

    #[error(
        "degenerate viewport: image {image_w}x{image_h}, viewport {viewport_w}x{viewport_h}"
    )]
    DegenerateViewport {
        image_w: i64,
        image_h: i64,
        viewport_w: i64,
        viewport_h: i64,
    },

    #[error("video {video_id} is unusable: {reason}")]
    VideoUnusable { video_id: String, reason: String },
}

impl ReviewError {
    pub(crate) fn decode(index: usize, reason: impl Into<String>) -> Self {
        Self::DecodeFailure {
            frame_number: index + 1,
            reason: reason.into(),
        }
    }
}
