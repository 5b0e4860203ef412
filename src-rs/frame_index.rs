use serde::Serialize;

use crate::error::ReviewError;

/// Result of one navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Navigation {
    /// 0-based frame index the request landed on.
    pub index: usize,
    /// Whether the request was outside `[1, frame_count]` and got clamped.
    pub clamped: bool,
}

impl Navigation {
    pub fn frame_number(&self) -> usize {
        self.index + 1
    }
}

/// A navigation request that did not land where it asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClampRecord {
    /// 1-based frame number that was requested.
    pub requested: i64,
    /// 1-based frame number actually shown.
    pub landed: usize,
}

/// Current-frame pointer for one bound video. `frame_count == 0` means no
/// video is bound and every navigation is refused with `NoActiveVideo`.
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    frame_count: usize,
    current: usize,
    last_clamp: Option<ClampRecord>,
}

impl FrameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, frame_count: usize) {
        self.frame_count = frame_count;
        self.current = 0;
        self.last_clamp = None;
    }

    pub fn close(&mut self) {
        self.bind(0);
    }

    pub fn is_bound(&self) -> bool {
        self.frame_count > 0
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn frame_number(&self) -> usize {
        self.current + 1
    }

    pub fn last_clamp(&self) -> Option<ClampRecord> {
        self.last_clamp
    }

    /// Jumps to a 1-based frame number, clamping into range.
    pub fn goto(&mut self, frame_number: i64) -> Result<Navigation, ReviewError> {
        let last = self.last_index()?;
        let wanted = frame_number.saturating_sub(1);
        let index = wanted.clamp(0, last as i64) as usize;
        let clamped = index as i64 != wanted;

        self.current = index;
        self.last_clamp = clamped.then_some(ClampRecord {
            requested: frame_number,
            landed: index + 1,
        });
        Ok(Navigation { index, clamped })
    }

    /// Moves by `delta` frames. Saturates at both ends instead of wrapping.
    pub fn step(&mut self, delta: i64) -> Result<Navigation, ReviewError> {
        let target = (self.current as i64 + 1).saturating_add(delta);
        self.goto(target)
    }

    fn last_index(&self) -> Result<usize, ReviewError> {
        self.frame_count
            .checked_sub(1)
            .ok_or(ReviewError::NoActiveVideo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_resets_to_first_frame() {
        let mut index = FrameIndex::new();
        index.bind(10);
        index.goto(7).unwrap();
        index.bind(4);
        assert_eq!(index.current(), 0);
        assert_eq!(index.frame_number(), 1);
        assert_eq!(index.frame_count(), 4);
    }

    #[test]
    fn goto_converts_to_zero_based() {
        let mut index = FrameIndex::new();
        index.bind(10);
        let nav = index.goto(5).unwrap();
        assert_eq!(nav, Navigation { index: 4, clamped: false });
        assert_eq!(nav.frame_number(), 5);
        assert!(index.last_clamp().is_none());
    }

    #[test]
    fn goto_clamps_and_reports_it() {
        let mut index = FrameIndex::new();
        index.bind(10);

        let nav = index.goto(99).unwrap();
        assert_eq!(nav, Navigation { index: 9, clamped: true });
        assert_eq!(
            index.last_clamp(),
            Some(ClampRecord { requested: 99, landed: 10 })
        );

        let nav = index.goto(0).unwrap();
        assert_eq!(nav, Navigation { index: 0, clamped: true });
        let nav = index.goto(-40).unwrap();
        assert_eq!(nav, Navigation { index: 0, clamped: true });
        let nav = index.goto(i64::MIN).unwrap();
        assert_eq!(nav.index, 0);
    }

    #[test]
    fn unbound_index_refuses_navigation() {
        let mut index = FrameIndex::new();
        assert_eq!(index.goto(1), Err(ReviewError::NoActiveVideo));
        assert_eq!(index.step(1), Err(ReviewError::NoActiveVideo));

        index.bind(3);
        index.close();
        assert!(!index.is_bound());
        assert_eq!(index.step(-1), Err(ReviewError::NoActiveVideo));
    }

    #[test]
    fn stepping_saturates_at_both_ends() {
        let mut index = FrameIndex::new();
        index.bind(3);

        let first = index.step(-1).unwrap();
        let second = index.step(-1).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first, second);

        index.step(1).unwrap();
        index.step(1).unwrap();
        let first = index.step(1).unwrap();
        let second = index.step(1).unwrap();
        assert_eq!(first.index, 2);
        assert!(first.clamped);
        assert_eq!(first, second);
    }

    #[test]
    fn every_request_stays_in_range() {
        let mut index = FrameIndex::new();
        for frame_count in 1..6usize {
            index.bind(frame_count);
            for requested in -3..(frame_count as i64 + 4) {
                let nav = index.goto(requested).unwrap();
                assert!(nav.index < frame_count);
                for delta in [-1, 1] {
                    assert!(index.step(delta).unwrap().index < frame_count);
                }
            }
        }
    }
}
