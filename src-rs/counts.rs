//! Per-frame box counts for one video, one series per corpus.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::corpus::{AnnotationStore, CorpusName};

/// Box count per frame as recorded in the corpus; element `i` belongs to
/// frame number `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CountSeries(Vec<usize>);

impl CountSeries {
    pub fn build(store: &AnnotationStore, name: CorpusName, video_id: &str, frame_count: usize) -> Self {
        Self(
            (1..=frame_count)
                .map(|frame_number| store.count_for(name, video_id, frame_number))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max(&self) -> usize {
        self.0.iter().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn get(&self, index: usize) -> Option<usize> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for CountSeries {
    fn from(values: Vec<usize>) -> Self {
        Self(values)
    }
}

/// The `old` and `new` series for one video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeriesPair {
    pub old: CountSeries,
    pub new: CountSeries,
}

impl SeriesPair {
    pub fn build(video_id: &str, frame_count: usize, store: &AnnotationStore) -> Self {
        Self {
            old: CountSeries::build(store, CorpusName::Old, video_id, frame_count),
            new: CountSeries::build(store, CorpusName::New, video_id, frame_count),
        }
    }

    pub fn get(&self, name: CorpusName) -> &CountSeries {
        match name {
            CorpusName::Old => &self.old,
            CorpusName::New => &self.new,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.old.len()
    }

    pub fn max(&self) -> usize {
        self.old.max().max(self.new.max())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    video_id: String,
    frame_count: usize,
    generation: u64,
}

/// Builds series pairs, memoized per video and store generation. A reload of
/// either corpus bumps the generation, so stale entries are never returned.
#[derive(Debug, Default)]
pub struct CountAggregator {
    cache: HashMap<CacheKey, SeriesPair>,
}

impl CountAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, video_id: &str, frame_count: usize, store: &AnnotationStore) -> SeriesPair {
        let generation = store.generation();
        self.cache.retain(|key, _| key.generation == generation);

        let key = CacheKey {
            video_id: video_id.to_string(),
            frame_count,
            generation,
        };
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let pair = SeriesPair::build(video_id, frame_count, store);
        debug!(
            video_id,
            frame_count,
            old_total = pair.old.total(),
            new_total = pair.new.total(),
            "built count series"
        );
        self.cache.insert(key, pair.clone());
        pair
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
