//! Friend recommendation over an [`EmbeddingStore`].
//!
//! The engine resolves a 1-based student identifier to a row, scores that row
//! against every row, keeps the best `top_k + 1` with a bounded min-heap (one
//! extra slot absorbs the student's own match), drops the student, and
//! returns the first `top_k` identifiers.
//!
//! Ranking is by score descending, then row index ascending, so equal scores
//! always come back in identifier order.

use crate::model::{Recommendation, UserId};
use crate::perf::{RECOMMEND, Timer};
use crate::store::EmbeddingStore;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, error};

/// Entry in the min-heap for top-k selection.
#[derive(Debug, Clone, Copy)]
struct ScoredEntry {
    score: f32,
    index: usize,
}

impl PartialEq for ScoredEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredEntry {}

impl PartialOrd for ScoredEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: the worst-ranked entry is "greatest" and pops first.
        // Worse means lower score, or the higher index among equal scores.
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Indices of the `k` best scores, best first.
fn top_k_indices(scores: &[f32], k: usize) -> Vec<ScoredEntry> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<ScoredEntry> = BinaryHeap::with_capacity(k.min(scores.len()) + 1);
    for (index, &score) in scores.iter().enumerate() {
        heap.push(ScoredEntry { score, index });
        if heap.len() > k {
            heap.pop();
        }
    }

    // Ascending by Ord is best-first: highest score, then lowest index
    heap.into_sorted_vec()
}

/// Recommends similar students from a static embedding store.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    store: EmbeddingStore,
}

impl RecommendationEngine {
    /// Wrap a loaded store.
    #[must_use]
    pub const fn new(store: EmbeddingStore) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// Number of students the engine knows about.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Always `false` for an engine built from a valid store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether `identifier` names a stored student.
    #[must_use]
    pub fn contains(&self, identifier: i64) -> bool {
        UserId(identifier).to_index(self.store.len()).is_some()
    }

    /// Up to `top_k` most similar students to `identifier`, best first.
    ///
    /// Unknown identifiers and `top_k == 0` yield an empty list rather than
    /// an error. The querying student never appears in the result.
    #[must_use]
    pub fn recommend(&self, identifier: i64, top_k: usize) -> Vec<UserId> {
        self.recommend_scored(identifier, top_k)
            .into_iter()
            .map(|r| r.user)
            .collect()
    }

    /// Like [`recommend`](Self::recommend), keeping each candidate's score.
    #[must_use]
    pub fn recommend_scored(&self, identifier: i64, top_k: usize) -> Vec<Recommendation> {
        let query = UserId(identifier);
        let Some(index) = query.to_index(self.store.len()) else {
            debug!(identifier, users = self.store.len(), "Unknown identifier");
            return Vec::new();
        };
        if top_k == 0 {
            return Vec::new();
        }

        let timer = Timer::start(RECOMMEND);

        let scores = match self.store.similarity_to_all(index) {
            Ok(scores) => scores,
            Err(e) => {
                error!(identifier, index, error = %e, "Bounds-checked index rejected by store");
                return Vec::new();
            }
        };

        let results: Vec<Recommendation> = top_k_indices(&scores, top_k.saturating_add(1))
            .into_iter()
            .map(|entry| Recommendation {
                user: UserId::from_index(entry.index),
                score: entry.score,
            })
            .filter(|r| r.user != query)
            .take(top_k)
            .collect();

        timer.stop();
        debug!(identifier, top_k, returned = results.len(), "Recommended");
        results
    }
}
