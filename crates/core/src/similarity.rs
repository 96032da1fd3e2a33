//! Bounded-cost near-duplicate detection.
//!
//! Every indexed prompt keeps a set of hashed word 3-shingles plus a coarse
//! word-count bucket. Lookup first narrows candidates through an inverted
//! shingle index and the bucket filter, caps the survivor list, and only then
//! pays for exact Jaccard similarity. A full-corpus pairwise scan never runs.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// Similarity threshold used when the caller does not configure one.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

const SHINGLE_SIZE: usize = 3;
const DEFAULT_MAX_CANDIDATES: usize = 64;

/// Closest indexed neighbour of a probed text.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarMatch {
    pub id: String,
    /// Jaccard similarity in [0, 1].
    pub score: f64,
}

struct IndexEntry {
    shingles: HashSet<u64>,
    bucket: u32,
}

/// In-memory near-duplicate index over prompt contents.
///
/// Rebuilt from the store at service startup; the capture path is the single
/// writer.
pub struct SimilarityIndex {
    max_candidates: usize,
    entries: HashMap<String, IndexEntry>,
    postings: HashMap<u64, Vec<String>>,
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::with_max_candidates(DEFAULT_MAX_CANDIDATES)
    }

    /// Cap on how many narrowed candidates get an exact comparison.
    pub fn with_max_candidates(max_candidates: usize) -> Self {
        Self {
            max_candidates: max_candidates.max(1),
            entries: HashMap::new(),
            postings: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index `text` under `id`, replacing any previous entry for the id.
    pub fn insert(&mut self, id: impl Into<String>, text: &str) {
        let id = id.into();
        self.remove(&id);

        let (shingles, bucket) = signature(text);
        for &shingle in &shingles {
            self.postings.entry(shingle).or_default().push(id.clone());
        }
        self.entries.insert(id, IndexEntry { shingles, bucket });
    }

    pub fn remove(&mut self, id: &str) {
        let Some(entry) = self.entries.remove(id) else {
            return;
        };
        for shingle in &entry.shingles {
            if let Some(ids) = self.postings.get_mut(shingle) {
                ids.retain(|existing| existing != id);
                if ids.is_empty() {
                    self.postings.remove(shingle);
                }
            }
        }
    }

    /// Best-scoring indexed neighbour of `text`, if any candidate survives
    /// the narrowing step. The caller compares the score to its threshold.
    pub fn best_match(&self, text: &str) -> Option<SimilarMatch> {
        let (shingles, bucket) = signature(text);
        if shingles.is_empty() {
            return None;
        }

        // Narrowing step 1: only ids sharing at least one shingle.
        let mut shared: HashMap<&str, usize> = HashMap::new();
        for shingle in &shingles {
            if let Some(ids) = self.postings.get(shingle) {
                for id in ids {
                    *shared.entry(id.as_str()).or_insert(0) += 1;
                }
            }
        }

        // Narrowing step 2: drop candidates from distant length buckets.
        let mut candidates: Vec<(&str, usize)> = shared
            .into_iter()
            .filter(|(id, _)| {
                self.entries
                    .get(*id)
                    .is_some_and(|e| e.bucket.abs_diff(bucket) <= 1)
            })
            .collect();

        // Narrowing step 3: cap the exact comparisons.
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        candidates.truncate(self.max_candidates);

        candidates
            .into_iter()
            .filter_map(|(id, _)| {
                let entry = self.entries.get(id)?;
                Some(SimilarMatch {
                    id: id.to_string(),
                    score: jaccard(&shingles, &entry.shingles),
                })
            })
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

fn signature(text: &str) -> (HashSet<u64>, u32) {
    let words = tokens(text);
    let bucket = length_bucket(words.len());

    let shingles = if words.len() < SHINGLE_SIZE {
        // Too short for shingles; fall back to the whole-word set.
        words.iter().map(|w| hash_shingle(std::slice::from_ref(w))).collect()
    } else {
        words.windows(SHINGLE_SIZE).map(hash_shingle).collect()
    };
    (shingles, bucket)
}

fn length_bucket(word_count: usize) -> u32 {
    (word_count as u64 + 1).ilog2()
}

fn hash_shingle(words: &[String]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for word in words {
        word.hash(&mut hasher);
    }
    hasher.finish()
}

fn jaccard(a: &HashSet<u64>, b: &HashSet<u64>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
