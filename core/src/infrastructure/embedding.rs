// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding index for semantic tool discovery.
//!
//! Maintains a vector per tool over its intent text and serves top-k cosine
//! similarity queries. The embedder is pluggable; the default is a
//! deterministic bag-of-words term-frequency vector with IDF weights
//! applied lazily at query time over the live corpus. A learned embedder
//! can be substituted behind [`IntentEmbedder`] as long as identical inputs
//! keep producing identical vectors.
//!
//! The index is kept consistent with the registry synchronously: tools are
//! indexed before their insertion is reported complete, and removed when
//! delisted. It is rebuilt from the persisted term maps at startup.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::tool::ToolId;

/// Turns intent text into a normalized term-frequency map.
pub trait IntentEmbedder: Send + Sync {
    fn term_frequencies(&self, text: &str) -> HashMap<String, f32>;
}

/// Deterministic default embedder: lowercase alphanumeric tokens, two
/// characters or longer, weighted by in-document frequency.
#[derive(Debug, Default)]
pub struct BagOfWordsEmbedder;

impl IntentEmbedder for BagOfWordsEmbedder {
    fn term_frequencies(&self, text: &str) -> HashMap<String, f32> {
        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
            .map(|t| t.to_string())
            .collect();
        if tokens.is_empty() {
            return HashMap::new();
        }
        let mut counts: HashMap<String, f32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        let total = tokens.len() as f32;
        for value in counts.values_mut() {
            *value /= total;
        }
        counts
    }
}

#[derive(Default)]
struct IndexState {
    documents: HashMap<ToolId, HashMap<String, f32>>,
    doc_freq: HashMap<String, usize>,
}

impl IndexState {
    fn add(&mut self, id: ToolId, terms: HashMap<String, f32>) {
        if let Some(previous) = self.documents.remove(&id) {
            self.forget_terms(&previous);
        }
        for term in terms.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.documents.insert(id, terms);
    }

    fn remove(&mut self, id: ToolId) {
        if let Some(previous) = self.documents.remove(&id) {
            self.forget_terms(&previous);
        }
    }

    fn forget_terms(&mut self, terms: &HashMap<String, f32>) {
        for term in terms.keys() {
            if let Some(count) = self.doc_freq.get_mut(term) {
                *count -= 1;
                if *count == 0 {
                    self.doc_freq.remove(term);
                }
            }
        }
    }

    /// Smoothed inverse document frequency over the current corpus.
    fn idf(&self, term: &str) -> f32 {
        let n = self.documents.len() as f32;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }

    fn weighted(&self, terms: &HashMap<String, f32>) -> HashMap<String, f32> {
        terms
            .iter()
            .map(|(term, tf)| (term.clone(), tf * self.idf(term)))
            .collect()
    }
}

fn cosine(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f64 {
    let dot: f32 = a
        .iter()
        .filter_map(|(term, weight)| b.get(term).map(|other| weight * other))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }
    let norm_a: f32 = a.values().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.values().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

/// Shared in-process index: single writer, parallel readers.
pub struct EmbeddingIndex {
    embedder: Arc<dyn IntentEmbedder>,
    state: RwLock<IndexState>,
}

impl EmbeddingIndex {
    pub fn new(embedder: Arc<dyn IntentEmbedder>) -> Self {
        Self {
            embedder,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Embed without indexing. Used to compute the term map that is
    /// persisted transactionally with the tool before the index is updated.
    pub fn embed(&self, text: &str) -> HashMap<String, f32> {
        self.embedder.term_frequencies(text)
    }

    /// Embed and index an intent text; returns the term map so the caller
    /// can persist it for rebuilds.
    pub fn index(&self, id: ToolId, intent: &str) -> HashMap<String, f32> {
        let terms = self.embedder.term_frequencies(intent);
        self.state.write().add(id, terms.clone());
        terms
    }

    /// Index a previously persisted term map (startup rebuild).
    pub fn index_terms(&self, id: ToolId, terms: HashMap<String, f32>) {
        self.state.write().add(id, terms);
    }

    pub fn remove(&self, id: ToolId) {
        self.state.write().remove(id);
    }

    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top-k tools by cosine similarity to the query text. Deterministic:
    /// ties break on tool id.
    pub fn query(&self, text: &str, k: usize) -> Vec<(ToolId, f64)> {
        let query_terms = self.embedder.term_frequencies(text);
        if query_terms.is_empty() || k == 0 {
            return Vec::new();
        }
        let state = self.state.read();
        let query_vec = state.weighted(&query_terms);
        let mut scored: Vec<(ToolId, f64)> = state
            .documents
            .iter()
            .map(|(id, terms)| (*id, cosine(&query_vec, &state.weighted(terms))))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0 .0.cmp(&b.0 .0))
        });
        scored.truncate(k);
        scored
    }
}
