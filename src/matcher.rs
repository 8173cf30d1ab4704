//! Entity matching: fuzzy ranking of bindable entities against an asset name.
//!
//! DESIGN
//! ======
//! Names are reduced to lowercase word tokens (extension stripped, camelCase
//! and digit boundaries split, numbers and filler words dropped). A
//! candidate's "normalized" form is its tokens concatenated, so `Goblin_Archer`
//! and `goblin archer` compare equal.
//!
//! Scoring is additive with fixed constants from `consts`, so a given pool
//! always ranks the same way. Candidates are immutable snapshots rebuilt
//! wholesale from the entity store whenever it changes.
//!
//! TRADE-OFFS
//! ==========
//! The world and source-label bonuses are flat, so a world entity with no name
//! overlap still scores a little and shows up below every real match. It never
//! reaches the auto-select threshold on bonuses alone.

#[cfg(test)]
#[path = "matcher_test.rs"]
mod matcher_test;

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::collab::EntityStore;
use crate::consts::{
    MIN_CONTAINMENT_LEN, SCORE_ALL_TOKENS, SCORE_CANDIDATE_STARTS_WITH_QUERY, SCORE_EXACT,
    SCORE_QUERY_STARTS_WITH_CANDIDATE, SCORE_SOURCE_LABEL, SCORE_SUBSTRING, SCORE_TOKEN_HIT, SCORE_TOKEN_PARTIAL,
    SCORE_WORLD_BONUS, TOKEN_COUNT_PENALTY,
};
use crate::entry::PlacementEntry;

/// Words that carry no identity in asset names.
const STOP_WORDS: &[&str] = &["token", "topdown", "the", "of", "a", "an"];

/// Longest suffix treated as a file extension.
const MAX_EXTENSION_LEN: usize = 5;

// =============================================================================
// TYPES
// =============================================================================

/// Where a candidate comes from. World sorts before compendium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    World,
    Compendium,
}

/// What binding to a candidate resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CandidateTarget {
    World { entity_id: String },
    Compendium { pack_id: String, entry_id: String },
}

/// A bindable entity option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Unique across world and compendium: `world.<id>` or `pack.<pack>.<id>`.
    pub id: String,
    pub kind: CandidateKind,
    pub target: CandidateTarget,
    pub label: String,
    /// Folder path for world entities, pack label for compendium entries.
    pub source_label: String,
    pub match_tokens: Vec<String>,
    pub match_normalized: String,
    pub source_tokens: Vec<String>,
    pub pack_tokens: Option<Vec<String>>,
}

impl MatchCandidate {
    #[must_use]
    pub fn world(entity_id: &str, label: &str, folder_path: Option<&str>) -> Self {
        let source_label = folder_path.unwrap_or_default().to_string();
        let match_tokens = tokenize(label);
        Self {
            id: format!("world.{entity_id}"),
            kind: CandidateKind::World,
            target: CandidateTarget::World { entity_id: entity_id.to_string() },
            label: label.to_string(),
            match_normalized: match_tokens.concat(),
            match_tokens,
            source_tokens: tokenize(&source_label),
            source_label,
            pack_tokens: None,
        }
    }

    #[must_use]
    pub fn compendium(pack_id: &str, pack_label: &str, entry_id: &str, label: &str) -> Self {
        let match_tokens = tokenize(label);
        let pack_tokens = tokenize(pack_label);
        Self {
            id: format!("pack.{pack_id}.{entry_id}"),
            kind: CandidateKind::Compendium,
            target: CandidateTarget::Compendium { pack_id: pack_id.to_string(), entry_id: entry_id.to_string() },
            label: label.to_string(),
            source_label: pack_label.to_string(),
            match_normalized: match_tokens.concat(),
            match_tokens,
            source_tokens: pack_tokens.clone(),
            pack_tokens: Some(pack_tokens),
        }
    }
}

/// A candidate with its score for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: MatchCandidate,
    pub score: f64,
}

/// Tokens and normalized form of the name being matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub tokens: Vec<String>,
    pub normalized: String,
}

impl Query {
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let tokens = tokenize(text);
        Self { normalized: tokens.concat(), tokens }
    }

    /// Query derived from an entry's filename, or its display name when the
    /// filename is empty.
    #[must_use]
    pub fn from_entry(entry: &PlacementEntry) -> Self {
        let name = if entry.filename.trim().is_empty() { &entry.display_name } else { &entry.filename };
        Self::from_text(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// =============================================================================
// TOKENIZER
// =============================================================================

/// Split a name into lowercase identity tokens.
#[must_use]
pub fn tokenize(name: &str) -> Vec<String> {
    let stem = strip_extension(name.trim());
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in stem.chars() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut words);
            prev = None;
            continue;
        }
        if let Some(p) = prev {
            let camel = p.is_lowercase() && c.is_uppercase();
            let digit_edge = p.is_ascii_digit() != c.is_ascii_digit();
            if camel || digit_edge {
                flush(&mut current, &mut words);
            }
        }
        current.extend(c.to_lowercase());
        prev = Some(c);
    }
    flush(&mut current, &mut words);

    let mut seen = HashSet::new();
    words
        .into_iter()
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn flush(current: &mut String, words: &mut Vec<String>) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => {
            let ext = &name[idx + 1..];
            let is_ext = !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic());
            if is_ext { &name[..idx] } else { name }
        }
        _ => name,
    }
}

// =============================================================================
// SCORING
// =============================================================================

/// Score one candidate against a query. Never negative.
#[must_use]
pub fn score(candidate: &MatchCandidate, query: &Query) -> f64 {
    let q = query.normalized.as_str();
    let c = candidate.match_normalized.as_str();
    let mut total = 0.0;

    if !q.is_empty() && q == c {
        total += SCORE_EXACT;
    } else if q.len() >= MIN_CONTAINMENT_LEN && c.len() >= MIN_CONTAINMENT_LEN {
        if c.starts_with(q) {
            total += SCORE_CANDIDATE_STARTS_WITH_QUERY;
        } else if q.starts_with(c) {
            total += SCORE_QUERY_STARTS_WITH_CANDIDATE;
        } else if c.contains(q) {
            total += SCORE_SUBSTRING;
        }
    }

    let token_set: HashSet<&str> = candidate.match_tokens.iter().map(String::as_str).collect();
    let mut hits = 0usize;
    for token in &query.tokens {
        if token_set.contains(token.as_str()) {
            total += SCORE_TOKEN_HIT;
            hits += 1;
        } else if c.contains(token.as_str()) {
            total += SCORE_TOKEN_PARTIAL;
        }
    }
    if !query.tokens.is_empty() && hits == query.tokens.len() {
        total += SCORE_ALL_TOKENS;
    }

    #[allow(clippy::cast_precision_loss)]
    let diff = token_set.len().abs_diff(query.tokens.len()) as f64;
    total -= TOKEN_COUNT_PENALTY * diff;

    if candidate.kind == CandidateKind::World {
        total += SCORE_WORLD_BONUS;
    }
    if q.len() >= MIN_CONTAINMENT_LEN && source_contains(candidate, q) {
        total += SCORE_SOURCE_LABEL;
    }

    total.max(0.0)
}

fn source_contains(candidate: &MatchCandidate, normalized_query: &str) -> bool {
    candidate.source_tokens.concat().contains(normalized_query)
        || candidate.source_label.to_lowercase().contains(normalized_query)
}

/// Rank candidates best first. Zero scores are dropped unless `fill_zero`.
#[must_use]
pub fn rank(candidates: &[MatchCandidate], query: &Query, fill_zero: bool) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .map(|c| RankedCandidate { score: score(c, query), candidate: c.clone() })
        .filter(|r| fill_zero || r.score > 0.0)
        .collect();
    ranked.sort_by(compare_ranked);
    ranked
}

fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.candidate.kind.cmp(&b.candidate.kind))
        .then_with(|| a.candidate.label.to_lowercase().cmp(&b.candidate.label.to_lowercase()))
        .then_with(|| a.candidate.id.cmp(&b.candidate.id))
}

/// The candidate to bind automatically, if any.
///
/// Only the top-ranked candidate qualifies, only when it reaches `min_score`,
/// and never after the user picked a binding by hand.
#[must_use]
pub fn auto_select(ranked: &[RankedCandidate], min_score: f64, manual_override: bool) -> Option<&RankedCandidate> {
    if manual_override {
        return None;
    }
    ranked.first().filter(|top| top.score >= min_score)
}

/// Interactive search: ranked matches for `text`, or every candidate in
/// kind/label order when the text has no usable tokens.
#[must_use]
pub fn search(candidates: &[MatchCandidate], text: &str, limit: usize) -> Vec<RankedCandidate> {
    let query = Query::from_text(text);
    let mut ranked = rank(candidates, &query, query.is_empty());
    ranked.truncate(limit);
    ranked
}

// =============================================================================
// CANDIDATES
// =============================================================================

/// Snapshot every bindable entity in the store. Excluded packs are skipped
/// and duplicate ids keep their first occurrence.
#[must_use]
pub fn build_candidates(store: &dyn EntityStore) -> Vec<MatchCandidate> {
    let excluded = store.excluded_packs();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for entity in store.world_entities() {
        let candidate = MatchCandidate::world(&entity.id, &entity.name, entity.folder_path.as_deref());
        if seen.insert(candidate.id.clone()) {
            out.push(candidate);
        }
    }
    for pack in store.packs() {
        if excluded.contains(&pack.id) {
            continue;
        }
        for entry in &pack.entries {
            let candidate = MatchCandidate::compendium(&pack.id, &pack.label, &entry.id, &entry.name);
            if seen.insert(candidate.id.clone()) {
                out.push(candidate);
            }
        }
    }
    out
}
