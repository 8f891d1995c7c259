//! Customer and product resolution against the external registries.
//!
//! Each signal (exact code, name similarity, sender domain) yields scored
//! candidates on a 0-100 scale. Signals are merged per candidate by keeping
//! the highest score and concatenating the reasons, then ranked by score
//! descending and code ascending. A candidate is only auto-selected when it
//! clears the acceptance threshold and leads the runner-up by the minimum
//! margin; anything else is surfaced as a user choice.

mod customer;
pub mod normalize;
mod product;

pub use customer::CustomerResolver;
pub use product::{LineOutcome, ProductResolver, ResolvedLine};

use std::collections::BTreeMap;

use crate::config::ResolutionConfig;
use crate::domain::customer::CustomerCandidate;
use crate::domain::product::ProductCandidate;

pub const EXACT_CODE_SCORE: u8 = 100;
pub const NORMALIZED_NAME_SCORE: u8 = 95;
pub const EMAIL_DOMAIN_SCORE: u8 = 85;
pub const CODE_CONTAINS_SCORE: u8 = 80;
/// Ceiling for fuzzy name similarity so it never outranks exact signals.
pub const SIMILARITY_CEILING: f64 = 90.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoValidation {
    pub acceptance_threshold: u8,
    pub min_margin: u8,
}

impl Default for AutoValidation {
    fn default() -> Self {
        Self { acceptance_threshold: 80, min_margin: 10 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionSettings {
    pub auto_validation: AutoValidation,
    pub max_candidates: usize,
    pub search_limit: usize,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self { auto_validation: AutoValidation::default(), max_candidates: 5, search_limit: 10 }
    }
}

impl From<&ResolutionConfig> for ResolutionSettings {
    fn from(config: &ResolutionConfig) -> Self {
        Self {
            auto_validation: AutoValidation {
                acceptance_threshold: config.acceptance_threshold,
                min_margin: config.min_margin,
            },
            max_candidates: config.max_candidates,
            search_limit: config.search_limit,
        }
    }
}

/// A ranked candidate that can be merged across signals.
pub trait Scored: Clone {
    fn key(&self) -> String;
    fn score(&self) -> u8;
    fn set_score(&mut self, score: u8);
    fn reason(&self) -> &str;
    fn set_reason(&mut self, reason: String);
}

impl Scored for CustomerCandidate {
    fn key(&self) -> String {
        self.external_code.0.clone()
    }
    fn score(&self) -> u8 {
        self.score
    }
    fn set_score(&mut self, score: u8) {
        self.score = score;
    }
    fn reason(&self) -> &str {
        &self.match_reason
    }
    fn set_reason(&mut self, reason: String) {
        self.match_reason = reason;
    }
}

impl Scored for ProductCandidate {
    fn key(&self) -> String {
        self.item_code.as_ref().map(|code| code.0.clone()).unwrap_or_default()
    }
    fn score(&self) -> u8 {
        self.score
    }
    fn set_score(&mut self, score: u8) {
        self.score = score;
    }
    fn reason(&self) -> &str {
        &self.match_reason
    }
    fn set_reason(&mut self, reason: String) {
        self.match_reason = reason;
    }
}

/// Merges per-signal candidates: max score per key, unique reasons joined with `; `.
pub fn merge_candidates<T: Scored>(candidates: Vec<T>, limit: usize) -> Vec<T> {
    let mut merged: BTreeMap<String, T> = BTreeMap::new();
    for candidate in candidates {
        match merged.get_mut(&candidate.key()) {
            Some(existing) => {
                if !existing.reason().split("; ").any(|reason| reason == candidate.reason()) {
                    let reason = format!("{}; {}", existing.reason(), candidate.reason());
                    existing.set_reason(reason);
                }
                if candidate.score() > existing.score() {
                    existing.set_score(candidate.score());
                }
            }
            None => {
                merged.insert(candidate.key(), candidate);
            }
        }
    }

    let mut ranked: Vec<T> = merged.into_values().collect();
    ranked.sort_by(|left, right| {
        right.score().cmp(&left.score()).then_with(|| left.key().cmp(&right.key()))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection<T> {
    pub selected: Option<T>,
    pub requires_user_choice: bool,
    pub reason: String,
}

/// Applies the threshold and margin rule to an already ranked list.
pub fn select<T: Scored>(ranked: &[T], rules: AutoValidation) -> Selection<T> {
    let Some(top) = ranked.first() else {
        return Selection {
            selected: None,
            requires_user_choice: true,
            reason: "no candidates found".to_string(),
        };
    };

    let runner_up = ranked.get(1).map(Scored::score).unwrap_or(0);
    let margin = top.score().saturating_sub(runner_up);

    if top.score() <= rules.acceptance_threshold {
        return Selection {
            selected: None,
            requires_user_choice: true,
            reason: format!(
                "top score {} does not exceed acceptance threshold {}",
                top.score(),
                rules.acceptance_threshold
            ),
        };
    }
    if margin < rules.min_margin {
        return Selection {
            selected: None,
            requires_user_choice: true,
            reason: format!(
                "top candidates {} and {} are within {} points (minimum margin {})",
                top.key(),
                ranked.get(1).map(Scored::key).unwrap_or_default(),
                margin,
                rules.min_margin
            ),
        };
    }

    Selection {
        selected: Some(top.clone()),
        requires_user_choice: false,
        reason: format!(
            "auto-selected {} with score {} and margin {}",
            top.key(),
            top.score(),
            margin
        ),
    }
}

pub(crate) fn similarity_score(similarity: f64) -> u8 {
    (similarity.clamp(0.0, 1.0) * SIMILARITY_CEILING).round() as u8
}
