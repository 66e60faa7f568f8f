//! Heuristic plausibility scorers for "source causes target".
//!
//! Every public entry point is total: missing text scores 0, a failing or
//! non-finite scorer contributes 0, and the ensemble is always a finite value
//! in [0, 1].

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::keywords::{CAUSAL_PATTERNS, ENVIRONMENTAL_KEYWORDS};

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("invalid token regex"));

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("missing input text")]
    MissingInput,
    #[error("{method} produced a non-finite score")]
    NonFinite { method: String },
    #[error("{method} failed: {reason}")]
    Method { method: String, reason: String },
}

/// Built-in scoring methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    Lexical,
    Keyword,
    CausalPattern,
}

impl SimilarityMethod {
    pub const fn all() -> &'static [SimilarityMethod] {
        &[
            SimilarityMethod::Lexical,
            SimilarityMethod::Keyword,
            SimilarityMethod::CausalPattern,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMethod::Lexical => "lexical",
            SimilarityMethod::Keyword => "keyword",
            SimilarityMethod::CausalPattern => "causal_pattern",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "lexical" | "jaccard" => Some(SimilarityMethod::Lexical),
            "keyword" | "keywords" => Some(SimilarityMethod::Keyword),
            "causal_pattern" | "causal" => Some(SimilarityMethod::CausalPattern),
            _ => None,
        }
    }

    fn scorer(&self) -> Box<dyn SimilarityScorer> {
        match self {
            SimilarityMethod::Lexical => Box::new(LexicalScorer),
            SimilarityMethod::Keyword => Box::new(KeywordScorer::default()),
            SimilarityMethod::CausalPattern => Box::new(CausalPatternScorer::default()),
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scoring method. Implementations see only non-blank text; the engine
/// handles missing input before calling them.
pub trait SimilarityScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Score in [0, 1]. Errors are absorbed by the engine as 0.
    fn score(&self, source: &str, target: &str) -> Result<f64, ScoringError>;
}

fn tokens(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Jaccard overlap of lowercase alphanumeric tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl SimilarityScorer for LexicalScorer {
    fn name(&self) -> &str {
        "lexical"
    }

    fn score(&self, source: &str, target: &str) -> Result<f64, ScoringError> {
        let a = tokens(source);
        let b = tokens(target);
        let union = a.union(&b).count();
        if union == 0 {
            return Ok(0.0);
        }
        Ok(a.intersection(&b).count() as f64 / union as f64)
    }
}

/// Fraction of a keyword list present in both texts.
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    keywords: Vec<String>,
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new(ENVIRONMENTAL_KEYWORDS.iter().copied())
    }
}

impl KeywordScorer {
    pub fn new<'a>(keywords: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl SimilarityScorer for KeywordScorer {
    fn name(&self) -> &str {
        "keyword"
    }

    fn score(&self, source: &str, target: &str) -> Result<f64, ScoringError> {
        if self.keywords.is_empty() {
            return Ok(0.0);
        }
        let source = source.to_lowercase();
        let target = target.to_lowercase();
        let shared = self
            .keywords
            .iter()
            .filter(|k| source.contains(k.as_str()) && target.contains(k.as_str()))
            .count();
        Ok(shared as f64 / self.keywords.len() as f64)
    }
}

/// Fraction of (cause, effect) phrase pairs that fire for source → target.
#[derive(Debug, Clone)]
pub struct CausalPatternScorer {
    patterns: Vec<(Vec<String>, Vec<String>)>,
}

impl Default for CausalPatternScorer {
    fn default() -> Self {
        Self {
            patterns: CAUSAL_PATTERNS
                .iter()
                .map(|(causes, effects)| {
                    (
                        causes.iter().map(|c| c.to_string()).collect(),
                        effects.iter().map(|e| e.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl CausalPatternScorer {
    pub fn new(patterns: Vec<(Vec<String>, Vec<String>)>) -> Self {
        Self { patterns }
    }
}

impl SimilarityScorer for CausalPatternScorer {
    fn name(&self) -> &str {
        "causal_pattern"
    }

    fn score(&self, source: &str, target: &str) -> Result<f64, ScoringError> {
        if self.patterns.is_empty() {
            return Ok(0.0);
        }
        let source = source.to_lowercase();
        let target = target.to_lowercase();
        let fired = self
            .patterns
            .iter()
            .filter(|(causes, effects)| {
                causes.iter().any(|c| source.contains(c.as_str()))
                    && effects.iter().any(|e| target.contains(e.as_str()))
            })
            .count();
        Ok(fired as f64 / self.patterns.len() as f64)
    }
}

/// Unweighted mean over a set of scorers.
pub struct SimilarityEngine {
    scorers: Vec<Box<dyn SimilarityScorer>>,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::from_methods(SimilarityMethod::all())
    }
}

impl fmt::Debug for SimilarityEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.scorers.iter().map(|s| s.name()).collect();
        f.debug_struct("SimilarityEngine")
            .field("scorers", &names)
            .finish()
    }
}

impl SimilarityEngine {
    /// Duplicate methods are collapsed.
    pub fn from_methods(methods: &[SimilarityMethod]) -> Self {
        let mut seen = HashSet::new();
        let scorers = methods
            .iter()
            .filter(|m| seen.insert(**m))
            .map(|m| m.scorer())
            .collect();
        Self { scorers }
    }

    pub fn empty() -> Self {
        Self {
            scorers: Vec::new(),
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn SimilarityScorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }

    /// Ensemble score for one pair. Always finite and within [0, 1].
    pub fn score(&self, source: Option<&str>, target: Option<&str>) -> f64 {
        let (Some(source), Some(target)) = (present(source), present(target)) else {
            return 0.0;
        };
        if self.scorers.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .scorers
            .iter()
            .map(|scorer| absorb(scorer.as_ref(), source, target))
            .sum();
        sanitize(total / self.scorers.len() as f64)
    }

    /// Per-scorer breakdown, in scorer order.
    pub fn breakdown(&self, source: Option<&str>, target: Option<&str>) -> Vec<(String, f64)> {
        let pair = (present(source), present(target));
        self.scorers
            .iter()
            .map(|scorer| {
                let value = match pair {
                    (Some(s), Some(t)) => absorb(scorer.as_ref(), s, t),
                    _ => 0.0,
                };
                (scorer.name().to_string(), value)
            })
            .collect()
    }
}

/// Score one pair with a single built-in method, under the same totality
/// rules as the ensemble.
pub fn method_score(method: SimilarityMethod, source: Option<&str>, target: Option<&str>) -> f64 {
    let (Some(source), Some(target)) = (present(source), present(target)) else {
        return 0.0;
    };
    absorb(method.scorer().as_ref(), source, target)
}

fn present(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

fn absorb(scorer: &dyn SimilarityScorer, source: &str, target: &str) -> f64 {
    let result = scorer.score(source, target).and_then(|v| {
        if v.is_finite() {
            Ok(v)
        } else {
            Err(ScoringError::NonFinite {
                method: scorer.name().to_string(),
            })
        }
    });
    match result {
        Ok(v) => sanitize(v),
        Err(e) => {
            warn!(method = scorer.name(), error = %e, "similarity scorer failed; scoring 0");
            0.0
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
