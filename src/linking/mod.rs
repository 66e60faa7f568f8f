//! Vocabulary-driven link suggestion.
//!
//! Candidates carry a bowtie role; sources are only ever scored against
//! targets in a permitted successor role, so backward or cross-category
//! edges cannot be produced regardless of what the scorers say.

pub mod keywords;
pub mod similarity;

use serde::{Deserialize, Serialize};

use crate::bowtie::Role;
use crate::config::LinkingConfig;
use crate::vocabulary::{Vocabulary, VocabularyEntry};

pub use similarity::{
    method_score, CausalPatternScorer, KeywordScorer, LexicalScorer, ScoringError,
    SimilarityEngine, SimilarityMethod, SimilarityScorer,
};

/// Roles a link from `role` may point at.
pub fn permitted_successors(role: Role) -> &'static [Role] {
    match role {
        Role::Activity => &[Role::Pressure],
        Role::Pressure => &[Role::PreventiveControl, Role::CentralProblem],
        Role::EscalationFactor => &[Role::PreventiveControl],
        Role::CentralProblem => &[Role::Consequence],
        Role::ProtectiveMitigation => &[Role::Consequence],
        Role::PreventiveControl | Role::Consequence => &[],
    }
}

pub fn is_permitted(from: Role, to: Role) -> bool {
    permitted_successors(from).contains(&to)
}

/// An item that may take part in a suggested link. `id`/`name` are optional
/// so raw, possibly incomplete rows can be passed straight in; ineligible
/// items are skipped rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub id: Option<String>,
    pub name: Option<String>,
    pub level: u32,
    pub role: Role,
}

impl LinkCandidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, level: u32, role: Role) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            level,
            role,
        }
    }

    pub fn from_entry(entry: &VocabularyEntry, role: Role) -> Self {
        Self {
            id: Some(entry.id.clone()),
            name: Some(entry.name.clone()),
            level: entry.level,
            role,
        }
    }

    /// Non-blank id and name, and not a category header.
    pub fn is_eligible(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.id) && present(&self.name) && self.level >= 2
    }
}

/// Candidates for every selectable vocabulary entry. Controls appear twice,
/// once as preventive controls and once as protective mitigations.
pub fn candidates_from_vocabulary(vocabulary: &Vocabulary) -> Vec<LinkCandidate> {
    let mut out = Vec::new();
    let mut push = |entries: &[VocabularyEntry], role: Role| {
        out.extend(
            entries
                .iter()
                .filter(|e| e.is_selectable())
                .map(|e| LinkCandidate::from_entry(e, role)),
        );
    };
    push(vocabulary.activities.entries(), Role::Activity);
    push(vocabulary.pressures.entries(), Role::Pressure);
    push(vocabulary.controls.entries(), Role::PreventiveControl);
    push(vocabulary.controls.entries(), Role::ProtectiveMitigation);
    push(vocabulary.consequences.entries(), Role::Consequence);
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedLink {
    pub from_id: String,
    pub to_id: String,
    pub from_role: Role,
    pub to_role: Role,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkOptions {
    /// Keep links scoring at or above this value.
    pub similarity_threshold: f64,
    /// Per source item.
    pub max_links_per_item: usize,
    pub methods: Vec<SimilarityMethod>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkingConfig::default().into()
    }
}

impl From<LinkingConfig> for LinkOptions {
    fn from(cfg: LinkingConfig) -> Self {
        Self {
            similarity_threshold: cfg.similarity_threshold,
            max_links_per_item: cfg.max_links_per_item,
            methods: cfg.methods,
        }
    }
}

/// Suggest links across a candidate set using the built-in scorers named in
/// `options.methods`.
pub fn find_links(candidates: &[LinkCandidate], options: &LinkOptions) -> Vec<SuggestedLink> {
    let engine = SimilarityEngine::from_methods(&options.methods);
    find_links_with(&engine, candidates, options)
}

/// Same as `find_links` with a caller-supplied engine. Output order is
/// sources in input order, then each source's links by descending score,
/// ties kept in input order.
pub fn find_links_with(
    engine: &SimilarityEngine,
    candidates: &[LinkCandidate],
    options: &LinkOptions,
) -> Vec<SuggestedLink> {
    let mut out = Vec::new();
    for source in candidates.iter().filter(|c| c.is_eligible()) {
        out.extend(successors_for(engine, source, candidates, options));
    }
    tracing::debug!(
        candidates = candidates.len(),
        links = out.len(),
        "link suggestion finished"
    );
    out
}

/// Ranked successors for a single source item.
pub fn suggest_successors(
    source: &LinkCandidate,
    candidates: &[LinkCandidate],
    options: &LinkOptions,
) -> Vec<SuggestedLink> {
    if !source.is_eligible() {
        return Vec::new();
    }
    let engine = SimilarityEngine::from_methods(&options.methods);
    successors_for(&engine, source, candidates, options)
}

fn successors_for(
    engine: &SimilarityEngine,
    source: &LinkCandidate,
    candidates: &[LinkCandidate],
    options: &LinkOptions,
) -> Vec<SuggestedLink> {
    let (Some(from_id), Some(from_name)) = (source.id.as_deref(), source.name.as_deref()) else {
        return Vec::new();
    };
    let mut scored: Vec<SuggestedLink> = candidates
        .iter()
        .filter(|t| t.is_eligible() && is_permitted(source.role, t.role))
        .filter_map(|target| {
            let score = engine.score(Some(from_name), target.name.as_deref());
            if score < options.similarity_threshold {
                return None;
            }
            Some(SuggestedLink {
                from_id: from_id.to_string(),
                to_id: target.id.clone()?,
                from_role: source.role,
                to_role: target.role,
                score,
            })
        })
        .collect();
    // stable: equal scores keep input order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(options.max_links_per_item);
    scored
}
