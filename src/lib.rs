#![forbid(unsafe_code)]

//! # bowtie-risk
//!
//! Bowtie environmental risk models. A bowtie places a central problem
//! (an undesired environmental state) between the activities and pressures
//! that cause it on the left and the consequences it leads to on the right,
//! with preventive controls, escalation factors and protective mitigations
//! as barriers along the way.
//!
//! The crate turns hierarchical vocabularies and tabular bowtie records into:
//! - suggested causal links between vocabulary items (`linking`)
//! - a Bayesian network per central problem with exact inference and a
//!   heuristic fallback (`bayes`)
//! - node/edge diagram data (`visual`) and reports (`report`)
//!
//! `workflow` assembles a record set step by step, capturing terms that are
//! not in the vocabulary as custom terms for review.

pub mod bayes;
pub mod bowtie;
pub mod config;
pub mod error;
pub mod linking;
pub mod notify;
pub mod report;
pub mod visual;
pub mod vocabulary;
pub mod workflow;

pub use bayes::{
    analyze_problem, compile, create_cpts, infer, BayesianNetwork, BayesianNetworkStructure,
    Evidence, InferenceMethod, InferenceResult, NodeType, ScenarioPreset,
};
pub use bowtie::{
    add_default_columns, validate, BowtieRecord, DataValidationError, RiskLevel, Role, Term,
};
pub use config::{BowtieConfig, ConfigError};
pub use error::BowtieError;
pub use linking::{find_links, LinkCandidate, LinkOptions, SimilarityMethod, SuggestedLink};
pub use notify::{NoticeLevel, Notifier};
pub use report::{build_report, render_report_html, render_report_markdown, BowtieReport};
pub use visual::{to_graph, BowtieGraph, GraphCache, GraphOptions};
pub use vocabulary::{Vocabulary, VocabularyKind, VocabularyStore, VocabularyTable};
pub use workflow::{Workflow, WorkflowError, WorkflowStep};
