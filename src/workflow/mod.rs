//! Eight-step guided workflow that assembles one record set.
//!
//! Steps move strictly one at a time. Advancing validates the current
//! step's required fields and leaves the state untouched on failure. Items
//! typed at steps 3 to 6 are resolved against the vocabulary; anything not
//! found becomes a custom term and is queued for review.

pub mod custom_terms;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bowtie::{add_default_columns, validate, BowtieRecord, DataValidationError, Term};
use crate::config::RiskConfig;
use crate::notify::{NoopNotifier, NoticeLevel, Notifier};
use crate::vocabulary::{same_name, Vocabulary};

pub use custom_terms::{
    custom_terms_csv, write_custom_terms, CustomTermEntry, CustomTermStatus, TermCategory,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("step {step}: required field {field} is empty")]
    Validation { step: u8, field: &'static str },
    #[error("already at the first step")]
    AtFirstStep,
    #[error("already at the final step")]
    AtFinalStep,
    #[error("workflow can only be completed at the final step (currently at step {0})")]
    NotAtFinalStep(u8),
    #[error("unknown project field {0:?}")]
    UnknownField(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("no custom term {name:?} under {category}")]
    UnknownCustomTerm { category: TermCategory, name: String },
    #[error(transparent)]
    Data(#[from] DataValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    ProjectIdentity = 1,
    CentralProblem = 2,
    ThreatsAndCauses = 3,
    PreventiveControls = 4,
    Consequences = 5,
    ProtectiveControls = 6,
    Review = 7,
    Finalize = 8,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 8] = [
        WorkflowStep::ProjectIdentity,
        WorkflowStep::CentralProblem,
        WorkflowStep::ThreatsAndCauses,
        WorkflowStep::PreventiveControls,
        WorkflowStep::Consequences,
        WorkflowStep::ProtectiveControls,
        WorkflowStep::Review,
        WorkflowStep::Finalize,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        WorkflowStep::ALL.into_iter().find(|s| s.number() == n)
    }

    pub fn title(&self) -> &'static str {
        match self {
            WorkflowStep::ProjectIdentity => "Project setup",
            WorkflowStep::CentralProblem => "Central problem",
            WorkflowStep::ThreatsAndCauses => "Activities and pressures",
            WorkflowStep::PreventiveControls => "Preventive controls",
            WorkflowStep::Consequences => "Consequences",
            WorkflowStep::ProtectiveControls => "Protective controls",
            WorkflowStep::Review => "Review",
            WorkflowStep::Finalize => "Finalize",
        }
    }

    fn next(&self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    fn prev(&self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectData {
    pub project_name: String,
    pub project_location: String,
    pub project_type: String,
    pub project_description: String,
    pub analyst: String,
    pub central_problem: String,
    pub problem_category: String,
    pub problem_details: String,
    pub activities: Vec<Term>,
    pub pressures: Vec<Term>,
    pub preventive_controls: Vec<Term>,
    pub escalation_factors: Vec<Term>,
    pub consequences: Vec<Term>,
    pub protective_controls: Vec<Term>,
    /// Likelihood given to assembled rows.
    pub default_likelihood: u8,
    pub default_severity: u8,
}

impl Default for ProjectData {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            project_location: String::new(),
            project_type: String::new(),
            project_description: String::new(),
            analyst: String::new(),
            central_problem: String::new(),
            problem_category: String::new(),
            problem_details: String::new(),
            activities: Vec::new(),
            pressures: Vec::new(),
            preventive_controls: Vec::new(),
            escalation_factors: Vec::new(),
            consequences: Vec::new(),
            protective_controls: Vec::new(),
            default_likelihood: 3,
            default_severity: 3,
        }
    }
}

impl ProjectData {
    pub fn items(&self, category: TermCategory) -> &[Term] {
        match category {
            TermCategory::Activities => &self.activities,
            TermCategory::Pressures => &self.pressures,
            TermCategory::PreventiveControls => &self.preventive_controls,
            TermCategory::EscalationFactors => &self.escalation_factors,
            TermCategory::Consequences => &self.consequences,
            TermCategory::ProtectiveControls => &self.protective_controls,
        }
    }

    fn items_mut(&mut self, category: TermCategory) -> &mut Vec<Term> {
        match category {
            TermCategory::Activities => &mut self.activities,
            TermCategory::Pressures => &mut self.pressures,
            TermCategory::PreventiveControls => &mut self.preventive_controls,
            TermCategory::EscalationFactors => &mut self.escalation_factors,
            TermCategory::Consequences => &mut self.consequences,
            TermCategory::ProtectiveControls => &mut self.protective_controls,
        }
    }
}

/// Serializable session state; a host may persist and restore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub current_step: WorkflowStep,
    pub project_data: ProjectData,
    pub custom_terms: BTreeMap<TermCategory, Vec<CustomTermEntry>>,
    pub last_error: Option<String>,
    pub completed: Option<Vec<BowtieRecord>>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            current_step: WorkflowStep::ProjectIdentity,
            project_data: ProjectData::default(),
            custom_terms: BTreeMap::new(),
            last_error: None,
            completed: None,
        }
    }
}

/// Result of `add_item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Standard,
    Custom,
    Duplicate,
}

pub struct Workflow {
    state: WorkflowState,
    notifier: Arc<dyn Notifier>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new(Arc::new(NoopNotifier))
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow").field("state", &self.state).finish()
    }
}

impl Workflow {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::from_state(WorkflowState::default(), notifier)
    }

    pub fn from_state(state: WorkflowState, notifier: Arc<dyn Notifier>) -> Self {
        Self { state, notifier }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn into_state(self) -> WorkflowState {
        self.state
    }

    pub fn current_step(&self) -> WorkflowStep {
        self.state.current_step
    }

    pub fn project(&self) -> &ProjectData {
        &self.state.project_data
    }

    pub fn set_project_field(
        &mut self,
        field: &str,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        let value = value.into();
        let data = &mut self.state.project_data;
        let slot = match field.trim() {
            "project_name" => &mut data.project_name,
            "project_location" => &mut data.project_location,
            "project_type" => &mut data.project_type,
            "project_description" => &mut data.project_description,
            "analyst" => &mut data.analyst,
            "central_problem" => &mut data.central_problem,
            "problem_category" => &mut data.problem_category,
            "problem_details" => &mut data.problem_details,
            other => return Err(WorkflowError::UnknownField(other.to_string())),
        };
        *slot = value.trim().to_string();
        Ok(())
    }

    pub fn set_default_scores(
        &mut self,
        likelihood: u8,
        severity: u8,
    ) -> Result<(), WorkflowError> {
        for (field, v) in [("default_likelihood", likelihood), ("default_severity", severity)] {
            if !(1..=5).contains(&v) {
                return Err(WorkflowError::InvalidValue {
                    field,
                    reason: format!("{v} is outside 1..=5"),
                });
            }
        }
        self.state.project_data.default_likelihood = likelihood;
        self.state.project_data.default_severity = severity;
        Ok(())
    }

    fn check_step(&self, step: WorkflowStep) -> Result<(), WorkflowError> {
        let data = &self.state.project_data;
        let require_text = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                Err(WorkflowError::Validation {
                    step: step.number(),
                    field,
                })
            } else {
                Ok(())
            }
        };
        let require_items = |category: TermCategory| {
            if data.items(category).iter().all(|t| t.is_missing()) {
                Err(WorkflowError::Validation {
                    step: step.number(),
                    field: category.as_str(),
                })
            } else {
                Ok(())
            }
        };
        match step {
            WorkflowStep::ProjectIdentity => require_text("project_name", &data.project_name),
            WorkflowStep::CentralProblem => require_text("central_problem", &data.central_problem),
            WorkflowStep::ThreatsAndCauses => {
                require_items(TermCategory::Activities)?;
                require_items(TermCategory::Pressures)
            }
            WorkflowStep::PreventiveControls => require_items(TermCategory::PreventiveControls),
            WorkflowStep::Consequences => require_items(TermCategory::Consequences),
            WorkflowStep::ProtectiveControls => require_items(TermCategory::ProtectiveControls),
            WorkflowStep::Review | WorkflowStep::Finalize => Ok(()),
        }
    }

    /// Validate the current step and move forward one step.
    pub fn advance(&mut self) -> Result<WorkflowStep, WorkflowError> {
        let current = self.state.current_step;
        let next = current.next().ok_or(WorkflowError::AtFinalStep)?;
        self.check_step(current)?;
        self.state.current_step = next;
        tracing::debug!(
            session = %self.state.session_id,
            step = next.number(),
            "workflow advanced"
        );
        Ok(next)
    }

    pub fn back(&mut self) -> Result<WorkflowStep, WorkflowError> {
        let prev = self
            .state
            .current_step
            .prev()
            .ok_or(WorkflowError::AtFirstStep)?;
        self.state.current_step = prev;
        Ok(prev)
    }

    /// Add an item, resolving it against `vocabulary`. A name already in the
    /// list (case-insensitive) is ignored.
    pub fn add_item(
        &mut self,
        category: TermCategory,
        name: &str,
        vocabulary: &Vocabulary,
    ) -> Result<AddOutcome, WorkflowError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkflowError::InvalidValue {
                field: category.as_str(),
                reason: "item name is empty".to_string(),
            });
        }
        let already = self
            .state
            .project_data
            .items(category)
            .iter()
            .any(|t| same_name(&t.name, name));
        if already {
            return Ok(AddOutcome::Duplicate);
        }

        let (term, outcome) = match category.vocabulary_kind() {
            None => (Term::standard(name), AddOutcome::Standard),
            Some(kind) => match vocabulary.table(kind).find_by_name(name) {
                Some(entry) => (Term::standard(entry.name.clone()), AddOutcome::Standard),
                None => (Term::custom(name), AddOutcome::Custom),
            },
        };
        if outcome == AddOutcome::Custom {
            let entry = CustomTermEntry::new(name);
            self.notifier.notify(
                NoticeLevel::Info,
                &format!("custom {} term added: {}", category, entry.term),
            );
            self.state
                .custom_terms
                .entry(category)
                .or_default()
                .push(entry);
        }
        self.state.project_data.items_mut(category).push(term);
        Ok(outcome)
    }

    /// Remove an item and any custom-term entry it created.
    pub fn remove_item(&mut self, category: TermCategory, name: &str) -> bool {
        let name = name.trim();
        let items = self.state.project_data.items_mut(category);
        let before = items.len();
        items.retain(|t| !same_name(&t.name, name));
        let removed = items.len() != before;
        if removed {
            if let Some(entries) = self.state.custom_terms.get_mut(&category) {
                entries.retain(|e| !same_name(&e.original_name, name));
                if entries.is_empty() {
                    self.state.custom_terms.remove(&category);
                }
            }
        }
        removed
    }

    pub fn custom_terms_table(&self, category: TermCategory) -> &[CustomTermEntry] {
        self.state
            .custom_terms
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn custom_terms_export(&self, category: TermCategory) -> Result<String, csv::Error> {
        custom_terms_csv(self.custom_terms_table(category))
    }

    pub fn custom_term_count(&self) -> usize {
        self.state.custom_terms.values().map(Vec::len).sum()
    }

    pub fn set_custom_term_status(
        &mut self,
        category: TermCategory,
        original_name: &str,
        status: CustomTermStatus,
        notes: Option<&str>,
    ) -> Result<(), WorkflowError> {
        let entry = self
            .state
            .custom_terms
            .get_mut(&category)
            .and_then(|entries| {
                entries
                    .iter_mut()
                    .find(|e| same_name(&e.original_name, original_name))
            })
            .ok_or_else(|| WorkflowError::UnknownCustomTerm {
                category,
                name: original_name.to_string(),
            })?;
        entry.status = status;
        if let Some(notes) = notes {
            entry.notes = notes.to_string();
        }
        Ok(())
    }

    pub fn clear_custom_terms(&mut self) {
        self.state.custom_terms.clear();
    }

    /// Rows in the order they will be assembled: every activity × pressure
    /// pair, with the other lists cycled by row index.
    fn assemble(&self) -> Vec<BowtieRecord> {
        let data = &self.state.project_data;
        let present = |items: &[Term]| -> Vec<Term> {
            items.iter().filter(|t| !t.is_missing()).cloned().collect()
        };
        let activities = present(&data.activities);
        let pressures = present(&data.pressures);
        if activities.is_empty() || pressures.is_empty() {
            return Vec::new();
        }
        let pairs: Vec<(&Term, &Term)> = activities
            .iter()
            .flat_map(|a| pressures.iter().map(move |p| (a, p)))
            .collect();
        let controls = present(&data.preventive_controls);
        let escalations = present(&data.escalation_factors);
        let consequences = present(&data.consequences);
        let mitigations = present(&data.protective_controls);
        let rows = [
            pairs.len(),
            controls.len(),
            escalations.len(),
            consequences.len(),
            mitigations.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);
        let cycled = |list: &[Term], i: usize| -> Term {
            if list.is_empty() {
                Term::empty()
            } else {
                list[i % list.len()].clone()
            }
        };

        (0..rows)
            .map(|i| {
                let (activity, pressure) = pairs[i % pairs.len()];
                BowtieRecord {
                    activity: activity.clone(),
                    pressure: pressure.clone(),
                    preventive_control: cycled(&controls, i),
                    escalation_factor: cycled(&escalations, i),
                    central_problem: Term::standard(data.central_problem.trim()),
                    protective_mitigation: cycled(&mitigations, i),
                    consequence: cycled(&consequences, i),
                    likelihood: data.default_likelihood,
                    severity: data.default_severity,
                    risk_level: None,
                    overall_likelihood: None,
                    overall_severity: None,
                    link_scores: None,
                }
            })
            .collect()
    }

    /// Assemble, derive and validate the record set. Only allowed at the
    /// final step; on failure the workflow stays there with `last_error` set.
    pub fn complete(&mut self, risk: &RiskConfig) -> Result<Vec<BowtieRecord>, WorkflowError> {
        if self.state.current_step != WorkflowStep::Finalize {
            return Err(WorkflowError::NotAtFinalStep(self.state.current_step.number()));
        }
        let records = add_default_columns(self.assemble(), risk);
        if let Err(e) = validate(&records) {
            self.state.last_error = Some(e.to_string());
            self.notifier.notify(NoticeLevel::Error, &format!("workflow incomplete: {e}"));
            return Err(WorkflowError::Data(e));
        }
        self.state.last_error = None;
        self.state.completed = Some(records.clone());
        self.notifier.notify(
            NoticeLevel::Info,
            &format!("workflow complete: {} records", records.len()),
        );
        Ok(records)
    }
}
