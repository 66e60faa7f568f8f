//! Bowtie record model.
//!
//! One `BowtieRecord` is one causal pathway through a bowtie: activity →
//! pressure → preventive control → escalation factor → central problem →
//! protective mitigation → consequence, with likelihood/severity scores.
//! A `Vec<BowtieRecord>` is the unit every downstream component consumes.

pub mod generate;
pub mod risk;
pub mod table;
pub mod validate;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use generate::{generate_from_links, generate_sample_scenarios};
pub use risk::{overall_likelihood, overall_severity, RiskLevel};
pub use table::{
    read_records_csv, records_from_csv_str, records_to_csv_string, write_records_csv, TableError,
};
pub use validate::{add_default_columns, validate, validate_columns, DataValidationError};

/// Canonical column names. The central-risk column is `Central_Problem`
/// everywhere; there is no alias.
pub mod columns {
    pub const ACTIVITY: &str = "Activity";
    pub const PRESSURE: &str = "Pressure";
    pub const PREVENTIVE_CONTROL: &str = "Preventive_Control";
    pub const ESCALATION_FACTOR: &str = "Escalation_Factor";
    pub const CENTRAL_PROBLEM: &str = "Central_Problem";
    pub const PROTECTIVE_MITIGATION: &str = "Protective_Mitigation";
    pub const CONSEQUENCE: &str = "Consequence";
    pub const LIKELIHOOD: &str = "Likelihood";
    pub const SEVERITY: &str = "Severity";
    pub const RISK_LEVEL: &str = "Risk_Level";
    pub const OVERALL_LIKELIHOOD: &str = "Overall_Likelihood";
    pub const OVERALL_SEVERITY: &str = "Overall_Severity";
    pub const CUSTOM_ROLES: &str = "Custom_Roles";

    /// Columns every record set must carry before visualization or export.
    pub const REQUIRED: [&str; 4] = [ACTIVITY, PRESSURE, CENTRAL_PROBLEM, CONSEQUENCE];
}

/// Display suffix for user-invented terms. Only ever appended at render time.
pub const CUSTOM_SUFFIX: &str = " (Custom)";

/// Structural role of an entity within a bowtie, in left-to-right order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Activity,
    Pressure,
    PreventiveControl,
    EscalationFactor,
    CentralProblem,
    ProtectiveMitigation,
    Consequence,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Activity,
        Role::Pressure,
        Role::PreventiveControl,
        Role::EscalationFactor,
        Role::CentralProblem,
        Role::ProtectiveMitigation,
        Role::Consequence,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Role::Activity => columns::ACTIVITY,
            Role::Pressure => columns::PRESSURE,
            Role::PreventiveControl => columns::PREVENTIVE_CONTROL,
            Role::EscalationFactor => columns::ESCALATION_FACTOR,
            Role::CentralProblem => columns::CENTRAL_PROBLEM,
            Role::ProtectiveMitigation => columns::PROTECTIVE_MITIGATION,
            Role::Consequence => columns::CONSEQUENCE,
        }
    }

    pub fn from_column(column: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.column() == column)
    }

    /// Position in the left-to-right bowtie layout, starting at 0.
    pub fn rank(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A named entity in a record, flagged when it did not come from the
/// vocabulary. A missing term is never custom: `Term::custom("")` is
/// `Term::empty()`, and CSV import clears the flag on blank cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    #[serde(default)]
    pub is_custom: bool,
}

impl Term {
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_custom: false,
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_custom = !name.trim().is_empty();
        Self { name, is_custom }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Blank and whitespace-only names count as missing.
    pub fn is_missing(&self) -> bool {
        self.name.trim().is_empty()
    }

    /// Name as shown to users, with the custom suffix where applicable.
    pub fn display(&self) -> String {
        if self.is_custom {
            format!("{}{}", self.name, CUSTOM_SUFFIX)
        } else {
            self.name.clone()
        }
    }
}

impl From<&str> for Term {
    fn from(name: &str) -> Self {
        Term::standard(name)
    }
}

impl From<String> for Term {
    fn from(name: String) -> Self {
        Term::standard(name)
    }
}

/// Likelihood/severity pair for one link of the chain (both 1–5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRating {
    pub likelihood: u8,
    pub severity: u8,
}

impl LinkRating {
    pub fn new(likelihood: u8, severity: u8) -> Self {
        Self {
            likelihood,
            severity,
        }
    }
}

/// Per-link ratings for the five scored edges of a pathway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkScores {
    pub activity_pressure: LinkRating,
    pub pressure_control: LinkRating,
    pub control_escalation: LinkRating,
    pub escalation_central: LinkRating,
    pub mitigation_consequence: LinkRating,
}

impl LinkScores {
    /// Column stems, in chain order.
    pub const STEMS: [&'static str; 5] = [
        "Activity_to_Pressure",
        "Pressure_to_Control",
        "Control_to_Escalation",
        "Escalation_to_Central",
        "Mitigation_to_Consequence",
    ];

    pub fn uniform(rating: LinkRating) -> Self {
        Self {
            activity_pressure: rating,
            pressure_control: rating,
            control_escalation: rating,
            escalation_central: rating,
            mitigation_consequence: rating,
        }
    }

    /// Ratings in chain order, matching `STEMS`.
    pub fn in_order(&self) -> [LinkRating; 5] {
        [
            self.activity_pressure,
            self.pressure_control,
            self.control_escalation,
            self.escalation_central,
            self.mitigation_consequence,
        ]
    }

    pub fn from_ordered(ratings: [LinkRating; 5]) -> Self {
        Self {
            activity_pressure: ratings[0],
            pressure_control: ratings[1],
            control_escalation: ratings[2],
            escalation_central: ratings[3],
            mitigation_consequence: ratings[4],
        }
    }
}

/// One causal pathway through a bowtie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BowtieRecord {
    pub activity: Term,
    pub pressure: Term,
    #[serde(default)]
    pub preventive_control: Term,
    #[serde(default)]
    pub escalation_factor: Term,
    pub central_problem: Term,
    #[serde(default)]
    pub protective_mitigation: Term,
    pub consequence: Term,
    pub likelihood: u8,
    pub severity: u8,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub overall_likelihood: Option<u8>,
    #[serde(default)]
    pub overall_severity: Option<u8>,
    #[serde(default)]
    pub link_scores: Option<LinkScores>,
}

impl BowtieRecord {
    /// Record with the four required roles set and the optional ones empty.
    pub fn new(
        activity: impl Into<Term>,
        pressure: impl Into<Term>,
        central_problem: impl Into<Term>,
        consequence: impl Into<Term>,
        likelihood: u8,
        severity: u8,
    ) -> Self {
        Self {
            activity: activity.into(),
            pressure: pressure.into(),
            preventive_control: Term::empty(),
            escalation_factor: Term::empty(),
            central_problem: central_problem.into(),
            protective_mitigation: Term::empty(),
            consequence: consequence.into(),
            likelihood,
            severity,
            risk_level: None,
            overall_likelihood: None,
            overall_severity: None,
            link_scores: None,
        }
    }

    pub fn with_preventive_control(mut self, term: impl Into<Term>) -> Self {
        self.preventive_control = term.into();
        self
    }

    pub fn with_escalation_factor(mut self, term: impl Into<Term>) -> Self {
        self.escalation_factor = term.into();
        self
    }

    pub fn with_protective_mitigation(mut self, term: impl Into<Term>) -> Self {
        self.protective_mitigation = term.into();
        self
    }

    pub fn with_link_scores(mut self, scores: LinkScores) -> Self {
        self.link_scores = Some(scores);
        self
    }

    pub fn term(&self, role: Role) -> &Term {
        match role {
            Role::Activity => &self.activity,
            Role::Pressure => &self.pressure,
            Role::PreventiveControl => &self.preventive_control,
            Role::EscalationFactor => &self.escalation_factor,
            Role::CentralProblem => &self.central_problem,
            Role::ProtectiveMitigation => &self.protective_mitigation,
            Role::Consequence => &self.consequence,
        }
    }

    pub fn term_mut(&mut self, role: Role) -> &mut Term {
        match role {
            Role::Activity => &mut self.activity,
            Role::Pressure => &mut self.pressure,
            Role::PreventiveControl => &mut self.preventive_control,
            Role::EscalationFactor => &mut self.escalation_factor,
            Role::CentralProblem => &mut self.central_problem,
            Role::ProtectiveMitigation => &mut self.protective_mitigation,
            Role::Consequence => &mut self.consequence,
        }
    }

    /// Likelihood used downstream: the derived overall value when present.
    pub fn effective_likelihood(&self) -> u8 {
        self.overall_likelihood.unwrap_or(self.likelihood)
    }

    pub fn effective_severity(&self) -> u8 {
        self.overall_severity.unwrap_or(self.severity)
    }

    pub fn risk_score(&self) -> u32 {
        self.effective_likelihood() as u32 * self.effective_severity() as u32
    }

    /// Roles whose value is a user-invented term.
    pub fn custom_roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| {
                let t = self.term(*r);
                t.is_custom && !t.is_missing()
            })
            .collect()
    }
}

/// Distinct central problems in first-seen order.
pub fn central_problems(records: &[BowtieRecord]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for r in records {
        let name = r.central_problem.name.trim();
        if !name.is_empty() && seen.insert(name.to_string()) {
            out.push(name.to_string());
        }
    }
    out
}

/// Records whose central problem matches `central_problem` (trimmed, exact).
pub fn filter_by_problem<'a>(
    records: &'a [BowtieRecord],
    central_problem: &str,
) -> Vec<&'a BowtieRecord> {
    let wanted = central_problem.trim();
    records
        .iter()
        .filter(|r| !r.central_problem.is_missing() && r.central_problem.name.trim() == wanted)
        .collect()
}
