//! User-invented terms captured by the workflow, pending review.

use std::fmt;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bowtie::CUSTOM_SUFFIX;
use crate::vocabulary::VocabularyKind;

/// Item lists the workflow collects, in step order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermCategory {
    Activities,
    Pressures,
    PreventiveControls,
    EscalationFactors,
    Consequences,
    ProtectiveControls,
}

impl TermCategory {
    pub const ALL: [TermCategory; 6] = [
        TermCategory::Activities,
        TermCategory::Pressures,
        TermCategory::PreventiveControls,
        TermCategory::EscalationFactors,
        TermCategory::Consequences,
        TermCategory::ProtectiveControls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TermCategory::Activities => "activities",
            TermCategory::Pressures => "pressures",
            TermCategory::PreventiveControls => "preventive_controls",
            TermCategory::EscalationFactors => "escalation_factors",
            TermCategory::Consequences => "consequences",
            TermCategory::ProtectiveControls => "protective_controls",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        TermCategory::ALL.into_iter().find(|c| c.as_str() == wanted)
    }

    /// Vocabulary the category resolves against. Escalation factors have
    /// none and are never treated as custom.
    pub fn vocabulary_kind(&self) -> Option<VocabularyKind> {
        match self {
            TermCategory::Activities => Some(VocabularyKind::Activities),
            TermCategory::Pressures => Some(VocabularyKind::Pressures),
            TermCategory::PreventiveControls | TermCategory::ProtectiveControls => {
                Some(VocabularyKind::Controls)
            }
            TermCategory::Consequences => Some(VocabularyKind::Consequences),
            TermCategory::EscalationFactors => None,
        }
    }
}

impl fmt::Display for TermCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomTermStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl CustomTermStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomTermStatus::Pending => "pending",
            CustomTermStatus::Approved => "approved",
            CustomTermStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(CustomTermStatus::Pending),
            "approved" => Some(CustomTermStatus::Approved),
            "rejected" => Some(CustomTermStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTermEntry {
    /// Display form, with the custom suffix.
    pub term: String,
    pub original_name: String,
    pub added_date: DateTime<Utc>,
    pub status: CustomTermStatus,
    pub notes: String,
}

impl CustomTermEntry {
    pub fn new(original_name: impl Into<String>) -> Self {
        let original_name = original_name.into();
        Self {
            term: format!("{original_name}{CUSTOM_SUFFIX}"),
            original_name,
            added_date: Utc::now(),
            status: CustomTermStatus::Pending,
            notes: String::new(),
        }
    }
}

pub const EXPORT_HEADERS: [&str; 5] = ["term", "original_name", "added_date", "status", "notes"];

/// One category's entries as CSV.
pub fn write_custom_terms<W: Write>(
    writer: W,
    entries: &[CustomTermEntry],
) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(EXPORT_HEADERS)?;
    for entry in entries {
        let added = entry.added_date.to_rfc3339();
        out.write_record([
            entry.term.as_str(),
            entry.original_name.as_str(),
            added.as_str(),
            entry.status.as_str(),
            entry.notes.as_str(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

pub fn custom_terms_csv(entries: &[CustomTermEntry]) -> Result<String, csv::Error> {
    let mut buf = Vec::new();
    write_custom_terms(&mut buf, entries)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
