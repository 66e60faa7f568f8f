//! Record-set validation and derived-column synthesis.

use crate::config::RiskConfig;

use super::risk::{overall_likelihood, overall_severity, RiskLevel};
use super::{columns, BowtieRecord, Role};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataValidationError {
    #[error("record set is empty")]
    EmptyRecordSet,
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("row {row}: required column {column} is empty")]
    MissingField { row: usize, column: &'static str },
    #[error("row {row}: invalid value {value:?} in column {column}")]
    InvalidField {
        row: usize,
        column: String,
        value: String,
    },
}

const REQUIRED_ROLES: [Role; 4] = [
    Role::Activity,
    Role::Pressure,
    Role::CentralProblem,
    Role::Consequence,
];

/// Check a tabular header row for the four required columns.
pub fn validate_columns<S: AsRef<str>>(headers: &[S]) -> Result<(), DataValidationError> {
    let missing: Vec<String> = columns::REQUIRED
        .iter()
        .filter(|required| !headers.iter().any(|h| h.as_ref().trim() == **required))
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DataValidationError::MissingColumns(missing))
    }
}

/// Validate a record set for downstream visualization and export.
///
/// Rows are numbered from 1. Required roles must be non-blank; likelihood,
/// severity and any per-link ratings must lie in 1..=5.
pub fn validate(records: &[BowtieRecord]) -> Result<(), DataValidationError> {
    if records.is_empty() {
        return Err(DataValidationError::EmptyRecordSet);
    }
    for (idx, record) in records.iter().enumerate() {
        let row = idx + 1;
        for role in REQUIRED_ROLES {
            if record.term(role).is_missing() {
                return Err(DataValidationError::MissingField {
                    row,
                    column: role.column(),
                });
            }
        }
        check_scale(row, columns::LIKELIHOOD, record.likelihood)?;
        check_scale(row, columns::SEVERITY, record.severity)?;
        if let Some(v) = record.overall_likelihood {
            check_scale(row, columns::OVERALL_LIKELIHOOD, v)?;
        }
        if let Some(v) = record.overall_severity {
            check_scale(row, columns::OVERALL_SEVERITY, v)?;
        }
        if let Some(links) = &record.link_scores {
            for (stem, rating) in super::LinkScores::STEMS.iter().zip(links.in_order()) {
                check_scale(row, &format!("{stem}_Likelihood"), rating.likelihood)?;
                check_scale(row, &format!("{stem}_Severity"), rating.severity)?;
            }
        }
    }
    Ok(())
}

fn check_scale(row: usize, column: &str, value: u8) -> Result<(), DataValidationError> {
    if (1..=5).contains(&value) {
        Ok(())
    } else {
        Err(DataValidationError::InvalidField {
            row,
            column: column.to_string(),
            value: value.to_string(),
        })
    }
}

/// Fill in `overall_likelihood`, `overall_severity` and `risk_level` where
/// absent. Per-link ratings drive the overall values when present; otherwise
/// they copy the record's own likelihood/severity. Values already present
/// are left alone.
pub fn add_default_columns(mut records: Vec<BowtieRecord>, cfg: &RiskConfig) -> Vec<BowtieRecord> {
    for record in &mut records {
        if record.overall_likelihood.is_none() {
            record.overall_likelihood = Some(match &record.link_scores {
                Some(links) => overall_likelihood(links, cfg),
                None => record.likelihood,
            });
        }
        if record.overall_severity.is_none() {
            record.overall_severity = Some(match &record.link_scores {
                Some(links) => overall_severity(links),
                None => record.severity,
            });
        }
        if record.risk_level.is_none() {
            record.risk_level = Some(RiskLevel::from_pair(
                record.effective_likelihood(),
                record.effective_severity(),
                cfg,
            ));
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bowtie::{LinkRating, LinkScores, Term};

    fn shipping() -> BowtieRecord {
        BowtieRecord::new("Shipping", "Oil spill", "Marine pollution", "Fish kill", 4, 4)
    }

    #[test]
    fn high_risk_record_validates_and_derives_high() {
        let records = vec![shipping()];
        validate(&records).unwrap();
        let records = add_default_columns(records, &RiskConfig::default());
        assert_eq!(records[0].risk_score(), 16);
        assert_eq!(records[0].risk_level, Some(RiskLevel::High));
        assert_eq!(records[0].overall_likelihood, Some(4));
        assert_eq!(records[0].overall_severity, Some(4));
    }

    #[test]
    fn stale_column_name_is_reported_missing() {
        let headers = ["Activity", "Pressure", "Problem", "Consequence"];
        let err = validate_columns(&headers).unwrap_err();
        assert_eq!(
            err,
            DataValidationError::MissingColumns(vec!["Central_Problem".to_string()])
        );
    }

    #[test]
    fn blank_required_field_names_the_column() {
        let mut record = shipping();
        record.consequence = Term::standard("   ");
        let err = validate(&[record]).unwrap_err();
        assert_eq!(
            err,
            DataValidationError::MissingField {
                row: 1,
                column: "Consequence"
            }
        );
    }

    #[test]
    fn out_of_scale_likelihood_is_invalid() {
        let mut record = shipping();
        record.likelihood = 7;
        assert!(matches!(
            validate(&[record]),
            Err(DataValidationError::InvalidField { row: 1, .. })
        ));
        assert_eq!(validate(&[]), Err(DataValidationError::EmptyRecordSet));
    }

    #[test]
    fn per_link_ratings_drive_overall_values() {
        let mut links = LinkScores::uniform(LinkRating::new(5, 2));
        links.mitigation_consequence.severity = 5;
        let record = shipping().with_link_scores(links);
        let records = add_default_columns(vec![record], &RiskConfig::default());
        assert_eq!(records[0].overall_likelihood, Some(4));
        assert_eq!(records[0].overall_severity, Some(5));
        assert_eq!(records[0].risk_level, Some(RiskLevel::High));
    }

    #[test]
    fn existing_derived_values_are_kept() {
        let mut record = shipping();
        record.risk_level = Some(RiskLevel::Low);
        let records = add_default_columns(vec![record], &RiskConfig::default());
        assert_eq!(records[0].risk_level, Some(RiskLevel::Low));
    }
}
