//! CSV import/export for record sets.
//!
//! One row per record, canonical column names, lossless round trip. Custom
//! flags travel in the `Custom_Roles` column as a `;`-joined list of role
//! columns rather than as a suffix on the value.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use super::risk::RiskLevel;
use super::validate::{validate_columns, DataValidationError};
use super::{columns, BowtieRecord, LinkRating, LinkScores, Role, Term};

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Validation(#[from] DataValidationError),
}

/// Header row written by the exporter.
pub fn export_headers() -> Vec<String> {
    let mut headers: Vec<String> = Role::ALL.iter().map(|r| r.column().to_string()).collect();
    headers.extend(
        [
            columns::LIKELIHOOD,
            columns::SEVERITY,
            columns::RISK_LEVEL,
            columns::OVERALL_LIKELIHOOD,
            columns::OVERALL_SEVERITY,
        ]
        .iter()
        .map(|c| c.to_string()),
    );
    for stem in LinkScores::STEMS {
        headers.push(format!("{stem}_Likelihood"));
        headers.push(format!("{stem}_Severity"));
    }
    headers.push(columns::CUSTOM_ROLES.to_string());
    headers
}

fn record_to_row(record: &BowtieRecord) -> Vec<String> {
    let mut row: Vec<String> = Role::ALL
        .iter()
        .map(|r| record.term(*r).name.clone())
        .collect();
    row.push(record.likelihood.to_string());
    row.push(record.severity.to_string());
    row.push(
        record
            .risk_level
            .map(|l| l.as_str().to_string())
            .unwrap_or_default(),
    );
    row.push(opt_to_cell(record.overall_likelihood));
    row.push(opt_to_cell(record.overall_severity));
    match &record.link_scores {
        Some(links) => {
            for rating in links.in_order() {
                row.push(rating.likelihood.to_string());
                row.push(rating.severity.to_string());
            }
        }
        None => row.extend(std::iter::repeat(String::new()).take(10)),
    }
    row.push(
        record
            .custom_roles()
            .iter()
            .map(|r| r.column())
            .collect::<Vec<_>>()
            .join(";"),
    );
    row
}

fn opt_to_cell(value: Option<u8>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn write_records<W: Write>(writer: W, records: &[BowtieRecord]) -> Result<(), TableError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(export_headers())?;
    for record in records {
        out.write_record(record_to_row(record))?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_records_csv(
    path: impl AsRef<Path>,
    records: &[BowtieRecord],
) -> Result<(), TableError> {
    let file = std::fs::File::create(path)?;
    write_records(file, records)
}

pub fn records_to_csv_string(records: &[BowtieRecord]) -> Result<String, TableError> {
    let mut buf = Vec::new();
    write_records(&mut buf, records)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

struct ColumnIndex {
    by_name: HashMap<String, usize>,
}

impl ColumnIndex {
    fn cell<'r>(&self, row: &'r csv::StringRecord, column: &str) -> Option<&'r str> {
        self.by_name.get(column).and_then(|idx| row.get(*idx))
    }
}

pub fn read_records<R: Read>(reader: R) -> Result<Vec<BowtieRecord>, TableError> {
    let mut input = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = input.headers()?.iter().map(|h| h.trim().to_string()).collect();
    validate_columns(&headers)?;
    let index = ColumnIndex {
        by_name: headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect(),
    };
    for optional in [columns::LIKELIHOOD, columns::SEVERITY] {
        if !index.by_name.contains_key(optional) {
            debug!(column = optional, "column absent; defaulting to 3");
        }
    }

    let mut records = Vec::new();
    for (idx, row) in input.records().enumerate() {
        let row = row?;
        records.push(parse_row(&index, &row, idx + 1)?);
    }
    Ok(records)
}

pub fn read_records_csv(path: impl AsRef<Path>) -> Result<Vec<BowtieRecord>, TableError> {
    let file = std::fs::File::open(path)?;
    read_records(file)
}

pub fn records_from_csv_str(raw: &str) -> Result<Vec<BowtieRecord>, TableError> {
    read_records(raw.as_bytes())
}

fn parse_row(
    index: &ColumnIndex,
    row: &csv::StringRecord,
    row_no: usize,
) -> Result<BowtieRecord, DataValidationError> {
    let custom: Vec<Role> = index
        .cell(row, columns::CUSTOM_ROLES)
        .unwrap_or("")
        .split(';')
        .filter_map(|c| Role::from_column(c.trim()))
        .collect();
    let term = |role: Role| -> Term {
        let name = index.cell(row, role.column()).unwrap_or("");
        if custom.contains(&role) {
            Term::custom(name)
        } else {
            Term::standard(name)
        }
    };

    let likelihood = match index.cell(row, columns::LIKELIHOOD) {
        Some(raw) => parse_scale(raw, columns::LIKELIHOOD, row_no)?,
        None => 3,
    };
    let severity = match index.cell(row, columns::SEVERITY) {
        Some(raw) => parse_scale(raw, columns::SEVERITY, row_no)?,
        None => 3,
    };
    let risk_level = match index.cell(row, columns::RISK_LEVEL).map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(RiskLevel::parse(raw).ok_or_else(|| {
            DataValidationError::InvalidField {
                row: row_no,
                column: columns::RISK_LEVEL.to_string(),
                value: raw.to_string(),
            }
        })?),
    };
    let overall_likelihood = parse_optional_scale(
        index.cell(row, columns::OVERALL_LIKELIHOOD),
        columns::OVERALL_LIKELIHOOD,
        row_no,
    )?;
    let overall_severity = parse_optional_scale(
        index.cell(row, columns::OVERALL_SEVERITY),
        columns::OVERALL_SEVERITY,
        row_no,
    )?;

    Ok(BowtieRecord {
        activity: term(Role::Activity),
        pressure: term(Role::Pressure),
        preventive_control: term(Role::PreventiveControl),
        escalation_factor: term(Role::EscalationFactor),
        central_problem: term(Role::CentralProblem),
        protective_mitigation: term(Role::ProtectiveMitigation),
        consequence: term(Role::Consequence),
        likelihood,
        severity,
        risk_level,
        overall_likelihood,
        overall_severity,
        link_scores: parse_link_scores(index, row, row_no)?,
    })
}

/// All ten link columns blank (or absent) means no per-link ratings; a
/// partially filled set is an error naming the first blank column.
fn parse_link_scores(
    index: &ColumnIndex,
    row: &csv::StringRecord,
    row_no: usize,
) -> Result<Option<LinkScores>, DataValidationError> {
    let mut cells = Vec::with_capacity(10);
    for stem in LinkScores::STEMS {
        for suffix in ["Likelihood", "Severity"] {
            let column = format!("{stem}_{suffix}");
            let value = index.cell(row, &column).unwrap_or("").trim().to_string();
            cells.push((column, value));
        }
    }
    if cells.iter().all(|(_, v)| v.is_empty()) {
        return Ok(None);
    }
    let mut ratings = [LinkRating::new(1, 1); 5];
    for (i, rating) in ratings.iter_mut().enumerate() {
        let (l_col, l_val) = &cells[2 * i];
        let (s_col, s_val) = &cells[2 * i + 1];
        rating.likelihood = parse_scale(l_val, l_col, row_no)?;
        rating.severity = parse_scale(s_val, s_col, row_no)?;
    }
    Ok(Some(LinkScores::from_ordered(ratings)))
}

/// Accepts integers and integral floats ("4", "4.0") in 1..=5.
fn parse_scale(raw: &str, column: &str, row: usize) -> Result<u8, DataValidationError> {
    let trimmed = raw.trim();
    let invalid = || DataValidationError::InvalidField {
        row,
        column: column.to_string(),
        value: raw.to_string(),
    };
    let value: f64 = trimmed.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value.fract() != 0.0 || !(1.0..=5.0).contains(&value) {
        return Err(invalid());
    }
    Ok(value as u8)
}

fn parse_optional_scale(
    raw: Option<&str>,
    column: &str,
    row: usize,
) -> Result<Option<u8>, DataValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_scale(v, column, row).map(Some),
    }
}
