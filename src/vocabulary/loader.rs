//! CSV loading for vocabulary tables.
//!
//! Files need `level`, `id` and `name` columns (any order, case-insensitive
//! headers); `parent_id` is optional. A missing or malformed file yields an
//! empty table from `load_vocabulary_dir`: running without a vocabulary is a
//! supported, degraded mode.

use std::io::Read;
use std::path::Path;

use tracing::warn;

use super::{Vocabulary, VocabularyEntry, VocabularyKind, VocabularyTable};

#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("{kind} vocabulary unavailable: {reason}")]
    Unavailable {
        kind: VocabularyKind,
        reason: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("vocabulary load timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("vocabulary reload cancelled")]
    Cancelled,
    #[error("vocabulary load task failed: {0}")]
    Join(String),
}

/// Parse one vocabulary table from CSV.
pub fn parse_table<R: Read>(
    reader: R,
    kind: VocabularyKind,
) -> Result<VocabularyTable, VocabularyError> {
    let mut input = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = input
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let (Some(level_idx), Some(id_idx), Some(name_idx)) =
        (position("level"), position("id"), position("name"))
    else {
        return Err(VocabularyError::Unavailable {
            kind,
            reason: "expected level, id and name columns".to_string(),
        });
    };
    let parent_idx = position("parent_id");

    let mut entries = Vec::new();
    for (row_no, row) in input.records().enumerate() {
        let row = row?;
        let id = row.get(id_idx).unwrap_or("").to_string();
        let name = row.get(name_idx).unwrap_or("").to_string();
        if id.is_empty() || name.is_empty() {
            tracing::debug!(kind = %kind, row = row_no + 1, "skipping row without id or name");
            continue;
        }
        let raw_level = row.get(level_idx).unwrap_or("");
        let level = raw_level
            .parse::<f64>()
            .ok()
            .filter(|l| l.is_finite() && *l >= 1.0)
            .map(|l| l as u32)
            .ok_or_else(|| VocabularyError::Unavailable {
                kind,
                reason: format!("row {}: invalid level {raw_level:?}", row_no + 1),
            })?;
        let parent_id = parent_idx
            .and_then(|idx| row.get(idx))
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        entries.push(VocabularyEntry {
            id,
            name,
            level,
            parent_id,
        });
    }
    Ok(VocabularyTable::new(entries))
}

pub fn load_table(
    path: impl AsRef<Path>,
    kind: VocabularyKind,
) -> Result<VocabularyTable, VocabularyError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(VocabularyError::Unavailable {
            kind,
            reason: format!("{} not found", path.display()),
        });
    }
    let file = std::fs::File::open(path)?;
    parse_table(file, kind)
}

/// Load all four tables from `dir` (`activities.csv` etc.). Tables that
/// fail to load are logged and left empty.
pub fn load_vocabulary_dir(dir: impl AsRef<Path>) -> Vocabulary {
    let dir = dir.as_ref();
    let mut vocabulary = Vocabulary::empty();
    for kind in VocabularyKind::ALL {
        let path = dir.join(kind.file_name());
        match load_table(&path, kind) {
            Ok(table) => *vocabulary.table_mut(kind) = table,
            Err(e) => warn!(
                kind = %kind,
                path = %path.display(),
                error = %e,
                "vocabulary table unavailable"
            ),
        }
    }
    vocabulary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive_and_reordered() {
        let raw = "Name,ID,Level\nPHYSICAL RESTRUCTURING,A,1\nDredging,A1,2\n";
        let table = parse_table(raw.as_bytes(), VocabularyKind::Activities).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("A1").unwrap().parent_id.as_deref(), Some("A"));
    }

    #[test]
    fn explicit_parent_column_wins() {
        let raw = "level,id,name,parent_id\n1,P,PRESSURES,\n1,Q,OTHER,\n2,P1,Noise,P\n";
        let table = parse_table(raw.as_bytes(), VocabularyKind::Pressures).unwrap();
        assert_eq!(table.get("P1").unwrap().parent_id.as_deref(), Some("P"));
    }

    #[test]
    fn missing_columns_mark_table_unavailable() {
        let raw = "id,name\nA,Dredging\n";
        assert!(matches!(
            parse_table(raw.as_bytes(), VocabularyKind::Activities),
            Err(VocabularyError::Unavailable { .. })
        ));
    }

    #[test]
    fn missing_directory_yields_empty_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let vocab = load_vocabulary_dir(dir.path().join("absent"));
        assert!(!vocab.is_available());
    }
}
