//! Crate-level error for callers that want a single type.

use crate::bayes::{BayesError, CompileError, CptError, InferenceError};
use crate::bowtie::{DataValidationError, TableError};
use crate::config::ConfigError;
use crate::vocabulary::VocabularyError;
use crate::workflow::WorkflowError;

#[derive(Debug, thiserror::Error)]
pub enum BowtieError {
    #[error(transparent)]
    Data(#[from] DataValidationError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Cpt(#[from] CptError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Bayes(#[from] BayesError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = BowtieError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bowtie::{records_from_csv_str, validate, BowtieRecord};

    fn load(raw: &str) -> Result<Vec<BowtieRecord>> {
        let records = records_from_csv_str(raw)?;
        validate(&records)?;
        Ok(records)
    }

    #[test]
    fn component_errors_convert() {
        let err = load("Activity,Pressure\n").unwrap_err();
        assert!(matches!(err, BowtieError::Table(TableError::Validation(_))));
        let err = load("Activity,Pressure,Central_Problem,Consequence\n").unwrap_err();
        assert!(matches!(err, BowtieError::Data(DataValidationError::EmptyRecordSet)));
    }
}
