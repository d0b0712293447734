// src/error.rs
use thiserror::Error;

use crate::classify::Category;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input is missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Row {row}: column '{column}' has unparseable value '{value}'")]
    DataType {
        row: usize,
        column: String,
        value: String,
    },

    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("CSV processing error")]
    Csv(#[from] csv::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("Invalid identifier pattern")]
    Pattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rendering failed for {employee_id}: {message}")]
    Render {
        employee_id: String,
        message: String,
    },
}

/// Attaches a human readable context to an I/O error.
pub fn io_context(source: std::io::Error, context: impl Into<String>) -> PipelineError {
    PipelineError::Io {
        source,
        context: context.into(),
    }
}

/// Non-fatal conditions surfaced in the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunWarning {
    /// No employee fell into the category; reporting for it was skipped.
    EmptyPopulation { category: Category },
    /// The output area did not exist yet; treated as an empty cache.
    CacheUnavailable { category: Category, path: String },
}

impl std::fmt::Display for RunWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunWarning::EmptyPopulation { category } => {
                write!(f, "no employees classified as {}; reporting skipped", category)
            }
            RunWarning::CacheUnavailable { category, path } => write!(
                f,
                "output area {} for {} not found; treating completion cache as empty",
                path, category
            ),
        }
    }
}
