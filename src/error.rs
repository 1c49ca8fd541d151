//! Error taxonomy shared by the loaders, the engines and the sweep.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A weight/topology record (line or JSON entry) that cannot be used.
    #[error("malformed record {record} in {source_name}: {reason}")]
    MalformedRecord {
        source_name: String,
        record: usize,
        reason: String,
    },

    #[error("taxon mismatch: {0}")]
    TaxonMismatch(String),

    #[error("sample '{0}' contains no trees")]
    EmptySample(String),

    #[error("degenerate weights in '{source_name}': {reason}")]
    DegenerateWeight { source_name: String, reason: String },

    #[error("no split reaches min_support={min_support}")]
    NoQualifyingSplits { min_support: f64 },

    #[error("external tool '{tool}' failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    #[error("tree structure error: {0}")]
    Tree(#[from] phylotree::tree::TreeError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(source_name: &str, record: usize, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            source_name: source_name.to_string(),
            record,
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(source_name: &str, reason: impl Into<String>) -> Self {
        Error::DegenerateWeight {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn external(tool: &str, reason: impl Into<String>) -> Self {
        Error::ExternalTool {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the only failure mode the sweep recovers from.
    pub fn is_external_tool(&self) -> bool {
        matches!(self, Error::ExternalTool { .. })
    }
}
