use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::schema::FieldKind;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("schema field '{field}' has no 'type'")]
    MissingType { field: String },

    #[error("schema field '{field}' has unsupported type '{kind}'")]
    UnknownType { field: String, kind: String },

    #[error("schema field '{field}' is declared more than once")]
    DuplicateField { field: String },

    #[error("schema field '{field}' lists allowed_values but is of type {kind}")]
    AllowedValuesOnNonEnum { field: String, kind: FieldKind },

    #[error("enumerated schema field '{field}' has no allowed_values")]
    EnumWithoutValues { field: String },

    #[error("schema field '{field}' has an invalid default: {problem}")]
    InvalidDefault { field: String, problem: FieldProblem },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("video directory {0} does not exist")]
    NotFound(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("video directory {path} is not readable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read project config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse project config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("model identifier cannot be empty")]
    EmptyModelId,

    #[error("model identifier '{0}' is configured twice")]
    DuplicateModelId(String),

    #[error("model identifiers '{shorter}' and '{longer}' overlap; pose results would match ambiguously")]
    OverlappingModelIds { shorter: String, longer: String },

    #[error("video extension list is empty")]
    NoVideoExtensions,
}

#[derive(Debug, Error)]
pub enum ProjectLoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Why a single field value was rejected or flagged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldProblem {
    #[error("field is missing")]
    Missing,

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: FieldKind,
        found: &'static str,
    },

    #[error("'{value}' is not one of {allowed:?}")]
    NotAllowed { value: String, allowed: Vec<String> },

    #[error("field is not part of the schema and cannot be changed here")]
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub problem: FieldProblem,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, problem: FieldProblem) -> Self {
        Self {
            field: field.into(),
            problem,
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// Write-time rejection listing every offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub video_id: String,
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().map(|issue| issue.field.as_str())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metadata for '{}' failed validation", self.video_id)?;
        for (idx, issue) in self.issues.iter().enumerate() {
            f.write_str(if idx == 0 { ": " } else { "; " })?;
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to serialize metadata for '{video_id}': {source}")]
    Serialize {
        video_id: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write sidecar {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read spreadsheet {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("spreadsheet {path} has no '{column}' column")]
    MissingKeyColumn { path: PathBuf, column: String },
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("no video '{0}' in this project")]
    UnknownVideo(String),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl EditError {
    /// Fields rejected by validation; empty for any other failure.
    pub fn invalid_fields(&self) -> Vec<&str> {
        match self {
            EditError::Write(WriteError::Invalid(err)) => err.fields().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("project config has no dashboard_export_data_path")]
    NoExportDir,

    #[error("failed to encode project table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write export {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
