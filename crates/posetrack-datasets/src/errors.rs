use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to write download: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("dataset '{name}' has an invalid hash '{value}'")]
    InvalidHash { name: String, value: String },

    #[error("dataset name '{0}' is not a relative path inside the cache")]
    InvalidName(String),

    #[error("dataset '{0}' is listed more than once")]
    DuplicateName(String),
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no dataset named '{name}'; available: {available:?}")]
    UnknownDataset { name: String, available: Vec<String> },

    #[error("no sample data for species '{species}'; available: {available:?}")]
    UnknownSpecies {
        species: String,
        available: Vec<String>,
    },

    #[error("no '{kind}' dataset for species '{species}'; available: {available:?}")]
    UnknownKind {
        species: String,
        kind: String,
        available: Vec<String>,
    },

    #[error("could not determine a home directory; set POSETRACK_DATA_DIR")]
    NoHomeDir,

    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("hash mismatch for '{name}': expected {expected}, got {actual}")]
    Integrity {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive {path} contains an entry outside its root: {entry}")]
    UnsafeArchiveEntry { path: PathBuf, entry: String },

    #[error("sample project config {0} not found")]
    MissingProjectConfig(PathBuf),

    #[error("failed to rewrite project config {path}: {source}")]
    ProjectConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| DatasetError::Io { path, source }
    }
}
