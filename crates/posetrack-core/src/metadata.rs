use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::discovery::DiscoveredVideo;
use crate::errors::FieldProblem;
use crate::schema::Schema;
use crate::value::{FieldValue, Metadata};

pub const DEFAULT_SIDECAR_SUFFIX: &str = ".metadata.yaml";

/// Resolves where a video's metadata sidecar lives.
pub trait SidecarLocator {
    fn sidecar_path(&self, video: &DiscoveredVideo) -> PathBuf;
}

impl<F> SidecarLocator for F
where
    F: Fn(&DiscoveredVideo) -> PathBuf,
{
    fn sidecar_path(&self, video: &DiscoveredVideo) -> PathBuf {
        self(video)
    }
}

/// Sidecar next to the video: `<video_id><suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarConvention {
    suffix: String,
}

impl SidecarConvention {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl Default for SidecarConvention {
    fn default() -> Self {
        Self::new(DEFAULT_SIDECAR_SUFFIX)
    }
}

impl SidecarLocator for SidecarConvention {
    fn sidecar_path(&self, video: &DiscoveredVideo) -> PathBuf {
        video
            .file_path
            .with_file_name(format!("{}{}", video.video_id, self.suffix))
    }
}

/// Non-fatal problem found while reading one video's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataWarning {
    /// The sidecar exists but could not be read or parsed; defaults were used.
    SidecarUnreadable { path: PathBuf, message: String },
    /// The sidecar has no value for this field; the default was used.
    MissingField { field: String },
    /// The value had the wrong type; the default was used.
    Defaulted { field: String, problem: String },
    /// The value is outside the allowed set; it was kept as is.
    NotAllowed { field: String, value: String },
}

impl MetadataWarning {
    pub fn field(&self) -> Option<&str> {
        match self {
            MetadataWarning::SidecarUnreadable { .. } => None,
            MetadataWarning::MissingField { field }
            | MetadataWarning::Defaulted { field, .. }
            | MetadataWarning::NotAllowed { field, .. } => Some(field),
        }
    }
}

impl fmt::Display for MetadataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataWarning::SidecarUnreadable { path, message } => {
                write!(f, "sidecar {} is unreadable: {message}", path.display())
            }
            MetadataWarning::MissingField { field } => write!(f, "{field}: missing, using default"),
            MetadataWarning::Defaulted { field, problem } => {
                write!(f, "{field}: {problem}, using default")
            }
            MetadataWarning::NotAllowed { field, value } => {
                write!(f, "{field}: '{value}' is not an allowed value")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledMetadata {
    pub metadata: Metadata,
    pub has_metadata_file: bool,
    pub warnings: Vec<MetadataWarning>,
}

/// Reads one video's sidecar and lines it up with the schema. Never fails:
/// an absent or malformed sidecar yields schema defaults.
pub fn reconcile_metadata(
    video: &DiscoveredVideo,
    schema: &Schema,
    locator: &dyn SidecarLocator,
) -> ReconciledMetadata {
    let path = locator.sidecar_path(video);
    if !path.is_file() {
        return ReconciledMetadata {
            metadata: schema.defaults(),
            has_metadata_file: false,
            warnings: Vec::new(),
        };
    }

    match read_sidecar(&path) {
        Ok(sidecar) => {
            let (metadata, warnings) = apply_schema(schema, sidecar);
            if !warnings.is_empty() {
                debug!(
                    video_id = %video.video_id,
                    warnings = warnings.len(),
                    "Sidecar reconciled with warnings"
                );
            }
            ReconciledMetadata {
                metadata,
                has_metadata_file: true,
                warnings,
            }
        }
        Err(message) => {
            warn!(
                video_id = %video.video_id,
                path = %path.display(),
                error = %message,
                "Malformed metadata sidecar; using defaults"
            );
            ReconciledMetadata {
                metadata: schema.defaults(),
                has_metadata_file: false,
                warnings: vec![MetadataWarning::SidecarUnreadable { path, message }],
            }
        }
    }
}

/// Parses a sidecar document into an ordered key/value mapping.
pub fn read_sidecar(path: &Path) -> Result<Metadata, String> {
    let text = fs::read_to_string(path).map_err(|err| err.to_string())?;
    parse_sidecar(&text)
}

pub fn parse_sidecar(text: &str) -> Result<Metadata, String> {
    if text.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let document: Value = serde_yaml::from_str(text).map_err(|err| err.to_string())?;
    let mapping = match document {
        Value::Null => return Ok(Metadata::new()),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(format!(
                "expected a mapping at the top level, found {}",
                FieldValue::from(other).kind_name()
            ))
        }
    };

    let mut metadata = Metadata::with_capacity(mapping.len());
    for (key, value) in mapping {
        let key = match key {
            Value::String(key) => key,
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            other => {
                return Err(format!(
                    "unsupported {} used as a key",
                    FieldValue::from(other).kind_name()
                ))
            }
        };
        metadata.insert(key, FieldValue::from(value));
    }
    Ok(metadata)
}

/// Schema fields in schema order, then every other sidecar key verbatim.
pub fn apply_schema(schema: &Schema, mut sidecar: Metadata) -> (Metadata, Vec<MetadataWarning>) {
    let mut metadata = Metadata::with_capacity(schema.len().max(sidecar.len()));
    let mut warnings = Vec::new();

    for field in schema.fields() {
        let value = match sidecar.shift_remove(&field.name) {
            None => {
                warnings.push(MetadataWarning::MissingField {
                    field: field.name.clone(),
                });
                field.default_value()
            }
            Some(raw) => match field.normalize(&raw) {
                Ok(normalized) => {
                    if let Err(FieldProblem::NotAllowed { value, .. }) =
                        field.check_allowed(&normalized)
                    {
                        warnings.push(MetadataWarning::NotAllowed {
                            field: field.name.clone(),
                            value,
                        });
                    }
                    normalized
                }
                Err(problem) => {
                    warnings.push(MetadataWarning::Defaulted {
                        field: field.name.clone(),
                        problem: problem.to_string(),
                    });
                    field.default_value()
                }
            },
        };
        metadata.insert(field.name.clone(), value);
    }

    metadata.extend(sidecar);
    (metadata, warnings)
}
