use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::errors::{FieldIssue, FieldProblem, ValidationError, WriteError};
use crate::schema::Schema;
use crate::table::VideoRecord;
use crate::value::Metadata;

/// Checks an edited mapping against the schema and returns what would be
/// written. Keys outside the schema must match `passthrough` exactly.
pub fn validate_metadata(
    video_id: &str,
    edited: &Metadata,
    schema: &Schema,
    passthrough: &Metadata,
) -> Result<Metadata, ValidationError> {
    let mut issues = Vec::new();
    let mut normalized = Metadata::with_capacity(schema.len());

    for field in schema.fields() {
        match edited.get(&field.name) {
            None => issues.push(FieldIssue::new(&field.name, FieldProblem::Missing)),
            Some(value) => match field.validate(value) {
                Ok(value) => {
                    normalized.insert(field.name.clone(), value);
                }
                Err(problem) => issues.push(FieldIssue::new(&field.name, problem)),
            },
        }
    }

    for (key, value) in edited {
        if !schema.contains(key) && passthrough.get(key) != Some(value) {
            issues.push(FieldIssue::new(key, FieldProblem::ReadOnly));
        }
    }

    if !issues.is_empty() {
        return Err(ValidationError {
            video_id: video_id.to_string(),
            issues,
        });
    }

    // Keep the row's existing key order; schema fields the row somehow lacks go last.
    let mut output = Metadata::with_capacity(passthrough.len().max(normalized.len()));
    for (key, value) in passthrough {
        let value = normalized.shift_remove(key).unwrap_or_else(|| value.clone());
        output.insert(key.clone(), value);
    }
    output.extend(normalized);
    Ok(output)
}

/// Validates `edited` and atomically replaces the sidecar at `sidecar_path`.
/// Nothing is written when validation fails. The returned record is what the
/// caller should apply to its in-memory table.
pub fn write_metadata(
    record: &VideoRecord,
    edited: &Metadata,
    schema: &Schema,
    sidecar_path: &Path,
) -> Result<VideoRecord, WriteError> {
    let metadata = validate_metadata(&record.video_id, edited, schema, &record.metadata)?;
    let yaml = serde_yaml::to_string(&metadata).map_err(|source| WriteError::Serialize {
        video_id: record.video_id.clone(),
        source,
    })?;

    write_atomically(sidecar_path, yaml.as_bytes()).map_err(|source| WriteError::Io {
        path: sidecar_path.to_path_buf(),
        source,
    })?;
    info!(
        video_id = %record.video_id,
        path = %sidecar_path.display(),
        "Wrote metadata sidecar"
    );

    Ok(VideoRecord {
        metadata,
        has_metadata_file: true,
        warnings: Vec::new(),
        ..record.clone()
    })
}

/// Writes to a temporary file beside `path`, then renames it over `path`, so
/// readers see either the old or the new contents.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
