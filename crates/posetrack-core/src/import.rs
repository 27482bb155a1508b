use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::{ImportError, ValidationError, WriteError};
use crate::metadata::SidecarLocator;
use crate::schema::Schema;
use crate::table::{ProjectTable, VideoRecord};
use crate::value::FieldValue;
use crate::writer::write_metadata;

#[derive(Debug)]
pub enum SkipReason {
    NoSuchVideo,
    /// Row has a different number of cells than the header.
    Malformed { expected: usize, found: usize },
    Invalid(ValidationError),
    WriteFailed(String),
}

#[derive(Debug)]
pub struct SkippedRow {
    /// 1-based data row number, not counting the header.
    pub row: usize,
    pub key: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub updated: Vec<VideoRecord>,
    pub skipped: Vec<SkippedRow>,
}

impl ImportReport {
    pub fn written(&self) -> impl Iterator<Item = &str> {
        self.updated.iter().map(|record| record.video_id.as_str())
    }
}

/// Generates one sidecar per spreadsheet row that names a video in `table`.
///
/// Rows are matched on `key_column` by video file name or base name. Each
/// generated sidecar replaces whatever sidecar the video had before. The
/// caller applies `ImportReport::updated` to its table.
///
/// The whole sheet is read before any sidecar is written, so an `Err` means
/// nothing on disk changed. Ragged rows are skipped, not fatal.
pub fn import_spreadsheet(
    csv_path: &Path,
    key_column: &str,
    schema: &Schema,
    table: &ProjectTable,
    sidecars: &dyn SidecarLocator,
) -> Result<ImportReport, ImportError> {
    let csv_error = |source| ImportError::Csv {
        path: csv_path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(csv_path)
        .map_err(csv_error)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').to_string())
        .collect();
    let key_index = headers
        .iter()
        .position(|header| header == key_column)
        .ok_or_else(|| ImportError::MissingKeyColumn {
            path: csv_path.to_path_buf(),
            column: key_column.to_string(),
        })?;

    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_error)?;

    let mut report = ImportReport::default();
    for (idx, row) in rows.into_iter().enumerate() {
        let key = row.get(key_index).unwrap_or_default().to_string();

        if row.len() != headers.len() {
            report.skipped.push(SkippedRow {
                row: idx + 1,
                key,
                reason: SkipReason::Malformed {
                    expected: headers.len(),
                    found: row.len(),
                },
            });
            continue;
        }

        let Some(record) = find_video(table, &key) else {
            report.skipped.push(SkippedRow {
                row: idx + 1,
                key,
                reason: SkipReason::NoSuchVideo,
            });
            continue;
        };

        let mut metadata = schema.defaults();
        for (header, value) in headers.iter().zip(row.iter()) {
            metadata.insert(header.clone(), FieldValue::text(value));
        }

        // The sheet owns the whole sidecar, so its extra columns are not read-only here.
        let base = VideoRecord {
            metadata: metadata.clone(),
            ..record.clone()
        };
        let sidecar_path = sidecars.sidecar_path(&record.discovered());
        match write_metadata(&base, &metadata, schema, &sidecar_path) {
            Ok(updated) => report.updated.push(updated),
            Err(WriteError::Invalid(err)) => report.skipped.push(SkippedRow {
                row: idx + 1,
                key,
                reason: SkipReason::Invalid(err),
            }),
            Err(err) => {
                warn!(video_id = %record.video_id, error = %err, "Spreadsheet row not written");
                report.skipped.push(SkippedRow {
                    row: idx + 1,
                    key,
                    reason: SkipReason::WriteFailed(err.to_string()),
                });
            }
        }
    }

    info!(
        path = %csv_path.display(),
        written = report.updated.len(),
        skipped = report.skipped.len(),
        "Imported metadata spreadsheet"
    );
    Ok(report)
}

fn find_video<'a>(table: &'a ProjectTable, key: &str) -> Option<&'a VideoRecord> {
    if key.is_empty() {
        return None;
    }
    if let Some(record) = table.get(key) {
        return Some(record);
    }
    let key_path = PathBuf::from(key);
    let stem = key_path.file_stem()?.to_str()?;
    table
        .get(stem)
        .filter(|record| record.file_path.file_name() == key_path.file_name())
}
