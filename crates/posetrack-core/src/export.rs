use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::errors::ExportError;
use crate::table::ProjectTable;
use crate::writer::write_atomically;

#[derive(Debug, Serialize)]
struct TableExport<'a> {
    exported_at: DateTime<Utc>,
    video_count: usize,
    rows: &'a ProjectTable,
}

/// Writes the table as JSON into `dir` (created if needed) and returns the file path.
pub fn export_table(table: &ProjectTable, dir: &Path) -> Result<PathBuf, ExportError> {
    export_table_at(table, dir, Utc::now())
}

fn export_table_at(
    table: &ProjectTable,
    dir: &Path,
    exported_at: DateTime<Utc>,
) -> Result<PathBuf, ExportError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ExportError::Io { path, source }
    };

    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(format!(
        "project_table_{}.json",
        exported_at.format("%Y%m%dT%H%M%SZ")
    ));

    let payload = TableExport {
        exported_at,
        video_count: table.len(),
        rows: table,
    };
    let json = serde_json::to_vec_pretty(&payload)?;
    write_atomically(&path, &json).map_err(io_error(&path))?;

    info!(path = %path.display(), videos = table.len(), "Exported project table");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn writes_timestamped_json() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let when = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();

        let path = export_table_at(&ProjectTable::default(), &out, when).unwrap();
        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("project_table_20240305T143000Z.json")
        );

        let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["video_count"], 0);
        assert_eq!(json["rows"], serde_json::json!([]));
    }
}
