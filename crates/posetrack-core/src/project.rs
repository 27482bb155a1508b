use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::ProjectConfig;
use crate::errors::{EditError, ExportError, ImportError, ProjectLoadError};
use crate::export::export_table;
use crate::import::{import_spreadsheet, ImportReport};
use crate::metadata::SidecarLocator;
use crate::schema::Schema;
use crate::table::{build_project_table, ProjectTable, VideoRecord};
use crate::value::Metadata;
use crate::writer::write_metadata;

/// An opened project: its config, schema and current table.
///
/// Every write goes through the schema, and the in-memory table is updated
/// only after the sidecar has been replaced on disk.
#[derive(Debug, Clone)]
pub struct Project {
    config: ProjectConfig,
    schema: Schema,
    table: ProjectTable,
}

impl Project {
    pub fn open(config_path: impl AsRef<Path>) -> Result<Self, ProjectLoadError> {
        let config = ProjectConfig::load(config_path)?;
        Self::from_config(config)
    }

    pub fn from_config(config: ProjectConfig) -> Result<Self, ProjectLoadError> {
        let schema = Schema::load(&config.schema_path)?;
        let table = build_project_table(&schema, &config.table_sources(), &config.sidecars)?;
        info!(
            config = %config.path.display(),
            fields = schema.len(),
            videos = table.len(),
            "Opened project"
        );
        Ok(Self {
            config,
            schema,
            table,
        })
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn table(&self) -> &ProjectTable {
        &self.table
    }

    pub fn sidecar_path(&self, video_id: &str) -> Option<PathBuf> {
        let record = self.table.get(video_id)?;
        Some(self.config.sidecars.sidecar_path(&record.discovered()))
    }

    /// Validates and writes `metadata` as the sidecar of `video_id`.
    pub fn edit(&mut self, video_id: &str, metadata: &Metadata) -> Result<&VideoRecord, EditError> {
        let record = self
            .table
            .get(video_id)
            .ok_or_else(|| EditError::UnknownVideo(video_id.to_string()))?;
        let sidecar_path = self.config.sidecars.sidecar_path(&record.discovered());
        let updated = write_metadata(record, metadata, &self.schema, &sidecar_path)?;
        self.table
            .apply(updated)
            .ok_or_else(|| EditError::UnknownVideo(video_id.to_string()))
    }

    /// Re-reads schema, videos, sidecars and pose results. On error the
    /// current state is kept.
    pub fn reload(&mut self) -> Result<(), ProjectLoadError> {
        let schema = Schema::load(&self.config.schema_path)?;
        let table = build_project_table(&schema, &self.config.table_sources(), &self.config.sidecars)?;
        self.schema = schema;
        self.table = table;
        Ok(())
    }

    pub fn import_spreadsheet(&mut self, csv_path: &Path) -> Result<ImportReport, ImportError> {
        let report = import_spreadsheet(
            csv_path,
            &self.config.key_field,
            &self.schema,
            &self.table,
            &self.config.sidecars,
        )?;
        for record in &report.updated {
            self.table.apply(record.clone());
        }
        Ok(report)
    }

    /// Writes the table into the configured export directory.
    pub fn export_table(&self) -> Result<PathBuf, ExportError> {
        let dir = self.config.export_dir.as_deref().ok_or(ExportError::NoExportDir)?;
        export_table(&self.table, dir)
    }
}
