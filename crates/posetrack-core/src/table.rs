use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::discovery::{discover_videos, DiscoveredVideo, VideoExtensions};
use crate::errors::ProjectLoadError;
use crate::metadata::{reconcile_metadata, MetadataWarning, SidecarLocator};
use crate::pose::{match_pose_results, ModelIds, PoseResultConvention, PoseResults};
use crate::schema::Schema;
use crate::value::Metadata;

/// One row of the project table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub file_path: PathBuf,
    pub metadata: Metadata,
    pub pose_results: PoseResults,
    pub has_metadata_file: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<MetadataWarning>,
}

impl VideoRecord {
    pub fn discovered(&self) -> DiscoveredVideo {
        DiscoveredVideo {
            video_id: self.video_id.clone(),
            file_path: self.file_path.clone(),
        }
    }

    pub fn has_pose_results(&self) -> bool {
        !self.pose_results.is_empty()
    }
}

/// Row-per-video view of a project, ordered by `video_id`.
#[derive(Debug, Clone, Default)]
pub struct ProjectTable {
    rows: Vec<VideoRecord>,
    index: HashMap<String, usize>,
}

impl ProjectTable {
    pub fn from_records(records: Vec<VideoRecord>) -> Self {
        let mut table = Self::default();
        for record in records {
            match table.index.get(&record.video_id) {
                Some(&position) => table.rows[position] = record,
                None => {
                    table.index.insert(record.video_id.clone(), table.rows.len());
                    table.rows.push(record);
                }
            }
        }
        table
    }

    pub fn rows(&self) -> &[VideoRecord] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VideoRecord> {
        self.rows.iter()
    }

    pub fn get(&self, video_id: &str) -> Option<&VideoRecord> {
        self.index.get(video_id).map(|&position| &self.rows[position])
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.index.contains_key(video_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn videos_missing_metadata(&self) -> impl Iterator<Item = &VideoRecord> {
        self.rows.iter().filter(|row| !row.has_metadata_file)
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&str, &MetadataWarning)> {
        self.rows.iter().flat_map(|row| {
            row.warnings
                .iter()
                .map(move |warning| (row.video_id.as_str(), warning))
        })
    }

    /// Replaces the metadata of the row with the same `video_id`. The row's
    /// identity (id, file path) and pose results are left alone. Returns `None`
    /// when no such row exists, leaving the table unchanged.
    pub fn apply(&mut self, updated: VideoRecord) -> Option<&VideoRecord> {
        let position = *self.index.get(&updated.video_id)?;
        let row = &mut self.rows[position];
        row.metadata = updated.metadata;
        row.has_metadata_file = updated.has_metadata_file;
        row.warnings = updated.warnings;
        Some(row)
    }
}

impl<'a> IntoIterator for &'a ProjectTable {
    type Item = &'a VideoRecord;
    type IntoIter = std::slice::Iter<'a, VideoRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl Serialize for ProjectTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(&self.rows)
    }
}

/// Where a project's three per-video inputs live.
#[derive(Debug, Clone)]
pub struct TableSources {
    pub videos_dir: PathBuf,
    pub pose_results_dir: PathBuf,
    pub video_extensions: VideoExtensions,
    pub models: ModelIds,
    pub pose_convention: PoseResultConvention,
}

/// Builds the full table. Only an unusable video directory is fatal; every
/// per-video problem ends up as a warning on its row.
pub fn build_project_table(
    schema: &Schema,
    sources: &TableSources,
    sidecars: &dyn SidecarLocator,
) -> Result<ProjectTable, ProjectLoadError> {
    let videos = discover_videos(&sources.videos_dir, &sources.video_extensions)?;

    if !sources.models.is_empty() && !sources.pose_results_dir.is_dir() {
        warn!(
            dir = %sources.pose_results_dir.display(),
            "Pose results directory not found; no pose results will be listed"
        );
    }

    let mut records = Vec::with_capacity(videos.len());
    for video in videos {
        let reconciled = reconcile_metadata(&video, schema, sidecars);
        let pose_results = match_pose_results(
            &video.video_id,
            &sources.pose_results_dir,
            &sources.models,
            &sources.pose_convention,
        );
        records.push(VideoRecord {
            video_id: video.video_id,
            file_path: video.file_path,
            metadata: reconciled.metadata,
            pose_results,
            has_metadata_file: reconciled.has_metadata_file,
            warnings: reconciled.warnings,
        });
    }

    let table = ProjectTable::from_records(records);
    info!(
        videos = table.len(),
        missing_metadata = table.videos_missing_metadata().count(),
        with_pose_results = table.iter().filter(|row| row.has_pose_results()).count(),
        "Built project table"
    );
    Ok(table)
}
