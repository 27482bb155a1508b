use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::discovery::VideoExtensions;
use crate::errors::ConfigError;
use crate::metadata::SidecarConvention;
use crate::pose::{ModelIds, PoseResultConvention};
use crate::table::TableSources;

pub const DEFAULT_KEY_FIELD: &str = "File";

#[derive(Debug, Deserialize)]
struct RawProjectConfig {
    videos_dir_path: PathBuf,
    metadata_fields_file_path: PathBuf,
    pose_estimation_results_path: Option<PathBuf>,
    dashboard_export_data_path: Option<PathBuf>,
    model_str: Option<String>,
    #[serde(default)]
    pose_models: Vec<String>,
    metadata_key_field_str: Option<String>,
    video_extensions: Option<Vec<String>>,
    sidecar_suffix: Option<String>,
    pose_result_extension: Option<String>,
    #[serde(flatten)]
    extra: IndexMap<String, Value>,
}

/// A project's configuration file, with every path resolved against the
/// directory the file lives in.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub path: PathBuf,
    pub videos_dir: PathBuf,
    pub schema_path: PathBuf,
    pub pose_results_dir: PathBuf,
    pub export_dir: Option<PathBuf>,
    pub models: ModelIds,
    pub key_field: String,
    pub video_extensions: VideoExtensions,
    pub sidecars: SidecarConvention,
    pub pose_convention: PoseResultConvention,
    /// Keys this crate does not interpret.
    pub extra: IndexMap<String, Value>,
}

impl ProjectConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses config YAML as if it had been read from `path`.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawProjectConfig =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let resolve = |p: &Path| base.join(p);

        let model_ids = raw
            .model_str
            .into_iter()
            .filter(|model| !model.is_empty())
            .chain(raw.pose_models);
        let video_extensions = match raw.video_extensions {
            Some(extensions) => VideoExtensions::new(extensions)?,
            None => VideoExtensions::default(),
        };
        let videos_dir = resolve(&raw.videos_dir_path);

        Ok(Self {
            path: path.to_path_buf(),
            schema_path: resolve(&raw.metadata_fields_file_path),
            pose_results_dir: raw
                .pose_estimation_results_path
                .as_deref()
                .map(resolve)
                .unwrap_or_else(|| videos_dir.clone()),
            export_dir: raw.dashboard_export_data_path.as_deref().map(resolve),
            videos_dir,
            models: ModelIds::new(model_ids)?,
            key_field: raw
                .metadata_key_field_str
                .unwrap_or_else(|| DEFAULT_KEY_FIELD.to_string()),
            video_extensions,
            sidecars: raw
                .sidecar_suffix
                .map(SidecarConvention::new)
                .unwrap_or_default(),
            pose_convention: raw
                .pose_result_extension
                .map(PoseResultConvention::new)
                .unwrap_or_default(),
            extra: raw.extra,
        })
    }

    pub fn pose_models(&self) -> &ModelIds {
        &self.models
    }

    pub fn table_sources(&self) -> TableSources {
        TableSources {
            videos_dir: self.videos_dir.clone(),
            pose_results_dir: self.pose_results_dir.clone(),
            video_extensions: self.video_extensions.clone(),
            models: self.models.clone(),
            pose_convention: self.pose_convention.clone(),
        }
    }
}
