use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

pub const DEFAULT_POSE_EXTENSION: &str = ".h5";

/// Model identifier → result file, only for models that have a file.
pub type PoseResults = BTreeMap<String, PathBuf>;

/// Configured pose-estimation model identifiers.
///
/// Identifiers are appended to a video's base name to form the result file
/// name, so no identifier may contain another one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelIds(Vec<String>);

impl ModelIds {
    pub fn new<I, S>(ids: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        for (idx, id) in ids.iter().enumerate() {
            if id.is_empty() {
                return Err(ConfigError::EmptyModelId);
            }
            for other in &ids[idx + 1..] {
                if other == id {
                    return Err(ConfigError::DuplicateModelId(id.clone()));
                }
                let (shorter, longer) = if id.len() <= other.len() {
                    (id, other)
                } else {
                    (other, id)
                };
                if longer.contains(shorter.as_str()) {
                    return Err(ConfigError::OverlappingModelIds {
                        shorter: shorter.clone(),
                        longer: longer.clone(),
                    });
                }
            }
        }
        Ok(Self(ids))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// File name pattern for pose results: `<video_id><model_id><extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoseResultConvention {
    extension: String,
}

impl PoseResultConvention {
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = if extension.is_empty() || extension.starts_with('.') {
            extension
        } else {
            format!(".{extension}")
        };
        Self { extension }
    }

    pub fn file_name(&self, video_id: &str, model_id: &str) -> String {
        format!("{video_id}{model_id}{}", self.extension)
    }
}

impl Default for PoseResultConvention {
    fn default() -> Self {
        Self::new(DEFAULT_POSE_EXTENSION)
    }
}

pub fn match_pose_results(
    video_id: &str,
    results_dir: &Path,
    models: &ModelIds,
    convention: &PoseResultConvention,
) -> PoseResults {
    models
        .iter()
        .filter_map(|model| {
            let path = results_dir.join(convention.file_name(video_id, model));
            path.is_file().then(|| (model.to_string(), path))
        })
        .collect()
}
