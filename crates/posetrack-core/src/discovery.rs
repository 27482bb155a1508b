use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{ConfigError, DiscoveryError};

pub const DEFAULT_VIDEO_EXTENSIONS: [&str; 2] = ["avi", "mp4"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredVideo {
    pub video_id: String,
    pub file_path: PathBuf,
}

impl DiscoveredVideo {
    pub fn file_name(&self) -> Option<&str> {
        self.file_path.file_name().and_then(|name| name.to_str())
    }
}

/// Recognized video suffixes, stored lowercase without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoExtensions(BTreeSet<String>);

impl VideoExtensions {
    pub fn new<I, S>(extensions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if set.is_empty() {
            return Err(ConfigError::NoVideoExtensions);
        }
        Ok(Self(set))
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.0.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for VideoExtensions {
    fn default() -> Self {
        Self(DEFAULT_VIDEO_EXTENSIONS.iter().map(|ext| ext.to_string()).collect())
    }
}

/// Lists the videos directly inside `dir`, sorted by id. Subdirectories are
/// never descended into. When two files share a base name the first by file
/// name is kept.
pub fn discover_videos(
    dir: &Path,
    extensions: &VideoExtensions,
) -> Result<Vec<DiscoveredVideo>, DiscoveryError> {
    let metadata = fs::metadata(dir).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => DiscoveryError::NotFound(dir.to_path_buf()),
        _ => DiscoveryError::Unreadable {
            path: dir.to_path_buf(),
            source,
        },
    })?;
    if !metadata.is_dir() {
        return Err(DiscoveryError::NotADirectory(dir.to_path_buf()));
    }

    let unreadable = |source| DiscoveryError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        if !extensions.matches(&path) {
            continue;
        }
        // Follows symlinks: linked videos count, dangling links and directories do not.
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            warn!(path = %path.display(), "Skipping video with a non UTF-8 name");
            continue;
        };
        candidates.push(DiscoveredVideo {
            video_id: stem.to_string(),
            file_path: path.clone(),
        });
    }

    candidates.sort_by(|a, b| {
        a.video_id
            .cmp(&b.video_id)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });

    let mut videos: Vec<DiscoveredVideo> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if let Some(kept) = videos.last().filter(|kept| kept.video_id == candidate.video_id) {
            warn!(
                video_id = %candidate.video_id,
                kept = %kept.file_path.display(),
                skipped = %candidate.file_path.display(),
                "Duplicate video base name"
            );
            continue;
        }
        videos.push(candidate);
    }

    debug!(dir = %dir.display(), count = videos.len(), "Discovered videos");
    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").expect("write file");
    }

    #[test]
    fn lists_supported_videos_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "B.avi");
        touch(dir.path(), "A.MP4");
        touch(dir.path(), "A.metadata.yaml");
        touch(dir.path(), "notes.txt");
        fs::create_dir(dir.path().join("nested.avi")).unwrap();

        let videos = discover_videos(dir.path(), &VideoExtensions::default()).unwrap();
        let ids: Vec<&str> = videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, ["A", "B"]);
        assert_eq!(videos[0].file_name(), Some("A.MP4"));
    }

    #[test]
    fn duplicate_base_names_keep_the_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "A.mp4");
        touch(dir.path(), "A.avi");

        let videos = discover_videos(dir.path(), &VideoExtensions::default()).unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].file_name(), Some("A.avi"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("videos");
        let err = discover_videos(&missing, &VideoExtensions::default()).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound(path) if path == missing));

        touch(dir.path(), "file.avi");
        let err = discover_videos(&dir.path().join("file.avi"), &VideoExtensions::default())
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NotADirectory(_)));
    }

    #[test]
    fn extensions_are_normalized() {
        let exts = VideoExtensions::new([".AVI", "mov"]).unwrap();
        assert_eq!(exts.iter().collect::<Vec<_>>(), ["avi", "mov"]);
        assert!(exts.matches(Path::new("clip.Mov")));
        assert!(VideoExtensions::new(Vec::<String>::new()).is_err());
    }
}
