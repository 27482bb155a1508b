use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_yaml::{Mapping, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::errors::DatasetError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::registry::{sample_registry, CacheEntry, Registry};

pub const DATA_DIR_ENV: &str = "POSETRACK_DATA_DIR";
pub const SAMPLE_CONFIG_FILE: &str = "WAZP_config.yaml";

const EXTRACT_SUFFIX: &str = ".unzip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub root: PathBuf,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$POSETRACK_DATA_DIR` if set, otherwise `~/.posetrack/sample_data`.
    pub fn from_env() -> Result<Self, DatasetError> {
        if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(Self::new(dir));
        }
        let home = dirs::home_dir().ok_or(DatasetError::NoHomeDir)?;
        Ok(Self::new(home.join(".posetrack").join("sample_data")))
    }
}

/// Paths resolved during this process, keyed by entry name.
#[derive(Debug, Default)]
pub struct LocalCacheState {
    resolved: Mutex<HashMap<String, PathBuf>>,
}

impl LocalCacheState {
    /// Remembered path for `name`, if it is still on disk.
    pub fn get(&self, name: &str) -> Option<PathBuf> {
        let resolved = self.resolved.lock().unwrap_or_else(|err| err.into_inner());
        resolved.get(name).filter(|path| path.exists()).cloned()
    }

    fn insert(&self, name: &str, path: PathBuf) {
        let mut resolved = self.resolved.lock().unwrap_or_else(|err| err.into_inner());
        resolved.insert(name.to_string(), path);
    }
}

/// A sample project unpacked in the cache, with its config pointing at the local copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleProject {
    pub root: PathBuf,
    pub config_path: PathBuf,
}

/// Download-once cache for registry entries.
///
/// Archives live at `<root>/<entry name>` and zip archives are unpacked
/// next to them into `<archive>.unzip/`. Every resolution re-checks the
/// archive hash, so a corrupt file on disk is replaced rather than trusted.
pub struct DatasetCache {
    config: CacheConfig,
    registry: Registry,
    fetcher: Box<dyn Fetcher>,
    state: LocalCacheState,
}

impl DatasetCache {
    pub fn new(config: CacheConfig, registry: Registry, fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            config,
            registry,
            fetcher,
            state: LocalCacheState::default(),
        }
    }

    /// Sample-data registry over HTTP, rooted per `CacheConfig::from_env`.
    pub fn with_defaults() -> Result<Self, DatasetError> {
        let fetcher = HttpFetcher::new().map_err(|source| DatasetError::Download {
            url: sample_registry().base_url().to_string(),
            source,
        })?;
        Ok(Self::new(
            CacheConfig::from_env()?,
            sample_registry().clone(),
            Box::new(fetcher),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Local path of a verified entry: the extraction directory for zip
    /// archives, the file itself otherwise.
    pub fn fetch(&self, name: &str) -> Result<PathBuf, DatasetError> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| DatasetError::UnknownDataset {
                name: name.to_string(),
                available: self.registry.names(),
            })?;

        if let Some(path) = self.state.get(name) {
            debug!(name, path = %path.display(), "Dataset already resolved");
            return Ok(path);
        }

        let archive = self.config.root.join(&entry.name);
        let downloaded = self.ensure_archive(entry, &archive)?;
        let resolved = if entry.is_zip() {
            extract_zip(&archive, downloaded)?
        } else {
            archive
        };

        self.state.insert(name, resolved.clone());
        Ok(resolved)
    }

    /// Fetches `<species>/<kind>.zip` and rewrites its project config so every
    /// path in it points into the cache.
    pub fn sample_project(&self, species: &str, kind: &str) -> Result<SampleProject, DatasetError> {
        let mut catalog = self.registry.catalog();
        let kinds = catalog
            .remove(species)
            .ok_or_else(|| DatasetError::UnknownSpecies {
                species: species.to_string(),
                available: catalog.keys().cloned().collect(),
            })?;
        if !kinds.iter().any(|known| known == kind) {
            return Err(DatasetError::UnknownKind {
                species: species.to_string(),
                kind: kind.to_string(),
                available: kinds,
            });
        }

        let extracted = self.fetch(&format!("{species}/{kind}.zip"))?;
        let nested = extracted.join(kind);
        let root = if nested.is_dir() { nested } else { extracted };
        let root = absolute(&root)?;

        let config_path = root.join(SAMPLE_CONFIG_FILE);
        rewrite_project_config(&config_path, &root)?;
        info!(species, kind, root = %root.display(), "Sample project ready");
        Ok(SampleProject { root, config_path })
    }

    /// Returns `true` when the archive on disk was (re)downloaded by this call.
    fn ensure_archive(&self, entry: &CacheEntry, archive: &Path) -> Result<bool, DatasetError> {
        if archive.is_file() {
            let actual = entry
                .expected_hash
                .algorithm()
                .digest_file(archive)
                .map_err(DatasetError::io(archive))?;
            if entry.expected_hash.matches(&actual) {
                debug!(name = %entry.name, "Cached archive verified");
                return Ok(false);
            }
            warn!(
                name = %entry.name,
                expected = %entry.expected_hash,
                actual = %actual,
                "Cached archive failed verification; downloading again"
            );
            fs::remove_file(archive).map_err(DatasetError::io(archive))?;
        }
        self.download(entry, archive)?;
        Ok(true)
    }

    /// Downloads into a temporary file beside `archive` and moves it into
    /// place only once its hash matches.
    fn download(&self, entry: &CacheEntry, archive: &Path) -> Result<(), DatasetError> {
        let dir = archive.parent().unwrap_or(&self.config.root);
        fs::create_dir_all(dir).map_err(DatasetError::io(dir))?;

        let mut staged = NamedTempFile::new_in(dir).map_err(DatasetError::io(dir))?;
        info!(name = %entry.name, url = %entry.url, "Downloading dataset");
        let bytes = self
            .fetcher
            .fetch(&entry.url, staged.as_file_mut())
            .map_err(|source| DatasetError::Download {
                url: entry.url.clone(),
                source,
            })?;
        staged
            .as_file_mut()
            .flush()
            .map_err(DatasetError::io(staged.path()))?;

        let actual = entry
            .expected_hash
            .algorithm()
            .digest_file(staged.path())
            .map_err(DatasetError::io(staged.path()))?;
        if !entry.expected_hash.matches(&actual) {
            warn!(name = %entry.name, bytes, "Downloaded archive failed verification; discarding");
            return Err(DatasetError::Integrity {
                name: entry.name.clone(),
                expected: entry.expected_hash.to_string(),
                actual,
            });
        }

        staged
            .persist(archive)
            .map_err(|err| DatasetError::io(archive)(err.error))?;
        info!(name = %entry.name, bytes, "Dataset downloaded and verified");
        Ok(())
    }
}

fn extract_dir_for(archive: &Path) -> PathBuf {
    let mut name = OsString::from(archive.as_os_str());
    name.push(EXTRACT_SUFFIX);
    PathBuf::from(name)
}

/// Unpacks `archive` into its sibling extraction directory. An existing,
/// non-empty directory is reused unless the archive was just downloaded, in
/// which case it belongs to an older archive and is removed first. Entries
/// are staged in a temporary directory, so a failed extraction leaves no
/// partial directory behind.
fn extract_zip(archive: &Path, fresh: bool) -> Result<PathBuf, DatasetError> {
    let target = extract_dir_for(archive);
    if fresh && target.is_dir() {
        debug!(dir = %target.display(), "Removing extraction of a replaced archive");
        fs::remove_dir_all(&target).map_err(DatasetError::io(&target))?;
    } else if is_non_empty_dir(&target) {
        debug!(dir = %target.display(), "Archive already extracted");
        return Ok(target);
    }

    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)
        .map_err(DatasetError::io(parent))?;

    let zip_error = |source| DatasetError::Archive {
        path: archive.to_path_buf(),
        source,
    };
    let file = File::open(archive).map_err(DatasetError::io(archive))?;
    let mut zip = ZipArchive::new(file).map_err(zip_error)?;
    for index in 0..zip.len() {
        let mut member = zip.by_index(index).map_err(zip_error)?;
        let relative = member
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| DatasetError::UnsafeArchiveEntry {
                path: archive.to_path_buf(),
                entry: member.name().to_string(),
            })?;
        let out = staging.path().join(relative);

        if member.is_dir() {
            fs::create_dir_all(&out).map_err(DatasetError::io(&out))?;
            continue;
        }
        if let Some(dir) = out.parent() {
            fs::create_dir_all(dir).map_err(DatasetError::io(dir))?;
        }
        let mut dest = File::create(&out).map_err(DatasetError::io(&out))?;
        io::copy(&mut member, &mut dest).map_err(DatasetError::io(&out))?;
    }

    if target.is_dir() {
        fs::remove_dir_all(&target).map_err(DatasetError::io(&target))?;
    }
    let staged = staging.keep();
    fs::rename(&staged, &target).map_err(DatasetError::io(&target))?;
    info!(
        archive = %archive.display(),
        dir = %target.display(),
        entries = zip.len(),
        "Extracted archive"
    );
    Ok(target)
}

fn is_non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn absolute(path: &Path) -> Result<PathBuf, DatasetError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().map_err(DatasetError::io(path))?;
    Ok(cwd.join(path))
}

const PROJECT_PATH_KEYS: [(&str, &str); 4] = [
    ("videos_dir_path", "videos"),
    ("pose_estimation_results_path", "pose_estimation_results"),
    ("metadata_fields_file_path", "metadata_fields.yaml"),
    ("dashboard_export_data_path", "wazp_output"),
];

/// Points the path keys of a sample project config at `root`, keeping every
/// other key and the original key order.
pub fn rewrite_project_config(config_path: &Path, root: &Path) -> Result<(), DatasetError> {
    if !config_path.is_file() {
        return Err(DatasetError::MissingProjectConfig(config_path.to_path_buf()));
    }
    let yaml_error = |source| DatasetError::ProjectConfig {
        path: config_path.to_path_buf(),
        source,
    };

    let text = fs::read_to_string(config_path).map_err(DatasetError::io(config_path))?;
    let mut config: Mapping = if text.trim().is_empty() {
        Mapping::new()
    } else {
        serde_yaml::from_str(&text).map_err(yaml_error)?
    };
    for (key, relative) in PROJECT_PATH_KEYS {
        let path = root.join(relative);
        config.insert(
            Value::from(key),
            Value::from(path.to_string_lossy().replace('\\', "/")),
        );
    }

    let rendered = serde_yaml::to_string(&config).map_err(yaml_error)?;
    let dir = config_path.parent().unwrap_or(root);
    let mut staged = NamedTempFile::new_in(dir).map_err(DatasetError::io(dir))?;
    staged
        .write_all(rendered.as_bytes())
        .map_err(DatasetError::io(config_path))?;
    staged
        .persist(config_path)
        .map_err(|err| DatasetError::io(config_path)(err.error))?;
    debug!(path = %config_path.display(), "Rewrote sample project config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_dir_sits_beside_the_archive() {
        assert_eq!(
            extract_dir_for(Path::new("/cache/jewel-wasp/short-clips_raw.zip")),
            PathBuf::from("/cache/jewel-wasp/short-clips_raw.zip.unzip")
        );
    }

    #[test]
    fn rewrite_keeps_other_keys_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(SAMPLE_CONFIG_FILE);
        fs::write(
            &config,
            "videos_dir_path: /home/someone/videos\nmodel_str: DLC_resnet50\nmetadata_key_field_str: File\n",
        )
        .unwrap();

        rewrite_project_config(&config, dir.path()).unwrap();

        let rewritten: Mapping = serde_yaml::from_str(&fs::read_to_string(&config).unwrap()).unwrap();
        let keys: Vec<&str> = rewritten.keys().filter_map(Value::as_str).collect();
        assert_eq!(
            keys,
            [
                "videos_dir_path",
                "model_str",
                "metadata_key_field_str",
                "pose_estimation_results_path",
                "metadata_fields_file_path",
                "dashboard_export_data_path"
            ]
        );
        let videos = rewritten.get("videos_dir_path").and_then(Value::as_str).unwrap();
        assert_eq!(
            Path::new(videos),
            dir.path().join("videos").as_path()
        );
        assert_eq!(
            rewritten.get("model_str").and_then(Value::as_str),
            Some("DLC_resnet50")
        );
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = rewrite_project_config(&dir.path().join(SAMPLE_CONFIG_FILE), dir.path()).unwrap_err();
        assert!(matches!(err, DatasetError::MissingProjectConfig(_)));
    }

    #[test]
    fn state_returns_only_known_names() {
        let state = LocalCacheState::default();
        let dir = tempfile::tempdir().unwrap();
        state.insert("a", dir.path().to_path_buf());
        assert_eq!(state.get("a"), Some(dir.path().to_path_buf()));
        assert_eq!(state.get("b"), None);
    }
}
