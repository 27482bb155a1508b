use std::collections::VecDeque;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use posetrack_datasets::{
    CacheConfig, CacheEntry, ContentHash, DatasetCache, DatasetError, FetchError, Fetcher,
    HashAlgorithm, Registry,
};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const BASE_URL: &str = "https://data.example.org/raw";

/// Serves queued bodies in order and counts requests.
struct QueuedFetcher {
    bodies: Mutex<VecDeque<Vec<u8>>>,
    calls: Arc<AtomicUsize>,
}

impl QueuedFetcher {
    fn new(bodies: Vec<Vec<u8>>) -> (Box<dyn Fetcher>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Self {
            bodies: Mutex::new(bodies.into()),
            calls: Arc::clone(&calls),
        };
        (Box::new(fetcher), calls)
    }
}

impl Fetcher for QueuedFetcher {
    fn fetch(&self, _url: &str, dest: &mut dyn Write) -> Result<u64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self
            .bodies
            .lock()
            .expect("fetcher lock")
            .pop_front()
            .ok_or_else(|| FetchError::Other("no response queued".into()))?;
        dest.write_all(&body)?;
        Ok(body.len() as u64)
    }
}

fn zip_bytes(files: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in files {
        zip.start_file(*name, options)?;
        zip.write_all(contents.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

fn registry_for(name: &str, body: &[u8]) -> Result<Registry> {
    let hash = ContentHash::new(HashAlgorithm::Sha256, HashAlgorithm::Sha256.digest_bytes(body));
    let entry = CacheEntry::new(name, format!("{BASE_URL}/{name}"), hash)?;
    Ok(Registry::new(BASE_URL, vec![entry])?)
}

fn colony_zip() -> Result<Vec<u8>> {
    zip_bytes(&[
        ("colony/WAZP_config.yaml", "videos_dir_path: /elsewhere/videos\nmodel_str: DLC_ant\n"),
        ("colony/videos/A.avi", "frames"),
        ("colony/metadata_fields.yaml", "File:\n  type: string\n"),
    ])
}

#[test]
fn second_fetch_reuses_the_first_download() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = colony_zip()?;
    let (fetcher, calls) = QueuedFetcher::new(vec![archive.clone()]);
    let cache = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/colony.zip", &archive)?,
        fetcher,
    );

    let first = cache.fetch("ant/colony.zip")?;
    let second = cache.fetch("ant/colony.zip")?;
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, root.path().join("ant/colony.zip.unzip"));
    assert_eq!(fs::read_to_string(first.join("colony/videos/A.avi"))?, "frames");
    Ok(())
}

#[test]
fn verified_archive_on_disk_is_reused_by_a_new_cache() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = colony_zip()?;
    let registry = registry_for("ant/colony.zip", &archive)?;

    let (fetcher, _) = QueuedFetcher::new(vec![archive.clone()]);
    let path = DatasetCache::new(CacheConfig::new(root.path()), registry.clone(), fetcher)
        .fetch("ant/colony.zip")?;

    let (fetcher, calls) = QueuedFetcher::new(Vec::new());
    let again = DatasetCache::new(CacheConfig::new(root.path()), registry, fetcher)
        .fetch("ant/colony.zip")?;
    assert_eq!(again, path);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn corrupt_download_is_discarded_and_retried() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = colony_zip()?;
    let (fetcher, calls) = QueuedFetcher::new(vec![b"truncated".to_vec(), archive.clone()]);
    let cache = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/colony.zip", &archive)?,
        fetcher,
    );

    let err = cache.fetch("ant/colony.zip").unwrap_err();
    assert!(matches!(err, DatasetError::Integrity { ref name, .. } if name == "ant/colony.zip"));
    assert!(!root.path().join("ant/colony.zip").exists());
    assert_eq!(fs::read_dir(root.path().join("ant"))?.count(), 0);

    let path = cache.fetch("ant/colony.zip")?;
    assert!(path.join("colony/WAZP_config.yaml").is_file());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn stale_archive_on_disk_is_replaced() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = colony_zip()?;
    fs::create_dir_all(root.path().join("ant"))?;
    fs::write(root.path().join("ant/colony.zip"), b"left over from an old release")?;

    let (fetcher, calls) = QueuedFetcher::new(vec![archive.clone()]);
    let cache = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/colony.zip", &archive)?,
        fetcher,
    );
    cache.fetch("ant/colony.zip")?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read(root.path().join("ant/colony.zip"))?, archive);
    Ok(())
}

#[test]
fn replaced_archive_is_extracted_afresh() -> Result<()> {
    let root = tempfile::tempdir()?;
    let old = zip_bytes(&[("data.txt", "v1"), ("only-in-v1.txt", "gone")])?;
    let new = zip_bytes(&[("data.txt", "v2")])?;

    let (fetcher, _) = QueuedFetcher::new(vec![old.clone()]);
    let first = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/colony.zip", &old)?,
        fetcher,
    )
    .fetch("ant/colony.zip")?;
    assert_eq!(fs::read_to_string(first.join("data.txt"))?, "v1");

    let (fetcher, calls) = QueuedFetcher::new(vec![new.clone()]);
    let second = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/colony.zip", &new)?,
        fetcher,
    )
    .fetch("ant/colony.zip")?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(second, first);
    assert_eq!(fs::read_to_string(second.join("data.txt"))?, "v2");
    assert!(!second.join("only-in-v1.txt").exists());
    Ok(())
}

#[test]
fn unknown_dataset_lists_what_exists() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = colony_zip()?;
    let (fetcher, calls) = QueuedFetcher::new(Vec::new());
    let cache = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/colony.zip", &archive)?,
        fetcher,
    );

    let err = cache.fetch("bee/hive.zip").unwrap_err();
    assert!(
        matches!(err, DatasetError::UnknownDataset { ref available, .. } if available == &["ant/colony.zip"])
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn plain_files_resolve_to_themselves() -> Result<()> {
    let root = tempfile::tempdir()?;
    let body = b"species,count\nant,3\n".to_vec();
    let (fetcher, _) = QueuedFetcher::new(vec![body.clone()]);
    let cache = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/counts.csv", &body)?,
        fetcher,
    );

    let path = cache.fetch("ant/counts.csv")?;
    assert_eq!(path, root.path().join("ant/counts.csv"));
    assert_eq!(fs::read(&path)?, body);
    Ok(())
}

#[test]
fn archive_entries_escaping_the_root_are_rejected() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = zip_bytes(&[("../escaped.txt", "gotcha")])?;
    let (fetcher, _) = QueuedFetcher::new(vec![archive.clone()]);
    let cache = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/evil.zip", &archive)?,
        fetcher,
    );

    let err = cache.fetch("ant/evil.zip").unwrap_err();
    assert!(matches!(err, DatasetError::UnsafeArchiveEntry { .. }));
    assert!(!root.path().join("escaped.txt").exists());
    assert!(!root.path().join("ant/evil.zip.unzip").exists());
    Ok(())
}

#[test]
fn sample_project_points_its_config_at_the_cache() -> Result<()> {
    let root = tempfile::tempdir()?;
    let archive = colony_zip()?;
    let (fetcher, _) = QueuedFetcher::new(vec![archive.clone()]);
    let cache = DatasetCache::new(
        CacheConfig::new(root.path()),
        registry_for("ant/colony.zip", &archive)?,
        fetcher,
    );

    let project = cache.sample_project("ant", "colony")?;
    assert_eq!(project.root, root.path().join("ant/colony.zip.unzip/colony"));

    let config: serde_yaml::Mapping = serde_yaml::from_str(&fs::read_to_string(&project.config_path)?)?;
    let path_of = |key: &str| config.get(key).and_then(|value| value.as_str()).map(Path::new);
    assert_eq!(path_of("videos_dir_path"), Some(project.root.join("videos").as_path()));
    assert_eq!(
        path_of("metadata_fields_file_path"),
        Some(project.root.join("metadata_fields.yaml").as_path())
    );
    assert_eq!(
        config.get("model_str").and_then(|value| value.as_str()),
        Some("DLC_ant")
    );

    let err = cache.sample_project("ant", "supercolony").unwrap_err();
    assert!(matches!(err, DatasetError::UnknownKind { ref available, .. } if available == &["colony"]));
    let err = cache.sample_project("bee", "colony").unwrap_err();
    assert!(matches!(err, DatasetError::UnknownSpecies { .. }));
    Ok(())
}
