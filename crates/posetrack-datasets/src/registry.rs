use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::errors::RegistryError;

pub const SAMPLE_DATA_URL: &str = "https://gin.g-node.org/SainsburyWellcomeCentre/WAZP/raw/master";

const SAMPLE_DATASETS: &[(&str, &str)] = &[
    (
        "jewel-wasp/short-clips_raw.zip",
        "7fab80e68af5b90a4633e886b06bebefd7d400c5d8acc23e1693ecfd8d344f0d",
    ),
    (
        "jewel-wasp/short-clips_compressed.zip",
        "2b4a6a4b00c6a41eae71d10e74dff61d5a2bb7d2b627db6edb59abae0e18aaee",
    ),
    (
        "jewel-wasp/entire-video_raw.zip",
        "f587c8e60b9df3b4664a6587a624abdcf401263b86ba0268c0b5a0f8e89f5167",
    ),
    (
        "jewel-wasp/entire-video_compressed.zip",
        "d2c5d4e4febc9eca1d523cb113b004fe6368a3d63bde5206cef04ef576c6a042",
    ),
];

static SAMPLE_REGISTRY: Lazy<Registry> = Lazy::new(|| Registry {
    base_url: SAMPLE_DATA_URL.to_string(),
    entries: SAMPLE_DATASETS
        .iter()
        .map(|(name, hex)| CacheEntry {
            name: (*name).to_string(),
            url: join_url(SAMPLE_DATA_URL, name),
            expected_hash: ContentHash::new(HashAlgorithm::Sha256, *hex),
        })
        .collect(),
});

/// Registry of the public sample projects.
pub fn sample_registry() -> &'static Registry {
    &SAMPLE_REGISTRY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "sha256" => Some(HashAlgorithm::Sha256),
            "blake3" => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }

    pub fn digest_bytes(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
            HashAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        }
    }

    /// Lowercase hex digest of a file, read in streaming fashion.
    pub fn digest_file(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                io::copy(&mut file, &mut hasher)?;
                Ok(format!("{:x}", hasher.finalize()))
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                io::copy(&mut file, &mut hasher)?;
                Ok(hasher.finalize().to_hex().to_string())
            }
        }
    }
}

/// Expected digest of a registry entry, written as `sha256:<hex>`,
/// `blake3:<hex>` or bare hex (sha256).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    hex: String,
}

impl ContentHash {
    pub fn new(algorithm: HashAlgorithm, hex: impl Into<String>) -> Self {
        Self {
            algorithm,
            hex: hex.into().to_ascii_lowercase(),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual_hex)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidContentHash;

impl FromStr for ContentHash {
    type Err = InvalidContentHash;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (algorithm, hex) = match value.split_once(':') {
            Some((prefix, hex)) => (
                HashAlgorithm::from_prefix(prefix).ok_or(InvalidContentHash)?,
                hex,
            ),
            None => (HashAlgorithm::Sha256, value),
        };
        // Both algorithms produce 32-byte digests.
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidContentHash);
        }
        Ok(Self::new(algorithm, hex))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

/// One downloadable dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Relative path of the archive inside the cache root, e.g. `jewel-wasp/short-clips_raw.zip`.
    pub name: String,
    pub url: String,
    pub expected_hash: ContentHash,
}

impl CacheEntry {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        expected_hash: ContentHash,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        if !is_relative_name(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        Ok(Self {
            name,
            url: url.into(),
            expected_hash,
        })
    }

    pub fn is_zip(&self) -> bool {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    base_url: String,
    #[serde(default)]
    datasets: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    hash: String,
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    base_url: String,
    entries: Vec<CacheEntry>,
}

impl Registry {
    pub fn new(base_url: impl Into<String>, entries: Vec<CacheEntry>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(RegistryError::DuplicateName(entry.name.clone()));
            }
        }
        Ok(Self {
            base_url: base_url.into(),
            entries,
        })
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses a TOML registry: `base_url` plus `[[datasets]]` tables with
    /// `name`, `hash` and an optional `url` overriding `base_url/name`.
    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        let raw: RawRegistry = toml::from_str(text)?;
        let entries = raw
            .datasets
            .into_iter()
            .map(|entry| {
                let expected_hash: ContentHash = entry.hash.parse().map_err(|_| RegistryError::InvalidHash {
                    name: entry.name.clone(),
                    value: entry.hash.clone(),
                })?;
                let url = entry
                    .url
                    .unwrap_or_else(|| join_url(&raw.base_url, &entry.name));
                CacheEntry::new(entry.name, url, expected_hash)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(raw.base_url, entries)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CacheEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.name.clone()).collect()
    }

    /// Species → dataset kinds, for entries named `<species>/<kind>.<ext>`.
    /// Kinds keep registry order.
    pub fn catalog(&self) -> BTreeMap<String, Vec<String>> {
        let mut catalog: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &self.entries {
            let Some((species, file)) = entry.name.split_once('/') else {
                continue;
            };
            let kind = file.split('.').next().unwrap_or(file);
            let kinds = catalog.entry(species.to_string()).or_default();
            if !kinds.iter().any(|known| known == kind) {
                kinds.push(kind.to_string());
            }
        }
        catalog
    }
}

fn join_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

fn is_relative_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
