pub mod cache;
pub mod errors;
pub mod fetch;
pub mod registry;

pub use cache::{CacheConfig, DatasetCache, LocalCacheState, SampleProject, DATA_DIR_ENV};
pub use errors::{DatasetError, FetchError, RegistryError};
pub use fetch::{Fetcher, HttpFetcher};
pub use registry::{sample_registry, CacheEntry, ContentHash, HashAlgorithm, Registry};
