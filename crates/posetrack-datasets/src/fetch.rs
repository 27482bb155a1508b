use std::io::Write;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::errors::FetchError;

/// Transport used by the dataset cache to download an entry.
pub trait Fetcher: Send + Sync {
    /// Streams the body at `url` into `dest` and returns the number of bytes written.
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64, FetchError>;
}

/// Blocking HTTP(S) fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("posetrack/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64, FetchError> {
        let mut response = self.client.get(url).send()?.error_for_status()?;
        debug!(url, status = %response.status(), "Downloading dataset");
        let written = response.copy_to(dest)?;
        Ok(written)
    }
}
