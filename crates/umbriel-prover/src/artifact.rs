//! proving artifact downloads
//!
//! the circuit wasm, proving key and r1cs are large static files served over
//! http. downloads report progress (the proving key alone is hundreds of
//! megabytes) and land in a content-addressed cache so a restart never pays
//! for them twice.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ProverError, Result};

/// locations of the three proving artifacts
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ArtifactUrls {
    pub circuit_wasm: String,
    pub proving_key: String,
    pub r1cs: String,
}

/// download progress snapshot
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
    pub percent: f32,
    pub message: String,
}

/// fetches artifacts by url, with caching
pub trait ArtifactProvider: Send {
    /// fetch, invoking `on_progress` at a modest rate during the transfer
    fn fetch_with_progress(
        &self,
        url: &str,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<Vec<u8>>;

    /// whether a url is already cached
    fn cached(&self, url: &str) -> bool;

    /// drop everything from the cache
    fn evict_all(&self) -> Result<()>;
}

/// cache file name: hex sha-256 of the url
fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// http provider with a filesystem cache
pub struct HttpArtifactProvider {
    cache_dir: PathBuf,
    client: reqwest::blocking::Client,
}

impl HttpArtifactProvider {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            client: reqwest::blocking::Client::new(),
        }
    }

    fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(cache_key(url))
    }
}

impl ArtifactProvider for HttpArtifactProvider {
    fn fetch_with_progress(
        &self,
        url: &str,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<Vec<u8>> {
        let path = self.cache_path(url);
        if let Ok(bytes) = std::fs::read(&path) {
            debug!(url, "artifact cache hit");
            return Ok(bytes);
        }

        info!(url, "downloading artifact");
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| ProverError::ArtifactFetch(e.to_string()))?;

        let total = response.content_length();
        let mut bytes = Vec::new();
        let mut buffer = [0u8; 64 * 1024];
        let mut last_percent = -1i32;

        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| ProverError::ArtifactFetch(e.to_string()))?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&buffer[..n]);

            let loaded = bytes.len() as u64;
            let percent = total
                .filter(|&t| t > 0)
                .map_or(0.0, |t| loaded as f32 / t as f32 * 100.0);
            // throttle to whole-percent steps, not per-read
            if (percent as i32) > last_percent {
                last_percent = percent as i32;
                on_progress(Progress {
                    loaded,
                    total,
                    percent,
                    message: format!("downloading {url}"),
                });
            }
        }

        std::fs::create_dir_all(&self.cache_dir)
            .and_then(|_| std::fs::write(&path, &bytes))
            .map_err(|e| ProverError::ArtifactFetch(format!("cache write: {e}")))?;
        Ok(bytes)
    }

    fn cached(&self, url: &str) -> bool {
        self.cache_path(url).exists()
    }

    fn evict_all(&self) -> Result<()> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)
                .map_err(|e| ProverError::ArtifactFetch(format!("cache evict: {e}")))?;
        }
        Ok(())
    }
}

/// in-memory provider for tests: serves preloaded bytes and tracks which
/// urls have been "cached" by a fetch
pub struct MemoryArtifacts {
    files: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryArtifacts {
    pub fn new(files: HashMap<String, Vec<u8>>) -> Self {
        Self {
            files,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_file(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.insert(url.into(), bytes);
        self
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }
}

impl ArtifactProvider for MemoryArtifacts {
    fn fetch_with_progress(
        &self,
        url: &str,
        on_progress: &mut dyn FnMut(Progress),
    ) -> Result<Vec<u8>> {
        let bytes = self
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| ProverError::ArtifactFetch(format!("unknown url {url}")))?;

        let total = bytes.len() as u64;
        for (loaded, percent) in [(0u64, 0.0f32), (total, 100.0)] {
            on_progress(Progress {
                loaded,
                total: Some(total),
                percent,
                message: format!("downloading {url}"),
            });
        }

        self.fetched.lock().expect("not poisoned").push(url.into());
        Ok(bytes)
    }

    fn cached(&self, url: &str) -> bool {
        self.fetched.lock().expect("not poisoned").iter().any(|u| u == url)
    }

    fn evict_all(&self) -> Result<()> {
        self.fetched.lock().expect("not poisoned").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_provider_progress_and_cache() {
        let provider = MemoryArtifacts::empty().with_file("http://x/pk", vec![1, 2, 3]);

        assert!(!provider.cached("http://x/pk"));

        let mut seen = Vec::new();
        let bytes = provider
            .fetch_with_progress("http://x/pk", &mut |p| seen.push(p.percent))
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(seen, vec![0.0, 100.0]);
        assert!(provider.cached("http://x/pk"));

        provider.evict_all().unwrap();
        assert!(!provider.cached("http://x/pk"));
    }

    #[test]
    fn test_memory_provider_unknown_url() {
        let provider = MemoryArtifacts::empty();
        let err = provider.fetch_with_progress("http://nowhere", &mut |_| {});
        assert!(matches!(err, Err(ProverError::ArtifactFetch(_))));
    }

    #[test]
    fn test_cache_key_stable_and_distinct() {
        assert_eq!(cache_key("a"), cache_key("a"));
        assert_ne!(cache_key("a"), cache_key("b"));
        assert_eq!(cache_key("a").len(), 64);
    }

    #[test]
    fn test_http_provider_cache_roundtrip() {
        // exercise the filesystem cache without any network: pre-seed the
        // cache file exactly as a completed download would
        let dir = tempfile::tempdir().unwrap();
        let provider = HttpArtifactProvider::new(dir.path().to_path_buf());
        let url = "http://example.invalid/pk";

        assert!(!provider.cached(url));
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join(cache_key(url)), b"cached bytes").unwrap();

        assert!(provider.cached(url));
        let bytes = provider.fetch_with_progress(url, &mut |_| {}).unwrap();
        assert_eq!(bytes, b"cached bytes");

        provider.evict_all().unwrap();
        assert!(!provider.cached(url));
    }
}
