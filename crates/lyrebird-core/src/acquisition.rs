//! Artifact acquisition: downloads, SHA-256 verification and the local cache.
//!
//! One file per model lives under the configured cache directory, named by the
//! descriptor's artifact filename. There is no checksum sidecar; the hash is
//! recomputed from the artifact on every verification pass. Checksum
//! comparison is case-insensitive hex.

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::error::{LyrebirdError, LyrebirdResult};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Chunk size for file hashing and download streaming
const IO_CHUNK_SIZE: usize = 8192;

/// Loadability probe over an artifact, implemented by the model loader.
///
/// Used by [`AcquisitionManager::check_status`] to catch payloads that hash
/// correctly but cannot be deserialized by the runtime.
pub trait ModelProbe: Send + Sync {
    /// Return true if the artifact at `path` deserializes cleanly.
    fn probe(&self, path: &Path, descriptor: &ModelDescriptor) -> bool;
}

/// Byte-level progress of one artifact download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Model being downloaded
    pub model: String,
    /// Bytes written so far
    pub downloaded: u64,
    /// Total size from `Content-Length`, when the server sent one
    pub total: Option<u64>,
}

impl DownloadProgress {
    /// Completion percentage, when the total size is known.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        self.total
            .filter(|t| *t > 0)
            .map(|t| self.downloaded as f64 / t as f64 * 100.0)
    }
}

/// Callback invoked with a running byte counter during downloads.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Outcome of a successful [`AcquisitionManager::acquire`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A verified artifact was already present; no network access happened
    UpToDate,
    /// The artifact was downloaded (or re-downloaded) and verified
    Updated,
}

/// Installation and verification status of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    /// Model name
    pub name: String,
    /// Whether the artifact file existed when the check started
    pub installed: bool,
    /// Whether the artifact hash matched the descriptor
    pub verified: bool,
    /// Human-readable capability/status tags (`Verified`, `Loadable`, ...)
    pub features: Vec<String>,
    /// Where the artifact lives (or would live) on disk
    pub path: PathBuf,
    /// Hash computed during this check, if the file was present
    pub actual_sha256: Option<String>,
}

/// Book-keeping for one artifact in the local cache.
#[derive(Debug, Clone)]
struct CacheEntry {
    verified: bool,
    last_verified_hash: Option<String>,
}

/// Downloads model artifacts, verifies them and maintains the cache directory.
pub struct AcquisitionManager {
    catalog: Arc<ModelCatalog>,
    cache_dir: PathBuf,
    client: reqwest::Client,
    entries: RwLock<HashMap<String, CacheEntry>>,
    probe: Option<Arc<dyn ModelProbe>>,
    // One async mutex per model name serializes same-name acquires so two
    // downloads never interleave writes into the same artifact file.
    inflight: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for AcquisitionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionManager")
            .field("cache_dir", &self.cache_dir)
            .field("models", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl AcquisitionManager {
    /// Create a manager over `cache_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the cache directory cannot be created.
    pub fn new(catalog: Arc<ModelCatalog>, cache_dir: PathBuf) -> LyrebirdResult<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        debug!("Artifact cache at {:?}", cache_dir);
        Ok(Self {
            catalog,
            cache_dir,
            client: reqwest::Client::new(),
            entries: RwLock::new(HashMap::new()),
            probe: None,
            inflight: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Attach a loadability probe used by [`Self::check_status`].
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ModelProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Local path of a model's artifact.
    ///
    /// # Errors
    ///
    /// Returns [`LyrebirdError::UnknownModel`] if the name is not cataloged.
    pub fn artifact_path(&self, name: &str) -> LyrebirdResult<PathBuf> {
        let descriptor = self.catalog.describe(name)?;
        Ok(self.cache_dir.join(&descriptor.file))
    }

    /// Check installation, verification and loadability of one model.
    ///
    /// A checksum mismatch observed here destroys the stale file and its cache
    /// entry, so a later [`Self::acquire`] re-downloads it.
    ///
    /// # Errors
    ///
    /// Returns [`LyrebirdError::UnknownModel`] for names not in the catalog,
    /// or an I/O error if the artifact cannot be read.
    pub async fn check_status(&self, name: &str) -> LyrebirdResult<ModelStatus> {
        let descriptor = self.catalog.describe(name)?.clone();
        let path = self.cache_dir.join(&descriptor.file);

        let installed = path.exists();
        let mut status = ModelStatus {
            name: name.to_string(),
            installed,
            verified: false,
            features: Vec::new(),
            path: path.clone(),
            actual_sha256: None,
        };

        if installed {
            let actual = hash_file(path.clone()).await?;
            status.verified = hex_digest_matches(&descriptor.sha256, &actual);
            status.actual_sha256 = Some(actual.clone());

            if status.verified {
                status.features.push("Verified".to_string());
                self.mark_verified(name, actual);
            } else {
                warn!(
                    "Artifact for '{}' failed verification (expected {}, got {}), removing",
                    name, descriptor.sha256, actual
                );
                self.discard_artifact(name, &path);
            }

            // Probe even when the checksum matches: a payload can hash
            // correctly while the runtime still rejects it (e.g. truncated
            // container written with the expected hash recorded upstream).
            if status.verified {
                if let Some(probe) = &self.probe {
                    if probe.probe(&path, &descriptor) {
                        status.features.push("Loadable".to_string());
                    } else {
                        status.features.push("Corrupted".to_string());
                    }
                }
            }
        }

        if descriptor.supports_ssml {
            status.features.push("SSML".to_string());
        }

        Ok(status)
    }

    /// Ensure a verified artifact is on disk, downloading it if necessary.
    ///
    /// With `force == false` an already-verified artifact short-circuits to
    /// [`AcquireOutcome::UpToDate`] without any network access.
    ///
    /// # Errors
    ///
    /// - [`LyrebirdError::UnknownModel`] if the name is not cataloged
    /// - [`LyrebirdError::DownloadFailed`] on network or write failure; any
    ///   partial file is discarded
    /// - [`LyrebirdError::ChecksumMismatch`] if the downloaded payload does
    ///   not hash to the descriptor's digest; the file is deleted
    pub async fn acquire(
        &self,
        name: &str,
        force: bool,
        progress: Option<ProgressCallback>,
    ) -> LyrebirdResult<AcquireOutcome> {
        let descriptor = self.catalog.describe(name)?.clone();
        let path = self.cache_dir.join(&descriptor.file);

        let name_lock = {
            let mut inflight = self.inflight.lock();
            Arc::clone(
                inflight
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let _guard = name_lock.lock().await;

        if !force && path.exists() {
            let actual = hash_file(path.clone()).await?;
            if hex_digest_matches(&descriptor.sha256, &actual) {
                self.mark_verified(name, actual);
                debug!("Artifact for '{}' already verified, skipping download", name);
                return Ok(AcquireOutcome::UpToDate);
            }
            // Stale or corrupt file; fall through to a fresh download.
            self.discard_artifact(name, &path);
        }

        info!("Downloading '{}' from {}", name, descriptor.url);
        self.entries.write().insert(
            name.to_string(),
            CacheEntry {
                verified: false,
                last_verified_hash: None,
            },
        );

        let actual = match self.stream_to_disk(&descriptor, &path, progress).await {
            Ok(digest) => digest,
            Err(err) => {
                self.discard_artifact(name, &path);
                return Err(err);
            }
        };

        if !hex_digest_matches(&descriptor.sha256, &actual) {
            self.discard_artifact(name, &path);
            return Err(LyrebirdError::checksum_mismatch(
                name.to_string(),
                descriptor.sha256.clone(),
                actual,
            ));
        }

        self.mark_verified(name, actual);
        info!("Artifact for '{}' downloaded and verified", name);
        Ok(AcquireOutcome::Updated)
    }

    /// Acquire several models with independent per-model results.
    ///
    /// One model's failure never aborts the others.
    pub async fn acquire_many(
        &self,
        names: &[String],
        force: bool,
        progress: Option<ProgressCallback>,
    ) -> HashMap<String, LyrebirdResult<AcquireOutcome>> {
        let mut results = HashMap::with_capacity(names.len());
        for name in names {
            let result = self.acquire(name, force, progress.clone()).await;
            results.insert(name.clone(), result);
        }
        results
    }

    /// Recompute the hash of a cached artifact and update its entry.
    ///
    /// Returns false (and deletes the file) on mismatch, true on match.
    ///
    /// # Errors
    ///
    /// Returns [`LyrebirdError::UnknownModel`] for uncataloged names and
    /// [`LyrebirdError::FileNotFound`] if the artifact is absent.
    pub async fn verify(&self, name: &str) -> LyrebirdResult<bool> {
        let descriptor = self.catalog.describe(name)?.clone();
        let path = self.cache_dir.join(&descriptor.file);
        if !path.exists() {
            return Err(LyrebirdError::file_not_found(path.display().to_string()));
        }
        let actual = hash_file(path.clone()).await?;
        if hex_digest_matches(&descriptor.sha256, &actual) {
            self.mark_verified(name, actual);
            Ok(true)
        } else {
            self.discard_artifact(name, &path);
            Ok(false)
        }
    }

    /// Delete a model's artifact and cache entry, if present.
    ///
    /// # Errors
    ///
    /// Returns [`LyrebirdError::UnknownModel`] for uncataloged names.
    pub fn remove(&self, name: &str) -> LyrebirdResult<()> {
        let path = self.artifact_path(name)?;
        self.discard_artifact(name, &path);
        Ok(())
    }

    /// The configured cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    async fn stream_to_disk(
        &self,
        descriptor: &ModelDescriptor,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> LyrebirdResult<String> {
        let name = descriptor.name.clone();
        let net_err =
            |e: reqwest::Error| LyrebirdError::download_failed(name.clone(), e.to_string());

        let response = self.client.get(&descriptor.url).send().await.map_err(net_err)?;
        let mut response = response.error_for_status().map_err(net_err)?;
        let total = response.content_length();

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| LyrebirdError::download_failed(name.clone(), e.to_string()))?;
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(net_err)? {
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| LyrebirdError::download_failed(name.clone(), e.to_string()))?;
            downloaded += chunk.len() as u64;
            if let Some(callback) = &progress {
                callback(DownloadProgress {
                    model: name.clone(),
                    downloaded,
                    total,
                });
            }
        }

        file.flush()
            .await
            .map_err(|e| LyrebirdError::download_failed(name.clone(), e.to_string()))?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn mark_verified(&self, name: &str, digest: String) {
        self.entries.write().insert(
            name.to_string(),
            CacheEntry {
                verified: true,
                last_verified_hash: Some(digest),
            },
        );
    }

    fn discard_artifact(&self, name: &str, path: &Path) {
        self.entries.write().remove(name);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove artifact {:?}: {}", path, e);
            }
        }
    }

    #[cfg(test)]
    fn entry_verified(&self, name: &str) -> Option<bool> {
        self.entries.read().get(name).map(|e| e.verified)
    }
}

/// Compare two hex digests case-insensitively.
fn hex_digest_matches(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

/// Hash a file's contents in fixed-size chunks off the async threads.
async fn hash_file(path: PathBuf) -> LyrebirdResult<String> {
    tokio::task::spawn_blocking(move || -> LyrebirdResult<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; IO_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| LyrebirdError::io(format!("hash task failed: {e}")))?
}
