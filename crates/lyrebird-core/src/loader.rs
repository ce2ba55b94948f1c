//! Model cache and loader: turns verified artifacts into in-memory handles.
//!
//! At most one model is loaded ("current") system-wide. Switching models swaps
//! the current pointer atomically; a failed switch leaves the previous model
//! usable. Deserialization goes through an explicit ordered list of
//! [`LoadStrategy`] values rather than catch-and-retry control flow, because
//! some artifacts are stored in an older container format that only the legacy
//! strategy understands.

use crate::acquisition::{AcquisitionManager, ModelProbe};
use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::error::{LyrebirdError, LyrebirdResult};
use crate::request::SynthesisRequest;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An opaque in-memory speech model produced by a [`LoadStrategy`].
///
/// The artifact container format and runtime are external; this crate only
/// needs to hand the model a validated request and receive raw samples back.
pub trait SpeechModel: Send + Sync {
    /// Run inference for one validated request, returning mono f32 samples.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails; the loader state is unaffected.
    fn synthesize(&self, request: &SynthesisRequest) -> LyrebirdResult<Vec<f32>>;
}

/// Shared handle to a loaded model.
pub type ModelHandle = Arc<dyn SpeechModel>;

/// One way of deserializing an artifact into a [`SpeechModel`].
pub trait LoadStrategy: Send + Sync {
    /// Short name used in logs and in `LoadFailed` causes.
    fn name(&self) -> &'static str;

    /// Attempt to deserialize the artifact at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error describing why this strategy rejected the artifact;
    /// the loader then tries the next strategy in order.
    fn load(&self, path: &Path, descriptor: &ModelDescriptor) -> LyrebirdResult<ModelHandle>;
}

/// Loadability probe backed by the same strategy list the loader uses.
///
/// Given to the [`AcquisitionManager`] so `check_status` can report artifacts
/// that hash correctly but do not deserialize.
pub struct StrategyProbe {
    strategies: Vec<Arc<dyn LoadStrategy>>,
}

impl StrategyProbe {
    /// Build a probe over an ordered strategy list.
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn LoadStrategy>>) -> Self {
        Self { strategies }
    }
}

impl ModelProbe for StrategyProbe {
    fn probe(&self, path: &Path, descriptor: &ModelDescriptor) -> bool {
        self.strategies
            .iter()
            .any(|s| s.load(path, descriptor).is_ok())
    }
}

/// Per-entry load state, observable for UI status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Not in memory
    Unloaded,
    /// A load attempt is in flight
    Loading,
    /// This entry is the current model
    Loaded,
    /// The most recent load attempt failed
    LoadFailed,
}

/// A model currently resident in memory.
#[derive(Clone)]
pub struct LoadedModel {
    /// Capability descriptor of the loaded model
    pub descriptor: ModelDescriptor,
    /// Opaque runtime handle; borrowed per synthesis call, owned here
    pub handle: ModelHandle,
    /// When the load completed
    pub loaded_at: DateTime<Utc>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("descriptor", &self.descriptor.name)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// Owns the single current model and the strategy list that produces it.
pub struct ModelLoader {
    catalog: Arc<ModelCatalog>,
    acquisition: Arc<AcquisitionManager>,
    strategies: Vec<Arc<dyn LoadStrategy>>,
    current: tokio::sync::RwLock<Option<Arc<LoadedModel>>>,
    states: parking_lot::RwLock<HashMap<String, LoadState>>,
    // One async mutex per model name serializes same-name loads; loads for
    // different names proceed independently up to the current-pointer swap.
    inflight: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("strategies", &self.strategies.len())
            .finish_non_exhaustive()
    }
}

impl ModelLoader {
    /// Create a loader over the given catalog, cache and strategy order.
    #[must_use]
    pub fn new(
        catalog: Arc<ModelCatalog>,
        acquisition: Arc<AcquisitionManager>,
        strategies: Vec<Arc<dyn LoadStrategy>>,
    ) -> Self {
        Self {
            catalog,
            acquisition,
            strategies,
            current: tokio::sync::RwLock::new(None),
            states: parking_lot::RwLock::new(HashMap::new()),
            inflight: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Load a model and make it current.
    ///
    /// Requires a present, checksum-verified artifact; loading never silently
    /// re-downloads. On success the current pointer swaps to the new handle
    /// and the previous handle is released after the swap. On failure the
    /// previously loaded model stays current and usable.
    ///
    /// # Errors
    ///
    /// - [`LyrebirdError::UnknownModel`] if the name is not cataloged
    /// - [`LyrebirdError::FileNotFound`] if the artifact is absent
    /// - [`LyrebirdError::ChecksumMismatch`] if verification fails
    /// - [`LyrebirdError::LoadFailed`] if every strategy rejects the artifact
    pub async fn load(&self, name: &str) -> LyrebirdResult<()> {
        let descriptor = self.catalog.describe(name)?.clone();

        let name_lock = {
            let mut inflight = self.inflight.lock();
            Arc::clone(
                inflight
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let _guard = name_lock.lock().await;

        // A concurrent caller may have finished this exact load while we
        // waited on the per-name lock; reuse its result.
        if let Some(current) = self.current.read().await.as_ref() {
            if current.descriptor.name == name {
                debug!("Model '{}' already current, reusing", name);
                return Ok(());
            }
        }

        self.set_state(name, LoadState::Loading);

        let status = match self.acquisition.check_status(name).await {
            Ok(status) => status,
            Err(e) => {
                self.set_state(name, LoadState::LoadFailed);
                return Err(e);
            }
        };
        if !status.installed {
            self.set_state(name, LoadState::LoadFailed);
            return Err(LyrebirdError::file_not_found(
                status.path.display().to_string(),
            ));
        }
        if !status.verified {
            self.set_state(name, LoadState::LoadFailed);
            return Err(LyrebirdError::checksum_mismatch(
                name.to_string(),
                descriptor.sha256.clone(),
                status.actual_sha256.unwrap_or_default(),
            ));
        }

        let strategies = self.strategies.clone();
        let path = status.path.clone();
        let blocking_descriptor = descriptor.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut causes: Vec<String> = Vec::new();
            for strategy in &strategies {
                match strategy.load(&path, &blocking_descriptor) {
                    Ok(handle) => {
                        debug!("Strategy '{}' accepted the artifact", strategy.name());
                        return Ok(handle);
                    }
                    Err(e) => {
                        warn!("Strategy '{}' rejected the artifact: {}", strategy.name(), e);
                        causes.push(format!("{}: {}", strategy.name(), e));
                    }
                }
            }
            Err(causes)
        })
        .await
        .map_err(|e| LyrebirdError::load_failed(name.to_string(), format!("load task failed: {e}")))?;

        let handle = match outcome {
            Ok(handle) => handle,
            Err(causes) => {
                self.set_state(name, LoadState::LoadFailed);
                return Err(LyrebirdError::load_failed(
                    name.to_string(),
                    causes.join("; "),
                ));
            }
        };

        let loaded = Arc::new(LoadedModel {
            descriptor: descriptor.clone(),
            handle,
            loaded_at: Utc::now(),
        });

        // Single critical section: swap the current pointer, releasing the
        // previous handle only once the new one is in place.
        let previous = {
            let mut current = self.current.write().await;
            current.replace(loaded)
        };
        if let Some(previous) = previous {
            self.set_state(&previous.descriptor.name, LoadState::Unloaded);
        }
        self.set_state(name, LoadState::Loaded);
        info!("Model '{}' is now current", name);
        Ok(())
    }

    /// Release the current model, if any.
    pub async fn unload(&self) {
        let previous = self.current.write().await.take();
        if let Some(previous) = previous {
            info!("Unloaded model '{}'", previous.descriptor.name);
            self.set_state(&previous.descriptor.name, LoadState::Unloaded);
        }
    }

    /// The currently loaded model, if any.
    pub async fn current(&self) -> Option<Arc<LoadedModel>> {
        self.current.read().await.clone()
    }

    /// Descriptor of the current model, if any.
    pub async fn current_descriptor(&self) -> Option<ModelDescriptor> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|m| m.descriptor.clone())
    }

    /// Speaker set of the current model, or empty when nothing is loaded.
    pub async fn available_voices(&self) -> Vec<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|m| m.descriptor.speakers.clone())
            .unwrap_or_default()
    }

    /// Whether the named model is the current one.
    pub async fn is_loaded(&self, name: &str) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .is_some_and(|m| m.descriptor.name == name)
    }

    /// Observable load state for one catalog entry.
    #[must_use]
    pub fn load_state(&self, name: &str) -> LoadState {
        self.states
            .read()
            .get(name)
            .copied()
            .unwrap_or(LoadState::Unloaded)
    }

    fn set_state(&self, name: &str, state: LoadState) {
        self.states.write().insert(name.to_string(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct NullModel;

    impl SpeechModel for NullModel {
        fn synthesize(&self, _request: &SynthesisRequest) -> LyrebirdResult<Vec<f32>> {
            Ok(vec![0.0; 480])
        }
    }

    struct CountingStrategy {
        accept: bool,
        calls: Arc<AtomicUsize>,
    }

    impl LoadStrategy for CountingStrategy {
        fn name(&self) -> &'static str {
            if self.accept {
                "counting-ok"
            } else {
                "counting-reject"
            }
        }

        fn load(&self, _path: &Path, _descriptor: &ModelDescriptor) -> LyrebirdResult<ModelHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.accept {
                Ok(Arc::new(NullModel))
            } else {
                Err(LyrebirdError::invalid_input("wrong container"))
            }
        }
    }

    fn descriptor(name: &str, payload: &[u8]) -> ModelDescriptor {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        ModelDescriptor {
            name: name.to_string(),
            file: format!("{name}.pt"),
            url: format!("https://example.com/{name}.pt"),
            sha256: format!("{:x}", hasher.finalize()),
            sample_rates: vec![8000, 24000, 48000],
            default_rate: 48000,
            speakers: vec!["alpha".to_string()],
            language: "en".to_string(),
            supports_sample_rate_override: true,
            supports_ssml: false,
        }
    }

    fn loader_with(
        descriptors: Vec<ModelDescriptor>,
        strategies: Vec<Arc<dyn LoadStrategy>>,
        dir: &TempDir,
    ) -> ModelLoader {
        let catalog = Arc::new(ModelCatalog::new(descriptors).unwrap());
        let acquisition = Arc::new(
            AcquisitionManager::new(Arc::clone(&catalog), dir.path().to_path_buf()).unwrap(),
        );
        ModelLoader::new(catalog, acquisition, strategies)
    }

    fn ok_strategy(calls: &Arc<AtomicUsize>) -> Arc<dyn LoadStrategy> {
        Arc::new(CountingStrategy {
            accept: true,
            calls: Arc::clone(calls),
        })
    }

    fn reject_strategy(calls: &Arc<AtomicUsize>) -> Arc<dyn LoadStrategy> {
        Arc::new(CountingStrategy {
            accept: false,
            calls: Arc::clone(calls),
        })
    }

    #[tokio::test]
    async fn test_load_unknown_model() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(vec![descriptor("m", b"x")], vec![ok_strategy(&calls)], &dir);
        let err = loader.load("unlisted").await.unwrap_err();
        assert_eq!(err, LyrebirdError::unknown_model("unlisted"));
        assert_eq!(loader.load_state("unlisted"), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn test_load_missing_artifact_never_downloads() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(vec![descriptor("m", b"x")], vec![ok_strategy(&calls)], &dir);
        let err = loader.load("m").await.unwrap_err();
        assert!(matches!(err, LyrebirdError::FileNotFound { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(loader.load_state("m"), LoadState::LoadFailed);
    }

    #[tokio::test]
    async fn test_load_checksum_mismatch_keeps_previous_current() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let good = descriptor("good", b"good payload");
        let bad = descriptor("v4_ru", b"expected payload");
        let loader = loader_with(vec![good, bad], vec![ok_strategy(&calls)], &dir);

        std::fs::write(dir.path().join("good.pt"), b"good payload").unwrap();
        std::fs::write(dir.path().join("v4_ru.pt"), b"tampered payload").unwrap();

        loader.load("good").await.unwrap();
        assert!(loader.is_loaded("good").await);

        let err = loader.load("v4_ru").await.unwrap_err();
        assert!(matches!(err, LyrebirdError::ChecksumMismatch { .. }));
        // The failed switch leaves the previous model usable
        assert!(loader.is_loaded("good").await);
        assert_eq!(loader.load_state("v4_ru"), LoadState::LoadFailed);
    }

    #[tokio::test]
    async fn test_fallback_strategy_used_when_primary_rejects() {
        let dir = TempDir::new().unwrap();
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let legacy_calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(
            vec![descriptor("m", b"payload")],
            vec![reject_strategy(&primary_calls), ok_strategy(&legacy_calls)],
            &dir,
        );
        std::fs::write(dir.path().join("m.pt"), b"payload").unwrap();

        loader.load("m").await.unwrap();
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(legacy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.load_state("m"), LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_all_strategies_fail_preserves_causes() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(
            vec![descriptor("m", b"payload")],
            vec![reject_strategy(&calls), reject_strategy(&calls)],
            &dir,
        );
        std::fs::write(dir.path().join("m.pt"), b"payload").unwrap();

        let err = loader.load("m").await.unwrap_err();
        match err {
            LyrebirdError::LoadFailed { message, .. } => {
                assert!(message.contains("counting-reject"));
                assert!(message.contains("wrong container"));
            }
            other => panic!("expected LoadFailed, got {other:?}"),
        }
        assert!(loader.current().await.is_none());
    }

    #[tokio::test]
    async fn test_switch_swaps_current_and_releases_previous() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(
            vec![descriptor("a", b"payload a"), descriptor("b", b"payload b")],
            vec![ok_strategy(&calls)],
            &dir,
        );
        std::fs::write(dir.path().join("a.pt"), b"payload a").unwrap();
        std::fs::write(dir.path().join("b.pt"), b"payload b").unwrap();

        loader.load("a").await.unwrap();
        loader.load("b").await.unwrap();

        assert!(loader.is_loaded("b").await);
        assert!(!loader.is_loaded("a").await);
        assert_eq!(loader.load_state("a"), LoadState::Unloaded);
        assert_eq!(loader.load_state("b"), LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_same_name_loads_serialize_and_reuse() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(loader_with(
            vec![descriptor("m", b"payload")],
            vec![ok_strategy(&calls)],
            &dir,
        ));
        std::fs::write(dir.path().join("m.pt"), b"payload").unwrap();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let loader = Arc::clone(&loader);
                tokio::spawn(async move { loader.load("m").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // One caller deserializes; the rest find the model current and reuse it
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_available_voices_empty_when_unloaded() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(vec![descriptor("m", b"x")], vec![ok_strategy(&calls)], &dir);
        assert!(loader.available_voices().await.is_empty());
        assert!(loader.current_descriptor().await.is_none());
    }

    #[tokio::test]
    async fn test_unload_clears_current() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(vec![descriptor("m", b"payload")], vec![ok_strategy(&calls)], &dir);
        std::fs::write(dir.path().join("m.pt"), b"payload").unwrap();

        loader.load("m").await.unwrap();
        loader.unload().await;
        assert!(loader.current().await.is_none());
        assert_eq!(loader.load_state("m"), LoadState::Unloaded);
    }

    #[test]
    fn test_strategy_probe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = StrategyProbe::new(vec![reject_strategy(&calls), ok_strategy(&calls)]);
        let descriptor = descriptor("m", b"x");
        assert!(probe.probe(Path::new("/nonexistent"), &descriptor));

        let probe = StrategyProbe::new(vec![reject_strategy(&calls)]);
        assert!(!probe.probe(Path::new("/nonexistent"), &descriptor));
    }
}
