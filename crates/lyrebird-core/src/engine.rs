//! The speech engine service object.
//!
//! Owns the catalog, acquisition manager and model loader, and runs the full
//! synthesis pipeline: build a validated request against the current model,
//! run inference on a blocking worker, then post-process the waveform. There
//! is no process-wide singleton; construct one engine and pass it by
//! reference to whoever needs it.

use crate::acquisition::{AcquireOutcome, AcquisitionManager, ModelStatus, ProgressCallback};
use crate::audio_processor::{process, AudioBuffer, OutputMode};
use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::error::{LyrebirdError, LyrebirdResult};
use crate::loader::{LoadStrategy, ModelLoader, StrategyProbe};
use crate::request::{RequestBuilder, RequestOptions};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Directory holding downloaded model artifacts
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Maximum accepted input text length, in bytes
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// Optional TOML catalog manifest; the built-in catalog is used when absent
    #[serde(default)]
    pub catalog_manifest: Option<PathBuf>,
}

fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "Lyrebird", "lyrebird")
        .map(|dirs| dirs.cache_dir().join("models"))
        .unwrap_or_else(|| PathBuf::from(".lyrebird/models"))
}

const fn default_max_text_length() -> usize {
    crate::MAX_TEXT_LENGTH
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_text_length: default_max_text_length(),
            catalog_manifest: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> LyrebirdResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Service object tying the provisioning and synthesis pipeline together.
#[derive(Debug)]
pub struct SpeechEngine {
    config: EngineConfig,
    catalog: Arc<ModelCatalog>,
    acquisition: Arc<AcquisitionManager>,
    loader: Arc<ModelLoader>,
}

impl SpeechEngine {
    /// Create an engine with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the
    /// catalog manifest is invalid.
    pub fn new(strategies: Vec<Arc<dyn LoadStrategy>>) -> LyrebirdResult<Self> {
        Self::with_config(EngineConfig::default(), strategies)
    }

    /// Create an engine with a custom configuration.
    ///
    /// `strategies` is the ordered deserialization list used for both loading
    /// and the loadability probe in status checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the
    /// catalog manifest is invalid.
    pub fn with_config(
        config: EngineConfig,
        strategies: Vec<Arc<dyn LoadStrategy>>,
    ) -> LyrebirdResult<Self> {
        debug!("Creating speech engine with config: {:?}", config);

        let catalog = Arc::new(match &config.catalog_manifest {
            Some(path) => ModelCatalog::from_toml_file(path)?,
            None => ModelCatalog::builtin(),
        });

        let probe = Arc::new(StrategyProbe::new(strategies.clone()));
        let acquisition = Arc::new(
            AcquisitionManager::new(Arc::clone(&catalog), config.cache_dir.clone())?
                .with_probe(probe),
        );
        let loader = Arc::new(ModelLoader::new(
            Arc::clone(&catalog),
            Arc::clone(&acquisition),
            strategies,
        ));

        info!("Speech engine ready with {} cataloged models", catalog.len());
        Ok(Self {
            config,
            catalog,
            acquisition,
            loader,
        })
    }

    /// The model catalog.
    #[must_use]
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Installation and verification status of one model.
    ///
    /// # Errors
    ///
    /// See [`AcquisitionManager::check_status`].
    pub async fn check_status(&self, name: &str) -> LyrebirdResult<ModelStatus> {
        self.acquisition.check_status(name).await
    }

    /// Ensure a verified artifact is on disk.
    ///
    /// # Errors
    ///
    /// See [`AcquisitionManager::acquire`].
    pub async fn acquire(
        &self,
        name: &str,
        force: bool,
        progress: Option<ProgressCallback>,
    ) -> LyrebirdResult<AcquireOutcome> {
        self.acquisition.acquire(name, force, progress).await
    }

    /// Acquire several models with independent per-model results.
    pub async fn acquire_many(
        &self,
        names: &[String],
        force: bool,
        progress: Option<ProgressCallback>,
    ) -> HashMap<String, LyrebirdResult<AcquireOutcome>> {
        self.acquisition.acquire_many(names, force, progress).await
    }

    /// Load a model and make it current.
    ///
    /// # Errors
    ///
    /// See [`ModelLoader::load`].
    pub async fn load(&self, name: &str) -> LyrebirdResult<()> {
        self.loader.load(name).await
    }

    /// Release the current model, if any.
    pub async fn unload(&self) {
        self.loader.unload().await;
    }

    /// Descriptor of the current model, if any.
    pub async fn current_model(&self) -> Option<ModelDescriptor> {
        self.loader.current_descriptor().await
    }

    /// Speaker set of the current model, or empty when nothing is loaded.
    pub async fn available_voices(&self) -> Vec<String> {
        self.loader.available_voices().await
    }

    /// Synthesize text through the full pipeline.
    ///
    /// Builds a validated request against the current model, runs inference
    /// on a blocking worker thread, and post-processes the waveform for the
    /// requested output mode. The handle is borrowed for the duration of this
    /// one call; the loader keeps ownership.
    ///
    /// # Errors
    ///
    /// - [`LyrebirdError::NoModelLoaded`] when nothing is loaded
    /// - request validation errors from [`RequestBuilder::build`]
    /// - an invalid-input error when the text exceeds the configured maximum
    /// - inference errors from the model itself
    pub async fn synthesize(
        &self,
        text: &str,
        options: &RequestOptions,
        mode: OutputMode,
    ) -> LyrebirdResult<AudioBuffer> {
        if text.len() > self.config.max_text_length {
            return Err(LyrebirdError::invalid_input(format!(
                "text length {} exceeds maximum {}",
                text.len(),
                self.config.max_text_length
            )));
        }

        let current = self.loader.current().await.ok_or(LyrebirdError::NoModelLoaded)?;
        let request = RequestBuilder::new(Some(&current.descriptor)).build(text, options)?;
        debug!(
            "Synthesizing {} characters as '{}' at {} Hz (ssml: {})",
            request.text.len(),
            request.speaker,
            request.sample_rate,
            request.ssml
        );

        let handle = Arc::clone(&current.handle);
        let sample_rate = request.sample_rate;
        let raw = tokio::task::spawn_blocking(move || handle.synthesize(&request))
            .await
            .map_err(|e| LyrebirdError::io(format!("synthesis task failed: {e}")))??;

        // Model output is a mono waveform; a single-column matrix goes in
        let buffer = process(&raw, 1, sample_rate, mode)?;
        info!("Synthesized {} frames at {} Hz", buffer.frames(), sample_rate);
        Ok(buffer)
    }
}
