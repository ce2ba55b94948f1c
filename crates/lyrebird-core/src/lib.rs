//! # Lyrebird Core
//!
//! Speech synthesis model provisioning and synthesis pipeline.
//!
//! ## Features
//!
//! - Cataloged model artifacts with checksum-verified download
//! - Single current model with atomic switching and strategy fallback
//! - Request building with speaker, sample-rate and SSML policy
//! - Deterministic audio post-processing (normalize, pad, channel-shape)
//! - Exclusive playback with progress reporting and WAV export
//!
//! ## Example
//!
//! ```rust,no_run
//! use lyrebird_core::{OutputMode, RequestOptions, SpeechEngine};
//!
//! # fn strategies() -> Vec<std::sync::Arc<dyn lyrebird_core::LoadStrategy>> { Vec::new() }
//! #[tokio::main]
//! async fn main() -> Result<(), lyrebird_core::LyrebirdError> {
//!     let engine = SpeechEngine::new(strategies())?;
//!     engine.acquire("v3_en", false, None).await?;
//!     engine.load("v3_en").await?;
//!
//!     let options = RequestOptions::default();
//!     let audio = engine.synthesize("Hello, world!", &options, OutputMode::Stereo).await?;
//!     lyrebird_core::write_wav("hello.wav", &audio)?;
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acquisition;
pub mod audio_processor;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod loader;
pub mod playback;
pub mod request;
pub mod wav_writer;

// Re-export main types for convenience
pub use acquisition::{
    AcquireOutcome, AcquisitionManager, DownloadProgress, ModelProbe, ModelStatus,
    ProgressCallback,
};
pub use audio_processor::{
    lead_silence_frames, process, AudioBuffer, OutputMode, LEAD_SILENCE_SECS, PEAK_TARGET,
};
pub use catalog::{ModelCatalog, ModelDescriptor};
pub use engine::{EngineConfig, SpeechEngine};
pub use error::{LyrebirdError, LyrebirdResult};
pub use loader::{
    LoadState, LoadStrategy, LoadedModel, ModelHandle, ModelLoader, SpeechModel, StrategyProbe,
};
pub use playback::{
    AudioSink, PlaybackController, PlaybackPosition, PlaybackState, PositionCallback, SinkStream,
};
pub use request::{strip_ssml, RequestBuilder, RequestOptions, SynthesisRequest};
pub use wav_writer::write_wav;

/// Version information for the lyrebird-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default synthesis sample rate (48 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Maximum text length for synthesis (to prevent memory issues)
pub const MAX_TEXT_LENGTH: usize = 100_000;
