//! Error types for the Lyrebird speech-synthesis pipeline.

/// Result type alias for Lyrebird operations
pub type LyrebirdResult<T> = Result<T, LyrebirdError>;

/// Main error type for Lyrebird operations.
///
/// Every failure in the provisioning and synthesis pipeline is reported as one
/// of these variants; nothing in this crate panics across the component
/// boundary. All failures are recoverable by retrying the specific operation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LyrebirdError {
    /// Model name is not present in the catalog
    #[error("Unknown model '{name}'")]
    UnknownModel {
        /// The model name that was not found
        name: String,
    },

    /// Model artifact is missing from the local cache
    #[error("Model artifact not found: {path}")]
    FileNotFound {
        /// Path where the artifact was expected
        path: String,
    },

    /// SHA-256 of the local artifact does not match the descriptor
    #[error("Checksum mismatch for '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Model whose artifact failed verification
        name: String,
        /// Expected hex digest from the descriptor
        expected: String,
        /// Digest computed from the local file
        actual: String,
    },

    /// Network or I/O failure while downloading an artifact
    #[error("Download failed for '{name}': {message}")]
    DownloadFailed {
        /// Model being downloaded
        name: String,
        /// Description of the underlying failure
        message: String,
    },

    /// Every loading strategy failed for an artifact
    #[error("Model load failed for '{name}': {message}")]
    LoadFailed {
        /// Model being loaded
        name: String,
        /// Per-strategy causes, joined
        message: String,
    },

    /// A synthesis request was built while no model is loaded
    #[error("No model loaded")]
    NoModelLoaded,

    /// Input text was empty after sanitization
    #[error("Empty text input")]
    EmptyText,

    /// Requested speaker is not offered by the current model
    #[error("Speaker '{speaker}' not available for the current model")]
    InvalidSpeaker {
        /// The rejected speaker identifier
        speaker: String,
    },

    /// SSML was requested but the markup is not well-formed
    #[error("Invalid SSML: {message}")]
    InvalidSsml {
        /// Description of the markup problem
        message: String,
    },

    /// Audio device failure during playback
    #[error("Playback device error: {message}")]
    PlaybackDevice {
        /// Description of the device failure
        message: String,
    },

    /// Invalid input outside the request-validation taxonomy
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid input
        message: String,
    },

    /// Configuration or catalog-construction error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// File I/O error
    #[error("File I/O error: {message}")]
    Io {
        /// Description of the I/O failure
        message: String,
    },
}

impl LyrebirdError {
    /// Create a new unknown-model error
    #[must_use]
    pub fn unknown_model<S: Into<String>>(name: S) -> Self {
        Self::UnknownModel { name: name.into() }
    }

    /// Create a new file-not-found error
    #[must_use]
    pub fn file_not_found<S: Into<String>>(path: S) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new checksum-mismatch error
    #[must_use]
    pub fn checksum_mismatch<S: Into<String>>(name: S, expected: S, actual: S) -> Self {
        Self::ChecksumMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new download-failed error
    #[must_use]
    pub fn download_failed<S: Into<String>>(name: S, message: S) -> Self {
        Self::DownloadFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new load-failed error
    #[must_use]
    pub fn load_failed<S: Into<String>>(name: S, message: S) -> Self {
        Self::LoadFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid-speaker error
    #[must_use]
    pub fn invalid_speaker<S: Into<String>>(speaker: S) -> Self {
        Self::InvalidSpeaker {
            speaker: speaker.into(),
        }
    }

    /// Create a new invalid-SSML error
    #[must_use]
    pub fn invalid_ssml<S: Into<String>>(message: S) -> Self {
        Self::InvalidSsml {
            message: message.into(),
        }
    }

    /// Create a new playback-device error
    #[must_use]
    pub fn playback_device<S: Into<String>>(message: S) -> Self {
        Self::PlaybackDevice {
            message: message.into(),
        }
    }

    /// Create a new invalid-input error
    #[must_use]
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    #[must_use]
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Check if this error is retriable without user intervention
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed { .. } | Self::Io { .. } | Self::PlaybackDevice { .. }
        )
    }

    /// Check if this error is due to invalid user input
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyText
                | Self::InvalidSpeaker { .. }
                | Self::InvalidSsml { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// Get the error category for logging/metrics
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::UnknownModel { .. } => "catalog",
            Self::FileNotFound { .. } | Self::ChecksumMismatch { .. } => "verification",
            Self::DownloadFailed { .. } => "download",
            Self::LoadFailed { .. } => "load",
            Self::NoModelLoaded | Self::EmptyText => "request",
            Self::InvalidSpeaker { .. } | Self::InvalidSsml { .. } => "request",
            Self::PlaybackDevice { .. } => "playback",
            Self::InvalidInput { .. } => "input",
            Self::Configuration { .. } => "configuration",
            Self::Io { .. } => "io",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for LyrebirdError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for LyrebirdError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LyrebirdError::unknown_model("v9_xx");
        assert_eq!(err.to_string(), "Unknown model 'v9_xx'");

        let err = LyrebirdError::checksum_mismatch("v4_ru", "aa", "bb");
        assert_eq!(err.to_string(), "Checksum mismatch for 'v4_ru': expected aa, got bb");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(LyrebirdError::unknown_model("x").category(), "catalog");
        assert_eq!(LyrebirdError::file_not_found("x").category(), "verification");
        assert_eq!(LyrebirdError::checksum_mismatch("a", "b", "c").category(), "verification");
        assert_eq!(LyrebirdError::download_failed("a", "b").category(), "download");
        assert_eq!(LyrebirdError::load_failed("a", "b").category(), "load");
        assert_eq!(LyrebirdError::NoModelLoaded.category(), "request");
        assert_eq!(LyrebirdError::EmptyText.category(), "request");
        assert_eq!(LyrebirdError::playback_device("x").category(), "playback");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(LyrebirdError::download_failed("a", "timeout").is_retriable());
        assert!(LyrebirdError::playback_device("busy").is_retriable());
        assert!(!LyrebirdError::unknown_model("a").is_retriable());
        assert!(!LyrebirdError::EmptyText.is_retriable());
    }

    #[test]
    fn test_user_errors() {
        assert!(LyrebirdError::EmptyText.is_user_error());
        assert!(LyrebirdError::invalid_speaker("nobody").is_user_error());
        assert!(LyrebirdError::invalid_ssml("half-wrapped").is_user_error());
        assert!(!LyrebirdError::NoModelLoaded.is_user_error());
        assert!(!LyrebirdError::download_failed("a", "b").is_user_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = LyrebirdError::from(io_err);
        assert!(matches!(err, LyrebirdError::Io { .. }));
    }

    #[test]
    fn test_error_equality_and_clone() {
        let err1 = LyrebirdError::load_failed("v3_en", "both strategies failed");
        let err2 = err1.clone();
        assert_eq!(err1, err2);
        assert_ne!(err1, LyrebirdError::load_failed("v3_en", "other"));
    }
}
