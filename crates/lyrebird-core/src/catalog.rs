//! Static registry of speech-model descriptors and their capabilities.
//!
//! Descriptors are validated when the catalog is constructed; an invalid
//! descriptor fails catalog construction entirely, so every other component
//! can assume validity and never probe capability fields at call time.

use crate::error::{LyrebirdError, LyrebirdResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Immutable capability record for one synthesis model variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Catalog name of the model (e.g. `v4_ru`)
    pub name: String,
    /// Artifact filename inside the cache directory
    pub file: String,
    /// Fixed source URL for the artifact
    pub url: String,
    /// Expected SHA-256 of the artifact, hex, compared case-insensitively
    pub sha256: String,
    /// Ordered list of sample rates the model can synthesize at
    pub sample_rates: Vec<u32>,
    /// Sample rate used when no override applies
    pub default_rate: u32,
    /// Ordered speaker identifiers; the first is the fallback speaker
    pub speakers: Vec<String>,
    /// BCP-47-ish language tag (e.g. `ru`)
    pub language: String,
    /// Whether a caller-requested sample rate is honored
    #[serde(default)]
    pub supports_sample_rate_override: bool,
    /// Whether SSML markup is honored
    #[serde(default)]
    pub supports_ssml: bool,
}

impl ModelDescriptor {
    /// Validate the construction invariants of this descriptor.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending field if the
    /// descriptor is incomplete or inconsistent.
    pub fn validate(&self) -> LyrebirdResult<()> {
        if self.name.is_empty() {
            return Err(LyrebirdError::configuration("descriptor has empty name"));
        }
        if self.file.is_empty() || self.url.is_empty() || self.sha256.is_empty() {
            return Err(LyrebirdError::configuration(format!(
                "descriptor '{}' is missing file, url or sha256",
                self.name
            )));
        }
        if self.speakers.is_empty() {
            return Err(LyrebirdError::configuration(format!(
                "descriptor '{}' has no speakers",
                self.name
            )));
        }
        if self.sample_rates.is_empty() {
            return Err(LyrebirdError::configuration(format!(
                "descriptor '{}' has no sample rates",
                self.name
            )));
        }
        if !self.sample_rates.contains(&self.default_rate) {
            return Err(LyrebirdError::configuration(format!(
                "descriptor '{}': default rate {} is not in the allowed list",
                self.name, self.default_rate
            )));
        }
        Ok(())
    }

    /// First speaker in the ordered list, used as the deterministic fallback.
    #[must_use]
    pub fn default_speaker(&self) -> &str {
        // Non-empty by construction invariant
        &self.speakers[0]
    }

    /// Check whether a speaker identifier belongs to this model.
    #[must_use]
    pub fn has_speaker(&self, speaker: &str) -> bool {
        self.speakers.iter().any(|s| s == speaker)
    }
}

/// On-disk manifest shape for [`ModelCatalog::from_toml_file`].
#[derive(Debug, Deserialize)]
struct CatalogManifest {
    models: Vec<ModelDescriptor>,
}

static BUILTIN_DESCRIPTORS: Lazy<Vec<ModelDescriptor>> = Lazy::new(|| {
    vec![
        ModelDescriptor {
            name: "v3_en".to_string(),
            file: "v3_en.pt".to_string(),
            url: "https://models.silero.ai/models/tts/en/v3_en.pt".to_string(),
            sha256: "02B71034D9F13BC4001195017BAC9DB1C6BB6115E03FEA52983E8ABCFF13B665".to_string(),
            sample_rates: vec![8000, 24000, 48000],
            default_rate: 48000,
            speakers: (0..118).map(|i| format!("en_{i}")).collect(),
            language: "en".to_string(),
            supports_sample_rate_override: true,
            supports_ssml: false,
        },
        ModelDescriptor {
            name: "v3_1_ru".to_string(),
            file: "v3_1_ru.pt".to_string(),
            url: "https://models.silero.ai/models/tts/ru/v3_1_ru.pt".to_string(),
            sha256: "CF60B47EC8A9C31046021D2D14B962EA56B8A5BF7061C98ACCAAACA428522F85".to_string(),
            sample_rates: vec![8000, 24000, 48000],
            default_rate: 48000,
            speakers: ["aidar", "baya", "kseniya", "xenia", "eugene", "random"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            language: "ru".to_string(),
            supports_sample_rate_override: true,
            supports_ssml: false,
        },
        ModelDescriptor {
            name: "v4_ru".to_string(),
            file: "v4_ru.pt".to_string(),
            url: "https://models.silero.ai/models/tts/ru/v4_ru.pt".to_string(),
            sha256: "896AB96347D5BD781AB97959D4FD6885620E5AAB52405D3445626EB7C1414B00".to_string(),
            sample_rates: vec![8000, 24000, 48000],
            default_rate: 48000,
            speakers: ["aidar", "baya", "kseniya", "xenia", "eugene", "random"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            language: "ru".to_string(),
            supports_sample_rate_override: true,
            supports_ssml: true,
        },
    ]
});

/// Registry of model descriptors, loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    // Insertion order preserved separately so listing stays deterministic
    order: Vec<String>,
    descriptors: HashMap<String, ModelDescriptor>,
}

impl ModelCatalog {
    /// Create a catalog from a set of descriptors.
    ///
    /// # Errors
    ///
    /// Fails entirely if any descriptor is invalid or duplicated; a catalog is
    /// never partially constructed.
    pub fn new(descriptors: Vec<ModelDescriptor>) -> LyrebirdResult<Self> {
        let mut order = Vec::with_capacity(descriptors.len());
        let mut map = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            descriptor.validate()?;
            if map.contains_key(&descriptor.name) {
                return Err(LyrebirdError::configuration(format!(
                    "duplicate descriptor '{}'",
                    descriptor.name
                )));
            }
            order.push(descriptor.name.clone());
            map.insert(descriptor.name.clone(), descriptor);
        }
        Ok(Self {
            order,
            descriptors: map,
        })
    }

    /// Catalog of the built-in Silero model variants.
    ///
    /// # Panics
    ///
    /// Never panics; the built-in descriptors are covered by tests.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(BUILTIN_DESCRIPTORS.clone()).expect("built-in descriptors are valid")
    }

    /// Load a catalog from a TOML manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or contains an
    /// invalid descriptor.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> LyrebirdResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let manifest: CatalogManifest = toml::from_str(&raw)?;
        Self::new(manifest.models)
    }

    /// Look up a descriptor by model name.
    ///
    /// # Errors
    ///
    /// Returns [`LyrebirdError::UnknownModel`] if the name is not registered.
    pub fn describe(&self, name: &str) -> LyrebirdResult<&ModelDescriptor> {
        self.descriptors
            .get(name)
            .ok_or_else(|| LyrebirdError::unknown_model(name))
    }

    /// Model names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Iterate descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.order.iter().filter_map(|n| self.descriptors.get(n))
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_descriptor() -> ModelDescriptor {
        ModelDescriptor {
            name: "test_model".to_string(),
            file: "test_model.pt".to_string(),
            url: "https://example.com/test_model.pt".to_string(),
            sha256: "ab".repeat(32),
            sample_rates: vec![8000, 24000, 48000],
            default_rate: 48000,
            speakers: vec!["alpha".to_string(), "beta".to_string()],
            language: "en".to_string(),
            supports_sample_rate_override: true,
            supports_ssml: false,
        }
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.names(), &["v3_en", "v3_1_ru", "v4_ru"]);

        let v4 = catalog.describe("v4_ru").unwrap();
        assert!(v4.supports_ssml);
        assert_eq!(v4.default_speaker(), "aidar");
        assert_eq!(v4.default_rate, 48000);

        let v3_en = catalog.describe("v3_en").unwrap();
        assert!(!v3_en.supports_ssml);
        assert_eq!(v3_en.speakers.len(), 118);
        assert_eq!(v3_en.default_speaker(), "en_0");
    }

    #[test]
    fn test_describe_unknown_model() {
        let catalog = ModelCatalog::builtin();
        let err = catalog.describe("v9_xx").unwrap_err();
        assert_eq!(err, LyrebirdError::unknown_model("v9_xx"));
    }

    #[test]
    fn test_default_rate_must_be_allowed() {
        let mut descriptor = test_descriptor();
        descriptor.default_rate = 96000;
        let err = ModelCatalog::new(vec![descriptor]).unwrap_err();
        assert!(matches!(err, LyrebirdError::Configuration { .. }));
    }

    #[test]
    fn test_empty_speakers_rejected() {
        let mut descriptor = test_descriptor();
        descriptor.speakers.clear();
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_invalid_descriptor_fails_whole_catalog() {
        let good = test_descriptor();
        let mut bad = test_descriptor();
        bad.name = "broken".to_string();
        bad.speakers.clear();
        let result = ModelCatalog::new(vec![good, bad]);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ModelCatalog::new(vec![test_descriptor(), test_descriptor()]);
        assert!(matches!(result, Err(LyrebirdError::Configuration { .. })));
    }

    #[test]
    fn test_has_speaker() {
        let descriptor = test_descriptor();
        assert!(descriptor.has_speaker("alpha"));
        assert!(descriptor.has_speaker("beta"));
        assert!(!descriptor.has_speaker("gamma"));
    }

    #[test]
    fn test_from_toml_file() {
        let manifest = r#"
            [[models]]
            name = "tiny"
            file = "tiny.pt"
            url = "https://example.com/tiny.pt"
            sha256 = "00ff"
            sample_rates = [24000]
            default_rate = 24000
            speakers = ["solo"]
            language = "en"
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.toml");
        std::fs::write(&path, manifest).unwrap();

        let catalog = ModelCatalog::from_toml_file(&path).unwrap();
        let tiny = catalog.describe("tiny").unwrap();
        assert!(!tiny.supports_sample_rate_override);
        assert!(!tiny.supports_ssml);
        assert_eq!(tiny.default_speaker(), "solo");
    }

    #[test]
    fn test_from_toml_file_rejects_bad_manifest() {
        let manifest = r#"
            [[models]]
            name = "broken"
            file = "broken.pt"
            url = "https://example.com/broken.pt"
            sha256 = "00ff"
            sample_rates = [24000]
            default_rate = 48000
            speakers = ["solo"]
            language = "en"
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.toml");
        std::fs::write(&path, manifest).unwrap();

        assert!(ModelCatalog::from_toml_file(&path).is_err());
    }
}
