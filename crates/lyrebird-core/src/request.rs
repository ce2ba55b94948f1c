//! Synthesis request building: text sanitization, speaker and sample-rate
//! negotiation, and the SSML policy.
//!
//! A [`SynthesisRequest`] is built fresh for every call and never reused.
//! Validation failures are reported as distinct error variants so callers can
//! react specifically (re-prompt only for text, for example).

use crate::catalog::ModelDescriptor;
use crate::error::{LyrebirdError, LyrebirdResult};
use unicode_normalization::UnicodeNormalization;

/// A validated, immutable synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    /// Sanitized input text (SSML markup retained only when `ssml` is true)
    pub text: String,
    /// Resolved speaker identifier, guaranteed to be in the model's set
    pub speaker: String,
    /// Resolved sample rate, guaranteed to be allowed by the model
    pub sample_rate: u32,
    /// Whether `text` is to be interpreted as SSML
    pub ssml: bool,
}

/// Caller preferences for one synthesis request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Requested speaker; empty or unknown falls back to the model's first
    pub speaker: Option<String>,
    /// Requested sample rate; honored only if the model supports overriding
    pub sample_rate: Option<u32>,
    /// Whether the caller wants SSML interpretation
    pub ssml: bool,
}

/// Builds validated requests against one model's capability descriptor.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    descriptor: Option<&'a ModelDescriptor>,
}

impl<'a> RequestBuilder<'a> {
    /// Create a builder over the current model's descriptor, or `None` when
    /// no model is loaded.
    #[must_use]
    pub fn new(descriptor: Option<&'a ModelDescriptor>) -> Self {
        Self { descriptor }
    }

    /// Build a request from raw text and caller options.
    ///
    /// # Errors
    ///
    /// - [`LyrebirdError::NoModelLoaded`] when no descriptor is present
    /// - [`LyrebirdError::EmptyText`] when the sanitized text is empty
    /// - [`LyrebirdError::InvalidSsml`] when SSML was requested on a
    ///   supporting model but the `<speak>` wrapping is half-formed
    pub fn build(&self, raw_text: &str, options: &RequestOptions) -> LyrebirdResult<SynthesisRequest> {
        let descriptor = self.descriptor.ok_or(LyrebirdError::NoModelLoaded)?;

        let text = sanitize_text(raw_text);
        if text.is_empty() {
            return Err(LyrebirdError::EmptyText);
        }

        let speaker = resolve_speaker(descriptor, options.speaker.as_deref());
        let sample_rate = resolve_sample_rate(descriptor, options.sample_rate);

        let wrapped = is_speak_wrapped(&text);
        let effective_ssml = descriptor.supports_ssml && options.ssml && wrapped;

        let text = if effective_ssml {
            text
        } else {
            if options.ssml && descriptor.supports_ssml && is_half_wrapped(&text) {
                return Err(LyrebirdError::invalid_ssml(
                    "text must be wrapped in <speak>...</speak>",
                ));
            }
            let stripped = strip_ssml(&text);
            if stripped.trim().is_empty() {
                return Err(LyrebirdError::EmptyText);
            }
            stripped
        };

        Ok(SynthesisRequest {
            text,
            speaker,
            sample_rate,
            ssml: effective_ssml,
        })
    }
}

/// NFC-normalize, trim, and collapse internal newlines to single spaces.
#[must_use]
pub fn sanitize_text(raw: &str) -> String {
    let normalized: String = raw.nfc().collect();
    normalized
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove all recognized SSML markers from `text`.
///
/// Recognized markers are `<speak>`, `</speak>`, `<prosody ...>`,
/// `</prosody>`, `<break .../>`, `<say-as ...>` and `</say-as>`. The result
/// is a fixpoint: stripping twice equals stripping once.
#[must_use]
pub fn strip_ssml(text: &str) -> String {
    let mut current = text.to_string();
    // Removing a tag can butt adjacent characters together into a new tag
    // ("<<speak>speak>" becomes "<speak>"), so iterate to a fixpoint.
    loop {
        let next = strip_ssml_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_ssml_once(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match recognized_tag_len(rest) {
            Some(len) => rest = &rest[len..],
            None => {
                out.push('<');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Length of the recognized SSML tag at the start of `s`, if any.
fn recognized_tag_len(s: &str) -> Option<usize> {
    const CLOSING: [&str; 3] = ["</speak>", "</prosody>", "</say-as>"];
    for tag in CLOSING {
        if s.starts_with(tag) {
            return Some(tag.len());
        }
    }

    const OPENING: [&str; 4] = ["<speak", "<prosody", "<break", "<say-as"];
    for tag in OPENING {
        if let Some(after) = s.strip_prefix(tag) {
            // The tag name must end here; "<speaker>" is not "<speak>"
            let boundary = after
                .chars()
                .next()
                .is_some_and(|c| c == '>' || c == '/' || c.is_whitespace());
            if !boundary {
                continue;
            }
            // An unterminated tag is left in place rather than guessed at
            let end = s.find('>')?;
            return Some(end + 1);
        }
    }
    None
}

fn is_speak_wrapped(text: &str) -> bool {
    text.starts_with("<speak>")
        && text.ends_with("</speak>")
        && text.len() > "<speak></speak>".len()
}

fn is_half_wrapped(text: &str) -> bool {
    text.starts_with("<speak>") != text.ends_with("</speak>")
}

fn resolve_speaker(descriptor: &ModelDescriptor, requested: Option<&str>) -> String {
    match requested {
        Some(speaker) if !speaker.is_empty() && descriptor.has_speaker(speaker) => {
            speaker.to_string()
        }
        _ => descriptor.default_speaker().to_string(),
    }
}

fn resolve_sample_rate(descriptor: &ModelDescriptor, requested: Option<u32>) -> u32 {
    if !descriptor.supports_sample_rate_override {
        return descriptor.default_rate;
    }
    match requested {
        Some(rate) if descriptor.sample_rates.contains(&rate) => rate,
        _ => descriptor.default_rate,
    }
}
