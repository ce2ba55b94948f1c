//! Post-processing of raw synthesized waveforms.
//!
//! The pipeline is pure and deterministic: reshape to frames x channels,
//! peak-normalize with headroom, prepend a fixed leading silence, then shape
//! channels for the requested output mode.

use crate::error::{LyrebirdError, LyrebirdResult};

/// Normalization target: full scale minus 5% headroom
pub const PEAK_TARGET: f32 = 0.95;

/// Leading silence prepended to every processed buffer, in seconds.
///
/// Gives playback cursors and waveform views a stable reference point.
pub const LEAD_SILENCE_SECS: f64 = 0.05;

/// Requested channel layout of the processed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Average all channels into one
    Mono,
    /// Duplicate mono into two channels; stereo passes through unchanged
    Stereo,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mono => write!(f, "mono"),
            Self::Stereo => write!(f, "stereo"),
        }
    }
}

/// A frames x channels sample matrix with its sample rate.
///
/// Samples are interleaved f32 in [-1, 1]. Ownership passes to the caller
/// (playback or export) once post-processing is done.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error if `channels` is zero or the sample
    /// count is not a whole number of frames.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> LyrebirdResult<Self> {
        if channels == 0 {
            return Err(LyrebirdError::invalid_input("channel count must be non-zero"));
        }
        if samples.len() % channels as usize != 0 {
            return Err(LyrebirdError::invalid_input(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Interleaved sample data.
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate in Hz.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Whether the buffer holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Largest absolute sample value.
    #[must_use]
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    /// One frame of interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.frames()`.
    #[must_use]
    pub fn frame(&self, index: usize) -> &[f32] {
        let width = self.channels as usize;
        &self.samples[index * width..(index + 1) * width]
    }
}

/// Number of silent frames prepended at a given sample rate.
#[must_use]
pub fn lead_silence_frames(sample_rate: u32) -> usize {
    (LEAD_SILENCE_SECS * f64::from(sample_rate)).round() as usize
}

/// Run the full post-processing pipeline over raw synthesized samples.
///
/// `raw` is interleaved with `channels` channels; mono input is a
/// single-column matrix. The result is normalized to [`PEAK_TARGET`] (a fully
/// silent buffer is left unscaled), padded with [`LEAD_SILENCE_SECS`] of
/// leading silence, and channel-shaped per `mode`.
///
/// # Errors
///
/// Returns an invalid-input error for a zero channel count or a ragged
/// sample matrix.
pub fn process(
    raw: &[f32],
    channels: u16,
    sample_rate: u32,
    mode: OutputMode,
) -> LyrebirdResult<AudioBuffer> {
    let buffer = AudioBuffer::new(raw.to_vec(), channels, sample_rate)?;
    let buffer = normalize(buffer);
    let buffer = prepend_silence(buffer);
    Ok(shape_channels(buffer, mode))
}

/// Scale the buffer so its peak equals [`PEAK_TARGET`].
///
/// A fully silent buffer is returned unscaled.
fn normalize(mut buffer: AudioBuffer) -> AudioBuffer {
    let peak = buffer.peak();
    if peak > 0.0 {
        let gain = PEAK_TARGET / peak;
        for sample in &mut buffer.samples {
            *sample *= gain;
        }
    }
    buffer
}

fn prepend_silence(buffer: AudioBuffer) -> AudioBuffer {
    let silence_frames = lead_silence_frames(buffer.sample_rate);
    let width = buffer.channels as usize;
    let mut samples = vec![0.0_f32; silence_frames * width];
    samples.extend_from_slice(&buffer.samples);
    AudioBuffer {
        samples,
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
    }
}

fn shape_channels(buffer: AudioBuffer, mode: OutputMode) -> AudioBuffer {
    match (mode, buffer.channels) {
        (OutputMode::Mono, 1) | (OutputMode::Stereo, 2) => buffer,
        (OutputMode::Mono, _) => downmix_mono(buffer),
        (OutputMode::Stereo, 1) => {
            let mut samples = Vec::with_capacity(buffer.samples.len() * 2);
            for sample in &buffer.samples {
                samples.push(*sample);
                samples.push(*sample);
            }
            AudioBuffer {
                samples,
                channels: 2,
                sample_rate: buffer.sample_rate,
            }
        }
        // Surround sources collapse to mono first, then duplicate
        (OutputMode::Stereo, _) => shape_channels(downmix_mono(buffer), OutputMode::Stereo),
    }
}

fn downmix_mono(buffer: AudioBuffer) -> AudioBuffer {
    let width = buffer.channels as usize;
    let samples = buffer
        .samples
        .chunks_exact(width)
        .map(|frame| frame.iter().sum::<f32>() / width as f32)
        .collect();
    AudioBuffer {
        samples,
        channels: 1,
        sample_rate: buffer.sample_rate,
    }
}
