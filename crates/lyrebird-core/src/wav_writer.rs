//! WAV export of processed audio buffers.

use crate::audio_processor::AudioBuffer;
use crate::error::{LyrebirdError, LyrebirdResult};
use std::path::Path;
use tracing::info;

/// Write a buffer to `path` as a 32-bit float WAV file.
///
/// The file carries the buffer's own channel count and sample rate.
///
/// # Errors
///
/// Returns an invalid-input error for an empty buffer, or an I/O error if the
/// file cannot be written.
pub fn write_wav<P: AsRef<Path>>(path: P, buffer: &AudioBuffer) -> LyrebirdResult<()> {
    if buffer.is_empty() {
        return Err(LyrebirdError::invalid_input("cannot export an empty buffer"));
    }

    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)
        .map_err(|e| LyrebirdError::io(format!("failed to create WAV file: {e}")))?;
    for sample in buffer.samples() {
        writer
            .write_sample(*sample)
            .map_err(|e| LyrebirdError::io(format!("failed to write WAV sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| LyrebirdError::io(format!("failed to finalize WAV file: {e}")))?;

    info!(
        "Exported {} frames at {} Hz to {:?}",
        buffer.frames(),
        buffer.sample_rate(),
        path.as_ref()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_processor::{process, OutputMode};
    use tempfile::TempDir;

    #[test]
    fn test_write_wav_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");

        let raw: Vec<f32> = (0..480).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let buffer = process(&raw, 1, 48000, OutputMode::Stereo).unwrap();
        write_wav(&path, &buffer).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);

        let samples: Vec<f32> = reader.samples::<f32>().map(Result::unwrap).collect();
        assert_eq!(samples.len(), buffer.samples().len());
        assert_eq!(&samples[..16], &buffer.samples()[..16]);
    }

    #[test]
    fn test_write_wav_rejects_empty_buffer() {
        let dir = TempDir::new().unwrap();
        let buffer = AudioBuffer::new(Vec::new(), 1, 48000).unwrap();
        assert!(write_wav(dir.path().join("empty.wav"), &buffer).is_err());
    }
}
