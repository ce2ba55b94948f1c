//! Exclusive, cancellable audio playback with position tracking.
//!
//! Only one playback stream may be active at a time; starting a new one stops
//! the old stream synchronously first, so two device writers never coexist.
//! Device writes happen on a dedicated thread in fixed-size chunks; the stop
//! flag is checked at every chunk boundary, which bounds cancellation latency
//! without requiring the device to support mid-buffer aborts. Position is
//! derived from wall-clock time elapsed since the playback origin divided by
//! total duration and recomputed at ~60 Hz on a ticker thread.

use crate::audio_processor::AudioBuffer;
use crate::error::{LyrebirdError, LyrebirdResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Frames written to the device per chunk
const CHUNK_FRAMES: usize = 1024;

/// Position recomputation period (~60 Hz)
const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Playback state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No stream is active
    Idle,
    /// A stream is writing to the device
    Playing,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Playing => write!(f, "Playing"),
        }
    }
}

/// Cursor position report delivered to the position callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    /// Progress through the buffer in [0, 1]
    pub progress: f64,
    /// Elapsed playback time in seconds
    pub elapsed_secs: f64,
    /// Total buffer duration in seconds
    pub duration_secs: f64,
}

/// Thread-safe callback receiving position updates while playing.
pub type PositionCallback = Arc<dyn Fn(PlaybackPosition) + Send + Sync>;

/// An open output stream on an audio device.
pub trait SinkStream: Send {
    /// Write one chunk of interleaved frames, blocking until accepted.
    ///
    /// # Errors
    ///
    /// Returns a device error; the controller stops playback and preserves
    /// the buffer for retry.
    fn write(&mut self, interleaved: &[f32]) -> LyrebirdResult<()>;
}

/// An audio output device capable of opening playback streams.
pub trait AudioSink: Send + Sync {
    /// Open a stream for the given format.
    ///
    /// # Errors
    ///
    /// Returns a device error if the format is unsupported or the device is
    /// unavailable.
    fn open(&self, sample_rate: u32, channels: u16) -> LyrebirdResult<Box<dyn SinkStream>>;
}

struct ActiveStream {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    writer: std::thread::JoinHandle<()>,
    ticker: std::thread::JoinHandle<()>,
    error: Arc<Mutex<Option<LyrebirdError>>>,
}

/// Manages exclusive playback of processed audio buffers.
pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    on_position: Option<PositionCallback>,
    active: Mutex<Option<ActiveStream>>,
    // Retained across stop() so the same audio can be replayed or exported
    buffer: Mutex<Option<Arc<AudioBuffer>>>,
    last_error: Mutex<Option<LyrebirdError>>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    /// Create a controller over an output device.
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            on_position: None,
            active: Mutex::new(None),
            buffer: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Attach a callback receiving ~60 Hz position updates while playing.
    #[must_use]
    pub fn with_position_callback(mut self, callback: PositionCallback) -> Self {
        self.on_position = Some(callback);
        self
    }

    /// Start playing a buffer from its beginning.
    ///
    /// Any active stream is stopped synchronously before the new one starts.
    ///
    /// # Errors
    ///
    /// Returns [`LyrebirdError::PlaybackDevice`] if the device stream cannot
    /// be opened, or an invalid-input error for an empty buffer.
    pub fn start(&self, buffer: AudioBuffer) -> LyrebirdResult<()> {
        if buffer.is_empty() {
            return Err(LyrebirdError::invalid_input("audio buffer is empty"));
        }
        self.stop_active();
        *self.buffer.lock() = Some(Arc::new(buffer));
        self.start_from(0)
    }

    /// Replay the retained buffer from its beginning.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error if no buffer has been played yet, or a
    /// device error if the stream cannot be opened.
    pub fn replay(&self) -> LyrebirdResult<()> {
        self.stop_active();
        self.start_from(0)
    }

    /// Stop playback and reset position reporting to zero.
    ///
    /// The buffer is retained for replay or export. Cancellation takes effect
    /// at the next chunk boundary.
    pub fn stop(&self) {
        if self.stop_active() {
            info!("Playback stopped");
        }
        if let Some(callback) = &self.on_position {
            let duration = self
                .buffer
                .lock()
                .as_ref()
                .map_or(0.0, |b| b.duration_secs());
            callback(PlaybackPosition {
                progress: 0.0,
                elapsed_secs: 0.0,
                duration_secs: duration,
            });
        }
    }

    /// Restart the active stream at a frame offset.
    ///
    /// A no-op when nothing is playing; the elapsed-time origin shifts so
    /// position reports stay consistent with the new offset.
    ///
    /// # Errors
    ///
    /// Returns a device error if the replacement stream cannot be opened.
    pub fn seek(&self, frame: usize) -> LyrebirdResult<()> {
        if self.state() != PlaybackState::Playing {
            debug!("Seek ignored while idle");
            return Ok(());
        }
        self.stop_active();
        self.start_from(frame)
    }

    /// Current playback state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        let active = self.active.lock();
        match active.as_ref() {
            Some(stream)
                if !stream.stop.load(Ordering::SeqCst)
                    && !stream.finished.load(Ordering::SeqCst) =>
            {
                PlaybackState::Playing
            }
            _ => PlaybackState::Idle,
        }
    }

    /// The device error that ended the last stream, if any.
    pub fn take_error(&self) -> Option<LyrebirdError> {
        self.last_error.lock().take()
    }

    /// The buffer most recently handed to [`Self::start`], if any.
    pub fn current_buffer(&self) -> Option<Arc<AudioBuffer>> {
        self.buffer.lock().clone()
    }

    /// Stop and join the active stream. Returns true if one was running.
    fn stop_active(&self) -> bool {
        let Some(stream) = self.active.lock().take() else {
            return false;
        };
        stream.stop.store(true, Ordering::SeqCst);
        // Synchronous: the device writer must be gone before a new stream
        // may start.
        if stream.writer.join().is_err() {
            warn!("Playback writer thread panicked");
        }
        if stream.ticker.join().is_err() {
            warn!("Playback ticker thread panicked");
        }
        if let Some(err) = stream.error.lock().take() {
            *self.last_error.lock() = Some(err);
        }
        true
    }

    fn start_from(&self, offset_frames: usize) -> LyrebirdResult<()> {
        let buffer = self
            .buffer
            .lock()
            .clone()
            .ok_or_else(|| LyrebirdError::invalid_input("no audio buffer to play"))?;

        let total_frames = buffer.frames();
        let offset_frames = offset_frames.min(total_frames);
        let duration_secs = buffer.duration_secs();

        let stream = self
            .sink
            .open(buffer.sample_rate(), buffer.channels())
            .map_err(|e| {
                warn!("Failed to open playback stream: {}", e);
                e
            })?;

        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let error: Arc<Mutex<Option<LyrebirdError>>> = Arc::new(Mutex::new(None));

        // Shift the origin so elapsed time reflects the seek offset
        let offset_secs = if buffer.sample_rate() > 0 {
            offset_frames as f64 / f64::from(buffer.sample_rate())
        } else {
            0.0
        };
        let origin = Instant::now() - Duration::from_secs_f64(offset_secs);

        let writer = {
            let buffer = Arc::clone(&buffer);
            let stop = Arc::clone(&stop);
            let finished = Arc::clone(&finished);
            let error = Arc::clone(&error);
            std::thread::spawn(move || {
                let mut stream = stream;
                let width = buffer.channels() as usize;
                let samples = &buffer.samples()[offset_frames * width..];
                for chunk in samples.chunks(CHUNK_FRAMES * width) {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = stream.write(chunk) {
                        warn!("Device write failed: {}", e);
                        *error.lock() = Some(e);
                        break;
                    }
                }
                finished.store(true, Ordering::SeqCst);
            })
        };

        let ticker = {
            let stop = Arc::clone(&stop);
            let finished = Arc::clone(&finished);
            let callback = self.on_position.clone();
            std::thread::spawn(move || loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                // Sample the writer flag before reporting so the final tick
                // still fires when the writer ends (drained or device error).
                let writer_done = finished.load(Ordering::SeqCst);
                let elapsed = origin.elapsed().as_secs_f64();
                let progress = if duration_secs > 0.0 {
                    (elapsed / duration_secs).min(1.0)
                } else {
                    1.0
                };
                if let Some(callback) = &callback {
                    callback(PlaybackPosition {
                        progress,
                        elapsed_secs: elapsed.min(duration_secs),
                        duration_secs,
                    });
                }
                if writer_done {
                    break;
                }
                std::thread::sleep(TICK_INTERVAL);
            })
        };

        *self.active.lock() = Some(ActiveStream {
            stop,
            finished,
            writer,
            ticker,
            error,
        });
        debug!("Playback started at frame {}", offset_frames);
        Ok(())
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop_active();
    }
}
