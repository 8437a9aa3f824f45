//! Audible alert cue for newly active reminders.
//!
//! [`AlertPlayer`] plays a pre-loaded clip and falls back to a synthesized
//! beep when the clip cannot be played. Failures never reach the caller:
//! the worst case is silence.
//!
//! Device backends live behind the `audio` feature. Without it, or with
//! alerts disabled in config, both slots hold a [`SilentBackend`].

use std::io::Cursor;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::AlertConfig;
use crate::error::{NotifyError, Result};

#[cfg(feature = "audio")]
mod device;

#[cfg(feature = "audio")]
pub use device::{ClipBackend, ToneBackend};

/// One way of making a sound.
pub trait AlertBackend: Send {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Begin playback from the start. Returns an error if playback could not
    /// begin at all.
    fn start(&mut self) -> Result<()>;

    /// Stop playback and rewind. Must be safe when nothing is playing.
    fn halt(&mut self);
}

/// Backend that never makes a sound.
#[derive(Debug, Default)]
pub struct SilentBackend;

impl AlertBackend for SilentBackend {
    fn name(&self) -> &str {
        "silent"
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn halt(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playing {
    Primary,
    Fallback,
}

/// Clip-with-fallback alert player.
pub struct AlertPlayer {
    primary: Box<dyn AlertBackend>,
    fallback: Box<dyn AlertBackend>,
    playing: Option<Playing>,
}

impl AlertPlayer {
    pub fn new(primary: Box<dyn AlertBackend>, fallback: Box<dyn AlertBackend>) -> Self {
        Self {
            primary,
            fallback,
            playing: None,
        }
    }

    /// A player that never makes a sound.
    pub fn silent() -> Self {
        Self::new(Box::new(SilentBackend), Box::new(SilentBackend))
    }

    /// Pick backends for the running machine.
    #[cfg(feature = "audio")]
    pub fn from_config(config: &AlertConfig) -> Self {
        if !config.enabled {
            return Self::silent();
        }
        Self::new(
            Box::new(ClipBackend::load(&config.clip_path, config.volume)),
            Box::new(ToneBackend::new(config.tone_hz, config.tone_ms, config.volume)),
        )
    }

    /// Pick backends for the running machine.
    #[cfg(not(feature = "audio"))]
    pub fn from_config(config: &AlertConfig) -> Self {
        if config.enabled {
            debug!("built without the audio feature, alerts are silent");
        }
        Self::silent()
    }

    /// Play the cue, restarting it if already playing.
    pub fn play(&mut self) {
        self.stop();
        match self.primary.start() {
            Ok(()) => {
                debug!(backend = self.primary.name(), "alert playing");
                self.playing = Some(Playing::Primary);
            }
            Err(e) => {
                debug!(backend = self.primary.name(), error = %e, "alert clip failed, using fallback");
                self.primary.halt();
                match self.fallback.start() {
                    Ok(()) => self.playing = Some(Playing::Fallback),
                    Err(e) => warn!(backend = self.fallback.name(), error = %e, "fallback alert failed"),
                }
            }
        }
    }

    /// Stop whatever is playing. Safe when idle.
    pub fn stop(&mut self) {
        match self.playing.take() {
            Some(Playing::Primary) => self.primary.halt(),
            Some(Playing::Fallback) => self.fallback.halt(),
            None => {}
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }
}

impl Drop for AlertPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decoded mono PCM clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub sample_rate: u32,
    pub samples: Arc<[f32]>,
}

/// Decode a WAV file into a mono clip. Integer PCM of any width and 32-bit
/// float are accepted; multi-channel audio is mixed down.
pub fn decode_wav(bytes: &[u8]) -> Result<Clip> {
    let bad = |e: hound::Error| NotifyError::Audio(format!("invalid WAV: {}", e));

    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(bad)?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(NotifyError::Audio("invalid WAV: zero channels or sample rate".into()));
    }

    let frames: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(bad)?,
        hound::SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(bad)?
        }
    };

    let channels = spec.channels as usize;
    let samples: Vec<f32> = frames
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok(Clip {
        sample_rate: spec.sample_rate,
        samples: samples.into(),
    })
}
