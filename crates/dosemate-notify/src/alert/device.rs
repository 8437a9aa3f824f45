//! cpal output backends.
//!
//! A cpal stream is not `Send` on every platform, so each playback runs on
//! its own thread that owns the stream. Neither `start` nor `halt` waits on
//! that thread: `start` returns once it is spawned, and a device that fails
//! to open is logged from the thread and leaves the cue silent.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tracing::warn;

use super::{decode_wav, AlertBackend, Clip};
use crate::error::{NotifyError, Result};

type Voice = Box<dyn Iterator<Item = f32> + Send>;

struct Playback {
    stop: Arc<AtomicBool>,
}

impl Playback {
    fn halt(self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn audio_err(e: impl std::fmt::Display) -> NotifyError {
    NotifyError::Audio(e.to_string())
}

fn open_output() -> Result<(cpal::Device, StreamConfig)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| audio_err("no output device"))?;
    let supported = device.default_output_config().map_err(audio_err)?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(audio_err(format!(
            "unsupported sample format {:?}",
            supported.sample_format()
        )));
    }
    Ok((device, supported.config()))
}

/// Render `make_voice(sample_rate)` on the default output device from a
/// dedicated thread.
fn spawn_playback<F>(make_voice: F) -> Result<Playback>
where
    F: FnOnce(u32) -> Voice + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();

    thread::Builder::new()
        .name("dosemate-alert".into())
        .spawn(move || {
            if let Err(e) = render(make_voice, &thread_stop) {
                warn!(error = %e, "alert playback failed");
            }
        })
        .map_err(audio_err)?;

    Ok(Playback { stop })
}

/// Open the device and play until the voice runs out or `stop` is set.
fn render<F>(make_voice: F, stop: &Arc<AtomicBool>) -> Result<()>
where
    F: FnOnce(u32) -> Voice,
{
    let (device, config) = open_output()?;
    let channels = config.channels as usize;
    let mut voice = make_voice(config.sample_rate.0);
    let finished = Arc::new(AtomicBool::new(false));
    let cb_finished = finished.clone();
    let cb_stop = stop.clone();

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = if cb_stop.load(Ordering::Relaxed) {
                        None
                    } else {
                        voice.next()
                    };
                    let value = sample.unwrap_or_else(|| {
                        cb_finished.store(true, Ordering::Relaxed);
                        0.0
                    });
                    frame.fill(value);
                }
            },
            |err| warn!(error = %err, "alert stream error"),
            None,
        )
        .map_err(audio_err)?;
    stream.play().map_err(audio_err)?;

    while !finished.load(Ordering::Relaxed) && !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

/// Plays a pre-loaded WAV clip.
pub struct ClipBackend {
    clip: std::result::Result<Clip, String>,
    volume: f32,
    playback: Option<Playback>,
}

impl ClipBackend {
    /// Load the clip now. A missing or undecodable file is remembered and
    /// reported by every `start`, which sends the player to its fallback.
    pub fn load(path: &Path, volume: f32) -> Self {
        let clip = std::fs::read(path)
            .map_err(|e| format!("{}: {}", path.display(), e))
            .and_then(|bytes| decode_wav(&bytes).map_err(|e| e.to_string()));
        if let Err(e) = &clip {
            warn!(error = %e, "alert clip unavailable");
        }
        Self {
            clip,
            volume,
            playback: None,
        }
    }
}

impl AlertBackend for ClipBackend {
    fn name(&self) -> &str {
        "clip"
    }

    fn start(&mut self) -> Result<()> {
        self.halt();
        let clip = self.clip.clone().map_err(NotifyError::Audio)?;
        let volume = self.volume;
        self.playback = Some(spawn_playback(move |rate| {
            let step = clip.sample_rate as f64 / rate as f64;
            let samples = clip.samples;
            let mut pos = 0.0f64;
            Box::new(std::iter::from_fn(move || {
                let sample = samples.get(pos as usize).copied()?;
                pos += step;
                Some(sample * volume)
            }))
        })?);
        Ok(())
    }

    fn halt(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.halt();
        }
    }
}

/// Synthesized sine beep with a short attack and linear release.
pub struct ToneBackend {
    hz: f32,
    duration: Duration,
    volume: f32,
    playback: Option<Playback>,
}

impl ToneBackend {
    pub fn new(hz: f32, duration_ms: u64, volume: f32) -> Self {
        Self {
            hz,
            duration: Duration::from_millis(duration_ms),
            volume,
            playback: None,
        }
    }
}

impl AlertBackend for ToneBackend {
    fn name(&self) -> &str {
        "tone"
    }

    fn start(&mut self) -> Result<()> {
        self.halt();
        let (hz, volume, duration) = (self.hz, self.volume, self.duration);
        self.playback = Some(spawn_playback(move |rate| {
            let rate = rate as f32;
            let total = (duration.as_secs_f32() * rate) as usize;
            let attack = ((0.01 * rate) as usize).max(1);
            Box::new((0..total).map(move |n| {
                let t = n as f32 / rate;
                let envelope = if n < attack {
                    n as f32 / attack as f32
                } else {
                    1.0 - (n - attack) as f32 / (total - attack).max(1) as f32
                };
                (2.0 * std::f32::consts::PI * hz * t).sin() * volume * envelope
            }))
        })?);
        Ok(())
    }

    fn halt(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.halt();
        }
    }
}
