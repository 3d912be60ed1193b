use crate::audio::wav::read_wav_mono;
use crate::speech::asset::{AssetFormat, AssetSource, SynthesizedAsset};
use crate::speech::playback::Player;
use crate::{Result, ZadeError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// Extra time allowed past the clip's nominal length before giving up
const PLAYBACK_GRACE: Duration = Duration::from_millis(500);

/// Margin added to the final buffer period before the stream is dropped
const TAIL_MARGIN: Duration = Duration::from_millis(20);

/// Upper bound on the wait for the last buffer to reach the speaker
const MAX_TAIL: Duration = Duration::from_millis(500);

/// Time for the final device buffer of `period_frames` to play out
///
/// The last samples are handed to the device one callback before they are
/// heard, so the stream must outlive that buffer.
fn tail_delay(period_frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return TAIL_MARGIN;
    }
    let period = Duration::from_secs_f64(period_frames as f64 / f64::from(sample_rate));
    (period + TAIL_MARGIN).min(MAX_TAIL)
}

/// Plays assets on the default output device
pub struct DevicePlayer {
    device: Device,
}

impl DevicePlayer {
    /// Create a player bound to the default output device
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| ZadeError::AudioDeviceError("No output device available".into()))?;

        info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        Ok(Self { device })
    }

    /// Pick an f32 output config that runs at `sample_rate`, mono preferred
    fn config_for(&self, sample_rate: u32) -> Result<StreamConfig> {
        let rate = SampleRate(sample_rate);
        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        };

        let configs: Vec<_> = self
            .device
            .supported_output_configs()
            .map_err(|e| ZadeError::AudioDeviceError(format!("Failed to query output configs: {}", e)))?
            .collect();

        configs
            .iter()
            .find(|c| supports(*c, 1))
            .or_else(|| configs.iter().find(|c| supports(*c, 2)))
            .map(|c| c.clone().with_sample_rate(rate).config())
            .ok_or_else(|| {
                ZadeError::AudioDeviceError(format!("No output config supports {} Hz", sample_rate))
            })
    }

    fn play_samples(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() || sample_rate == 0 {
            return Ok(());
        }

        let config = self.config_for(sample_rate)?;
        let channels = config.channels as usize;
        let total = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(Mutex::new(0usize));
        let period_frames = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = bounded::<()>(1);

        let cb_samples = Arc::clone(&samples);
        let cb_position = Arc::clone(&position);
        let cb_period = Arc::clone(&period_frames);

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = cb_position.lock();
                    cb_period.store(data.len() / channels.max(1), Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = cb_samples.get(*pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if *pos < cb_samples.len() {
                            *pos += 1;
                        }
                    }
                    if *pos >= cb_samples.len() {
                        let _ = done_tx.try_send(());
                    }
                },
                |err| {
                    error!("Audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| ZadeError::AudioDeviceError(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| ZadeError::AudioDeviceError(format!("Failed to start output stream: {}", e)))?;

        let nominal = Duration::from_millis((total as u64 * 1000) / u64::from(sample_rate));
        let finished = done_rx.recv_timeout(nominal + PLAYBACK_GRACE).is_ok();
        if finished {
            thread::sleep(tail_delay(period_frames.load(Ordering::Relaxed), sample_rate));
        }
        drop(stream);

        if finished {
            debug!("Played {} samples at {} Hz", total, sample_rate);
            Ok(())
        } else {
            Err(ZadeError::PlaybackError(format!(
                "Playback stalled at sample {} of {}",
                *position.lock(),
                total
            )))
        }
    }
}

impl Player for DevicePlayer {
    fn play(&mut self, asset: &SynthesizedAsset) -> Result<()> {
        let (samples, sample_rate) = match asset.source() {
            AssetSource::Samples { samples, sample_rate } => (samples.clone(), *sample_rate),
            AssetSource::File { path, format: AssetFormat::Wav } => read_wav_mono(&**path)?,
            AssetSource::File { path, format: AssetFormat::Mp3 } => {
                decode_mp3(&std::fs::read(&**path)?)?
            }
        };
        self.play_samples(samples, sample_rate)
    }
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                let channels = frame.channels.max(1);
                samples.extend(frame.data.chunks(channels).map(|chunk| {
                    chunk.iter().map(|&s| f32::from(s) / 32768.0).sum::<f32>() / chunk.len() as f32
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(ZadeError::PlaybackError(format!("MP3 decode error: {:?}", e))),
        }
    }

    Ok((samples, sample_rate))
}
