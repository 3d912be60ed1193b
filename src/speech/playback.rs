//! Audio playback backends

use crate::speech::asset::{AssetSource, SynthesizedAsset};
use crate::{Result, ZadeError};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Renders an asset to the output device, blocking until it finishes
pub trait Player: Send {
    fn play(&mut self, asset: &SynthesizedAsset) -> Result<()>;
}

/// Configuration for an external command-line player
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandPlayerConfig {
    /// Executable name or path
    pub program: String,

    /// Arguments placed before the file path
    pub args: Vec<String>,
}

impl Default for CommandPlayerConfig {
    fn default() -> Self {
        Self {
            program: "mpg123".to_string(),
            args: vec!["-q".to_string()],
        }
    }
}

/// Plays file-backed assets through an external program such as `mpg123`
pub struct CommandPlayer {
    config: CommandPlayerConfig,
}

impl CommandPlayer {
    pub fn new(config: CommandPlayerConfig) -> Self {
        Self { config }
    }
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self::new(CommandPlayerConfig::default())
    }
}

impl Player for CommandPlayer {
    fn play(&mut self, asset: &SynthesizedAsset) -> Result<()> {
        let path = match asset.source() {
            AssetSource::File { path, .. } => path,
            AssetSource::Samples { .. } => {
                return Err(ZadeError::PlaybackError(
                    "In-memory audio needs a device player".into(),
                ))
            }
        };

        debug!("{} {}", self.config.program, path.display());
        let status = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(&**path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                ZadeError::PlaybackError(format!("Failed to run {}: {}", self.config.program, e))
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ZadeError::PlaybackError(format!(
                "{} exited with {}",
                self.config.program, status
            )))
        }
    }
}

/// Playback backend, chosen once from configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum PlaybackBackend {
    Command(CommandPlayerConfig),
    Device,
}

impl Default for PlaybackBackend {
    fn default() -> Self {
        PlaybackBackend::Command(CommandPlayerConfig::default())
    }
}

impl PlaybackBackend {
    /// Construct the configured player
    pub fn build(&self) -> Result<Box<dyn Player>> {
        match self {
            PlaybackBackend::Command(config) => {
                info!("Using command playback ({})", config.program);
                Ok(Box::new(CommandPlayer::new(config.clone())))
            }
            #[cfg(feature = "audio-io")]
            PlaybackBackend::Device => Ok(Box::new(crate::audio::DevicePlayer::new()?)),
            #[cfg(not(feature = "audio-io"))]
            PlaybackBackend::Device => Err(ZadeError::ConfigError(
                "Device playback requires the `audio-io` feature".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::asset::{AssetFormat, AssetSpool, Utterance};

    #[test]
    fn test_in_memory_asset_rejected() {
        let mut player = CommandPlayer::default();
        let asset = SynthesizedAsset::from_samples(&Utterance::new("hi"), vec![0.0; 10], 16000);
        assert!(matches!(player.play(&asset), Err(ZadeError::PlaybackError(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let spool = AssetSpool::new(dir.path());
        let utterance = Utterance::new("hi");
        let asset = SynthesizedAsset::from_file(
            &utterance,
            spool.allocate(AssetFormat::Mp3).unwrap(),
            AssetFormat::Mp3,
        );

        let mut ok = CommandPlayer::new(CommandPlayerConfig {
            program: "true".into(),
            args: vec![],
        });
        assert!(ok.play(&asset).is_ok());

        let mut failing = CommandPlayer::new(CommandPlayerConfig {
            program: "false".into(),
            args: vec![],
        });
        assert!(matches!(failing.play(&asset), Err(ZadeError::PlaybackError(_))));

        // Playback never consumes the asset's file
        assert!(asset.path().unwrap().exists());
    }

    #[test]
    fn test_backend_config_tagging() {
        let backend: PlaybackBackend =
            serde_json::from_str(r#"{"backend": "command", "program": "ffplay", "args": ["-nodisp", "-autoexit"]}"#)
                .unwrap();
        match backend {
            PlaybackBackend::Command(config) => {
                assert_eq!(config.program, "ffplay");
                assert_eq!(config.args.len(), 2);
            }
            other => panic!("Wrong backend: {:?}", other),
        }

        let device: PlaybackBackend = serde_json::from_str(r#"{"backend": "device"}"#).unwrap();
        assert!(matches!(device, PlaybackBackend::Device));
    }
}
