//! Assistant configuration
//!
//! One JSON file drives the whole assistant. Voice keys sit at the top level
//! so the file doubles as the voice bundle.

use crate::integration::gate::GateMode;
use crate::llm::ResponderEngine;
use crate::pipeline::PipelineConfig;
use crate::speech::playback::PlaybackBackend;
use crate::speech::profile::VoiceProfile;
use crate::speech::tts::SynthesisEngine;
use crate::{Result, ZadeError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Configuration for the complete assistant
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Voice name passed to the synthesizer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,

    /// Signed percent, as `"+20%"` or a number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_rate: Option<serde_json::Value>,

    /// Signed hertz, as `"-5Hz"` or a number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_pitch: Option<serde_json::Value>,

    /// Spoken once the pipeline is up
    pub greeting: String,

    /// Spoken before the session ends
    pub farewell: String,

    /// Spoken at the end of the ignite sequence
    pub tts_response: String,

    /// Words that make a single-word input worth answering
    pub wake_words: Vec<String>,

    /// Print every queued line as `>> text` on stdout
    pub echo: bool,

    pub pipeline: PipelineConfig,
    pub synthesis: SynthesisEngine,
    pub playback: PlaybackBackend,
    pub responder: ResponderEngine,
    pub gate: GateMode,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            voice_id: None,
            speech_rate: None,
            voice_pitch: None,
            greeting: "System online. Listening.".to_string(),
            farewell: "Goodbye, sir. Deactivating protocols.".to_string(),
            tts_response: "Welcome home, sir.".to_string(),
            wake_words: vec!["zade".to_string()],
            echo: true,
            pipeline: PipelineConfig::default(),
            synthesis: SynthesisEngine::default(),
            playback: PlaybackBackend::default(),
            responder: ResponderEngine::default(),
            gate: GateMode::default(),
        }
    }
}

impl AssistantConfig {
    /// Load from a JSON file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config not found at {}; using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ZadeError::ConfigError(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse from a JSON string
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Voice profile built from the top-level voice keys
    pub fn voice_profile(&self) -> Result<VoiceProfile> {
        let mut bundle = serde_json::Map::new();
        if let Some(voice) = &self.voice_id {
            bundle.insert("voice_id".into(), serde_json::Value::String(voice.clone()));
        }
        if let Some(rate) = &self.speech_rate {
            bundle.insert("speech_rate".into(), rate.clone());
        }
        if let Some(pitch) = &self.voice_pitch {
            bundle.insert("voice_pitch".into(), pitch.clone());
        }
        VoiceProfile::from_bundle(&bundle)
    }

    pub fn with_voice(mut self, profile: &VoiceProfile) -> Self {
        self.voice_id = Some(profile.voice_id.clone());
        self.speech_rate = Some(serde_json::Value::String(profile.rate.to_string()));
        self.voice_pitch = Some(serde_json::Value::String(profile.pitch.to_string()));
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_synthesis(mut self, engine: SynthesisEngine) -> Self {
        self.synthesis = engine;
        self
    }

    pub fn with_playback(mut self, backend: PlaybackBackend) -> Self {
        self.playback = backend;
        self
    }

    pub fn with_responder(mut self, engine: ResponderEngine) -> Self {
        self.responder = engine;
        self
    }

    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn with_gate(mut self, gate: GateMode) -> Self {
        self.gate = gate;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.voice_profile()?;

        if let SynthesisEngine::Vits(vits) = &self.synthesis {
            vits.validate()?;
        }

        if let PlaybackBackend::Command(command) = &self.playback {
            if command.program.trim().is_empty() {
                return Err(ZadeError::ConfigError("Playback program is required".into()));
            }
        }

        if let Some(0) = self.pipeline.synthesis_queue.capacity {
            return Err(ZadeError::ConfigError(
                "Synthesis queue capacity must be at least 1".into(),
            ));
        }

        if let GateMode::Poll { interval_ms: 0 } = self.gate {
            return Err(ZadeError::ConfigError("Gate poll interval must be non-zero".into()));
        }

        Ok(())
    }
}
