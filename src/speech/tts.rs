//! Text-to-speech engines
//!
//! Every engine turns one utterance into one [`SynthesizedAsset`]. Calls are
//! blocking and produce the whole clip before returning.

use crate::speech::asset::{AssetFormat, AssetSpool, SynthesizedAsset, Utterance};
use crate::speech::profile::VoiceProfile;
use crate::{Result, ZadeError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Converts text into a playable asset
pub trait Synthesizer: Send {
    /// Synthesize one utterance with the given voice snapshot
    fn synthesize(&mut self, utterance: &Utterance, profile: &VoiceProfile) -> Result<SynthesizedAsset>;
}

/// Configuration for the `edge-tts` command-line engine
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeTtsConfig {
    /// Executable name or path
    pub program: String,

    /// Give up on a single clip after this many seconds
    pub timeout_secs: u64,
}

impl Default for EdgeTtsConfig {
    fn default() -> Self {
        Self {
            program: "edge-tts".to_string(),
            timeout_secs: 30,
        }
    }
}

impl EdgeTtsConfig {
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }
}

/// Synthesizes MP3 clips by running the `edge-tts` CLI
pub struct EdgeTtsSynthesizer {
    config: EdgeTtsConfig,
    spool: AssetSpool,
}

impl EdgeTtsSynthesizer {
    pub fn new(config: EdgeTtsConfig, spool: AssetSpool) -> Self {
        Self { config, spool }
    }

    fn command(&self, text: &str, profile: &VoiceProfile, output: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("--voice")
            .arg(&profile.voice_id)
            .arg(format!("--rate={}", profile.rate))
            .arg(format!("--pitch={}", profile.pitch))
            .arg("--text")
            .arg(text)
            .arg("--write-media")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Synthesizer for EdgeTtsSynthesizer {
    fn synthesize(&mut self, utterance: &Utterance, profile: &VoiceProfile) -> Result<SynthesizedAsset> {
        let text = utterance.text().trim();
        if text.is_empty() {
            return Err(ZadeError::SynthesisError("Nothing to synthesize".into()));
        }

        let path = self.spool.allocate(AssetFormat::Mp3)?;
        debug!(
            "edge-tts voice={} rate={} pitch={} -> {}",
            profile.voice_id,
            profile.rate,
            profile.pitch,
            path.display()
        );

        let child = self.command(text, profile, &path).spawn().map_err(|e| {
            ZadeError::SynthesisError(format!("Failed to run {}: {}", self.config.program, e))
        })?;
        run_to_completion(child, Duration::from_secs(self.config.timeout_secs))?;

        let size = std::fs::metadata(&path)?.len();
        if size == 0 {
            return Err(ZadeError::SynthesisError(format!(
                "{} produced no audio",
                self.config.program
            )));
        }

        Ok(SynthesizedAsset::from_file(utterance, path, AssetFormat::Mp3))
    }
}

/// Wait for a child process, killing it once `timeout` elapses
///
/// Stderr is drained on a helper thread while the child runs, so a chatty
/// engine can never stall on a full pipe.
fn run_to_completion(mut child: Child, timeout: Duration) -> Result<()> {
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut raw = Vec::new();
            let _ = pipe.read_to_end(&mut raw);
            String::from_utf8_lossy(&raw).into_owned()
        })
    });
    let collect_stderr = |reader: Option<thread::JoinHandle<String>>| {
        reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    };

    let started = Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) if status.success() => {
                let stderr = collect_stderr(stderr_reader);
                if !stderr.trim().is_empty() {
                    debug!("Engine stderr: {} bytes", stderr.len());
                }
                return Ok(());
            }
            Some(status) => {
                let stderr = collect_stderr(stderr_reader);
                return Err(ZadeError::SynthesisError(format!(
                    "Engine exited with {}: {}",
                    status,
                    stderr.trim()
                )));
            }
            None if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                collect_stderr(stderr_reader);
                return Err(ZadeError::SynthesisError(format!(
                    "Engine timed out after {:?}",
                    timeout
                )));
            }
            None => thread::sleep(Duration::from_millis(20)),
        }
    }
}

/// Configuration for the local VITS engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitsConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,

    /// Path to the tokens file
    pub tokens_path: PathBuf,

    /// Path to the espeak-ng data directory (optional for some models)
    pub data_dir: Option<PathBuf>,

    /// Speaker used when the voice id is not a number
    pub default_speaker: i32,
}

impl VitsConfig {
    pub fn new(model_path: impl Into<PathBuf>, tokens_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            tokens_path: tokens_path.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.model_path.exists() {
            return Err(ZadeError::ConfigError(format!(
                "VITS model not found: {}",
                self.model_path.display()
            )));
        }
        if !self.tokens_path.exists() {
            return Err(ZadeError::ConfigError(format!(
                "VITS tokens file not found: {}",
                self.tokens_path.display()
            )));
        }
        Ok(())
    }
}

/// Local neural synthesis through sherpa-rs
#[cfg(feature = "vits")]
pub struct VitsSynthesizer {
    tts: sherpa_rs::tts::VitsTts,
    default_speaker: i32,
}

#[cfg(feature = "vits")]
impl VitsSynthesizer {
    pub fn new(config: &VitsConfig) -> Result<Self> {
        config.validate()?;
        info!("Loading VITS model from {}", config.model_path.display());

        let vits_config = sherpa_rs::tts::VitsTtsConfig {
            model: config.model_path.to_string_lossy().into_owned(),
            tokens: config.tokens_path.to_string_lossy().into_owned(),
            data_dir: config
                .data_dir
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..Default::default()
        };

        Ok(Self {
            tts: sherpa_rs::tts::VitsTts::new(vits_config),
            default_speaker: config.default_speaker,
        })
    }
}

#[cfg(feature = "vits")]
impl Synthesizer for VitsSynthesizer {
    fn synthesize(&mut self, utterance: &Utterance, profile: &VoiceProfile) -> Result<SynthesizedAsset> {
        let text = utterance.text().trim();
        if text.is_empty() {
            return Err(ZadeError::SynthesisError("Nothing to synthesize".into()));
        }

        let speaker = profile.voice_id.parse::<i32>().unwrap_or(self.default_speaker);
        if profile.pitch.0 != 0 {
            debug!("VITS ignores pitch offset {}", profile.pitch);
        }

        let audio = self
            .tts
            .create(text, speaker, profile.rate.speed_factor())
            .map_err(|e| ZadeError::SynthesisError(format!("VITS synthesis failed: {}", e)))?;

        Ok(SynthesizedAsset::from_samples(
            utterance,
            audio.samples,
            audio.sample_rate as u32,
        ))
    }
}

/// Synthesis backend, chosen once from configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "kebab-case")]
pub enum SynthesisEngine {
    EdgeTts(EdgeTtsConfig),
    Vits(VitsConfig),
}

impl Default for SynthesisEngine {
    fn default() -> Self {
        SynthesisEngine::EdgeTts(EdgeTtsConfig::default())
    }
}

impl SynthesisEngine {
    /// Construct the configured engine
    pub fn build(&self, spool: AssetSpool) -> Result<Box<dyn Synthesizer>> {
        match self {
            SynthesisEngine::EdgeTts(config) => {
                info!("Using edge-tts synthesis ({})", config.program);
                Ok(Box::new(EdgeTtsSynthesizer::new(config.clone(), spool)))
            }
            #[cfg(feature = "vits")]
            SynthesisEngine::Vits(config) => Ok(Box::new(VitsSynthesizer::new(config)?)),
            #[cfg(not(feature = "vits"))]
            SynthesisEngine::Vits(_) => Err(ZadeError::ConfigError(
                "VITS synthesis requires the `vits` feature".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spool() -> (tempfile::TempDir, AssetSpool) {
        let dir = tempfile::tempdir().unwrap();
        let spool = AssetSpool::new(dir.path());
        (dir, spool)
    }

    #[test]
    fn test_edge_tts_arguments() {
        let (_dir, spool) = spool();
        let synth = EdgeTtsSynthesizer::new(EdgeTtsConfig::default(), spool);
        let profile = VoiceProfile::new("en-GB-RyanNeural").with_rate(-10).with_pitch(-5);
        let cmd = synth.command("Good morning.", &profile, std::path::Path::new("/tmp/out.mp3"));

        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.get_program(), "edge-tts");
        assert_eq!(
            args,
            vec![
                "--voice",
                "en-GB-RyanNeural",
                "--rate=-10%",
                "--pitch=-5Hz",
                "--text",
                "Good morning.",
                "--write-media",
                "/tmp/out.mp3",
            ]
        );
    }

    #[test]
    fn test_blank_text_fails() {
        let (_dir, spool) = spool();
        let mut synth = EdgeTtsSynthesizer::new(EdgeTtsConfig::default(), spool);
        let result = synth.synthesize(&Utterance::new("   "), &VoiceProfile::default());
        assert!(matches!(result, Err(ZadeError::SynthesisError(_))));
    }

    #[test]
    fn test_missing_program_fails_without_leaking() {
        let (dir, spool) = spool();
        let config = EdgeTtsConfig::default().with_program("zade-no-such-tts-binary");
        let mut synth = EdgeTtsSynthesizer::new(config, spool);

        let result = synth.synthesize(&Utterance::new("hello"), &VoiceProfile::default());
        assert!(matches!(result, Err(ZadeError::SynthesisError(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_failure() {
        let (dir, spool) = spool();
        let mut synth = EdgeTtsSynthesizer::new(EdgeTtsConfig::default().with_program("false"), spool);

        let result = synth.synthesize(&Utterance::new("hello"), &VoiceProfile::default());
        assert!(matches!(result, Err(ZadeError::SynthesisError(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_output_is_failure() {
        let (_dir, spool) = spool();
        let mut synth = EdgeTtsSynthesizer::new(EdgeTtsConfig::default().with_program("true"), spool);

        let result = synth.synthesize(&Utterance::new("hello"), &VoiceProfile::default());
        assert!(matches!(result, Err(ZadeError::SynthesisError(ref m)) if m.contains("no audio")));
    }

    #[cfg(unix)]
    fn fake_engine(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-edge-tts");
        std::fs::write(&script, format!("#!/bin/sh\nfor last; do :; done\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn test_verbose_stderr_does_not_stall() {
        let (_dir, spool) = spool();
        let bin = tempfile::tempdir().unwrap();
        // Media goes to the last argument; far more than a pipe buffer goes to stderr
        let program = fake_engine(
            bin.path(),
            "printf 'ID3' > \"$last\"\nhead -c 200000 /dev/zero | tr '\\0' 'x' >&2\nexit 0",
        );
        let config = EdgeTtsConfig::default()
            .with_program(program)
            .with_timeout(Duration::from_secs(10));
        let mut synth = EdgeTtsSynthesizer::new(config, spool);

        let started = Instant::now();
        let asset = synth
            .synthesize(&Utterance::new("A long answer."), &VoiceProfile::default())
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(asset.path().unwrap().exists());
        asset.release().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_reports_stderr() {
        let (_dir, spool) = spool();
        let bin = tempfile::tempdir().unwrap();
        let program = fake_engine(bin.path(), "echo 'voice not found' >&2\nexit 3");
        let mut synth = EdgeTtsSynthesizer::new(EdgeTtsConfig::default().with_program(program), spool);

        let result = synth.synthesize(&Utterance::new("hello"), &VoiceProfile::default());
        assert!(matches!(result, Err(ZadeError::SynthesisError(ref m)) if m.contains("voice not found")));
    }

    #[test]
    fn test_engine_config_tagging() {
        let engine: SynthesisEngine =
            serde_json::from_str(r#"{"engine": "edge-tts", "program": "/opt/edge-tts"}"#).unwrap();
        match engine {
            SynthesisEngine::EdgeTts(config) => {
                assert_eq!(config.program, "/opt/edge-tts");
                assert_eq!(config.timeout_secs, 30);
            }
            other => panic!("Wrong engine: {:?}", other),
        }
    }

    #[cfg(not(feature = "vits"))]
    #[test]
    fn test_vits_requires_feature() {
        let engine = SynthesisEngine::Vits(VitsConfig::new("model.onnx", "tokens.txt"));
        assert!(matches!(engine.build(AssetSpool::system_temp()), Err(ZadeError::ConfigError(_))));
    }
}
