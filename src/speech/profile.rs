//! Voice parameters applied to each synthesized utterance

use crate::{Result, ZadeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Voice used when the configuration names none
pub const DEFAULT_VOICE_ID: &str = "en-US-ChristopherNeural";

/// Default speaking rate offset, percent
pub const DEFAULT_RATE_PERCENT: i32 = 20;

/// Default pitch offset, hertz
pub const DEFAULT_PITCH_HZ: i32 = -5;

/// Speaking rate relative to the voice's natural rate, e.g. `+20%`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateOffset(pub i32);

impl RateOffset {
    /// Multiplicative speed factor (`+20%` -> 1.2)
    pub fn speed_factor(self) -> f32 {
        (1.0 + self.0 as f32 / 100.0).max(0.1)
    }
}

impl fmt::Display for RateOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}%", self.0)
    }
}

impl FromStr for RateOffset {
    type Err = ZadeError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
        number
            .parse::<i32>()
            .map(RateOffset)
            .map_err(|_| ZadeError::ConfigError(format!("Invalid speech rate: {:?}", s)))
    }
}

impl TryFrom<String> for RateOffset {
    type Error = ZadeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RateOffset> for String {
    fn from(value: RateOffset) -> Self {
        value.to_string()
    }
}

/// Pitch shift relative to the voice's natural pitch, e.g. `-5Hz`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PitchOffset(pub i32);

impl fmt::Display for PitchOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}Hz", self.0)
    }
}

impl FromStr for PitchOffset {
    type Err = ZadeError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        let number = match lower.strip_suffix("hz") {
            Some(_) => &trimmed[..trimmed.len() - 2],
            None => trimmed,
        };
        number
            .trim()
            .parse::<i32>()
            .map(PitchOffset)
            .map_err(|_| ZadeError::ConfigError(format!("Invalid voice pitch: {:?}", s)))
    }
}

impl TryFrom<String> for PitchOffset {
    type Error = ZadeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PitchOffset> for String {
    fn from(value: PitchOffset) -> Self {
        value.to_string()
    }
}

/// Voice identifier plus rate and pitch offsets
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Engine-specific voice name (an edge-tts voice or a VITS speaker id)
    pub voice_id: String,

    /// Speaking rate offset
    pub rate: RateOffset,

    /// Pitch offset
    pub pitch: PitchOffset,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            rate: RateOffset(DEFAULT_RATE_PERCENT),
            pitch: PitchOffset(DEFAULT_PITCH_HZ),
        }
    }
}

impl VoiceProfile {
    /// Create a profile for the given voice with default offsets
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            ..Default::default()
        }
    }

    /// Set the rate offset in percent
    pub fn with_rate(mut self, percent: i32) -> Self {
        self.rate = RateOffset(percent);
        self
    }

    /// Set the pitch offset in hertz
    pub fn with_pitch(mut self, hz: i32) -> Self {
        self.pitch = PitchOffset(hz);
        self
    }

    /// Build a profile from a flat key-value bundle
    ///
    /// Reads `voice_id`, `speech_rate` and `voice_pitch`. Missing keys keep
    /// their defaults; values may be strings (`"+20%"`) or plain numbers.
    pub fn from_bundle(bundle: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut profile = Self::default();

        if let Some(value) = bundle.get("voice_id") {
            match value.as_str() {
                Some(voice) if !voice.trim().is_empty() => profile.voice_id = voice.trim().to_string(),
                _ => {
                    return Err(ZadeError::ConfigError(format!(
                        "voice_id must be a non-empty string, got {}",
                        value
                    )))
                }
            }
        }

        if let Some(value) = bundle.get("speech_rate") {
            profile.rate = RateOffset(bundle_number(value, "speech_rate", |s| {
                s.parse::<RateOffset>().map(|r| r.0)
            })?);
        }

        if let Some(value) = bundle.get("voice_pitch") {
            profile.pitch = PitchOffset(bundle_number(value, "voice_pitch", |s| {
                s.parse::<PitchOffset>().map(|p| p.0)
            })?);
        }

        Ok(profile)
    }
}

fn bundle_number(
    value: &serde_json::Value,
    key: &str,
    parse: impl Fn(&str) -> Result<i32>,
) -> Result<i32> {
    match value {
        serde_json::Value::String(s) => parse(s),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| ZadeError::ConfigError(format!("{} out of range: {}", key, n))),
        other => Err(ZadeError::ConfigError(format!(
            "{} must be a string or number, got {}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_profile() {
        let profile = VoiceProfile::default();
        assert_eq!(profile.voice_id, "en-US-ChristopherNeural");
        assert_eq!(profile.rate.to_string(), "+20%");
        assert_eq!(profile.pitch.to_string(), "-5Hz");
    }

    #[test]
    fn test_parse_offsets() {
        assert_eq!("+20%".parse::<RateOffset>().unwrap(), RateOffset(20));
        assert_eq!("-10%".parse::<RateOffset>().unwrap(), RateOffset(-10));
        assert_eq!("15".parse::<RateOffset>().unwrap(), RateOffset(15));
        assert_eq!("-5Hz".parse::<PitchOffset>().unwrap(), PitchOffset(-5));
        assert_eq!("+12hz".parse::<PitchOffset>().unwrap(), PitchOffset(12));
        assert!("fast".parse::<RateOffset>().is_err());
        assert!("lowHz".parse::<PitchOffset>().is_err());
    }

    #[test]
    fn test_zero_offsets_keep_sign() {
        assert_eq!(RateOffset(0).to_string(), "+0%");
        assert_eq!(PitchOffset(0).to_string(), "+0Hz");
    }

    #[test]
    fn test_speed_factor() {
        assert!((RateOffset(20).speed_factor() - 1.2).abs() < 1e-6);
        assert!((RateOffset(-50).speed_factor() - 0.5).abs() < 1e-6);
        assert!((RateOffset(-100).speed_factor() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_from_bundle() {
        let bundle = json!({
            "voice_id": "en-GB-RyanNeural",
            "speech_rate": "+5%",
            "voice_pitch": 3,
            "location": "Nagpur"
        });
        let profile = VoiceProfile::from_bundle(bundle.as_object().unwrap()).unwrap();
        assert_eq!(profile.voice_id, "en-GB-RyanNeural");
        assert_eq!(profile.rate, RateOffset(5));
        assert_eq!(profile.pitch, PitchOffset(3));
    }

    #[test]
    fn test_from_bundle_defaults_and_errors() {
        let empty = serde_json::Map::new();
        assert_eq!(VoiceProfile::from_bundle(&empty).unwrap(), VoiceProfile::default());

        let bad = json!({ "speech_rate": "quickly" });
        assert!(VoiceProfile::from_bundle(bad.as_object().unwrap()).is_err());

        let blank = json!({ "voice_id": "  " });
        assert!(VoiceProfile::from_bundle(blank.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_profile_serde_uses_strings() {
        let profile = VoiceProfile::new("en-US-AriaNeural").with_rate(-10).with_pitch(4);
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["rate"], "-10%");
        assert_eq!(value["pitch"], "+4Hz");

        let back: VoiceProfile = serde_json::from_value(value).unwrap();
        assert_eq!(back, profile);
    }
}
