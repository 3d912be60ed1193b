//! Speech boundaries: voice profiles, synthesis engines, players and recognizers
//!
//! This module provides:
//! - Text-to-speech via the `edge-tts` CLI or a local VITS model
//! - Playback via an external player or the default output device
//! - The recognizer seam used by the listen gate

pub mod asset;
pub mod playback;
pub mod profile;
pub mod stt;
pub mod tts;

// Re-export commonly used types
pub use asset::{AssetFormat, AssetSource, AssetSpool, SynthesizedAsset, Utterance};
pub use playback::{CommandPlayer, CommandPlayerConfig, PlaybackBackend, Player};
pub use profile::{PitchOffset, RateOffset, VoiceProfile};
pub use stt::{Heard, LineRecognizer, Recognizer};
pub use tts::{EdgeTtsConfig, EdgeTtsSynthesizer, SynthesisEngine, Synthesizer, VitsConfig};
