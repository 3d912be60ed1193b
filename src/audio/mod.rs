pub mod level;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod wav;

pub use level::{rms_level_f32, rms_level_i16, rms_level_pcm16_bytes, VocalLevel};
#[cfg(feature = "audio-io")]
pub use output::DevicePlayer;
pub use wav::{read_wav_mono, write_wav};
