//! Utterances and the transient audio produced from them

use crate::{Result, ZadeError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use uuid::Uuid;

/// Prefix for spooled speech files, so stale ones can be reaped externally
pub const SPOOL_PREFIX: &str = "zade-speech-";

/// One unit of text requested to be spoken
#[derive(Clone, Debug)]
pub struct Utterance {
    id: Uuid,
    text: String,
    enqueued_at: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    /// Short form of the text for log lines
    pub fn preview(&self) -> &str {
        match self.text.char_indices().nth(60) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

/// Container format of a spooled asset file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetFormat {
    Mp3,
    Wav,
}

impl AssetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AssetFormat::Mp3 => ".mp3",
            AssetFormat::Wav => ".wav",
        }
    }
}

/// Where a synthesized asset's audio lives
pub enum AssetSource {
    /// Temporary file, deleted when the asset is released or dropped
    File { path: TempPath, format: AssetFormat },

    /// Decoded mono samples held in memory
    Samples { samples: Vec<f32>, sample_rate: u32 },
}

impl fmt::Debug for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetSource::File { path, format } => f
                .debug_struct("File")
                .field("path", &path.to_path_buf())
                .field("format", format)
                .finish(),
            AssetSource::Samples { samples, sample_rate } => f
                .debug_struct("Samples")
                .field("len", &samples.len())
                .field("sample_rate", sample_rate)
                .finish(),
        }
    }
}

/// Playable audio produced from one utterance
///
/// The backing resource is freed exactly once: either by [`release`](Self::release)
/// after playback, or by `Drop` if the asset is abandoned.
#[derive(Debug)]
pub struct SynthesizedAsset {
    utterance_id: Uuid,
    text: String,
    source: AssetSource,
}

impl SynthesizedAsset {
    /// Wrap a spooled file
    pub fn from_file(utterance: &Utterance, path: TempPath, format: AssetFormat) -> Self {
        Self {
            utterance_id: utterance.id(),
            text: utterance.text().to_string(),
            source: AssetSource::File { path, format },
        }
    }

    /// Wrap in-memory samples
    pub fn from_samples(utterance: &Utterance, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            utterance_id: utterance.id(),
            text: utterance.text().to_string(),
            source: AssetSource::Samples { samples, sample_rate },
        }
    }

    pub fn utterance_id(&self) -> Uuid {
        self.utterance_id
    }

    /// Text this asset speaks
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &AssetSource {
        &self.source
    }

    /// Path of the backing file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            AssetSource::File { path, .. } => Some(&**path),
            AssetSource::Samples { .. } => None,
        }
    }

    /// Duration in seconds, when known without decoding
    pub fn duration_secs(&self) -> Option<f32> {
        match &self.source {
            AssetSource::Samples { samples, sample_rate } if *sample_rate > 0 => {
                Some(samples.len() as f32 / *sample_rate as f32)
            }
            _ => None,
        }
    }

    /// Free the backing resource
    pub fn release(self) -> Result<()> {
        match self.source {
            AssetSource::File { path, .. } => {
                let shown = path.to_path_buf();
                path.close().map_err(|e| {
                    ZadeError::IOError(format!("Failed to delete {}: {}", shown.display(), e))
                })
            }
            AssetSource::Samples { .. } => Ok(()),
        }
    }
}

/// Directory where file-backed assets are created
#[derive(Clone, Debug)]
pub struct AssetSpool {
    dir: PathBuf,
}

impl AssetSpool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Spool in the system temporary directory
    pub fn system_temp() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh, empty file for one asset
    pub fn allocate(&self, format: AssetFormat) -> Result<TempPath> {
        std::fs::create_dir_all(&self.dir)?;
        let file = tempfile::Builder::new()
            .prefix(SPOOL_PREFIX)
            .suffix(format.extension())
            .tempfile_in(&self.dir)?;
        Ok(file.into_temp_path())
    }
}

impl Default for AssetSpool {
    fn default() -> Self {
        Self::system_temp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_preview_is_char_safe() {
        let long = "é".repeat(100);
        let utterance = Utterance::new(long);
        assert_eq!(utterance.preview().chars().count(), 60);

        let short = Utterance::new("Good morning.");
        assert_eq!(short.preview(), "Good morning.");
    }

    #[test]
    fn test_spooled_file_is_deleted_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let spool = AssetSpool::new(dir.path());
        let utterance = Utterance::new("Battery is at 80 percent.");

        let path = spool.allocate(AssetFormat::Mp3).unwrap();
        let asset = SynthesizedAsset::from_file(&utterance, path, AssetFormat::Mp3);
        let on_disk = asset.path().unwrap().to_path_buf();

        assert!(on_disk.exists());
        assert!(on_disk
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(SPOOL_PREFIX));
        assert_eq!(asset.utterance_id(), utterance.id());

        asset.release().unwrap();
        assert!(!on_disk.exists());
    }

    #[test]
    fn test_dropped_asset_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let spool = AssetSpool::new(dir.path());
        let utterance = Utterance::new("dropped");

        let asset = SynthesizedAsset::from_file(
            &utterance,
            spool.allocate(AssetFormat::Wav).unwrap(),
            AssetFormat::Wav,
        );
        let on_disk = asset.path().unwrap().to_path_buf();
        drop(asset);
        assert!(!on_disk.exists());
    }

    #[test]
    fn test_release_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let spool = AssetSpool::new(dir.path());
        let utterance = Utterance::new("gone");

        let asset = SynthesizedAsset::from_file(
            &utterance,
            spool.allocate(AssetFormat::Mp3).unwrap(),
            AssetFormat::Mp3,
        );
        std::fs::remove_file(asset.path().unwrap()).unwrap();
        assert!(asset.release().is_err());
    }

    #[test]
    fn test_sample_asset_duration() {
        let utterance = Utterance::new("one second");
        let asset = SynthesizedAsset::from_samples(&utterance, vec![0.0; 22050], 22050);
        assert!((asset.duration_secs().unwrap() - 1.0).abs() < 0.01);
        assert!(asset.path().is_none());
        assert!(asset.release().is_ok());
    }
}
