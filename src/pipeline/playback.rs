//! Playback stage: one worker playing assets in queue order

use crate::audio::level::VocalLevel;
use crate::pipeline::queue::{StatsCounters, WorkTracker};
use crate::speech::asset::{AssetSource, SynthesizedAsset};
use crate::speech::playback::Player;
use crate::ZadeError;
use crossbeam_channel::Receiver;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Work item on the playback queue
#[derive(Debug)]
pub(crate) enum PlaybackJob {
    Play(SynthesizedAsset),
    Stop,
}

pub(crate) struct PlaybackWorker {
    pub player: Box<dyn Player>,
    pub jobs: Receiver<PlaybackJob>,
    pub tracker: Arc<WorkTracker>,
    pub stats: Arc<StatsCounters>,
    /// Published while in-memory assets play, when set
    pub meter: Option<VocalLevel>,
}

impl PlaybackWorker {
    pub fn run(mut self) {
        info!("Playback worker started");

        loop {
            match self.jobs.recv() {
                Ok(PlaybackJob::Play(asset)) => self.process(asset),
                Ok(PlaybackJob::Stop) => {
                    info!("Playback worker stopping");
                    break;
                }
                Err(_) => {
                    debug!("Playback queue disconnected");
                    break;
                }
            }
        }

        info!("Playback worker stopped");
    }

    fn process(&mut self, asset: SynthesizedAsset) {
        debug!("Playing {}", asset.utterance_id());

        if let (Some(meter), AssetSource::Samples { samples, .. }) = (&self.meter, asset.source()) {
            meter.publish_f32(samples);
        }

        let player = &mut self.player;
        let result = panic::catch_unwind(AssertUnwindSafe(|| player.play(&asset)))
            .unwrap_or_else(|_| Err(ZadeError::PlaybackError("Player panicked".into())));

        match result {
            Ok(()) => StatsCounters::bump(&self.stats.played),
            Err(e) => {
                StatsCounters::bump(&self.stats.playback_failures);
                warn!("Failed to play {:?}: {}", asset.text(), e);
            }
        }

        if let Some(meter) = &self.meter {
            meter.reset();
        }

        // Released on both paths
        let id = asset.utterance_id();
        match asset.release() {
            Ok(()) => StatsCounters::bump(&self.stats.released),
            Err(e) => error!("Failed to release asset for {}: {}", id, e),
        }

        self.tracker.finish();
    }
}
