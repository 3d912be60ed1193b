//! Synthesis stage: one worker turning queued utterances into assets

use crate::pipeline::playback::PlaybackJob;
use crate::pipeline::queue::{StatsCounters, WorkTracker};
use crate::speech::asset::Utterance;
use crate::speech::profile::VoiceProfile;
use crate::speech::tts::Synthesizer;
use crate::ZadeError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Work item on the synthesis queue
#[derive(Debug)]
pub(crate) enum SynthesisJob {
    Speak(Utterance),
    /// Finish everything queued before this, then stop both stages
    Stop,
}

pub(crate) struct SynthesisWorker {
    pub synthesizer: Box<dyn Synthesizer>,
    pub profile: Arc<RwLock<VoiceProfile>>,
    pub jobs: Receiver<SynthesisJob>,
    pub playback_tx: Sender<PlaybackJob>,
    pub tracker: Arc<WorkTracker>,
    pub stats: Arc<StatsCounters>,
}

impl SynthesisWorker {
    pub fn run(mut self) {
        info!("Synthesis worker started");

        loop {
            match self.jobs.recv() {
                Ok(SynthesisJob::Speak(utterance)) => self.process(utterance),
                Ok(SynthesisJob::Stop) => {
                    info!("Synthesis worker stopping");
                    let _ = self.playback_tx.send(PlaybackJob::Stop);
                    break;
                }
                Err(_) => {
                    debug!("Synthesis queue disconnected");
                    break;
                }
            }
        }

        info!("Synthesis worker stopped");
    }

    fn process(&mut self, utterance: Utterance) {
        // Each item reads its own snapshot; later profile changes don't affect it
        let profile = self.profile.read().clone();
        let started = Instant::now();

        debug!("Synthesizing {}: {}", utterance.id(), utterance.preview());

        let synthesizer = &mut self.synthesizer;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            synthesizer.synthesize(&utterance, &profile)
        }))
        .unwrap_or_else(|_| Err(ZadeError::SynthesisError("Synthesizer panicked".into())));

        match result {
            Ok(asset) => {
                StatsCounters::bump(&self.stats.synthesized);
                debug!(
                    "Synthesized {} in {} ms",
                    utterance.id(),
                    started.elapsed().as_millis()
                );
                // Blocks while the playback queue is full
                if let Err(returned) = self.playback_tx.send(PlaybackJob::Play(asset)) {
                    error!("Playback stage is gone; discarding {}", utterance.id());
                    drop(returned);
                    self.tracker.finish();
                }
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.synthesis_failures);
                warn!("Failed to synthesize {:?}: {}", utterance.preview(), e);
                self.tracker.finish();
            }
        }
    }
}
