//! Pipeline coordinator
//!
//! Owns the synthesis and playback queues, starts exactly one worker per
//! stage and exposes the enqueue/drain contract the listen gate relies on.

use crate::audio::level::VocalLevel;
use crate::pipeline::playback::{PlaybackJob, PlaybackWorker};
use crate::pipeline::queue::{
    channel, push_dropping_oldest, OverflowPolicy, PipelineStats, QueuePolicy, StatsCounters,
    WorkTracker,
};
use crate::pipeline::synthesis::{SynthesisJob, SynthesisWorker};
use crate::speech::asset::{AssetSpool, Utterance};
use crate::speech::playback::Player;
use crate::speech::profile::VoiceProfile;
use crate::speech::tts::Synthesizer;
use crate::{Result, ZadeError};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Thread name of the synthesis worker
pub const SYNTHESIS_THREAD: &str = "zade-synthesis";

/// Thread name of the playback worker
pub const PLAYBACK_THREAD: &str = "zade-playback";

/// Configuration for the speech pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Policy for text waiting to be synthesized
    pub synthesis_queue: QueuePolicy,

    /// Synthesized assets allowed to wait for playback before synthesis blocks
    ///
    /// `None` removes the backpressure between the stages.
    pub playback_capacity: Option<usize>,

    /// Directory for spooled audio files (system temp dir when unset)
    pub spool_dir: Option<PathBuf>,

    /// Publish the loudness of in-memory assets while they play
    pub meter_playback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            synthesis_queue: QueuePolicy::unbounded(),
            playback_capacity: Some(4),
            spool_dir: None,
            meter_playback: true,
        }
    }
}

impl PipelineConfig {
    pub fn with_synthesis_queue(mut self, policy: QueuePolicy) -> Self {
        self.synthesis_queue = policy;
        self
    }

    pub fn with_playback_capacity(mut self, capacity: Option<usize>) -> Self {
        self.playback_capacity = capacity;
        self
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    pub fn without_metering(mut self) -> Self {
        self.meter_playback = false;
        self
    }

    /// Spool for file-backed assets
    pub fn spool(&self) -> AssetSpool {
        match &self.spool_dir {
            Some(dir) => AssetSpool::new(dir),
            None => AssetSpool::system_temp(),
        }
    }
}

/// Lifecycle of the worker threads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Created; queued text waits until `start`
    Idle,
    /// Both workers running
    Running,
    /// `shutdown` was called; no more work is accepted
    Stopped,
}

/// Two-stage text-to-speech pipeline
///
/// Share it as `Arc<SpeechPipeline>` between the control loop, the listen
/// gate and anything else that speaks.
pub struct SpeechPipeline {
    config: PipelineConfig,
    profile: Arc<RwLock<VoiceProfile>>,
    state: RwLock<PipelineState>,
    synthesis_tx: Sender<SynthesisJob>,
    synthesis_rx: Receiver<SynthesisJob>,
    playback_tx: Sender<PlaybackJob>,
    playback_rx: Receiver<PlaybackJob>,
    stages: Mutex<Option<(Box<dyn Synthesizer>, Box<dyn Player>)>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Threads that must never wait on this pipeline
    worker_ids: RwLock<Vec<ThreadId>>,
    tracker: Arc<WorkTracker>,
    stats: Arc<StatsCounters>,
    level: VocalLevel,
}

impl SpeechPipeline {
    /// Create an idle pipeline around the given engines
    pub fn new(
        config: PipelineConfig,
        synthesizer: Box<dyn Synthesizer>,
        player: Box<dyn Player>,
    ) -> Self {
        let (synthesis_tx, synthesis_rx) = channel(config.synthesis_queue.capacity);
        let (playback_tx, playback_rx) = channel(config.playback_capacity);

        Self {
            config,
            profile: Arc::new(RwLock::new(VoiceProfile::default())),
            state: RwLock::new(PipelineState::Idle),
            synthesis_tx,
            synthesis_rx,
            playback_tx,
            playback_rx,
            stages: Mutex::new(Some((synthesizer, player))),
            workers: Mutex::new(Vec::new()),
            worker_ids: RwLock::new(Vec::new()),
            tracker: Arc::new(WorkTracker::default()),
            stats: Arc::new(StatsCounters::default()),
            level: VocalLevel::new(),
        }
    }

    /// Replace the voice used for utterances synthesized from now on
    pub fn configure(&self, profile: VoiceProfile) {
        info!(
            "Voice configured: {} rate={} pitch={}",
            profile.voice_id, profile.rate, profile.pitch
        );
        *self.profile.write() = profile;
    }

    /// Read `voice_id`, `speech_rate` and `voice_pitch` from a key-value bundle
    pub fn configure_from_bundle(
        &self,
        bundle: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        self.configure(VoiceProfile::from_bundle(bundle)?);
        Ok(())
    }

    /// Current voice profile
    pub fn profile(&self) -> VoiceProfile {
        self.profile.read().clone()
    }

    /// Launch the synthesis and playback workers
    ///
    /// Calling this again while running does nothing.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            PipelineState::Running => {
                debug!("Speech pipeline already started");
                return Ok(());
            }
            PipelineState::Stopped => return Err(ZadeError::ShutDown),
            PipelineState::Idle => {}
        }

        let (synthesizer, player) = self
            .stages
            .lock()
            .take()
            .ok_or_else(|| ZadeError::PipelineError("Stage engines already consumed".into()))?;

        let playback = PlaybackWorker {
            player,
            jobs: self.playback_rx.clone(),
            tracker: Arc::clone(&self.tracker),
            stats: Arc::clone(&self.stats),
            meter: self.config.meter_playback.then(|| self.level.clone()),
        };
        let playback_handle = thread::Builder::new()
            .name(PLAYBACK_THREAD.into())
            .spawn(move || playback.run())
            .map_err(|e| {
                *state = PipelineState::Stopped;
                ZadeError::PipelineError(format!("Failed to spawn playback worker: {}", e))
            })?;

        let synthesis = SynthesisWorker {
            synthesizer,
            profile: Arc::clone(&self.profile),
            jobs: self.synthesis_rx.clone(),
            playback_tx: self.playback_tx.clone(),
            tracker: Arc::clone(&self.tracker),
            stats: Arc::clone(&self.stats),
        };
        let synthesis_handle = match thread::Builder::new()
            .name(SYNTHESIS_THREAD.into())
            .spawn(move || synthesis.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.playback_tx.send(PlaybackJob::Stop);
                *state = PipelineState::Stopped;
                return Err(ZadeError::PipelineError(format!(
                    "Failed to spawn synthesis worker: {}",
                    e
                )));
            }
        };

        self.worker_ids
            .write()
            .extend([synthesis_handle.thread().id(), playback_handle.thread().id()]);
        self.workers.lock().extend([synthesis_handle, playback_handle]);
        *state = PipelineState::Running;
        info!("Speech pipeline started");
        Ok(())
    }

    /// Queue text to be spoken and return immediately
    ///
    /// Only a bounded synthesis queue can make this block (`Block`) or fail
    /// (`Reject`). Delivery is fire-and-forget: a later synthesis or playback
    /// failure is logged, not reported here.
    pub fn enqueue_speak(&self, text: impl Into<String>) -> Result<Uuid> {
        let state = self.state.read();
        if *state == PipelineState::Stopped {
            return Err(ZadeError::ShutDown);
        }

        let utterance = Utterance::new(text);
        let id = utterance.id();
        info!("Queued speech: {}", utterance.text());

        self.tracker.begin();
        if let Err(e) = self.push(SynthesisJob::Speak(utterance)) {
            self.tracker.finish();
            return Err(e);
        }

        StatsCounters::bump(&self.stats.enqueued);
        Ok(id)
    }

    fn push(&self, job: SynthesisJob) -> Result<()> {
        let closed = || ZadeError::PipelineError("Synthesis queue closed".into());
        let policy = self.config.synthesis_queue;

        match (policy.capacity, policy.overflow) {
            (None, _) | (Some(_), OverflowPolicy::Block) => {
                self.synthesis_tx.send(job).map_err(|_| closed())
            }
            (Some(_), OverflowPolicy::Reject) => match self.synthesis_tx.try_send(job) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    warn!("Synthesis queue full; rejecting utterance");
                    Err(ZadeError::QueueFull(format!(
                        "{} utterances waiting",
                        self.synthesis_tx.len()
                    )))
                }
                Err(TrySendError::Disconnected(_)) => Err(closed()),
            },
            (Some(_), OverflowPolicy::DropOldest) => {
                let evicted = push_dropping_oldest(&self.synthesis_tx, &self.synthesis_rx, job)
                    .map_err(|_| closed())?;
                for job in evicted {
                    if let SynthesisJob::Speak(oldest) = job {
                        warn!("Synthesis queue full; dropping {:?}", oldest.preview());
                        StatsCounters::bump(&self.stats.dropped_by_policy);
                        self.tracker.finish();
                    }
                }
                Ok(())
            }
        }
    }

    /// Queue text and wait until everything queued so far has been spoken
    pub fn speak_and_wait(&self, text: impl Into<String>) -> Result<()> {
        self.enqueue_speak(text)?;
        self.drain_all();
        Ok(())
    }

    /// Block until both queues are empty and no item is mid-processing
    ///
    /// Returns immediately before `start`, and refuses to wait when called
    /// from one of the pipeline's own workers.
    pub fn drain_all(&self) {
        if !self.can_wait() {
            return;
        }
        self.tracker.wait_idle();
    }

    /// Like [`drain_all`](Self::drain_all), giving up after `timeout`
    ///
    /// Returns `true` if the pipeline drained.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        if !self.can_wait() {
            return !self.has_pending_work();
        }
        self.tracker.wait_idle_timeout(timeout)
    }

    fn can_wait(&self) -> bool {
        // Read state first: a worker that races `start` blocks here until
        // its id is registered
        let state = *self.state.read();
        if self.is_worker_thread() {
            error!("drain requested from a pipeline worker; refusing to wait on itself");
            return false;
        }
        if state == PipelineState::Idle {
            if self.has_pending_work() {
                warn!("drain requested before start; {} utterances waiting", self.tracker.pending());
            }
            return false;
        }
        true
    }

    /// Whether the calling thread is one of this pipeline's workers
    fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.worker_ids.read().contains(&current)
    }

    /// Whether anything is queued or being synthesized or played right now
    pub fn has_pending_work(&self) -> bool {
        self.tracker.pending() > 0
    }

    /// Utterances waiting for synthesis
    pub fn synthesis_backlog(&self) -> usize {
        self.synthesis_tx.len()
    }

    /// Assets waiting for playback
    pub fn playback_backlog(&self) -> usize {
        self.playback_tx.len()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.read()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Shared loudness reading, fed by the listen gate and playback metering
    pub fn vocal_level(&self) -> VocalLevel {
        self.level.clone()
    }

    /// Finish queued work, stop both workers and join them
    ///
    /// Further `enqueue_speak` calls fail with `ShutDown`.
    pub fn shutdown(&self) -> Result<()> {
        if self.is_worker_thread() {
            return Err(ZadeError::PipelineError(
                "shutdown cannot be called from a pipeline worker".into(),
            ));
        }

        {
            let mut state = self.state.write();
            match *state {
                PipelineState::Stopped => return Ok(()),
                PipelineState::Idle => {
                    let mut discarded = 0;
                    while self.synthesis_rx.try_recv().is_ok() {
                        self.tracker.finish();
                        discarded += 1;
                    }
                    if discarded > 0 {
                        warn!("Pipeline never started; discarded {} utterances", discarded);
                    }
                    self.stages.lock().take();
                }
                PipelineState::Running => {
                    self.synthesis_tx
                        .send(SynthesisJob::Stop)
                        .map_err(|_| ZadeError::PipelineError("Synthesis queue closed".into()))?;
                }
            }
            *state = PipelineState::Stopped;
        }

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("{} panicked during shutdown", name);
            }
        }

        info!("Speech pipeline stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::asset::SynthesizedAsset;

    struct InstantSynth;

    impl Synthesizer for InstantSynth {
        fn synthesize(
            &mut self,
            utterance: &Utterance,
            _profile: &VoiceProfile,
        ) -> Result<SynthesizedAsset> {
            Ok(SynthesizedAsset::from_samples(utterance, vec![0.0; 8], 16000))
        }
    }

    struct SilentPlayer;

    impl Player for SilentPlayer {
        fn play(&mut self, _asset: &SynthesizedAsset) -> Result<()> {
            Ok(())
        }
    }

    fn pipeline(config: PipelineConfig) -> SpeechPipeline {
        SpeechPipeline::new(config, Box::new(InstantSynth), Box::new(SilentPlayer))
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = pipeline(PipelineConfig::default());
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(!pipeline.has_pending_work());
        assert_eq!(pipeline.profile(), VoiceProfile::default());
    }

    #[test]
    fn test_enqueue_before_start_is_pending() {
        let pipeline = pipeline(PipelineConfig::default());
        pipeline.enqueue_speak("System online. Listening.").unwrap();

        assert!(pipeline.has_pending_work());
        assert_eq!(pipeline.synthesis_backlog(), 1);
        // Not started: drain must not hang
        pipeline.drain_all();

        pipeline.start().unwrap();
        pipeline.drain_all();
        assert!(!pipeline.has_pending_work());
        assert_eq!(pipeline.stats().played, 1);
    }

    #[test]
    fn test_reject_policy() {
        let config = PipelineConfig::default()
            .with_synthesis_queue(QueuePolicy::bounded(2, OverflowPolicy::Reject));
        let pipeline = pipeline(config);

        pipeline.enqueue_speak("one").unwrap();
        pipeline.enqueue_speak("two").unwrap();
        let third = pipeline.enqueue_speak("three");

        assert!(matches!(third, Err(ZadeError::QueueFull(_))));
        assert_eq!(pipeline.tracker.pending(), 2);
        assert_eq!(pipeline.stats().enqueued, 2);
    }

    #[test]
    fn test_drop_oldest_policy() {
        let config = PipelineConfig::default()
            .with_synthesis_queue(QueuePolicy::bounded(2, OverflowPolicy::DropOldest));
        let pipeline = pipeline(config);

        pipeline.enqueue_speak("stale").unwrap();
        pipeline.enqueue_speak("middle").unwrap();
        pipeline.enqueue_speak("fresh").unwrap();

        assert_eq!(pipeline.synthesis_backlog(), 2);
        assert_eq!(pipeline.tracker.pending(), 2);
        assert_eq!(pipeline.stats().dropped_by_policy, 1);

        let remaining: Vec<String> = pipeline
            .synthesis_rx
            .try_iter()
            .filter_map(|job| match job {
                SynthesisJob::Speak(u) => Some(u.text().to_string()),
                SynthesisJob::Stop => None,
            })
            .collect();
        assert_eq!(remaining, vec!["middle", "fresh"]);
    }

    #[test]
    fn test_configure_from_bundle() {
        let pipeline = pipeline(PipelineConfig::default());
        let bundle = serde_json::json!({ "voice_id": "en-IN-PrabhatNeural", "speech_rate": "+0%" });
        pipeline
            .configure_from_bundle(bundle.as_object().unwrap())
            .unwrap();

        let profile = pipeline.profile();
        assert_eq!(profile.voice_id, "en-IN-PrabhatNeural");
        assert_eq!(profile.rate.0, 0);
        assert_eq!(profile.pitch.0, -5);
    }

    #[test]
    fn test_shutdown_idle_discards_and_rejects() {
        let pipeline = pipeline(PipelineConfig::default());
        pipeline.enqueue_speak("never spoken").unwrap();

        pipeline.shutdown().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(!pipeline.has_pending_work());
        assert!(matches!(pipeline.enqueue_speak("late"), Err(ZadeError::ShutDown)));
        assert!(matches!(pipeline.start(), Err(ZadeError::ShutDown)));
        // Idempotent
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_running_finishes_queued_work() {
        let pipeline = pipeline(PipelineConfig::default());
        pipeline.start().unwrap();
        for i in 0..5 {
            pipeline.enqueue_speak(format!("line {}", i)).unwrap();
        }

        pipeline.shutdown().unwrap();
        let stats = pipeline.stats();
        assert_eq!(stats.played, 5);
        assert_eq!(stats.released, 5);
        assert!(!pipeline.has_pending_work());
    }

    /// Drains a target pipeline from inside `play` and records what it saw
    struct DrainingPlayer {
        target: Arc<Mutex<Option<std::sync::Weak<SpeechPipeline>>>>,
        played_after_drain: Arc<Mutex<Vec<u64>>>,
    }

    impl Player for DrainingPlayer {
        fn play(&mut self, _asset: &SynthesizedAsset) -> Result<()> {
            let target = self.target.lock().as_ref().and_then(|w| w.upgrade());
            if let Some(target) = target {
                if target.state() == PipelineState::Running && !target.has_pending_work() {
                    target.enqueue_speak("from another pipeline")?;
                }
                target.drain_all();
                self.played_after_drain.lock().push(target.stats().played);
            }
            Ok(())
        }
    }

    #[test]
    fn test_worker_drain_on_own_pipeline_returns() {
        let target = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Arc::new(SpeechPipeline::new(
            PipelineConfig::default(),
            Box::new(InstantSynth),
            Box::new(DrainingPlayer {
                target: Arc::clone(&target),
                played_after_drain: Arc::clone(&seen),
            }),
        ));
        *target.lock() = Some(Arc::downgrade(&pipeline));
        pipeline.start().unwrap();

        pipeline.enqueue_speak("self drain").unwrap();
        assert!(pipeline.drain_timeout(Duration::from_secs(5)));
        // The worker's own drain returned before its item counted as played
        assert_eq!(*seen.lock(), vec![0]);
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_worker_may_drain_another_pipeline() {
        let other = Arc::new(pipeline(PipelineConfig::default()));
        other.start().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = SpeechPipeline::new(
            PipelineConfig::default(),
            Box::new(InstantSynth),
            Box::new(DrainingPlayer {
                target: Arc::new(Mutex::new(Some(Arc::downgrade(&other)))),
                played_after_drain: Arc::clone(&seen),
            }),
        );
        pipeline.start().unwrap();

        pipeline.enqueue_speak("cross drain").unwrap();
        assert!(pipeline.drain_timeout(Duration::from_secs(5)));
        // The other pipeline really was drained, not skipped
        assert_eq!(*seen.lock(), vec![1]);

        pipeline.shutdown().unwrap();
        other.shutdown().unwrap();
    }

    #[test]
    fn test_pipeline_config_serde_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"playback_capacity": 2}"#).unwrap();
        assert_eq!(config.playback_capacity, Some(2));
        assert!(config.synthesis_queue.capacity.is_none());
        assert!(config.meter_playback);
    }
}
