//! Listen gate
//!
//! Keeps the microphone closed while the assistant is still talking, so the
//! recognizer never transcribes the assistant's own voice.

use crate::pipeline::{PipelineState, SpeechPipeline};
use crate::speech::stt::Recognizer;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// How the gate waits for the pipeline to go quiet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum GateMode {
    /// Block on `drain_all`
    #[default]
    Drain,

    /// Re-check `has_pending_work` every `interval_ms`
    Poll { interval_ms: u64 },
}

/// Result of one listen attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Lowercased, trimmed transcript
    Spoke(String),

    /// Microphone opened but nothing intelligible was said
    Nothing,

    /// The recognizer has no more input
    Closed,
}

pub struct ListenGate {
    pipeline: Arc<SpeechPipeline>,
    recognizer: Box<dyn Recognizer>,
    mode: GateMode,
}

impl ListenGate {
    pub fn new(pipeline: Arc<SpeechPipeline>, recognizer: Box<dyn Recognizer>, mode: GateMode) -> Self {
        Self {
            pipeline,
            recognizer,
            mode,
        }
    }

    /// Wait until nothing is queued or playing, then capture one utterance
    pub fn listen(&mut self) -> Result<ListenOutcome> {
        self.wait_until_quiet();

        let heard = match self.recognizer.next_utterance()? {
            Some(heard) => heard,
            None => {
                info!("Recognizer input closed");
                return Ok(ListenOutcome::Closed);
            }
        };

        if !heard.pcm.is_empty() {
            let level = self.pipeline.vocal_level().publish_pcm16(&heard.pcm);
            debug!("Captured {} samples, level {:.3}", heard.pcm.len(), level);
        }

        let text = heard
            .transcript
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());

        Ok(match text {
            Some(text) => {
                info!("Heard: {}", text);
                ListenOutcome::Spoke(text)
            }
            None => ListenOutcome::Nothing,
        })
    }

    fn wait_until_quiet(&self) {
        match self.mode {
            GateMode::Drain => self.pipeline.drain_all(),
            GateMode::Poll { interval_ms } => {
                let interval = Duration::from_millis(interval_ms.max(1));
                // An idle pipeline never drains
                while self.pipeline.state() == PipelineState::Running
                    && self.pipeline.has_pending_work()
                {
                    thread::sleep(interval);
                }
            }
        }
    }
}
