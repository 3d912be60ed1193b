use crate::{Result, ZadeError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reply spoken when no model is configured
pub const OFFLINE_REPLY: &str = "AI system not initialized.";

/// Turns a user prompt into a short spoken reply
pub trait Responder: Send {
    fn respond(&mut self, prompt: &str) -> Result<String>;
}

/// Responder selected once from configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "kebab-case")]
pub enum ResponderEngine {
    /// No model available
    #[default]
    Offline,

    /// Repeat the prompt back
    Echo,

    /// Cycle through fixed replies
    Scripted { replies: Vec<String> },
}

impl ResponderEngine {
    pub fn build(&self) -> Result<Box<dyn Responder>> {
        match self {
            ResponderEngine::Offline => Ok(Box::new(OfflineResponder)),
            ResponderEngine::Echo => Ok(Box::new(EchoResponder)),
            ResponderEngine::Scripted { replies } => {
                if replies.is_empty() {
                    return Err(ZadeError::ConfigError(
                        "Scripted responder needs at least one reply".into(),
                    ));
                }
                Ok(Box::new(ScriptedResponder::new(replies.clone())))
            }
        }
    }
}

pub struct OfflineResponder;

impl Responder for OfflineResponder {
    fn respond(&mut self, _prompt: &str) -> Result<String> {
        Ok(OFFLINE_REPLY.to_string())
    }
}

pub struct EchoResponder;

impl Responder for EchoResponder {
    fn respond(&mut self, prompt: &str) -> Result<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ZadeError::ResponderError("Empty prompt".into()));
        }
        Ok(prompt.to_string())
    }
}

/// Returns its replies in order, wrapping around
pub struct ScriptedResponder {
    replies: Vec<String>,
    next: usize,
}

impl ScriptedResponder {
    pub fn new(replies: Vec<String>) -> Self {
        Self { replies, next: 0 }
    }
}

impl Responder for ScriptedResponder {
    fn respond(&mut self, prompt: &str) -> Result<String> {
        let reply = self
            .replies
            .get(self.next % self.replies.len().max(1))
            .cloned()
            .ok_or_else(|| ZadeError::ResponderError("No scripted replies".into()))?;
        self.next += 1;
        debug!("Scripted reply to {:?}: {:?}", prompt, reply);
        Ok(reply)
    }
}
