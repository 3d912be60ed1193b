//! Session loop
//!
//! Greets, then alternates between listening through the gate and acting on
//! what was heard until a terminate command or the end of input.

use crate::integration::config::AssistantConfig;
use crate::integration::gate::{ListenGate, ListenOutcome};
use crate::llm::Responder;
use crate::pipeline::SpeechPipeline;
use crate::speech::stt::Recognizer;
use crate::{Result, ZadeError};
use chrono::{Local, NaiveTime, Timelike};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

const TERMINATE_WORDS: &[&str] = &["terminate", "abort"];
const STOP_WORDS: &[&str] = &["cancel", "stop"];
const STOP_TARGETS: &[&str] = &["system", "protocol", "process", "program", "listening"];
const IGNITE_WORDS: &[&str] = &["ignite", "ignited", "ign", "start"];
const CHAT_PHRASES: &[&str] = &["chat mode", "lets chat"];
const CHAT_EXIT_WORDS: &[&str] = &["exit", "stop", "cancel"];

const CHAT_ENTER_REPLY: &str = "Engaging conversational mode. Say 'exit' to stop.";
const CHAT_EXIT_REPLY: &str = "Exiting chat mode.";

/// What a heard phrase asks for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Say goodbye and end the session
    Terminate,
    /// Run the startup sequence
    Ignite,
    /// Enter conversational mode until told to exit
    Chat,
    /// Pass the phrase to the responder
    Ask(String),
    /// Too short to be meant for the assistant
    Ignore,
}

/// Why [`Orchestrator::run`] returned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    Terminated,
    InputClosed,
}

/// Time-of-day greeting for a local hour
pub fn greeting_for_hour(hour: u32) -> &'static str {
    if hour < 12 {
        "Good morning"
    } else if hour < 18 {
        "Good afternoon"
    } else {
        "Good evening"
    }
}

fn words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Classify a lowercased phrase
///
/// Checked in order: ignite, terminate, chat, then anything worth answering.
pub fn classify(text: &str, wake_words: &[String]) -> Command {
    let words = words(text);
    let has = |set: &[&str]| words.iter().any(|w| set.contains(w));

    if has(IGNITE_WORDS) {
        Command::Ignite
    } else if has(TERMINATE_WORDS) || (has(STOP_WORDS) && has(STOP_TARGETS)) {
        Command::Terminate
    } else if CHAT_PHRASES.iter().any(|p| text.contains(p)) {
        Command::Chat
    } else if words.len() > 1 || words.iter().any(|w| wake_words.iter().any(|k| k == w)) {
        Command::Ask(text.to_string())
    } else {
        Command::Ignore
    }
}

/// Whether a phrase said during chat mode ends it
pub fn ends_chat(text: &str) -> bool {
    words(text).iter().any(|w| CHAT_EXIT_WORDS.contains(w))
}

pub struct Orchestrator {
    config: AssistantConfig,
    pipeline: Arc<SpeechPipeline>,
    gate: ListenGate,
    responder: Box<dyn Responder>,
    /// Receives `>> text` for every queued line
    echo: Option<Mutex<Box<dyn Write + Send>>>,
}

impl Orchestrator {
    pub fn new(
        config: AssistantConfig,
        pipeline: Arc<SpeechPipeline>,
        gate: ListenGate,
        responder: Box<dyn Responder>,
    ) -> Self {
        let echo = config
            .echo
            .then(|| Mutex::new(Box::new(std::io::stdout()) as Box<dyn Write + Send>));
        Self {
            config,
            pipeline,
            gate,
            responder,
            echo,
        }
    }

    /// Send the console echo somewhere other than stdout
    pub fn with_echo(mut self, writer: impl Write + Send + 'static) -> Self {
        self.echo = Some(Mutex::new(Box::new(writer)));
        self
    }

    /// Build every component from configuration
    pub fn from_config(config: AssistantConfig, recognizer: Box<dyn Recognizer>) -> Result<Self> {
        config.validate()?;

        let synthesizer = config.synthesis.build(config.pipeline.spool())?;
        let player = config.playback.build()?;
        let pipeline = Arc::new(SpeechPipeline::new(
            config.pipeline.clone(),
            synthesizer,
            player,
        ));
        pipeline.configure(config.voice_profile()?);

        let gate = ListenGate::new(Arc::clone(&pipeline), recognizer, config.gate);
        let responder = config.responder.build()?;
        Ok(Self::new(config, pipeline, gate, responder))
    }

    pub fn pipeline(&self) -> Arc<SpeechPipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Run the session until terminated or the input closes
    pub fn run(&mut self) -> Result<SessionEnd> {
        self.pipeline.start()?;
        info!("Session started");
        self.say(&self.config.greeting)?;

        let end = loop {
            let text = match self.next_phrase()? {
                Some(text) => text,
                None => break SessionEnd::InputClosed,
            };

            match classify(&text, &self.config.wake_words) {
                Command::Terminate => {
                    info!("Terminate command detected");
                    self.say(&self.config.farewell)?;
                    break SessionEnd::Terminated;
                }
                Command::Ignite => {
                    info!("Ignite command detected");
                    for line in self.ignite_lines(Local::now().time()) {
                        self.say(&line)?;
                    }
                }
                Command::Chat => {
                    if let Some(end) = self.chat()? {
                        break end;
                    }
                }
                Command::Ask(prompt) => self.answer(&prompt)?,
                Command::Ignore => {}
            }
        };

        self.pipeline.drain_all();
        info!("Session ended: {:?}", end);
        Ok(end)
    }

    /// Conversational mode: every phrase goes to the responder until an exit word
    ///
    /// Returns `Some` when the input closed mid-chat.
    fn chat(&mut self) -> Result<Option<SessionEnd>> {
        info!("Entering chat mode");
        self.say(CHAT_ENTER_REPLY)?;

        loop {
            let text = match self.next_phrase()? {
                Some(text) => text,
                None => return Ok(Some(SessionEnd::InputClosed)),
            };

            if ends_chat(&text) {
                info!("Leaving chat mode");
                self.say(CHAT_EXIT_REPLY)?;
                return Ok(None);
            }
            self.answer(&text)?;
        }
    }

    /// Next non-empty phrase from the gate, or `None` once input is closed
    fn next_phrase(&mut self) -> Result<Option<String>> {
        loop {
            match self.gate.listen() {
                Ok(ListenOutcome::Spoke(text)) => return Ok(Some(text)),
                Ok(ListenOutcome::Nothing) => continue,
                Ok(ListenOutcome::Closed) => return Ok(None),
                Err(e) if e.is_recoverable() => warn!("Listen failed: {}", e),
                Err(e) => return Err(e),
            }
        }
    }

    fn answer(&mut self, prompt: &str) -> Result<()> {
        match self.responder.respond(prompt) {
            Ok(reply) if !reply.trim().is_empty() => self.say(&reply),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Responder failed: {}", e);
                Ok(())
            }
        }
    }

    /// Lines queued by the startup sequence
    pub fn ignite_lines(&self, now: NaiveTime) -> Vec<String> {
        vec![
            format!(
                "{}. The time is {}.",
                greeting_for_hour(now.hour()),
                now.format("%I:%M %p")
            ),
            self.config.tts_response.clone(),
            "Startup complete.".to_string(),
        ]
    }

    fn say(&self, text: &str) -> Result<()> {
        match self.pipeline.enqueue_speak(text) {
            Ok(_) => {
                if let Some(echo) = &self.echo {
                    let mut out = echo.lock();
                    let _ = writeln!(out, ">> {}", text);
                    let _ = out.flush();
                }
                Ok(())
            }
            Err(e @ ZadeError::QueueFull(_)) => {
                warn!("Dropped reply: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wake() -> Vec<String> {
        vec!["zade".to_string()]
    }

    #[test]
    fn test_greeting_for_hour() {
        assert_eq!(greeting_for_hour(0), "Good morning");
        assert_eq!(greeting_for_hour(11), "Good morning");
        assert_eq!(greeting_for_hour(12), "Good afternoon");
        assert_eq!(greeting_for_hour(17), "Good afternoon");
        assert_eq!(greeting_for_hour(18), "Good evening");
        assert_eq!(greeting_for_hour(23), "Good evening");
    }

    #[test]
    fn test_classify_terminate() {
        assert_eq!(classify("terminate", &wake()), Command::Terminate);
        assert_eq!(classify("abort.", &wake()), Command::Terminate);
        assert_eq!(classify("stop listening", &wake()), Command::Terminate);
        assert_eq!(classify("cancel the process", &wake()), Command::Terminate);
        // "stop" alone names no target
        assert_eq!(
            classify("stop the music", &wake()),
            Command::Ask("stop the music".into())
        );
    }

    #[test]
    fn test_exit_and_goodbye_do_not_terminate() {
        assert_eq!(classify("exit", &wake()), Command::Ignore);
        assert_eq!(
            classify("okay goodbye", &wake()),
            Command::Ask("okay goodbye".into())
        );
    }

    #[test]
    fn test_classify_ignite_and_ask() {
        assert_eq!(classify("ignite", &wake()), Command::Ignite);
        assert_eq!(classify("ign", &wake()), Command::Ignite);
        assert_eq!(classify("start the day", &wake()), Command::Ignite);
        assert_eq!(
            classify("what is the weather", &wake()),
            Command::Ask("what is the weather".into())
        );
        assert_eq!(classify("zade", &wake()), Command::Ask("zade".into()));
        assert_eq!(classify("hmm", &wake()), Command::Ignore);
        assert_eq!(classify("", &wake()), Command::Ignore);
    }

    #[test]
    fn test_classify_chat() {
        assert_eq!(classify("lets chat", &wake()), Command::Chat);
        assert_eq!(classify("switch to chat mode", &wake()), Command::Chat);
        // Ignite wins, as it is checked first
        assert_eq!(classify("start chat mode", &wake()), Command::Ignite);
    }

    #[test]
    fn test_ends_chat() {
        assert!(ends_chat("exit"));
        assert!(ends_chat("okay stop."));
        assert!(ends_chat("cancel that"));
        assert!(!ends_chat("tell me about existentialism"));
        assert!(!ends_chat("what is the weather"));
    }
}
