//! Integration layer
//!
//! Wires the speech pipeline, the listen gate and the responder into one
//! assistant session.

pub mod config;
pub mod gate;
pub mod orchestrator;

pub use config::AssistantConfig;
pub use gate::{GateMode, ListenGate, ListenOutcome};
pub use orchestrator::{greeting_for_hour, Orchestrator, SessionEnd};
