//! Text responder boundary
//!
//! Answers free-form prompts. The real model lives outside this crate; the
//! engines here cover the offline, echo and scripted cases.

pub mod responder;

pub use responder::{Responder, ResponderEngine};
