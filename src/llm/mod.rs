//! Language-model integration
//!
//! A bounded conversation context, an OpenAI-style chat-completion client
//! behind a trait seam, the directive line grammar, and the bounded
//! action-execution loop that ties them to the backend.

pub mod client;
pub mod context;
pub mod directives;
pub mod worker;

pub use client::{LlmClient, OpenAiClient};
pub use context::{ChatContext, TurnRole};
pub use directives::{Directive, ParsedLine};
pub use worker::AiWorker;
