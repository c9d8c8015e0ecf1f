//! Finance Chat Assistant
//!
//! A conversational assistant for managing financial transactions over chat:
//! - Parses short free-text utterances into structured transactions
//! - Mirrors the remote financial state in a thread-safe snapshot cache
//! - Drives a per-chat scene machine (registration, dashboard, settings,
//!   notifications)
//! - Falls back to a language model that may execute a bounded sequence of
//!   backend directives
//! - Listens on a real-time update channel, degrading to polling when it
//!   is unavailable

pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod parser;
pub mod registry;
pub mod session;
pub mod state;
pub mod transport;

pub use error::{AssistantError, Result};

// Re-export common types
pub use config::AssistantConfig;
pub use models::*;
pub use session::{ChatSession, SessionDeps, SessionEvent, SessionManager};
pub use state::{ClientState, StateView};
