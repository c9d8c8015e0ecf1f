//! Outbound messaging seam
//!
//! The session layer renders text and inline buttons; how they reach the
//! chat platform is behind `MessageTransport`. One pinned message per chat
//! is the contract: `set_content` edits in place when possible and returns
//! the id of the message now on screen.

use crate::Result;
use std::sync::Mutex;

/// An inline button below a message. `action` is the opaque payload the
/// platform echoes back when the button is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// A rendered screen: text plus rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(text: impl Into<String>, buttons: Vec<Vec<Button>>) -> Self {
        Self {
            text: text.into(),
            buttons,
        }
    }
}

#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync {
    /// Replaces the chat's assistant message with `message`, returning the
    /// id of the message now displayed.
    async fn set_content(&self, chat_id: i64, message: OutboundMessage) -> Result<i64>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    /// Shows a "typing" indicator. The platform clears it after a few
    /// seconds, so long operations must re-send it periodically.
    async fn typing(&self, chat_id: i64) -> Result<()>;

    /// The bot's own username, used to detect mentions in group chats.
    fn bot_username(&self) -> &str;
}

/// Test transport that records everything sent through it.
pub struct RecordingTransport {
    username: String,
    sent: Mutex<Vec<(i64, OutboundMessage)>>,
    deleted: Mutex<Vec<(i64, i64)>>,
    typing_count: Mutex<u32>,
    next_message_id: Mutex<i64>,
}

impl RecordingTransport {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            typing_count: Mutex::new(0),
            next_message_id: Mutex::new(100),
        }
    }

    pub fn sent(&self) -> Vec<(i64, OutboundMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_message(&self) -> Option<OutboundMessage> {
        self.sent
            .lock()
            .ok()
            .and_then(|s| s.last().map(|(_, m)| m.clone()))
    }

    pub fn deleted(&self) -> Vec<(i64, i64)> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn typing_count(&self) -> u32 {
        *self.typing_count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl MessageTransport for RecordingTransport {
    async fn set_content(&self, chat_id: i64, message: OutboundMessage) -> Result<i64> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((chat_id, message));
        }

        let mut next = self.next_message_id.lock().unwrap_or_else(|e| e.into_inner());
        *next += 1;
        Ok(*next)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.push((chat_id, message_id));
        }
        Ok(())
    }

    async fn typing(&self, _chat_id: i64) -> Result<()> {
        let mut count = self.typing_count.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
        Ok(())
    }

    fn bot_username(&self) -> &str {
        &self.username
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_transport_tracks_messages() {
        let transport = RecordingTransport::new("finbot");

        let first = transport
            .set_content(42, OutboundMessage::text("hello"))
            .await
            .unwrap();
        let second = transport
            .set_content(
                42,
                OutboundMessage::with_buttons(
                    "confirm?",
                    vec![vec![Button::new("Yes", "confirm"), Button::new("No", "cancel")]],
                ),
            )
            .await
            .unwrap();

        assert!(second > first);
        assert_eq!(transport.sent().len(), 2);

        let last = transport.last_message().unwrap();
        assert_eq!(last.buttons[0].len(), 2);
        assert_eq!(last.buttons[0][0].action, "confirm");
        assert_eq!(transport.bot_username(), "finbot");
    }
}
