//! Real-time update channel
//!
//! Each registered chat can hold an open connection to its backend that
//! pushes state-change events and notifications. The connection is a pair
//! of mpsc halves behind the `UpdateChannel` seam; sessions that fail to
//! open one fall back to refresh-on-demand.

use crate::models::ChatBinding;
use crate::{AssistantError, Result};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// A push notification from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub text: String,
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Remote financial state changed; cached snapshots are stale.
    StateChanged,
    Notification(PushNotification),
    /// The backend created the notification point we asked for.
    PointRegistered(Uuid),
    /// Authentication outcome for the freshly opened connection.
    AuthStatus(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    RegisterPoint { name: String },
    Subscribe(Uuid),
}

/// An open connection: events arrive on `events`, requests go out on
/// `commands`. Dropping either half closes the connection.
pub struct ChannelConnection {
    pub events: mpsc::Receiver<ChannelEvent>,
    pub commands: mpsc::Sender<ChannelCommand>,
}

#[async_trait::async_trait]
pub trait UpdateChannel: Send + Sync {
    async fn open(&self, binding: &ChatBinding) -> Result<ChannelConnection>;
}

/// Waits for the backend's authentication verdict on a new connection.
/// Anything other than a timely `AuthStatus(true)` fails the connection.
pub async fn await_auth(connection: &mut ChannelConnection, timeout: Duration) -> Result<()> {
    let event = tokio::time::timeout(timeout, connection.events.recv())
        .await
        .map_err(|_| {
            warn!("Update channel authentication timed out");
            AssistantError::Channel("authentication timed out".to_string())
        })?;

    match event {
        Some(ChannelEvent::AuthStatus(true)) => Ok(()),
        Some(ChannelEvent::AuthStatus(false)) => Err(AssistantError::Channel(
            "authentication rejected".to_string(),
        )),
        Some(other) => Err(AssistantError::Channel(format!(
            "unexpected event before authentication: {:?}",
            other
        ))),
        None => Err(AssistantError::Channel(
            "connection closed during authentication".to_string(),
        )),
    }
}

/// Test channel that replays a scripted event sequence and records the
/// commands sessions send.
pub struct ScriptedChannel {
    scripts: Mutex<Vec<Vec<ChannelEvent>>>,
    commands: Mutex<Vec<mpsc::Receiver<ChannelCommand>>>,
    fail_open: bool,
}

impl ScriptedChannel {
    pub fn new(scripts: Vec<Vec<ChannelEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            commands: Mutex::new(Vec::new()),
            fail_open: false,
        }
    }

    /// A channel whose every `open` fails, for degraded-mode tests.
    pub fn unavailable() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            fail_open: true,
        }
    }

    /// Drains the commands recorded for the `index`-th opened connection.
    pub fn sent_commands(&self, index: usize) -> Vec<ChannelCommand> {
        let mut receivers = match self.commands.lock() {
            Ok(receivers) => receivers,
            Err(_) => return Vec::new(),
        };

        let Some(receiver) = receivers.get_mut(index) else {
            return Vec::new();
        };

        let mut drained = Vec::new();
        while let Ok(command) = receiver.try_recv() {
            drained.push(command);
        }
        drained
    }
}

#[async_trait::async_trait]
impl UpdateChannel for ScriptedChannel {
    async fn open(&self, _binding: &ChatBinding) -> Result<ChannelConnection> {
        if self.fail_open {
            return Err(AssistantError::Channel("connection refused".to_string()));
        }

        let script = {
            let mut scripts = self
                .scripts
                .lock()
                .map_err(|_| AssistantError::Channel("script lock poisoned".to_string()))?;
            if scripts.is_empty() {
                Vec::new()
            } else {
                scripts.remove(0)
            }
        };

        let (event_tx, event_rx) = mpsc::channel(32);
        let (command_tx, command_rx) = mpsc::channel(32);

        for event in script {
            // capacity 32 is far above any script length
            let _ = event_tx.try_send(event);
        }
        // keep the sender alive so the receiver stays open
        tokio::spawn(async move {
            event_tx.closed().await;
        });

        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command_rx);
        }

        Ok(ChannelConnection {
            events: event_rx,
            commands: command_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatKind;

    fn binding() -> ChatBinding {
        ChatBinding {
            chat_id: 1,
            api_url: "https://finance.example/api/".to_string(),
            session_token: "token".to_string(),
            chat_kind: ChatKind::Private,
            last_message_id: None,
        }
    }

    #[tokio::test]
    async fn test_auth_accepts_positive_status() {
        let channel = ScriptedChannel::new(vec![vec![
            ChannelEvent::AuthStatus(true),
            ChannelEvent::StateChanged,
        ]]);

        let mut connection = channel.open(&binding()).await.unwrap();
        await_auth(&mut connection, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            connection.events.recv().await,
            Some(ChannelEvent::StateChanged)
        );
    }

    #[tokio::test]
    async fn test_auth_rejection_and_timeout_fail() {
        let channel = ScriptedChannel::new(vec![
            vec![ChannelEvent::AuthStatus(false)],
            vec![],
        ]);

        let mut rejected = channel.open(&binding()).await.unwrap();
        assert!(await_auth(&mut rejected, Duration::from_secs(5))
            .await
            .is_err());

        let mut silent = channel.open(&binding()).await.unwrap();
        assert!(await_auth(&mut silent, Duration::from_millis(10))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_commands_are_recorded() {
        let channel = ScriptedChannel::new(vec![vec![ChannelEvent::AuthStatus(true)]]);

        let connection = channel.open(&binding()).await.unwrap();
        connection
            .commands
            .send(ChannelCommand::RegisterPoint {
                name: "telegram".to_string(),
            })
            .await
            .unwrap();

        let sent = channel.sent_commands(0);
        assert_eq!(sent.len(), 1);
    }
}
