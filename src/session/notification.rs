//! Notification scene
//!
//! An interrupt view for pushed alerts. The scene it pre-empted is held in
//! `resume` and restored once the user acknowledges; the queue itself lives
//! on the session so silent notifications can accumulate while the user is
//! elsewhere.

use crate::session::{ChatSession, MainState, Scene, SessionEvent};
use crate::transport::{Button, OutboundMessage};
use crate::Result;

#[derive(Debug, Clone)]
pub struct NotificationState {
    pub(crate) resume: Box<MainState>,
}

impl NotificationState {
    pub(crate) fn suspending(main: MainState) -> Self {
        Self {
            resume: Box::new(main),
        }
    }
}

impl ChatSession {
    pub(crate) async fn enter_notification(&mut self, state: NotificationState) -> Result<Scene> {
        self.render_notifications().await;
        Ok(Scene::Notification(state))
    }

    pub(crate) async fn on_notification(
        &mut self,
        state: NotificationState,
        event: SessionEvent,
    ) -> Result<Scene> {
        match event {
            SessionEvent::Button { action } if action == "notif_ack" => {
                self.notifications.clear();
                self.enter_main(*state.resume).await
            }
            SessionEvent::Channel(_) => {
                // StateChanged while suspended; refresh when we get back
                self.last_refresh = None;
                Ok(Scene::Notification(state))
            }
            _ => Ok(Scene::Notification(state)),
        }
    }

    pub(crate) async fn render_notifications(&mut self) {
        let mut text = String::from("🔔 Notifications\n");
        for notification in &self.notifications {
            text.push_str(&format!("• {}\n", notification.text));
        }

        self.show(OutboundMessage::with_buttons(
            text,
            vec![vec![Button::new("Got it", "notif_ack")]],
        ))
        .await;
    }
}
