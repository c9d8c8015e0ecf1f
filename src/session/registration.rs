//! Registration scene
//!
//! Binds a chat to a backend server: an optional custom-URL step, then a
//! session-token step verified with an identity probe. The binding is
//! persisted through the registry before the session moves to the
//! dashboard, so a restart always resumes Main.

use crate::models::ChatBinding;
use crate::session::{ChatSession, MainState, Scene, SessionEvent};
use crate::state::ClientState;
use crate::transport::{Button, OutboundMessage};
use crate::Result;
use std::sync::Arc;
use tracing::info;

const USE_DEFAULT_ACTION: &str = "default_url";

#[derive(Debug, Clone, Default)]
pub struct RegistrationState {
    step: RegistrationStep,
}

#[derive(Debug, Clone, Default)]
enum RegistrationStep {
    #[default]
    Url,
    Token {
        api_url: String,
    },
}

impl ChatSession {
    pub(crate) async fn enter_registration(
        &mut self,
        mut state: RegistrationState,
    ) -> Result<Scene> {
        if self.deps.config.allow_custom_url {
            self.show(OutboundMessage::with_buttons(
                "Welcome! Send the URL of your server, or use the default one.",
                vec![vec![Button::new(
                    format!("Use {}", self.deps.config.default_api_url),
                    USE_DEFAULT_ACTION,
                )]],
            ))
            .await;
        } else {
            state.step = RegistrationStep::Token {
                api_url: self.deps.config.default_api_url.clone(),
            };
            self.show(OutboundMessage::text(
                "Welcome! Send a session token to connect your account.",
            ))
            .await;
        }

        Ok(Scene::Registration(state))
    }

    pub(crate) async fn on_registration(
        &mut self,
        mut state: RegistrationState,
        event: SessionEvent,
    ) -> Result<Scene> {
        match event {
            SessionEvent::Button { action } if action == USE_DEFAULT_ACTION => {
                state.step = RegistrationStep::Token {
                    api_url: self.deps.config.default_api_url.clone(),
                };
                self.show(OutboundMessage::text(
                    "Now send a session token for your account.",
                ))
                .await;
                Ok(Scene::Registration(state))
            }
            SessionEvent::Message(message) => match &state.step {
                RegistrationStep::Url => {
                    match normalize_url(&message.text) {
                        Some(api_url) => {
                            state.step = RegistrationStep::Token { api_url };
                            self.show(OutboundMessage::text(
                                "Now send a session token for your account.",
                            ))
                            .await;
                        }
                        None => {
                            self.show(OutboundMessage::text(
                                "That does not look like a server address. \
                                 Send a URL or a bare domain like finance.example.",
                            ))
                            .await;
                        }
                    }
                    Ok(Scene::Registration(state))
                }
                RegistrationStep::Token { api_url } => {
                    self.try_bind(api_url.clone(), message.text.trim().to_string(), state)
                        .await
                }
            },
            _ => Ok(Scene::Registration(state)),
        }
    }

    /// Probes the token; on success the binding is stored before the Main
    /// transition, on failure the user is re-prompted in place.
    async fn try_bind(
        &mut self,
        api_url: String,
        token: String,
        state: RegistrationState,
    ) -> Result<Scene> {
        let backend = self.deps.backend_factory.connect(&api_url, &token);

        match backend.whoami().await {
            Ok(username) => {
                info!(chat_id = self.chat_id, %username, "Chat bound to backend");

                self.deps
                    .registry
                    .register(ChatBinding {
                        chat_id: self.chat_id,
                        api_url,
                        session_token: token,
                        chat_kind: self.chat_kind,
                        last_message_id: self.last_message_id,
                    })
                    .await?;

                self.state = Some(Arc::new(ClientState::new(backend)));
                self.enter_main(MainState::default()).await
            }
            Err(e) => {
                self.show(OutboundMessage::text(format!(
                    "That token did not work ({}). Send a valid session token.",
                    e
                )))
                .await;
                Ok(Scene::Registration(state))
            }
        }
    }
}

/// Accepts a full URL as-is; a bare domain becomes `https://<host>/api/`.
/// A trailing slash is always ensured.
fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return None;
    }

    let mut url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}/api/", trimmed.trim_matches('/'))
    };

    if !url.ends_with('/') {
        url.push('/');
    }
    Some(url)
}
