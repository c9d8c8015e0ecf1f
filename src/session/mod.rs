//! Per-chat conversational state machine
//!
//! One `ChatSession` per chat, holding the active scene as a tagged union
//! dispatched through a single enter / handle-event contract. A session is
//! only ever driven behind its own mutex, so events are processed strictly
//! in arrival order and a refresh started by one event settles before the
//! next event is seen.

mod main;
mod notification;
mod registration;
mod settings;

pub use main::MainState;
pub use notification::NotificationState;
pub use registration::RegistrationState;
pub use settings::SettingsState;

use crate::backend::BackendFactory;
use crate::channel::{ChannelCommand, ChannelEvent, PushNotification, UpdateChannel};
use crate::config::AssistantConfig;
use crate::llm::{ChatContext, LlmClient};
use crate::models::{ChatKind, ChatPreferences};
use crate::parser::ActionParser;
use crate::registry::ChatRegistry;
use crate::state::ClientState;
use crate::transport::{MessageTransport, OutboundMessage};
use crate::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// An inbound chat message, as delivered by the messaging transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: i64,
    pub text: String,
    /// Whether this message replies to one of the bot's own messages.
    pub reply_to_bot: bool,
}

/// Everything a session can react to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Message(InboundMessage),
    /// An inline-button press; `action` is the payload the button carried.
    Button { action: String },
    Channel(ChannelEvent),
}

/// The active scene of a chat.
pub enum Scene {
    Registration(RegistrationState),
    Main(MainState),
    Settings(SettingsState),
    Notification(NotificationState),
}

impl Scene {
    pub fn name(&self) -> &'static str {
        match self {
            Scene::Registration(_) => "registration",
            Scene::Main(_) => "main",
            Scene::Settings(_) => "settings",
            Scene::Notification(_) => "notification",
        }
    }
}

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub config: AssistantConfig,
    pub registry: Arc<dyn ChatRegistry>,
    pub transport: Arc<dyn MessageTransport>,
    pub backend_factory: Arc<dyn BackendFactory>,
    pub channel: Arc<dyn UpdateChannel>,
    pub llm: Option<Arc<dyn LlmClient>>,
}

pub struct ChatSession {
    chat_id: i64,
    chat_kind: ChatKind,
    deps: SessionDeps,
    parser: ActionParser,

    scene: Scene,
    state: Option<Arc<ClientState>>,
    context: ChatContext,

    channel_commands: Option<mpsc::Sender<ChannelCommand>>,
    channel_events: Option<mpsc::Receiver<ChannelEvent>>,
    channel_live: bool,

    last_refresh: Option<Instant>,
    last_message_id: Option<i64>,
    notifications: VecDeque<PushNotification>,
}

impl ChatSession {
    pub fn new(chat_id: i64, chat_kind: ChatKind, deps: SessionDeps) -> Self {
        let parser = ActionParser::new(deps.config.preferred_account_boost);
        let context = ChatContext::new(deps.config.context_capacity);

        Self {
            chat_id,
            chat_kind,
            deps,
            parser,
            scene: Scene::Registration(RegistrationState::default()),
            state: None,
            context,
            channel_commands: None,
            channel_events: None,
            channel_live: false,
            last_refresh: None,
            last_message_id: None,
            notifications: VecDeque::new(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Hands the live channel's event half to an external pump, which should
    /// feed them back as `SessionEvent::Channel`.
    pub fn take_channel_events(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.channel_events.take()
    }

    /// Picks the initial scene: Main for a registered chat, Registration
    /// otherwise.
    pub async fn start(&mut self) -> Result<()> {
        let scene = if self.deps.registry.binding(self.chat_id).await?.is_some() {
            self.enter_main(MainState::default()).await?
        } else {
            self.enter_registration(RegistrationState::default()).await?
        };

        self.scene = scene;
        debug!(chat_id = self.chat_id, scene = self.scene.name(), "Session started");
        Ok(())
    }

    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<()> {
        // Notifications and channel bookkeeping are routed the same way
        // regardless of the active scene.
        if let SessionEvent::Channel(channel_event) = &event {
            match channel_event {
                ChannelEvent::Notification(notification) => {
                    let notification = notification.clone();
                    return self.on_push_notification(notification).await;
                }
                ChannelEvent::PointRegistered(point) => {
                    let point = *point;
                    return self.on_point_registered(point).await;
                }
                ChannelEvent::AuthStatus(_) => return Ok(()),
                ChannelEvent::StateChanged => {}
            }
        }

        let scene = self.take_scene();
        let next = match scene {
            Scene::Registration(state) => self.on_registration(state, event).await?,
            Scene::Main(state) => self.on_main(state, event).await?,
            Scene::Settings(state) => self.on_settings(state, event).await?,
            Scene::Notification(state) => self.on_notification(state, event).await?,
        };
        self.scene = next;

        debug!(chat_id = self.chat_id, scene = self.scene.name(), "Event handled");
        Ok(())
    }

    /// A non-silent notification pre-empts the dashboard; a silent one only
    /// queues. Registration is never interrupted.
    async fn on_push_notification(&mut self, notification: PushNotification) -> Result<()> {
        let silent = notification.silent;
        self.notifications.push_back(notification);

        if silent {
            if matches!(self.scene, Scene::Notification(_)) {
                self.render_notifications().await;
            }
            return Ok(());
        }

        let scene = self.take_scene();
        let next = match scene {
            Scene::Main(main) => {
                self.enter_notification(NotificationState::suspending(main))
                    .await?
            }
            Scene::Settings(settings) => {
                self.enter_notification(NotificationState {
                    resume: settings.resume,
                })
                .await?
            }
            Scene::Notification(state) => {
                self.render_notifications().await;
                Scene::Notification(state)
            }
            Scene::Registration(state) => Scene::Registration(state),
        };
        self.scene = next;
        Ok(())
    }

    async fn on_point_registered(&mut self, point: Uuid) -> Result<()> {
        let mut prefs = self.prefs().await;
        prefs.notification_point = Some(point);
        self.save_prefs(prefs).await;

        if let Some(commands) = &self.channel_commands {
            if commands.send(ChannelCommand::Subscribe(point)).await.is_err() {
                warn!(chat_id = self.chat_id, "Update channel closed before subscribe");
            }
        }
        Ok(())
    }

    fn take_scene(&mut self) -> Scene {
        std::mem::replace(
            &mut self.scene,
            Scene::Registration(RegistrationState::default()),
        )
    }

    /// Replaces the chat's assistant message. Transport failures are logged,
    /// never raised: the next render supersedes this one anyway.
    pub(crate) async fn show(&mut self, message: OutboundMessage) {
        match self.deps.transport.set_content(self.chat_id, message).await {
            Ok(message_id) => self.last_message_id = Some(message_id),
            Err(e) => warn!(chat_id = self.chat_id, error = %e, "Message delivery failed"),
        }
    }

    pub(crate) async fn prefs(&self) -> ChatPreferences {
        self.deps
            .registry
            .preferences(self.chat_id)
            .await
            .unwrap_or_else(|_| ChatPreferences::new(self.chat_id))
    }

    pub(crate) async fn save_prefs(&self, prefs: ChatPreferences) {
        if let Err(e) = self.deps.registry.update_preferences(prefs).await {
            warn!(chat_id = self.chat_id, error = %e, "Preference update failed");
        }
    }
}

/// Keeps the chat's typing indicator alive while a slow call is in flight.
/// Dropping the guard aborts the task, so the pulse can never outlive the
/// call it decorates.
pub struct TypingPulse {
    handle: JoinHandle<()>,
}

impl TypingPulse {
    pub fn start(transport: Arc<dyn MessageTransport>, chat_id: i64, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if transport.typing(chat_id).await.is_err() {
                    break;
                }
            }
        });

        Self { handle }
    }
}

impl Drop for TypingPulse {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Owns all live sessions, one mutex-guarded session per chat.
pub struct SessionManager {
    deps: SessionDeps,
    sessions: Mutex<HashMap<i64, Arc<Mutex<ChatSession>>>>,
}

impl SessionManager {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The chat's session, created and started on first use. A new session
    /// is started before it becomes visible in the map, so a concurrent
    /// dispatch can never reach an unstarted scene.
    pub async fn session(
        &self,
        chat_id: i64,
        chat_kind: ChatKind,
    ) -> Result<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&chat_id) {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(Mutex::new(ChatSession::new(
            chat_id,
            chat_kind,
            self.deps.clone(),
        )));
        {
            let mut guard = session.lock().await;
            guard.start().await?;
            Self::pump_channel_events(&session, &mut guard);
        }
        sessions.insert(chat_id, Arc::clone(&session));

        Ok(session)
    }

    /// Routes one event to the chat's session, in arrival order.
    pub async fn dispatch(
        &self,
        chat_id: i64,
        chat_kind: ChatKind,
        event: SessionEvent,
    ) -> Result<()> {
        let session = self.session(chat_id, chat_kind).await?;
        let mut guard = session.lock().await;
        let result = guard.handle_event(event).await;

        // the channel may have just gone live (e.g. registration completed)
        Self::pump_channel_events(&session, &mut guard);
        result
    }

    /// Forwards events from a freshly authenticated channel connection into
    /// the session's own event path, behind the same per-chat mutex as every
    /// other event. The task ends when the connection closes.
    fn pump_channel_events(session: &Arc<Mutex<ChatSession>>, guard: &mut ChatSession) {
        let Some(mut events) = guard.take_channel_events() else {
            return;
        };

        let chat_id = guard.chat_id;
        let session = Arc::clone(session);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mut session = session.lock().await;
                if let Err(e) = session.handle_event(SessionEvent::Channel(event)).await {
                    warn!(chat_id, error = %e, "Channel event handling failed");
                }
            }
            debug!(chat_id, "Update channel connection closed");
        });
    }
}
