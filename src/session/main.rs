//! Main scene: the dashboard and free-text interpretation
//!
//! Renders the account dashboard, routes incoming text to the parser or the
//! assistant loop per the chat's mode, and runs the confirm / cancel flow
//! for directly parsed transactions.

use crate::channel::{await_auth, ChannelCommand};
use crate::error::AssistantError;
use crate::llm::{AiWorker, TurnRole};
use crate::models::{AssistantMode, ChatBinding, NewTransaction, ParsedAction};
use crate::session::{ChatSession, InboundMessage, Scene, SessionEvent, TypingPulse};
use crate::state::ClientState;
use crate::transport::{Button, OutboundMessage};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const COULD_NOT_UNDERSTAND: &str =
    "I could not understand that. Try \"500 grocery\" or \"+1500 salary bank\".";
const SOMETHING_WENT_WRONG: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, Default)]
pub struct MainState {
    pending: Option<PendingTransaction>,
}

/// A parsed transaction awaiting user confirmation.
#[derive(Debug, Clone)]
struct PendingTransaction {
    request: NewTransaction,
    source_text: String,
}

impl ChatSession {
    pub(crate) async fn enter_main(&mut self, state: MainState) -> Result<Scene> {
        let Some(binding) = self.deps.registry.binding(self.chat_id).await? else {
            return self.enter_registration(Default::default()).await;
        };

        if self.state.is_none() {
            let backend = self
                .deps
                .backend_factory
                .connect(&binding.api_url, &binding.session_token);
            self.state = Some(Arc::new(ClientState::new(backend)));
        }

        self.ensure_channel(&binding).await;

        match self.update_state().await {
            Ok(()) => {
                self.render_dashboard().await;
                Ok(Scene::Main(state))
            }
            Err(AssistantError::Network(message)) => {
                warn!(chat_id = self.chat_id, %message, "State refresh failed");
                self.show(OutboundMessage::with_buttons(
                    "The server is unreachable right now. Try again in a moment.",
                    vec![vec![Button::new("🔄 Retry", "dashboard")]],
                ))
                .await;
                Ok(Scene::Main(state))
            }
            Err(e) => self.render_rebind_prompt(state, e).await,
        }
    }

    pub(crate) async fn on_main(
        &mut self,
        mut state: MainState,
        event: SessionEvent,
    ) -> Result<Scene> {
        match event {
            SessionEvent::Message(message) => {
                let Some(text) = self.addressed_text(&message) else {
                    return Ok(Scene::Main(state));
                };
                self.handle_text(state, &text).await
            }
            SessionEvent::Button { action } => match action.as_str() {
                "confirm" => {
                    if let Some(pending) = state.pending.take() {
                        self.execute_transaction(&pending.request).await;
                    } else {
                        self.render_dashboard().await;
                    }
                    Ok(Scene::Main(state))
                }
                "cancel" => {
                    state.pending = None;
                    self.render_dashboard().await;
                    Ok(Scene::Main(state))
                }
                "assistant" => {
                    if let Some(pending) = state.pending.take() {
                        let answer = self.assistant_reply(&pending.source_text).await;
                        self.show_assistant_answer(answer).await;
                    }
                    Ok(Scene::Main(state))
                }
                "ai_ack" => {
                    self.context.clear();
                    if !self.channel_live {
                        if let Err(e) = self.update_state().await {
                            warn!(chat_id = self.chat_id, error = %e, "Refresh after assistant turn failed");
                        }
                    }
                    self.render_dashboard().await;
                    Ok(Scene::Main(state))
                }
                "dashboard" => {
                    self.maybe_refresh().await;
                    self.render_dashboard().await;
                    Ok(Scene::Main(state))
                }
                "settings" => self.enter_settings(state).await,
                "rebind" => {
                    self.state = None;
                    self.channel_live = false;
                    self.channel_commands = None;
                    self.enter_registration(Default::default()).await
                }
                _ => Ok(Scene::Main(state)),
            },
            SessionEvent::Channel(_) => {
                // only StateChanged reaches the scene; the rest is routed
                // by the session before dispatch
                if let Err(e) = self.update_state().await {
                    warn!(chat_id = self.chat_id, error = %e, "Refresh after push failed");
                }
                self.render_dashboard().await;
                Ok(Scene::Main(state))
            }
        }
    }

    async fn handle_text(&mut self, mut state: MainState, text: &str) -> Result<Scene> {
        self.maybe_refresh().await;

        let prefs = self.prefs().await;

        if prefs.assistant_mode == AssistantMode::Always && self.deps.llm.is_some() {
            let answer = self.assistant_reply(text).await;
            self.show_assistant_answer(answer).await;
            return Ok(Scene::Main(state));
        }

        let Some(client) = self.state.clone() else {
            return self.render_rebind_prompt(state, AssistantError::Session(
                "no bound backend".to_string(),
            ))
            .await;
        };
        let view = client.view().await;

        match self.parser.parse(&view, text, prefs.preferred_account_id) {
            Some(ParsedAction::NewNote(body)) => {
                match client.backend().create_note(body.trim()).await {
                    Ok(_) => {
                        self.show(OutboundMessage::with_buttons(
                            "📝 Note saved.",
                            vec![vec![Button::new("OK", "dashboard")]],
                        ))
                        .await
                    }
                    Err(e) => self.show_failure(e).await,
                }
                Ok(Scene::Main(state))
            }
            Some(ParsedAction::NewTransaction(request)) => {
                if prefs.auto_accept {
                    self.execute_transaction(&request).await;
                } else {
                    state.pending = Some(PendingTransaction {
                        request,
                        source_text: text.to_string(),
                    });
                    self.render_confirmation(&state).await;
                }
                Ok(Scene::Main(state))
            }
            None => {
                if prefs.assistant_mode == AssistantMode::OnNoMatch && self.deps.llm.is_some() {
                    let answer = self.assistant_reply(text).await;
                    self.show_assistant_answer(answer).await;
                } else {
                    self.show(OutboundMessage::with_buttons(
                        COULD_NOT_UNDERSTAND,
                        vec![vec![Button::new("OK", "dashboard")]],
                    ))
                    .await;
                }
                Ok(Scene::Main(state))
            }
        }
    }

    /// Group chats only listen when addressed: an @-mention (stripped before
    /// parsing) or a reply to the bot's own message.
    fn addressed_text(&self, message: &InboundMessage) -> Option<String> {
        if self.chat_kind.is_private() {
            return Some(message.text.clone());
        }

        // only a whole-token @mention counts: "@finbotter" must not
        // address a bot named "finbot"
        let mention = format!("@{}", self.deps.transport.bot_username());
        let mut mentioned = false;
        let kept: Vec<&str> = message
            .text
            .split_whitespace()
            .filter(|word| {
                if word.eq_ignore_ascii_case(&mention) {
                    mentioned = true;
                    false
                } else {
                    true
                }
            })
            .collect();

        if mentioned {
            return Some(kept.join(" "));
        }

        if message.reply_to_bot {
            return Some(message.text.clone());
        }

        None
    }

    /// Runs the assistant loop with a typing keep-alive scoped to the call.
    async fn assistant_reply(&mut self, text: &str) -> String {
        let (Some(llm), Some(client)) = (self.deps.llm.clone(), self.state.clone()) else {
            return COULD_NOT_UNDERSTAND.to_string();
        };

        let prefs = self.prefs().await;
        let view = client.view().await;
        self.context.push(TurnRole::User, text);

        let worker = AiWorker::new(
            llm,
            self.deps.config.system_prompt.clone(),
            self.deps.config.max_llm_runs,
        );

        let _typing = TypingPulse::start(
            self.deps.transport.clone(),
            self.chat_id,
            self.deps.config.typing_period,
        );

        match worker
            .answer(&mut self.context, &client.backend(), &view, &prefs)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                error!(chat_id = self.chat_id, error = %e, "Assistant call failed");
                SOMETHING_WENT_WRONG.to_string()
            }
        }
    }

    async fn show_assistant_answer(&mut self, answer: String) {
        self.show(OutboundMessage::with_buttons(
            answer,
            vec![vec![Button::new("Got it", "ai_ack")]],
        ))
        .await;
    }

    /// Executes a confirmed (or auto-accepted) transaction and re-renders.
    async fn execute_transaction(&mut self, request: &NewTransaction) {
        let Some(client) = self.state.clone() else {
            return;
        };

        match client.backend().create_transaction(request).await {
            Ok(id) => {
                info!(chat_id = self.chat_id, transaction_id = id, "Transaction created");
                self.after_mutation().await;
                self.render_dashboard().await;
            }
            Err(e) => self.show_failure(e).await,
        }
    }

    /// Post-mutation bookkeeping: the conversation context no longer matches
    /// the backend state, and without a live channel nobody will push the
    /// change to us.
    async fn after_mutation(&mut self) {
        self.context.clear();

        if !self.channel_live {
            if let Err(e) = self.update_state().await {
                warn!(chat_id = self.chat_id, error = %e, "Refresh after mutation failed");
            }
        }
    }

    async fn show_failure(&mut self, error: AssistantError) {
        let text = match error {
            // domain rejections carry the server's own wording
            AssistantError::Api(message) => format!("❌ {}", message),
            other => {
                warn!(chat_id = self.chat_id, error = %other, "Backend call failed");
                SOMETHING_WENT_WRONG.to_string()
            }
        };

        self.show(OutboundMessage::with_buttons(
            text,
            vec![vec![Button::new("OK", "dashboard")]],
        ))
        .await;
    }

    async fn render_confirmation(&mut self, state: &MainState) {
        let Some(pending) = &state.pending else {
            return;
        };
        let Some(client) = self.state.clone() else {
            return;
        };

        let prefs = self.prefs().await;
        let view = client.view().await;
        let request = &pending.request;

        let account = view
            .accounts
            .map
            .get(&request.account_id)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| format!("account {}", request.account_id));
        let category = view
            .categories
            .map
            .get(&request.category_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("category {}", request.category_id));
        let amount = view
            .format_amount(request.delta, request.account_id, true, prefs.hide_amounts)
            .unwrap_or_else(|_| request.delta.to_string());

        let mut text = format!("Log this transaction?\n{} · {} · {}", amount, category, account);
        if let Some(description) = &request.description {
            text.push_str(&format!("\n“{}”", description));
        }

        self.show(OutboundMessage::with_buttons(
            text,
            vec![
                vec![
                    Button::new("✅ Confirm", "confirm"),
                    Button::new("❌ Cancel", "cancel"),
                ],
                vec![Button::new("🤖 Ask assistant", "assistant")],
            ],
        ))
        .await;
    }

    pub(crate) async fn render_dashboard(&mut self) {
        let Some(client) = self.state.clone() else {
            return;
        };

        let prefs = self.prefs().await;
        let view = client.view().await;

        let mut text = String::from("💰 Your accounts\n");
        for (folder, accounts) in view.accounts_by_folder() {
            let visible: Vec<_> = accounts.iter().filter(|a| !a.hidden).collect();
            if visible.is_empty() {
                continue;
            }

            text.push_str(&format!("\n{}\n", folder.name));
            for account in visible {
                let marker = if prefs.preferred_account_id == Some(account.account_id) {
                    "⭐ "
                } else {
                    ""
                };
                let amount = view
                    .format_amount(account.amount, account.account_id, false, prefs.hide_amounts)
                    .unwrap_or_else(|_| account.amount.to_string());
                text.push_str(&format!("  {}{}: {}\n", marker, account.name, amount));
            }
        }

        match client.fetch_last_transactions(10).await {
            Ok(transactions) if !transactions.is_empty() => {
                text.push_str("\n🧾 Last transactions\n");
                let last = transactions.len() - 1;
                for (i, t) in transactions.iter().enumerate() {
                    let branch = if i == last { '└' } else { '├' };
                    let category = view
                        .categories
                        .map
                        .get(&t.category_id)
                        .map(|c| c.name.as_str())
                        .unwrap_or("?");
                    let amount = view
                        .format_amount(t.delta, t.account_id, true, prefs.hide_amounts)
                        .unwrap_or_else(|_| t.delta.to_string());

                    text.push_str(&format!("{} {} {}", branch, category, amount));
                    if let Some(description) = &t.description {
                        text.push_str(&format!(" · {}", description));
                    }
                    text.push('\n');
                }
            }
            Ok(_) => {}
            Err(e) => warn!(chat_id = self.chat_id, error = %e, "Transaction fetch failed"),
        }

        match client.fetch_important_notes().await {
            Ok(notes) if !notes.is_empty() => {
                text.push_str("\n📌 Notes\n");
                for note in &notes {
                    text.push_str(&format!("• {}\n", note.text));
                }
            }
            Ok(_) => {}
            Err(e) => warn!(chat_id = self.chat_id, error = %e, "Note fetch failed"),
        }

        if prefs.tips_shown {
            text.push_str(
                "\n💡 Send \"500 grocery\" to log an expense, \"+1500 salary\" for income, \
                 or start with '!' to save a note.\n",
            );
        }

        if !self.channel_live {
            text.push_str("\n⚠ Live updates unavailable; data refreshes on demand.\n");
        }

        self.show(OutboundMessage::with_buttons(
            text,
            vec![vec![Button::new("⚙ Settings", "settings")]],
        ))
        .await;
    }

    /// Opens and authenticates the update channel once; any failure degrades
    /// to the polling staleness check.
    async fn ensure_channel(&mut self, binding: &ChatBinding) {
        if self.channel_live {
            return;
        }

        let mut connection = match self.deps.channel.open(binding).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(chat_id = self.chat_id, error = %e, "Update channel unavailable; polling");
                return;
            }
        };

        if let Err(e) = await_auth(&mut connection, self.deps.config.channel_auth_timeout).await {
            warn!(chat_id = self.chat_id, error = %e, "Update channel auth failed; polling");
            return;
        }

        let prefs = self.prefs().await;
        let command = match prefs.notification_point {
            Some(point) => ChannelCommand::Subscribe(point),
            None => ChannelCommand::RegisterPoint {
                name: format!("chat-{}", self.chat_id),
            },
        };

        if connection.commands.send(command).await.is_err() {
            warn!(chat_id = self.chat_id, "Update channel closed before subscription");
            return;
        }

        self.channel_commands = Some(connection.commands);
        self.channel_events = Some(connection.events);
        self.channel_live = true;
        info!(chat_id = self.chat_id, "Update channel live");
    }

    pub(crate) async fn update_state(&mut self) -> Result<()> {
        let Some(client) = self.state.clone() else {
            return Err(AssistantError::Session("no bound backend".to_string()));
        };

        client.refresh().await?;
        self.last_refresh = Some(Instant::now());
        Ok(())
    }

    /// Polling fallback: without a live channel, refresh once the cache is
    /// older than the staleness window.
    async fn maybe_refresh(&mut self) {
        if self.channel_live {
            return;
        }

        let stale = self
            .last_refresh
            .map(|at| at.elapsed() >= self.deps.config.refresh_window)
            .unwrap_or(true);

        if stale {
            if let Err(e) = self.update_state().await {
                warn!(chat_id = self.chat_id, error = %e, "Staleness refresh failed");
            }
        }
    }

    async fn render_rebind_prompt(
        &mut self,
        state: MainState,
        error: AssistantError,
    ) -> Result<Scene> {
        error!(chat_id = self.chat_id, error = %error, "Unrecoverable backend error");

        self.show(OutboundMessage::with_buttons(
            format!(
                "⚠ Could not load your data: {}.\nYou may need to bind a new session.",
                error
            ),
            vec![vec![
                Button::new("🔁 Rebind", "rebind"),
                Button::new("🔄 Retry", "dashboard"),
            ]],
        ))
        .await;

        Ok(Scene::Main(state))
    }
}
