//! Settings scene
//!
//! Preference editing over the registry: preferred account, assistant mode,
//! tips, auto-accept and hide-amounts. The account picker works off the
//! snapshot taken when the scene was entered, never the live cache.

use crate::models::{Account, AssistantMode};
use crate::session::{ChatSession, MainState, Scene, SessionEvent};
use crate::transport::{Button, OutboundMessage};
use crate::Result;

#[derive(Debug, Clone)]
pub struct SettingsState {
    pub(crate) resume: Box<MainState>,
    accounts: Vec<Account>,
    picking_account: bool,
}

impl ChatSession {
    pub(crate) async fn enter_settings(&mut self, resume: MainState) -> Result<Scene> {
        let accounts = match &self.state {
            Some(client) => client.view().await.accounts.list.clone(),
            None => Vec::new(),
        };

        let state = SettingsState {
            resume: Box::new(resume),
            accounts,
            picking_account: false,
        };

        self.render_settings(&state).await;
        Ok(Scene::Settings(state))
    }

    pub(crate) async fn on_settings(
        &mut self,
        mut state: SettingsState,
        event: SessionEvent,
    ) -> Result<Scene> {
        let action = match event {
            SessionEvent::Button { action } => action,
            SessionEvent::Channel(_) => {
                // state changed under us; the dashboard will refresh on return
                self.last_refresh = None;
                return Ok(Scene::Settings(state));
            }
            _ => return Ok(Scene::Settings(state)),
        };

        match action.as_str() {
            "back" => {
                if state.picking_account {
                    state.picking_account = false;
                    self.render_settings(&state).await;
                    Ok(Scene::Settings(state))
                } else {
                    self.enter_main(*state.resume).await
                }
            }
            "toggle_tips" => {
                let mut prefs = self.prefs().await;
                prefs.tips_shown = !prefs.tips_shown;
                self.save_prefs(prefs).await;
                self.render_settings(&state).await;
                Ok(Scene::Settings(state))
            }
            "toggle_auto" => {
                let mut prefs = self.prefs().await;
                prefs.auto_accept = !prefs.auto_accept;
                self.save_prefs(prefs).await;
                self.render_settings(&state).await;
                Ok(Scene::Settings(state))
            }
            "toggle_hide" => {
                let mut prefs = self.prefs().await;
                prefs.hide_amounts = !prefs.hide_amounts;
                self.save_prefs(prefs).await;
                self.render_settings(&state).await;
                Ok(Scene::Settings(state))
            }
            "cycle_mode" => {
                let mut prefs = self.prefs().await;
                prefs.assistant_mode = match prefs.assistant_mode {
                    AssistantMode::Always => AssistantMode::OnNoMatch,
                    AssistantMode::OnNoMatch => AssistantMode::Disabled,
                    AssistantMode::Disabled => AssistantMode::Always,
                };
                self.save_prefs(prefs).await;
                self.render_settings(&state).await;
                Ok(Scene::Settings(state))
            }
            "pick_account" => {
                state.picking_account = true;
                self.render_account_picker(&state).await;
                Ok(Scene::Settings(state))
            }
            other => {
                if let Some(choice) = other.strip_prefix("account:") {
                    let mut prefs = self.prefs().await;
                    prefs.preferred_account_id = choice.parse::<i64>().ok();
                    self.save_prefs(prefs).await;

                    state.picking_account = false;
                    self.render_settings(&state).await;
                }
                Ok(Scene::Settings(state))
            }
        }
    }

    async fn render_settings(&mut self, state: &SettingsState) {
        let prefs = self.prefs().await;

        let preferred = prefs
            .preferred_account_id
            .and_then(|id| state.accounts.iter().find(|a| a.account_id == id))
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "none".to_string());

        let text = format!(
            "⚙ Settings\n\
             Preferred account: {}\n\
             Assistant mode: {}\n\
             Tips: {}\n\
             Auto-accept parsed transactions: {}\n\
             Hide amounts: {}",
            preferred,
            prefs.assistant_mode,
            on_off(prefs.tips_shown),
            on_off(prefs.auto_accept),
            on_off(prefs.hide_amounts),
        );

        self.show(OutboundMessage::with_buttons(
            text,
            vec![
                vec![Button::new("Preferred account", "pick_account")],
                vec![Button::new("Assistant mode", "cycle_mode")],
                vec![
                    Button::new("Tips", "toggle_tips"),
                    Button::new("Auto-accept", "toggle_auto"),
                    Button::new("Hide amounts", "toggle_hide"),
                ],
                vec![Button::new("⬅ Back", "back")],
            ],
        ))
        .await;
    }

    async fn render_account_picker(&mut self, state: &SettingsState) {
        let mut buttons: Vec<Vec<Button>> = state
            .accounts
            .iter()
            .filter(|a| !a.hidden)
            .map(|a| {
                vec![Button::new(
                    account_label(a),
                    format!("account:{}", a.account_id),
                )]
            })
            .collect();

        buttons.push(vec![Button::new("No preference", "account:none")]);
        buttons.push(vec![Button::new("⬅ Back", "back")]);

        self.show(OutboundMessage::with_buttons(
            "Pick your preferred account:",
            buttons,
        ))
        .await;
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Button label for an account; a long description is truncated so the
/// label stays readable on one row.
fn account_label(account: &Account) -> String {
    match &account.description {
        Some(description) => {
            let short: String = if description.chars().count() > 30 {
                let mut s: String = description.chars().take(29).collect();
                s.push('…');
                s
            } else {
                description.clone()
            };
            format!("{} ({})", account.name, short)
        }
        None => account.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn account(description: Option<&str>) -> Account {
        Account {
            account_id: 1,
            folder_id: 1,
            currency_id: 1,
            name: "Wallet".to_string(),
            amount: Decimal::ZERO,
            hidden: false,
            description: description.map(String::from),
        }
    }

    #[test]
    fn test_account_label_truncates_long_descriptions() {
        assert_eq!(account_label(&account(None)), "Wallet");
        assert_eq!(account_label(&account(Some("cash"))), "Wallet (cash)");

        let long = "a very long description that keeps going and going";
        let label = account_label(&account(Some(long)));
        assert!(label.ends_with("…)"));
        assert!(label.chars().count() < long.chars().count() + 10);
    }
}
