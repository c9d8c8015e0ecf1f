//! Core data models for the finance chat assistant

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Remote entities =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub account_id: i64,
    pub folder_id: i64,
    pub currency_id: i64,
    pub name: String,
    pub amount: Decimal,
    pub hidden: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountFolder {
    pub folder_id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Signed category kind: income-only, expense-only, or both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Income,
    Mixed,
    Expense,
}

impl CategoryKind {
    /// Signed representation used by the backend (+1 income, 0 both, -1 expense).
    pub fn signum(self) -> i32 {
        match self {
            CategoryKind::Income => 1,
            CategoryKind::Mixed => 0,
            CategoryKind::Expense => -1,
        }
    }

    /// A category is compatible with a delta when kind * sign >= 0.
    pub fn matches_sign(self, delta_signum: i32) -> bool {
        self.signum() * delta_signum >= 0
    }

    pub fn from_signum(raw: i32) -> Self {
        match raw {
            1.. => CategoryKind::Income,
            0 => CategoryKind::Mixed,
            _ => CategoryKind::Expense,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub kind: CategoryKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Currency {
    pub currency_id: i64,
    pub symbol: String,
    pub code: String,
    pub decimals: u32,
    pub owned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub transaction_id: i64,
    pub category_id: i64,
    pub account_id: i64,
    pub currency_id: i64,
    pub delta: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub note_id: i64,
    pub text: String,
    pub notification_time: Option<DateTime<Utc>>,
}

//
// ================= Mutation requests =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTransaction {
    pub category_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
    pub delta: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EditTransaction {
    pub transaction_id: i64,
    pub category_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
    pub delta: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTransfer {
    pub category_id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub created_at: DateTime<Utc>,
    pub from_delta: Decimal,
    pub to_delta: Decimal,
    pub description: Option<String>,
}

/// Structured outcome of parsing one free-text line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAction {
    NewNote(String),
    NewTransaction(NewTransaction),
}

//
// ================= Chat registry records =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_private(self) -> bool {
        self == ChatKind::Private
    }
}

/// A chat's bound backend session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatBinding {
    pub chat_id: i64,
    pub api_url: String,
    pub session_token: String,
    pub chat_kind: ChatKind,
    pub last_message_id: Option<i64>,
}

/// Routing policy for free text that the parser could not resolve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AssistantMode {
    Always,
    OnNoMatch,
    Disabled,
}

impl fmt::Display for AssistantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssistantMode::Always => "always",
            AssistantMode::OnNoMatch => "on no match",
            AssistantMode::Disabled => "disabled",
        };
        write!(f, "{}", s)
    }
}

/// Per-chat preference record, owned by the external registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatPreferences {
    pub chat_id: i64,
    pub preferred_account_id: Option<i64>,
    pub assistant_mode: AssistantMode,
    pub tips_shown: bool,
    pub auto_accept: bool,
    pub hide_amounts: bool,
    pub notification_point: Option<Uuid>,
}

impl ChatPreferences {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            preferred_account_id: None,
            assistant_mode: AssistantMode::OnNoMatch,
            tips_shown: true,
            auto_accept: false,
            hide_amounts: false,
            notification_point: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_sign_compatibility() {
        assert!(CategoryKind::Income.matches_sign(1));
        assert!(!CategoryKind::Income.matches_sign(-1));
        assert!(CategoryKind::Expense.matches_sign(-1));
        assert!(!CategoryKind::Expense.matches_sign(1));
        assert!(CategoryKind::Mixed.matches_sign(1));
        assert!(CategoryKind::Mixed.matches_sign(-1));
    }

    #[test]
    fn test_default_preferences() {
        let prefs = ChatPreferences::new(42);
        assert_eq!(prefs.chat_id, 42);
        assert_eq!(prefs.assistant_mode, AssistantMode::OnNoMatch);
        assert!(prefs.tips_shown);
        assert!(!prefs.auto_accept);
        assert!(prefs.preferred_account_id.is_none());
    }
}
