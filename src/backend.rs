//! Backend financial service client
//!
//! `BackendClient` is the trait seam between the assistant and the remote
//! service. `HttpBackend` talks to a real server over a long-lived pooled
//! reqwest client; `MockBackend` keeps everything in memory for tests and
//! the demo binary.

use crate::error::AssistantError;
use crate::models::{
    Account, AccountFolder, Category, Currency, EditTransaction, NewTransaction, NewTransfer,
    Note, Transaction,
};
use crate::Result;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::error;

#[async_trait::async_trait]
pub trait BackendClient: Send + Sync {
    async fn accounts(&self) -> Result<Vec<Account>>;
    async fn account_folders(&self) -> Result<Vec<AccountFolder>>;
    async fn categories(&self) -> Result<Vec<Category>>;
    async fn currencies(&self) -> Result<Vec<Currency>>;
    async fn transactions(&self, offset: u32, count: u32) -> Result<Vec<Transaction>>;
    async fn important_notes(&self) -> Result<Vec<Note>>;

    async fn create_transaction(&self, request: &NewTransaction) -> Result<i64>;
    async fn edit_transaction(&self, request: &EditTransaction) -> Result<()>;
    async fn delete_transaction(&self, transaction_id: i64) -> Result<()>;
    async fn create_transfer(&self, request: &NewTransfer) -> Result<i64>;
    async fn create_note(&self, text: &str) -> Result<i64>;

    /// Identity probe; succeeds only for a valid bound session.
    async fn whoami(&self) -> Result<String>;
}

/// Creates backend clients for a chat's bound server URL + session token.
///
/// A trait so session tests can inject `MockBackend` without a server.
pub trait BackendFactory: Send + Sync {
    fn connect(&self, api_url: &str, session_token: &str) -> Arc<dyn BackendClient>;
}

//
// ================= HTTP implementation =================
//

pub struct HttpBackend {
    client: Client,
    base_url: String,
    session_token: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    username: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, session_token: &str) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token: session_token.to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.session_token)
            .send()
            .await
            .map_err(|e| AssistantError::Network(format!("GET {} failed: {}", path, e)))?;

        Self::decode(response, path).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.session_token)
            .json(body)
            .send()
            .await
            .map_err(|e| AssistantError::Network(format!("POST {} failed: {}", path, e)))?;

        Self::decode(response, path).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            // The server reports domain rejections as {"message": ...};
            // surface that text verbatim.
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<MessageResponse>(&body)
                .map(|m| m.message)
                .unwrap_or_else(|_| format!("{} on {}", status, path));

            error!(path, %status, "Backend request rejected");
            return Err(AssistantError::Api(message));
        }

        response.json::<T>().await.map_err(|e| {
            AssistantError::Network(format!("Malformed response from {}: {}", path, e))
        })
    }
}

#[async_trait::async_trait]
impl BackendClient for HttpBackend {
    async fn accounts(&self) -> Result<Vec<Account>> {
        self.get_json("/accounts").await
    }

    async fn account_folders(&self) -> Result<Vec<AccountFolder>> {
        self.get_json("/accounts/folders").await
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        self.get_json("/transactions/categories").await
    }

    async fn currencies(&self) -> Result<Vec<Currency>> {
        self.get_json("/currencies").await
    }

    async fn transactions(&self, offset: u32, count: u32) -> Result<Vec<Transaction>> {
        self.get_json(&format!("/transactions?offset={}&count={}", offset, count))
            .await
    }

    async fn important_notes(&self) -> Result<Vec<Note>> {
        self.get_json("/notes/important").await
    }

    async fn create_transaction(&self, request: &NewTransaction) -> Result<i64> {
        let response: IdResponse = self.post_json("/transactions/new", request).await?;
        Ok(response.id)
    }

    async fn edit_transaction(&self, request: &EditTransaction) -> Result<()> {
        let _: MessageResponse = self.post_json("/transactions/edit", request).await?;
        Ok(())
    }

    async fn delete_transaction(&self, transaction_id: i64) -> Result<()> {
        let body = serde_json::json!({ "transactionId": transaction_id });
        let _: MessageResponse = self.post_json("/transactions/delete", &body).await?;
        Ok(())
    }

    async fn create_transfer(&self, request: &NewTransfer) -> Result<i64> {
        let response: IdResponse = self.post_json("/transactions/transfer", request).await?;
        Ok(response.id)
    }

    async fn create_note(&self, text: &str) -> Result<i64> {
        let body = serde_json::json!({ "text": text });
        let response: IdResponse = self.post_json("/notes/new", &body).await?;
        Ok(response.id)
    }

    async fn whoami(&self) -> Result<String> {
        let response: WhoamiResponse = self.get_json("/user/whoami").await?;
        Ok(response.username)
    }
}

pub struct HttpBackendFactory;

impl BackendFactory for HttpBackendFactory {
    fn connect(&self, api_url: &str, session_token: &str) -> Arc<dyn BackendClient> {
        Arc::new(HttpBackend::new(api_url, session_token))
    }
}

/// Factory that hands out one shared in-memory backend regardless of the
/// binding, for tests and the demo binary.
pub struct MockBackendFactory {
    backend: Arc<MockBackend>,
}

impl MockBackendFactory {
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self { backend }
    }
}

impl BackendFactory for MockBackendFactory {
    fn connect(&self, _api_url: &str, _session_token: &str) -> Arc<dyn BackendClient> {
        Arc::clone(&self.backend) as Arc<dyn BackendClient>
    }
}

//
// ================= In-memory implementation =================
//

/// In-memory backend for tests and the demo binary.
///
/// Mutations behave like the real service: creates allocate ids, edits and
/// deletes reject unknown ids with a domain error.
#[derive(Default)]
pub struct MockBackend {
    pub username: String,
    accounts: RwLock<Vec<Account>>,
    folders: RwLock<Vec<AccountFolder>>,
    categories: RwLock<Vec<Category>>,
    currencies: RwLock<Vec<Currency>>,
    transactions: RwLock<Vec<Transaction>>,
    notes: RwLock<Vec<Note>>,
    next_id: AtomicI64,
}

impl MockBackend {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    pub async fn seed(
        &self,
        accounts: Vec<Account>,
        folders: Vec<AccountFolder>,
        categories: Vec<Category>,
        currencies: Vec<Currency>,
    ) {
        *self.accounts.write().await = accounts;
        *self.folders.write().await = folders;
        *self.categories.write().await = categories;
        *self.currencies.write().await = currencies;
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn last_transaction(&self) -> Option<Transaction> {
        self.transactions.read().await.last().cloned()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BackendClient for MockBackend {
    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.read().await.clone())
    }

    async fn account_folders(&self) -> Result<Vec<AccountFolder>> {
        Ok(self.folders.read().await.clone())
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.categories.read().await.clone())
    }

    async fn currencies(&self) -> Result<Vec<Currency>> {
        Ok(self.currencies.read().await.clone())
    }

    async fn transactions(&self, offset: u32, count: u32) -> Result<Vec<Transaction>> {
        let all = self.transactions.read().await;
        Ok(all
            .iter()
            .rev()
            .skip(offset as usize)
            .take(count as usize)
            .cloned()
            .collect())
    }

    async fn important_notes(&self) -> Result<Vec<Note>> {
        Ok(self.notes.read().await.clone())
    }

    async fn create_transaction(&self, request: &NewTransaction) -> Result<i64> {
        let currency_id = {
            let accounts = self.accounts.read().await;
            accounts
                .iter()
                .find(|a| a.account_id == request.account_id)
                .map(|a| a.currency_id)
                .ok_or_else(|| AssistantError::Api("Unknown account".to_string()))?
        };

        let id = self.allocate_id();
        self.transactions.write().await.push(Transaction {
            transaction_id: id,
            category_id: request.category_id,
            account_id: request.account_id,
            currency_id,
            delta: request.delta,
            description: request.description.clone(),
            created_at: request.created_at,
        });

        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.iter_mut().find(|a| a.account_id == request.account_id) {
            account.amount += request.delta;
        }

        Ok(id)
    }

    async fn edit_transaction(&self, request: &EditTransaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let existing = transactions
            .iter_mut()
            .find(|t| t.transaction_id == request.transaction_id)
            .ok_or_else(|| AssistantError::Api("Unknown transaction".to_string()))?;

        existing.category_id = request.category_id;
        existing.account_id = request.account_id;
        existing.delta = request.delta;
        existing.description = request.description.clone();
        Ok(())
    }

    async fn delete_transaction(&self, transaction_id: i64) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let before = transactions.len();
        transactions.retain(|t| t.transaction_id != transaction_id);

        if transactions.len() == before {
            return Err(AssistantError::Api("Unknown transaction".to_string()));
        }
        Ok(())
    }

    async fn create_transfer(&self, request: &NewTransfer) -> Result<i64> {
        let id = self.allocate_id();

        let mut accounts = self.accounts.write().await;
        for account in accounts.iter_mut() {
            if account.account_id == request.from_account_id {
                account.amount += request.from_delta;
            }
            if account.account_id == request.to_account_id {
                account.amount += request.to_delta;
            }
        }

        Ok(id)
    }

    async fn create_note(&self, text: &str) -> Result<i64> {
        let id = self.allocate_id();
        self.notes.write().await.push(Note {
            note_id: id,
            text: text.to_string(),
            notification_time: None,
        });
        Ok(id)
    }

    async fn whoami(&self) -> Result<String> {
        if self.username.is_empty() {
            return Err(AssistantError::Api("Invalid session".to_string()));
        }
        Ok(self.username.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryKind;
    use chrono::Utc;
    use rust_decimal::Decimal;

    pub(crate) fn sample_account(id: i64, folder_id: i64, name: &str) -> Account {
        Account {
            account_id: id,
            folder_id,
            currency_id: 1,
            name: name.to_string(),
            amount: Decimal::ZERO,
            hidden: false,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_mock_backend_create_and_delete() {
        let backend = MockBackend::new("tester");
        backend
            .seed(
                vec![sample_account(7, 1, "Wallet")],
                vec![AccountFolder {
                    folder_id: 1,
                    name: "Cash".to_string(),
                    description: None,
                }],
                vec![Category {
                    category_id: 3,
                    name: "Groceries".to_string(),
                    description: None,
                    kind: CategoryKind::Expense,
                }],
                vec![Currency {
                    currency_id: 1,
                    symbol: "€".to_string(),
                    code: "EUR".to_string(),
                    decimals: 2,
                    owned: false,
                }],
            )
            .await;

        let id = backend
            .create_transaction(&NewTransaction {
                category_id: 3,
                account_id: 7,
                created_at: Utc::now(),
                delta: Decimal::new(-2000, 2),
                description: Some("coffee".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(backend.transaction_count().await, 1);

        backend.delete_transaction(id).await.unwrap();
        assert_eq!(backend.transaction_count().await, 0);

        let err = backend.delete_transaction(id).await.unwrap_err();
        assert!(matches!(err, AssistantError::Api(_)));
    }

    #[tokio::test]
    async fn test_mock_backend_rejects_unknown_account() {
        let backend = MockBackend::new("tester");

        let result = backend
            .create_transaction(&NewTransaction {
                category_id: 1,
                account_id: 99,
                created_at: Utc::now(),
                delta: Decimal::new(-100, 0),
                description: None,
            })
            .await;

        assert!(matches!(result, Err(AssistantError::Api(_))));
    }
}
