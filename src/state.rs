//! Remote state cache
//!
//! Mirrors the backend's accounts, account folders, transaction categories
//! and currencies. Each collection is an atomically swapped immutable
//! snapshot behind its own lock, so a refresh of one collection never blocks
//! readers of another. The cache never schedules its own refreshes; callers
//! decide cadence.

use crate::backend::BackendClient;
use crate::error::AssistantError;
use crate::models::{Account, AccountFolder, Category, Currency, Note, Transaction};
use crate::Result;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Placeholder rendered instead of any amount in "hide amounts" mode.
pub const HIDDEN_AMOUNT: &str = "▒▒▒▒";

/// One cached collection: ordered list + id-keyed map, swapped as a unit.
#[derive(Debug)]
pub struct CollectionSnapshot<T> {
    pub list: Vec<T>,
    pub map: HashMap<i64, T>,
}

impl<T> Default for CollectionSnapshot<T> {
    fn default() -> Self {
        Self {
            list: Vec::new(),
            map: HashMap::new(),
        }
    }
}

impl<T: Clone> CollectionSnapshot<T> {
    fn build(list: Vec<T>, key: impl Fn(&T) -> i64) -> Arc<Self> {
        let map = list.iter().map(|item| (key(item), item.clone())).collect();
        Arc::new(Self { list, map })
    }
}

/// A consistent view of all four collections taken at one moment.
///
/// Pure consumers (the parser, the LLM prompt builder, renderers) work off
/// this instead of locking the cache repeatedly.
#[derive(Clone)]
pub struct StateView {
    pub accounts: Arc<CollectionSnapshot<Account>>,
    pub folders: Arc<CollectionSnapshot<AccountFolder>>,
    pub categories: Arc<CollectionSnapshot<Category>>,
    pub currencies: Arc<CollectionSnapshot<Currency>>,
}

impl StateView {
    /// Deterministic amount rendering.
    ///
    /// `hide` short-circuits everything to the fixed placeholder. Otherwise
    /// the amount is scaled to the account currency's decimal count with
    /// round-half-up, prefixed with `+` only for positive amounts when
    /// `add_plus`, and suffixed with the currency symbol.
    pub fn format_amount(
        &self,
        amount: Decimal,
        account_id: i64,
        add_plus: bool,
        hide: bool,
    ) -> Result<String> {
        if hide {
            return Ok(HIDDEN_AMOUNT.to_string());
        }

        let account = self
            .accounts
            .map
            .get(&account_id)
            .ok_or_else(|| AssistantError::State(format!("Unknown account id {}", account_id)))?;

        let currency = self.currencies.map.get(&account.currency_id).ok_or_else(|| {
            AssistantError::State(format!("Unknown currency id {}", account.currency_id))
        })?;

        let scaled = amount
            .round_dp_with_strategy(currency.decimals, RoundingStrategy::MidpointAwayFromZero);

        let prefix = if add_plus && amount.is_sign_positive() && !amount.is_zero() {
            "+"
        } else {
            ""
        };

        // Pad to the currency's full decimal count; `scaled` already carries
        // no more than that many places, so this never re-rounds.
        Ok(format!(
            "{}{:.*}{}",
            prefix, currency.decimals as usize, scaled, currency.symbol
        ))
    }

    /// Groups the current account snapshot by folder, in folder-list order.
    /// Folders without accounts are omitted.
    pub fn accounts_by_folder(&self) -> Vec<(AccountFolder, Vec<Account>)> {
        let mut grouped: HashMap<i64, Vec<Account>> = HashMap::new();

        for account in &self.accounts.list {
            grouped
                .entry(account.folder_id)
                .or_default()
                .push(account.clone());
        }

        self.folders
            .list
            .iter()
            .filter_map(|folder| {
                grouped
                    .remove(&folder.folder_id)
                    .map(|accounts| (folder.clone(), accounts))
            })
            .collect()
    }
}

/// Thread-safe mirror of the remote financial state.
pub struct ClientState {
    backend: Arc<dyn BackendClient>,

    accounts: RwLock<Arc<CollectionSnapshot<Account>>>,
    folders: RwLock<Arc<CollectionSnapshot<AccountFolder>>>,
    categories: RwLock<Arc<CollectionSnapshot<Category>>>,
    currencies: RwLock<Arc<CollectionSnapshot<Currency>>>,
}

impl ClientState {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self {
            backend,
            accounts: RwLock::new(Arc::new(CollectionSnapshot::default())),
            folders: RwLock::new(Arc::new(CollectionSnapshot::default())),
            categories: RwLock::new(Arc::new(CollectionSnapshot::default())),
            currencies: RwLock::new(Arc::new(CollectionSnapshot::default())),
        }
    }

    pub fn backend(&self) -> Arc<dyn BackendClient> {
        Arc::clone(&self.backend)
    }

    /// Refreshes all four collections concurrently.
    ///
    /// A failed sub-fetch keeps its previous snapshot and is logged; the
    /// aggregate result still reports the first failure so callers can react
    /// (e.g. fall back to the rebind prompt on an auth error).
    pub async fn refresh(&self) -> Result<()> {
        let (accounts, folders, categories, currencies) = tokio::join!(
            self.refresh_accounts(),
            self.refresh_folders(),
            self.refresh_categories(),
            self.refresh_currencies(),
        );

        accounts.and(folders).and(categories).and(currencies)
    }

    async fn refresh_accounts(&self) -> Result<()> {
        match self.backend.accounts().await {
            Ok(list) => {
                let snapshot = CollectionSnapshot::build(list, |a| a.account_id);
                *self.accounts.write().await = snapshot;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Account refresh failed; keeping previous snapshot");
                Err(e)
            }
        }
    }

    async fn refresh_folders(&self) -> Result<()> {
        match self.backend.account_folders().await {
            Ok(list) => {
                let snapshot = CollectionSnapshot::build(list, |f| f.folder_id);
                *self.folders.write().await = snapshot;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Folder refresh failed; keeping previous snapshot");
                Err(e)
            }
        }
    }

    async fn refresh_categories(&self) -> Result<()> {
        match self.backend.categories().await {
            Ok(list) => {
                let snapshot = CollectionSnapshot::build(list, |c| c.category_id);
                *self.categories.write().await = snapshot;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Category refresh failed; keeping previous snapshot");
                Err(e)
            }
        }
    }

    async fn refresh_currencies(&self) -> Result<()> {
        match self.backend.currencies().await {
            Ok(list) => {
                let snapshot = CollectionSnapshot::build(list, |c| c.currency_id);
                *self.currencies.write().await = snapshot;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Currency refresh failed; keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// Takes a read-only view of all four current snapshots.
    pub async fn view(&self) -> StateView {
        StateView {
            accounts: Arc::clone(&*self.accounts.read().await),
            folders: Arc::clone(&*self.folders.read().await),
            categories: Arc::clone(&*self.categories.read().await),
            currencies: Arc::clone(&*self.currencies.read().await),
        }
    }

    // Pass-through reads; not cached, used for the dashboard render.

    pub async fn fetch_last_transactions(&self, count: u32) -> Result<Vec<Transaction>> {
        self.backend.transactions(0, count).await
    }

    pub async fn fetch_important_notes(&self) -> Result<Vec<Note>> {
        self.backend.important_notes().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::models::CategoryKind;

    pub(crate) fn fixtures() -> (
        Vec<Account>,
        Vec<AccountFolder>,
        Vec<Category>,
        Vec<Currency>,
    ) {
        let folders = vec![AccountFolder {
            folder_id: 1,
            name: "Personal".to_string(),
            description: None,
        }];
        let accounts = vec![
            Account {
                account_id: 7,
                folder_id: 1,
                currency_id: 1,
                name: "Wallet".to_string(),
                amount: Decimal::new(10000, 2),
                hidden: false,
                description: None,
            },
            Account {
                account_id: 8,
                folder_id: 1,
                currency_id: 1,
                name: "Bank".to_string(),
                amount: Decimal::new(500000, 2),
                hidden: false,
                description: None,
            },
        ];
        let categories = vec![
            Category {
                category_id: 3,
                name: "Groceries".to_string(),
                description: None,
                kind: CategoryKind::Expense,
            },
            Category {
                category_id: 4,
                name: "Salary".to_string(),
                description: None,
                kind: CategoryKind::Income,
            },
        ];
        let currencies = vec![Currency {
            currency_id: 1,
            symbol: "€".to_string(),
            code: "EUR".to_string(),
            decimals: 2,
            owned: false,
        }];

        (accounts, folders, categories, currencies)
    }

    async fn seeded_state() -> ClientState {
        let backend = MockBackend::new("tester");
        let (accounts, folders, categories, currencies) = fixtures();
        backend.seed(accounts, folders, categories, currencies).await;

        let state = ClientState::new(Arc::new(backend));
        state.refresh().await.unwrap();
        state
    }

    #[tokio::test]
    async fn test_refresh_is_referentially_consistent() {
        let state = seeded_state().await;
        let view = state.view().await;

        for account in &view.accounts.list {
            assert!(
                view.currencies.map.contains_key(&account.currency_id),
                "account {} references missing currency {}",
                account.account_id,
                account.currency_id
            );
            assert!(view.folders.map.contains_key(&account.folder_id));
        }
    }

    #[tokio::test]
    async fn test_format_amount_rounds_half_up() {
        let state = seeded_state().await;
        let view = state.view().await;

        let formatted = view
            .format_amount(Decimal::new(12345, 3), 7, false, false)
            .unwrap();
        assert_eq!(formatted, "12.35€");
    }

    #[tokio::test]
    async fn test_format_amount_signs_and_hide() {
        let state = seeded_state().await;
        let view = state.view().await;

        let positive = view
            .format_amount(Decimal::new(1500, 0), 7, true, false)
            .unwrap();
        assert_eq!(positive, "+1500.00€");

        let negative = view
            .format_amount(Decimal::new(-1500, 0), 7, true, false)
            .unwrap();
        assert_eq!(negative, "-1500.00€");

        // hide=true is idempotent and ignores every other flag
        for _ in 0..3 {
            let hidden = view
                .format_amount(Decimal::new(-1500, 0), 7, true, true)
                .unwrap();
            assert_eq!(hidden, HIDDEN_AMOUNT);
        }
    }

    #[tokio::test]
    async fn test_format_amount_unknown_account_errors() {
        let state = seeded_state().await;
        let view = state.view().await;

        let result = view.format_amount(Decimal::ONE, 999, false, false);
        assert!(matches!(result, Err(AssistantError::State(_))));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let state = seeded_state().await;

        // Swap the backend's data out from under the cache by refreshing
        // against an empty (unauthorized) backend.
        let broken = ClientState::new(Arc::new(MockBackend::new("")));
        assert!(broken.refresh().await.is_ok()); // empty lists are still valid

        let view = state.view().await;
        assert_eq!(view.accounts.list.len(), 2);
    }

    #[tokio::test]
    async fn test_accounts_by_folder_omits_empty_folders() {
        let backend = MockBackend::new("tester");
        let (accounts, mut folders, categories, currencies) = fixtures();
        folders.push(AccountFolder {
            folder_id: 2,
            name: "Empty".to_string(),
            description: None,
        });
        backend.seed(accounts, folders, categories, currencies).await;

        let state = ClientState::new(Arc::new(backend));
        state.refresh().await.unwrap();

        let grouped = state.view().await.accounts_by_folder();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0.name, "Personal");
        assert_eq!(grouped[0].1.len(), 2);
    }
}
