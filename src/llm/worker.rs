//! Bounded action-execution loop
//!
//! Asks the model for a reply, executes any embedded directives against the
//! backend, feeds the observed results back as context, and re-asks until
//! the model produces a plain answer or the run budget is exhausted. The
//! budget is the only defense against a model that keeps emitting
//! directives, so exhaustion returns a fixed refusal instead of an error.

use crate::backend::BackendClient;
use crate::llm::client::LlmClient;
use crate::llm::context::{ChatContext, TurnRole};
use crate::llm::directives::{parse_line, Directive, ParsedLine};
use crate::models::{ChatPreferences, Transaction};
use crate::state::StateView;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Returned when the model exhausts its per-turn action budget.
pub const REFUSAL_MESSAGE: &str =
    "I could not finish that request within the allowed number of steps. Please try again.";

pub struct AiWorker {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    max_runs: u32,
}

#[derive(Default)]
struct PassOutcome {
    created: u32,
    edited: u32,
    deleted: u32,
    failed: u32,
    fetched: Option<String>,
    any_matched: bool,
}

impl AiWorker {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: String, max_runs: u32) -> Self {
        Self {
            llm,
            system_prompt,
            max_runs,
        }
    }

    /// Runs the loop for the conversation in `context`. The final user turn
    /// must already be pushed; observed facts and model replies are appended
    /// as the loop progresses.
    pub async fn answer(
        &self,
        context: &mut ChatContext,
        backend: &Arc<dyn BackendClient>,
        view: &StateView,
        prefs: &ChatPreferences,
    ) -> Result<String> {
        if self.max_runs == 0 {
            return Ok(REFUSAL_MESSAGE.to_string());
        }

        let mut reply = match context.last() {
            Some((TurnRole::Assistant, text)) => text.clone(),
            _ => self.ask(context, view, prefs).await?,
        };

        let mut runs_left = self.max_runs;

        loop {
            let outcome = self.execute_pass(&reply, backend).await;

            if !outcome.any_matched {
                return Ok(reply);
            }

            record_outcome(context, &outcome);

            runs_left -= 1;
            if runs_left == 0 {
                warn!(
                    max_runs = self.max_runs,
                    "LLM exhausted its action budget; refusing"
                );
                return Ok(REFUSAL_MESSAGE.to_string());
            }

            reply = self.ask(context, view, prefs).await?;
        }
    }

    async fn ask(
        &self,
        context: &mut ChatContext,
        view: &StateView,
        prefs: &ChatPreferences,
    ) -> Result<String> {
        let system = format!(
            "{}\nHere is the current financial state:\n{}",
            self.system_prompt,
            state_to_text(view, prefs)
        );

        let turns: Vec<(TurnRole, String)> = context.turns().cloned().collect();
        let reply = self.llm.complete(&system, &turns).await?;

        debug!(reply_len = reply.len(), "LLM reply received");
        context.push(TurnRole::Assistant, reply.clone());

        Ok(reply)
    }

    /// Executes every directive found in one reply. Failures are counted,
    /// never raised; a single pass is the unit of at-most-once execution.
    async fn execute_pass(&self, reply: &str, backend: &Arc<dyn BackendClient>) -> PassOutcome {
        let mut outcome = PassOutcome::default();

        for line in reply.lines() {
            let directive = match parse_line(line) {
                ParsedLine::Ignored => continue,
                ParsedLine::Malformed => {
                    warn!(line, "Malformed directive line");
                    outcome.any_matched = true;
                    outcome.failed += 1;
                    continue;
                }
                ParsedLine::Directive(directive) => {
                    outcome.any_matched = true;
                    directive
                }
            };

            match directive {
                Directive::FetchTransactions { count } => {
                    match backend.transactions(0, count).await {
                        Ok(transactions) => {
                            outcome.fetched = Some(render_transactions(&transactions));
                        }
                        Err(e) => {
                            error!(error = %e, line, "Transaction fetch for LLM failed");
                            outcome.failed += 1;
                        }
                    }
                }
                Directive::NewTransaction(request) => {
                    match backend.create_transaction(&request).await {
                        Ok(_) => outcome.created += 1,
                        Err(e) => {
                            error!(error = %e, line, "LLM-issued transaction failed");
                            outcome.failed += 1;
                        }
                    }
                }
                Directive::EditTransaction(request) => {
                    match backend.edit_transaction(&request).await {
                        Ok(()) => outcome.edited += 1,
                        Err(e) => {
                            error!(error = %e, line, "LLM-issued edit failed");
                            outcome.failed += 1;
                        }
                    }
                }
                Directive::DeleteTransaction { transaction_id } => {
                    match backend.delete_transaction(transaction_id).await {
                        Ok(()) => outcome.deleted += 1,
                        Err(e) => {
                            error!(error = %e, line, "LLM-issued delete failed");
                            outcome.failed += 1;
                        }
                    }
                }
                Directive::NewTransfer(request) => {
                    match backend.create_transfer(&request).await {
                        Ok(_) => outcome.created += 1,
                        Err(e) => {
                            error!(error = %e, line, "LLM-issued transfer failed");
                            outcome.failed += 1;
                        }
                    }
                }
            }
        }

        outcome
    }
}

/// Appends per-pass counters to the context as terse observed facts.
fn record_outcome(context: &mut ChatContext, outcome: &PassOutcome) {
    if outcome.created > 0 {
        context.push(
            TurnRole::Assistant,
            format!("CREATED TRANSACTIONS: {}", outcome.created),
        );
    }
    if outcome.edited > 0 {
        context.push(
            TurnRole::Assistant,
            format!("EDITED TRANSACTIONS: {}", outcome.edited),
        );
    }
    if outcome.deleted > 0 {
        context.push(
            TurnRole::Assistant,
            format!("DELETED TRANSACTIONS: {}", outcome.deleted),
        );
    }
    if outcome.failed > 0 {
        context.push(
            TurnRole::Assistant,
            format!("FAILED PARSING OR API ERROR: {}", outcome.failed),
        );
    }
    if let Some(fetched) = &outcome.fetched {
        context.push(TurnRole::Assistant, fetched.clone());
    }
}

fn render_transactions(transactions: &[Transaction]) -> String {
    let mut out = String::from("Last transactions:\n");

    for t in transactions {
        out.push_str(&format!(
            "id: {}, delta: {}, account id: {}, category id: {}, description: {}, created: {}\n",
            t.transaction_id,
            t.delta,
            t.account_id,
            t.category_id,
            t.description.as_deref().unwrap_or("-"),
            t.created_at
        ));
    }

    if transactions.is_empty() {
        out.push_str("EMPTY");
    }

    out
}

/// Renders the cached financial state as LLM context.
fn state_to_text(view: &StateView, prefs: &ChatPreferences) -> String {
    let mut out = String::from("Accounts:\n");

    for account in &view.accounts.list {
        let amount = view
            .format_amount(account.amount, account.account_id, false, false)
            .unwrap_or_else(|_| account.amount.to_string());
        let code = view
            .currencies
            .map
            .get(&account.currency_id)
            .map(|c| c.code.as_str())
            .unwrap_or("?");

        out.push_str(&format!(
            "id: {}, name: {}, description: {}, amount: {}, currency: {} ({}), hidden: {}\n",
            account.account_id,
            account.name,
            account.description.as_deref().unwrap_or("-"),
            amount,
            code,
            account.currency_id,
            if account.hidden { "yes" } else { "no" }
        ));
    }

    out.push_str("Transaction categories:\n");
    for category in &view.categories.list {
        let kind = match category.kind.signum() {
            1 => "only incomes",
            0 => "incomes and expenses",
            _ => "only expenses",
        };
        out.push_str(&format!(
            "id: {}, name: {}, description: {}, type: {}\n",
            category.category_id,
            category.name,
            category.description.as_deref().unwrap_or("-"),
            kind
        ));
    }

    out.push_str("Currencies:\n");
    for currency in &view.currencies.list {
        out.push_str(&format!(
            "id: {}, symbol: {}, code: {}, decimals: {}, can edit: {}\n",
            currency.currency_id,
            currency.symbol,
            currency.code,
            currency.decimals,
            if currency.owned { "yes" } else { "no" }
        ));
    }

    if let Some(preferred) = prefs.preferred_account_id {
        out.push_str(&format!("Preferred account id: {}", preferred));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::llm::client::ScriptedLlm;
    use crate::state::ClientState;
    use rust_decimal::Decimal;

    async fn setup(replies: Vec<&str>, max_runs: u32) -> (AiWorker, Arc<ScriptedLlm>, Arc<MockBackend>, StateView, ChatPreferences) {
        let backend = Arc::new(MockBackend::new("tester"));
        let (accounts, folders, categories, currencies) = crate::state::tests::fixtures();
        backend
            .seed(accounts, folders, categories, currencies)
            .await;

        let state = ClientState::new(backend.clone() as Arc<dyn BackendClient>);
        state.refresh().await.unwrap();
        let view = state.view().await;

        let llm = Arc::new(ScriptedLlm::new(replies));
        let worker = AiWorker::new(
            llm.clone() as Arc<dyn LlmClient>,
            "You are a finance assistant.".to_string(),
            max_runs,
        );

        (worker, llm, backend, view, ChatPreferences::new(1))
    }

    #[tokio::test]
    async fn test_plain_reply_is_final() {
        let (worker, llm, _, view, prefs) = setup(vec!["You spent 20 on coffee."], 5).await;
        let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::new("tester"));

        let mut context = ChatContext::new(20);
        context.push(TurnRole::User, "how much coffee?");

        let answer = worker
            .answer(&mut context, &backend, &view, &prefs)
            .await
            .unwrap();

        assert_eq!(answer, "You spent 20 on coffee.");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_directive_executes_once_then_final_answer() {
        let (worker, llm, backend, view, prefs) =
            setup(vec!["NEW_TRANSACTION 3 7 -20 coffee", "Logged it!"], 5).await;
        let backend_dyn: Arc<dyn BackendClient> = backend.clone();

        let mut context = ChatContext::new(20);
        context.push(TurnRole::User, "add 20 for coffee");

        let answer = worker
            .answer(&mut context, &backend_dyn, &view, &prefs)
            .await
            .unwrap();

        assert_eq!(answer, "Logged it!");
        assert_eq!(backend.transaction_count().await, 1);

        let tx = backend.last_transaction().await.unwrap();
        assert_eq!(tx.category_id, 3);
        assert_eq!(tx.account_id, 7);
        assert_eq!(tx.delta, Decimal::new(-20, 0));
        assert_eq!(tx.description.as_deref(), Some("coffee"));

        // one initial ask + one re-ask, well within (bound - 1) re-queries
        assert_eq!(llm.call_count(), 2);

        // observed fact was fed back to the model
        let facts: Vec<&str> = context.turns().map(|(_, t)| t.as_str()).collect();
        assert!(facts.iter().any(|t| t.starts_with("CREATED TRANSACTIONS: 1")));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_refusal() {
        // The scripted client repeats its last reply, so the model "always"
        // emits a directive.
        let (worker, llm, backend, view, prefs) =
            setup(vec!["NEW_TRANSACTION 3 7 -20"], 3).await;
        let backend_dyn: Arc<dyn BackendClient> = backend.clone();

        let mut context = ChatContext::new(20);
        context.push(TurnRole::User, "log coffee forever");

        let answer = worker
            .answer(&mut context, &backend_dyn, &view, &prefs)
            .await
            .unwrap();

        assert_eq!(answer, REFUSAL_MESSAGE);
        assert_eq!(llm.call_count(), 3); // exactly max_runs invocations
    }

    #[tokio::test]
    async fn test_malformed_directive_counts_failed_and_continues() {
        let (worker, _, backend, view, prefs) =
            setup(vec!["NEW_TRANSACTION 3 seven -20", "Sorry, try again."], 5).await;
        let backend_dyn: Arc<dyn BackendClient> = backend.clone();

        let mut context = ChatContext::new(20);
        context.push(TurnRole::User, "log something");

        let answer = worker
            .answer(&mut context, &backend_dyn, &view, &prefs)
            .await
            .unwrap();

        assert_eq!(answer, "Sorry, try again.");
        assert_eq!(backend.transaction_count().await, 0);

        let facts: Vec<&str> = context.turns().map(|(_, t)| t.as_str()).collect();
        assert!(facts
            .iter()
            .any(|t| t.starts_with("FAILED PARSING OR API ERROR: 1")));
    }

    #[tokio::test]
    async fn test_fetch_directive_feeds_data_back() {
        let (worker, _, backend, view, prefs) =
            setup(vec!["GET_TRANSACTIONS 5", "You have no transactions."], 5).await;
        let backend_dyn: Arc<dyn BackendClient> = backend.clone();

        let mut context = ChatContext::new(20);
        context.push(TurnRole::User, "what did I spend?");

        let answer = worker
            .answer(&mut context, &backend_dyn, &view, &prefs)
            .await
            .unwrap();

        assert_eq!(answer, "You have no transactions.");

        let facts: Vec<&str> = context.turns().map(|(_, t)| t.as_str()).collect();
        assert!(facts.iter().any(|t| t.contains("EMPTY")));
    }
}
