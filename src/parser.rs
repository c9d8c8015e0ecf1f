//! Natural-language transaction parser
//!
//! Turns one line of free text into a structured action without any network
//! call: a pure function of a cache view and the chat's preferred account.
//!
//! Matching uses Jaccard similarity over unique characters, scored against a
//! window of tokens around the amount. The window widens with the word count
//! of the candidate's own label so multi-word names are not penalized.

use crate::models::{Account, Category, NewTransaction, ParsedAction};
use crate::state::StateView;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;

/// Prefix marking the rest of the line as a note body.
const NOTE_MARKER: char = '!';

pub struct ActionParser {
    /// Multiplicative score boost for the chat's preferred account.
    preferred_boost: f64,
}

impl ActionParser {
    pub fn new(preferred_boost: f64) -> Self {
        Self { preferred_boost }
    }

    /// Parses one message. Returns `None` when the text does not describe a
    /// note or a transaction; a transaction is never partially constructed.
    pub fn parse(
        &self,
        view: &StateView,
        text: &str,
        preferred_account: Option<i64>,
    ) -> Option<ParsedAction> {
        if text.trim().is_empty() {
            return None;
        }

        if let Some(body) = text.strip_prefix(NOTE_MARKER) {
            return Some(ParsedAction::NewNote(body.to_string()));
        }

        let mut words: Vec<&str> = text.split_whitespace().collect();
        let (delta, delta_index) = extract_delta(&mut words)?;

        if words.is_empty() {
            return None;
        }

        let sign = if delta.is_sign_negative() { -1 } else { 1 };

        // With a single token left the preferred account is authoritative;
        // otherwise it only boosts the similarity score.
        let mut consumed: Vec<usize> = Vec::new();
        let (account, account_window) = if words.len() == 1 {
            let id = preferred_account?;
            (view.accounts.map.get(&id)?.clone(), 0)
        } else {
            let (account, window) =
                self.find_account(view, &words, delta_index, preferred_account)?;

            consumed.extend(best_token(
                &words,
                delta_index,
                window,
                &account.name.to_lowercase(),
            ));

            (account, window)
        };

        let category = find_category(view, &words, delta_index, sign, account_window)?;
        let category_window = account_window + word_count(&category.name);
        consumed.extend(best_token(
            &words,
            delta_index,
            category_window,
            &category.name.to_lowercase(),
        ));

        // Tokens matched against the account/category labels are consumed;
        // whatever is left becomes the description.
        let description: String = words
            .iter()
            .enumerate()
            .filter(|(i, _)| !consumed.contains(i))
            .map(|(_, w)| *w)
            .collect::<Vec<_>>()
            .join(" ");

        Some(ParsedAction::NewTransaction(NewTransaction {
            category_id: category.category_id,
            account_id: account.account_id,
            created_at: Utc::now(),
            delta,
            description: (!description.is_empty()).then_some(description),
        }))
    }

    fn find_account(
        &self,
        view: &StateView,
        words: &[&str],
        delta_index: usize,
        preferred_account: Option<i64>,
    ) -> Option<(Account, usize)> {
        let mut best: Option<(Account, usize)> = None;
        let mut best_score = -1.0;

        for account in &view.accounts.list {
            let folder_name = view
                .folders
                .map
                .get(&account.folder_id)
                .map(|f| f.name.as_str())
                .unwrap_or_default();

            let window =
                word_count(folder_name) + word_count(&account.name) + 1;
            let probe = window_text(words, delta_index, window);
            let target = format!("{} {}", folder_name, account.name).to_lowercase();

            let mut score = jaccard(&probe, &target);
            if preferred_account == Some(account.account_id) {
                score *= self.preferred_boost;
            }

            if score > best_score {
                best_score = score;
                best = Some((account.clone(), window));
            }
        }

        best
    }
}

/// Picks the best sign-compatible category by windowed similarity.
fn find_category(
    view: &StateView,
    words: &[&str],
    delta_index: usize,
    sign: i32,
    account_window: usize,
) -> Option<Category> {
    let mut best: Option<Category> = None;
    let mut best_score = -1.0;

    for category in view
        .categories
        .list
        .iter()
        .filter(|c| c.kind.matches_sign(sign))
    {
        let window = account_window + word_count(&category.name);
        let probe = window_text(words, delta_index, window);

        let score = jaccard(&probe, &category.name.to_lowercase());
        if score > best_score {
            best_score = score;
            best = Some(category.clone());
        }
    }

    best
}

/// Minimum per-token similarity for a word to count as "matched" and be
/// consumed out of the description.
const CONSUME_THRESHOLD: f64 = 0.5;

/// Index of the window token most similar to `target`, when that token
/// clearly matches. Weakly-similar tokens are left for the description.
fn best_token(
    words: &[&str],
    delta_index: usize,
    window: usize,
    target: &str,
) -> Option<usize> {
    let (lo, hi) = window_span(words.len(), delta_index, window);

    words[lo..hi]
        .iter()
        .enumerate()
        .map(|(offset, word)| (lo + offset, jaccard(&word.to_lowercase(), target)))
        .filter(|(_, score)| *score >= CONSUME_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}

/// Finds the first non-zero numeric token, removes it and returns it signed.
/// An unsigned token is treated as an expense (negated).
fn extract_delta(words: &mut Vec<&str>) -> Option<(Decimal, usize)> {
    for index in 0..words.len() {
        let word = words[index];
        let normalized = word.replace(',', ".");

        let Ok(value) = Decimal::from_str(&normalized) else {
            continue;
        };
        if value.is_zero() {
            continue;
        }

        words.remove(index);

        let delta = if word.starts_with('-') || word.starts_with('+') {
            value
        } else {
            -value
        };

        return Some((delta, index));
    }

    None
}

fn word_count(name: &str) -> usize {
    name.trim().split_whitespace().count()
}

fn window_span(len: usize, delta_index: usize, window: usize) -> (usize, usize) {
    (
        delta_index.saturating_sub(window),
        len.min(delta_index + window + 1),
    )
}

fn window_text(words: &[&str], delta_index: usize, window: usize) -> String {
    let (lo, hi) = window_span(words.len(), delta_index, window);
    words[lo..hi].join(" ").to_lowercase()
}

/// Jaccard similarity over the sets of unique characters of both strings.
fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<char> = a.chars().collect();
    let right: HashSet<char> = b.chars().collect();

    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();

    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::state::ClientState;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    async fn view() -> StateView {
        let backend = MockBackend::new("tester");
        let (accounts, folders, categories, currencies) = crate::state::tests::fixtures();
        backend.seed(accounts, folders, categories, currencies).await;

        let state = ClientState::new(Arc::new(backend));
        state.refresh().await.unwrap();
        state.view().await
    }

    fn parser() -> ActionParser {
        ActionParser::new(1.2)
    }

    #[tokio::test]
    async fn test_expense_with_preferred_account() {
        let view = view().await;

        let action = parser().parse(&view, "500 grocery", Some(7)).unwrap();
        let ParsedAction::NewTransaction(tx) = action else {
            panic!("expected transaction");
        };

        assert_eq!(tx.delta, Decimal::new(-500, 0));
        assert_eq!(tx.account_id, 7);
        assert_eq!(tx.category_id, 3); // Groceries
        assert_eq!(tx.description, None);
    }

    #[tokio::test]
    async fn test_explicit_plus_is_income() {
        let view = view().await;

        let action = parser().parse(&view, "+1500 salary bank", Some(7)).unwrap();
        let ParsedAction::NewTransaction(tx) = action else {
            panic!("expected transaction");
        };

        assert_eq!(tx.delta, Decimal::new(1500, 0));
        assert_eq!(tx.account_id, 8); // Bank
        assert_eq!(tx.category_id, 4); // Salary (income-only)
        assert_eq!(tx.description, None);
    }

    #[tokio::test]
    async fn test_no_numeric_token_is_no_match() {
        let view = view().await;
        assert_eq!(parser().parse(&view, "hello there", Some(7)), None);
    }

    #[tokio::test]
    async fn test_zero_amount_is_skipped() {
        let view = view().await;
        assert_eq!(parser().parse(&view, "0 groceries", Some(7)), None);
    }

    #[tokio::test]
    async fn test_note_marker_short_circuits() {
        let view = view().await;

        let action = parser().parse(&view, "!buy milk tomorrow", None).unwrap();
        assert_eq!(action, ParsedAction::NewNote("buy milk tomorrow".to_string()));
    }

    #[tokio::test]
    async fn test_comma_decimal_separator() {
        let view = view().await;

        let action = parser().parse(&view, "12,50 grocery", Some(7)).unwrap();
        let ParsedAction::NewTransaction(tx) = action else {
            panic!("expected transaction");
        };
        assert_eq!(tx.delta, Decimal::new(-1250, 2));
    }

    #[tokio::test]
    async fn test_single_token_without_preferred_account_is_no_match() {
        let view = view().await;
        assert_eq!(parser().parse(&view, "500 grocery", None), None);
    }

    #[tokio::test]
    async fn test_income_category_rejected_for_expense() {
        let view = view().await;

        // "salary" as an expense must not resolve the income-only category.
        let action = parser().parse(&view, "200 salary", Some(7)).unwrap();
        let ParsedAction::NewTransaction(tx) = action else {
            panic!("expected transaction");
        };
        assert_ne!(tx.category_id, 4);
    }

    #[tokio::test]
    async fn test_trailing_words_become_description() {
        let view = view().await;

        let action = parser()
            .parse(&view, "500 grocery dinner with friends", Some(7))
            .unwrap();
        let ParsedAction::NewTransaction(tx) = action else {
            panic!("expected transaction");
        };

        let description = tx.description.unwrap();
        assert!(description.contains("friends"));
    }

    #[test]
    fn test_jaccard_bounds() {
        assert_eq!(jaccard("", ""), 1.0);
        assert_eq!(jaccard("abc", ""), 0.0);
        assert_eq!(jaccard("abc", "abc"), 1.0);
        assert!(jaccard("grocery", "groceries") > 0.5);
    }
}
