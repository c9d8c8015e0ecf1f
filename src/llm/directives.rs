//! Directive line grammar
//!
//! The model requests backend actions by emitting lines of the form
//! `KEYWORD field field … [description…]` with positional numeric fields.
//! Lines without a known keyword are ignored; lines with a known keyword but
//! malformed fields are counted as failures, never fatal.

use crate::models::{EditTransaction, NewTransaction, NewTransfer};
use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    FetchTransactions { count: u32 },
    NewTransaction(NewTransaction),
    EditTransaction(EditTransaction),
    DeleteTransaction { transaction_id: i64 },
    NewTransfer(NewTransfer),
}

/// Outcome of testing one reply line against the grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// No directive keyword; plain prose for the user.
    Ignored,
    /// Known keyword, malformed fields.
    Malformed,
    Directive(Directive),
}

pub fn parse_line(line: &str) -> ParsedLine {
    let words: Vec<&str> = line.split_whitespace().collect();

    let Some(&keyword) = words.first() else {
        return ParsedLine::Ignored;
    };

    match keyword {
        "GET_TRANSACTIONS" => parse_fetch(&words),
        "NEW_TRANSACTION" => parse_new_transaction(&words),
        "EDIT_TRANSACTION" => parse_edit_transaction(&words),
        "DELETE_TRANSACTION" => parse_delete(&words),
        "NEW_TRANSFER" => parse_transfer(&words),
        _ => ParsedLine::Ignored,
    }
}

fn parse_fetch(words: &[&str]) -> ParsedLine {
    match words.get(1).and_then(|w| w.parse::<u32>().ok()) {
        Some(count) => ParsedLine::Directive(Directive::FetchTransactions { count }),
        None => ParsedLine::Malformed,
    }
}

fn parse_new_transaction(words: &[&str]) -> ParsedLine {
    if words.len() < 4 {
        return ParsedLine::Malformed;
    }

    let fields = (
        words[1].parse::<i64>(),
        words[2].parse::<i64>(),
        Decimal::from_str(words[3]),
    );

    match fields {
        (Ok(category_id), Ok(account_id), Ok(delta)) => {
            ParsedLine::Directive(Directive::NewTransaction(NewTransaction {
                category_id,
                account_id,
                created_at: Utc::now(),
                delta,
                description: tail(words, 4),
            }))
        }
        _ => ParsedLine::Malformed,
    }
}

fn parse_edit_transaction(words: &[&str]) -> ParsedLine {
    if words.len() < 5 {
        return ParsedLine::Malformed;
    }

    let fields = (
        words[1].parse::<i64>(),
        words[2].parse::<i64>(),
        words[3].parse::<i64>(),
        Decimal::from_str(words[4]),
    );

    match fields {
        (Ok(transaction_id), Ok(category_id), Ok(account_id), Ok(delta)) => {
            ParsedLine::Directive(Directive::EditTransaction(EditTransaction {
                transaction_id,
                category_id,
                account_id,
                created_at: Utc::now(),
                delta,
                description: tail(words, 5),
            }))
        }
        _ => ParsedLine::Malformed,
    }
}

fn parse_delete(words: &[&str]) -> ParsedLine {
    match words.get(1).and_then(|w| w.parse::<i64>().ok()) {
        Some(transaction_id) => {
            ParsedLine::Directive(Directive::DeleteTransaction { transaction_id })
        }
        None => ParsedLine::Malformed,
    }
}

fn parse_transfer(words: &[&str]) -> ParsedLine {
    if words.len() < 6 {
        return ParsedLine::Malformed;
    }

    let fields = (
        words[1].parse::<i64>(),
        words[2].parse::<i64>(),
        words[3].parse::<i64>(),
        Decimal::from_str(words[4]),
        Decimal::from_str(words[5]),
    );

    match fields {
        (Ok(category_id), Ok(from_account_id), Ok(to_account_id), Ok(from_delta), Ok(to_delta)) => {
            ParsedLine::Directive(Directive::NewTransfer(NewTransfer {
                category_id,
                from_account_id,
                to_account_id,
                created_at: Utc::now(),
                from_delta,
                to_delta,
                description: tail(words, 6),
            }))
        }
        _ => ParsedLine::Malformed,
    }
}

fn tail(words: &[&str], from: usize) -> Option<String> {
    if words.len() > from {
        Some(words[from..].join(" "))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_with_description() {
        let parsed = parse_line("NEW_TRANSACTION 3 7 -20 coffee to go");

        let ParsedLine::Directive(Directive::NewTransaction(tx)) = parsed else {
            panic!("expected directive");
        };
        assert_eq!(tx.category_id, 3);
        assert_eq!(tx.account_id, 7);
        assert_eq!(tx.delta, Decimal::new(-20, 0));
        assert_eq!(tx.description.as_deref(), Some("coffee to go"));
    }

    #[test]
    fn test_new_transaction_without_description() {
        let parsed = parse_line("NEW_TRANSACTION 3 7 -20");

        let ParsedLine::Directive(Directive::NewTransaction(tx)) = parsed else {
            panic!("expected directive");
        };
        assert_eq!(tx.description, None);
    }

    #[test]
    fn test_prose_is_ignored() {
        assert_eq!(parse_line("You spent 20 on coffee."), ParsedLine::Ignored);
        assert_eq!(parse_line(""), ParsedLine::Ignored);
    }

    #[test]
    fn test_malformed_fields_are_flagged() {
        assert_eq!(parse_line("NEW_TRANSACTION 3 seven -20"), ParsedLine::Malformed);
        assert_eq!(parse_line("NEW_TRANSACTION 3"), ParsedLine::Malformed);
        assert_eq!(parse_line("GET_TRANSACTIONS many"), ParsedLine::Malformed);
        assert_eq!(parse_line("DELETE_TRANSACTION"), ParsedLine::Malformed);
    }

    #[test]
    fn test_transfer_and_fetch() {
        let parsed = parse_line("NEW_TRANSFER 2 7 8 -100 100 moving savings");
        let ParsedLine::Directive(Directive::NewTransfer(transfer)) = parsed else {
            panic!("expected directive");
        };
        assert_eq!(transfer.from_account_id, 7);
        assert_eq!(transfer.to_account_id, 8);
        assert_eq!(transfer.description.as_deref(), Some("moving savings"));

        assert_eq!(
            parse_line("GET_TRANSACTIONS 10"),
            ParsedLine::Directive(Directive::FetchTransactions { count: 10 })
        );
    }
}
