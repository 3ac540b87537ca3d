//! Seams to the finance domain
//!
//! finwarden never owns financial data. Reads come through a
//! [`FinanceDataProvider`], writes made on behalf of parser tools go through
//! [`DomainActions`]. Both return `anyhow::Result` so implementors can surface
//! whatever error type their storage layer uses.

use chrono::NaiveDate;
use serde_json::Value;

use crate::models::{Account, FinancialSummary, Transaction};
use crate::parser_tools::{ParsedAccount, ParsedTrade, ParsedTransaction};

/// Date/limit window for transaction reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Case-insensitive account name match
    pub account: Option<String>,
    pub limit: usize,
}

impl TransactionQuery {
    /// Whether a transaction falls inside this window
    pub fn matches(&self, transaction: &Transaction) -> bool {
        let date_ok = match transaction.date {
            Some(date) => {
                self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
            }
            None => self.from.is_none() && self.to.is_none(),
        };
        let account_ok = match &self.account {
            Some(wanted) => transaction
                .account_name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(wanted)),
            None => true,
        };
        date_ok && account_ok
    }
}

/// Read access to the household's finance data
pub trait FinanceDataProvider: Send + Sync {
    fn accounts(&self) -> anyhow::Result<Vec<Account>>;

    fn transactions(&self, query: &TransactionQuery) -> anyhow::Result<Vec<Transaction>>;

    fn summary(&self) -> anyhow::Result<FinancialSummary>;

    /// Single account by id
    fn account(&self, id: &str) -> anyhow::Result<Option<Account>> {
        Ok(self
            .accounts()?
            .into_iter()
            .find(|a| a.id.as_deref() == Some(id)))
    }
}

/// Domain writes performed by parser tools once input is validated
///
/// Implementations return the created entity as JSON.
pub trait DomainActions: Send + Sync {
    fn create_transaction(&self, input: &ParsedTransaction) -> anyhow::Result<Value>;

    fn create_account(&self, input: &ParsedAccount) -> anyhow::Result<Value>;

    fn record_trade(&self, input: &ParsedTrade) -> anyhow::Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(date: Option<NaiveDate>, account: Option<&str>) -> Transaction {
        Transaction {
            date,
            account_name: account.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_query_matches_window() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day);
        let query = TransactionQuery {
            from: d(5),
            to: d(10),
            ..Default::default()
        };
        assert!(query.matches(&tx(d(5), None)));
        assert!(query.matches(&tx(d(10), None)));
        assert!(!query.matches(&tx(d(11), None)));
        assert!(!query.matches(&tx(None, None)));
        assert!(TransactionQuery::default().matches(&tx(None, None)));
    }

    #[test]
    fn test_query_matches_account() {
        let query = TransactionQuery {
            account: Some("everyday checking".to_string()),
            ..Default::default()
        };
        assert!(query.matches(&tx(None, Some("Everyday Checking"))));
        assert!(!query.matches(&tx(None, Some("Brokerage"))));
        assert!(!query.matches(&tx(None, None)));
    }
}
