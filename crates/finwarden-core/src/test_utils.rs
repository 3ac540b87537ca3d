//! Test utilities for finwarden-core
//!
//! An in-memory finance data provider with a small, realistic household and
//! a domain-actions recorder, for unit and integration tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::models::{Account, FinancialSummary, Holding, Transaction};
use crate::parser_tools::{ParsedAccount, ParsedTrade, ParsedTransaction};
use crate::provider::{DomainActions, FinanceDataProvider, TransactionQuery};

/// In-memory finance data
#[derive(Debug, Clone, Default)]
pub struct MockDataProvider {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub summary: FinancialSummary,
    /// Every read fails when set
    pub fail: bool,
}

impl MockDataProvider {
    /// Checking, brokerage and credit card accounts with a month of activity
    pub fn sample() -> Self {
        let today = Utc::now().date_naive();
        let holding = |ticker: &str, class: &str, value: f64| Holding {
            ticker: Some(ticker.to_string()),
            name: None,
            asset_class: Some(class.to_string()),
            quantity: None,
            value,
        };

        let accounts = vec![
            Account {
                id: Some("acc-1".to_string()),
                name: "Everyday Checking".to_string(),
                account_type: Some("depository".to_string()),
                balance: 12500.0,
                currency: Some("USD".to_string()),
                institution: Some("First Federal".to_string()),
                holdings: None,
            },
            Account {
                id: Some("acc-2".to_string()),
                name: "Taxable Brokerage".to_string(),
                account_type: Some("investment".to_string()),
                balance: 85000.0,
                currency: Some("USD".to_string()),
                institution: Some("Vanguard".to_string()),
                holdings: Some(vec![
                    holding("VTI", "equity", 60000.0),
                    holding("BND", "bond", 20000.0),
                    holding("VMFXX", "cash", 5000.0),
                ]),
            },
            Account {
                id: Some("acc-3".to_string()),
                name: "Rewards Card".to_string(),
                account_type: Some("credit_card".to_string()),
                balance: -1800.0,
                currency: Some("USD".to_string()),
                institution: Some("First Federal".to_string()),
                holdings: None,
            },
        ];

        let tx = |days: i64, name: &str, amount: f64, kind: &str, account: &str| Transaction {
            id: None,
            date: Some(today - Duration::days(days)),
            name: name.to_string(),
            amount,
            currency: Some("USD".to_string()),
            transaction_type: Some(kind.to_string()),
            category: None,
            ticker: None,
            account_name: Some(account.to_string()),
        };

        let transactions = vec![
            Transaction {
                category: Some("dining".to_string()),
                ..tx(3, "Blue Bottle Coffee", -6.5, "expense", "Everyday Checking")
            },
            tx(10, "Paycheck", 4200.0, "income", "Everyday Checking"),
            Transaction {
                ticker: Some("VTI".to_string()),
                ..tx(12, "Buy VTI", -2500.0, "buy", "Taxable Brokerage")
            },
            Transaction {
                category: Some("housing".to_string()),
                ..tx(40, "Rent", -2100.0, "expense", "Everyday Checking")
            },
        ];

        let summary = FinancialSummary {
            total_value: 95700.0,
            currency: Some("USD".to_string()),
            savings_rate: Some(0.22),
            debt_to_income: Some(0.18),
            allocation: BTreeMap::from([
                ("cash".to_string(), 16.4),
                ("equity".to_string(), 62.7),
                ("fixed_income".to_string(), 20.9),
            ]),
            risk_level: Some("moderate".to_string()),
        };

        Self {
            accounts,
            transactions,
            summary,
            fail: false,
        }
    }

    /// Provider whose every read fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail {
            Err(anyhow!("connection refused"))
        } else {
            Ok(())
        }
    }
}

impl FinanceDataProvider for MockDataProvider {
    fn accounts(&self) -> anyhow::Result<Vec<Account>> {
        self.check()?;
        Ok(self.accounts.clone())
    }

    fn transactions(&self, query: &TransactionQuery) -> anyhow::Result<Vec<Transaction>> {
        self.check()?;
        let mut matched: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        if query.limit > 0 {
            matched.truncate(query.limit);
        }
        Ok(matched)
    }

    fn summary(&self) -> anyhow::Result<FinancialSummary> {
        self.check()?;
        Ok(self.summary.clone())
    }
}

/// Records every domain write; optionally fails them all
#[derive(Debug, Default)]
pub struct RecordingActions {
    transactions: Mutex<Vec<ParsedTransaction>>,
    accounts: Mutex<Vec<ParsedAccount>>,
    trades: Mutex<Vec<ParsedTrade>>,
    failure: Option<String>,
}

impl RecordingActions {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn transactions(&self) -> Vec<ParsedTransaction> {
        self.transactions.lock().unwrap().clone()
    }

    pub fn accounts(&self) -> Vec<ParsedAccount> {
        self.accounts.lock().unwrap().clone()
    }

    pub fn trades(&self) -> Vec<ParsedTrade> {
        self.trades.lock().unwrap().clone()
    }

    /// Everything created, as JSON
    pub fn created(&self) -> Vec<Value> {
        let mut created = Vec::new();
        created.extend(self.transactions().iter().map(|t| json!(t)));
        created.extend(self.accounts().iter().map(|a| json!(a)));
        created.extend(self.trades().iter().map(|t| json!(t)));
        created
    }

    fn check(&self) -> anyhow::Result<()> {
        match &self.failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }
}

impl DomainActions for RecordingActions {
    fn create_transaction(&self, input: &ParsedTransaction) -> anyhow::Result<Value> {
        self.check()?;
        let mut transactions = self.transactions.lock().unwrap();
        transactions.push(input.clone());
        Ok(json!({ "id": format!("tx-{}", transactions.len()), "name": input.name }))
    }

    fn create_account(&self, input: &ParsedAccount) -> anyhow::Result<Value> {
        self.check()?;
        let mut accounts = self.accounts.lock().unwrap();
        accounts.push(input.clone());
        Ok(json!({ "id": format!("acc-new-{}", accounts.len()), "name": input.name }))
    }

    fn record_trade(&self, input: &ParsedTrade) -> anyhow::Result<Value> {
        self.check()?;
        let mut trades = self.trades.lock().unwrap();
        trades.push(input.clone());
        Ok(json!({ "id": format!("trade-{}", trades.len()), "ticker": input.ticker }))
    }
}
