//! Static finance tools
//!
//! Read-only queries over a [`FinanceDataProvider`]. Every tool here returns
//! the raw domain records; the registry passes them through the privacy
//! filter before anything reaches the agent.
//!
//! A declaration without a minimum mode is treated as `anonymized`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::anonymizer::{self, asset_class_breakdown};
use crate::error::{Error, Result, ToolError, ToolErrorCode};
use crate::models::{Account, PrivacyMode, ToolKind, ToolSource};
use crate::provider::{FinanceDataProvider, TransactionQuery};
use crate::registry::{ToolDescriptor, ToolProvider};

pub const GET_FINANCIAL_SUMMARY: &str = "get_financial_summary";
pub const GET_ACCOUNTS: &str = "get_accounts";
pub const GET_TRANSACTIONS: &str = "get_transactions";
pub const GET_PORTFOLIO_ALLOCATION: &str = "get_portfolio_allocation";
pub const GET_ACCOUNT_DETAILS: &str = "get_account_details";

const DEFAULT_TRANSACTION_LIMIT: i64 = 50;
const MAX_TRANSACTION_LIMIT: i64 = 200;

// =============================================================================
// Period Resolution (shared utility)
// =============================================================================

/// Resolve a period string to date range
pub fn resolve_period(period: &str) -> Result<(NaiveDate, NaiveDate)> {
    resolve_period_from(period, Utc::now().date_naive())
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::InvalidData(format!("Invalid date: {}-{}-{}", year, month, day)))
}

pub(crate) fn resolve_period_from(period: &str, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    match period.to_lowercase().as_str() {
        "this-month" | "thismonth" => Ok((ymd(today.year(), today.month(), 1)?, today)),
        "last-month" | "lastmonth" => {
            let first_of_this = ymd(today.year(), today.month(), 1)?;
            let last_day = first_of_this
                .pred_opt()
                .ok_or_else(|| Error::InvalidData("Date out of range".into()))?;
            Ok((ymd(last_day.year(), last_day.month(), 1)?, last_day))
        }
        "this-year" | "thisyear" | "ytd" => Ok((ymd(today.year(), 1, 1)?, today)),
        "last-year" | "lastyear" => Ok((
            ymd(today.year() - 1, 1, 1)?,
            ymd(today.year() - 1, 12, 31)?,
        )),
        "last-30-days" | "last30days" => Ok((today - Duration::days(30), today)),
        "last-90-days" | "last90days" => Ok((today - Duration::days(90), today)),
        "last-12-months" | "last12months" => Ok((today - Duration::days(365), today)),
        "all" | "" => Ok((ymd(2000, 1, 1)?, today)),
        _ => {
            // Try to parse as YYYY-MM-DD
            if let Ok(date) = NaiveDate::parse_from_str(period, "%Y-%m-%d") {
                Ok((date, date))
            } else {
                Err(Error::InvalidData(format!(
                    "Invalid period: {}. Use: this-month, last-month, this-year, last-year, last-30-days, last-90-days, last-12-months, ytd, all",
                    period
                )))
            }
        }
    }
}

/// Parse optional date strings
pub fn parse_date_opt(s: Option<&str>) -> Result<Option<NaiveDate>> {
    match s {
        None => Ok(None),
        Some(date_str) => {
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
                Error::InvalidData(format!("Invalid date format: {}. Use YYYY-MM-DD", date_str))
            })?;
            Ok(Some(date))
        }
    }
}

// =============================================================================
// Parameters
// =============================================================================

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct FinancialSummaryParams {}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct AccountsParams {
    /// Only accounts of this type (depository, investment, credit_card, ...)
    #[schemars(description = "Filter by account type, e.g. depository, investment, credit_card")]
    pub account_type: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct TransactionsParams {
    /// Period preset (this-month, last-month, this-year, last-year, last-30-days, etc.)
    #[schemars(
        description = "Time period: this-month, last-month, this-year, last-year, last-30-days, last-90-days, last-12-months, ytd, all"
    )]
    pub period: Option<String>,

    /// Custom start date (YYYY-MM-DD), used if period is not specified
    #[schemars(description = "Start date in YYYY-MM-DD format")]
    pub from_date: Option<String>,

    /// Custom end date (YYYY-MM-DD), used if period is not specified
    #[schemars(description = "End date in YYYY-MM-DD format")]
    pub to_date: Option<String>,

    #[schemars(description = "Only transactions from this account (by name)")]
    pub account: Option<String>,

    /// Maximum number of results (default 50, max 200)
    #[schemars(description = "Maximum number of results to return (default 50, max 200)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct PortfolioAllocationParams {}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct AccountDetailsParams {
    #[schemars(description = "Account id as returned by get_accounts in full mode")]
    pub account_id: String,
}

// =============================================================================
// Declarations
// =============================================================================

/// A domain tool as declared at build time
#[derive(Debug, Clone)]
pub struct StaticToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ToolKind,
    /// `None` is inferred as `anonymized`
    pub minimum_mode: Option<PrivacyMode>,
    pub input_schema: Value,
}

impl StaticToolDeclaration {
    pub fn effective_minimum_mode(&self) -> PrivacyMode {
        self.minimum_mode.unwrap_or(PrivacyMode::Anonymized)
    }
}

/// All static finance tools
pub fn static_tools() -> Vec<StaticToolDeclaration> {
    vec![
        StaticToolDeclaration {
            name: GET_FINANCIAL_SUMMARY,
            description: "Get household financial summary: total value, savings rate, \
                          debt-to-income, allocation and risk level.",
            kind: ToolKind::Summary,
            minimum_mode: Some(PrivacyMode::Strict),
            input_schema: schemars::schema_for!(FinancialSummaryParams).into(),
        },
        StaticToolDeclaration {
            name: GET_ACCOUNTS,
            description: "List financial accounts with balances and holdings.",
            kind: ToolKind::Accounts,
            minimum_mode: Some(PrivacyMode::Strict),
            input_schema: schemars::schema_for!(AccountsParams).into(),
        },
        StaticToolDeclaration {
            name: GET_TRANSACTIONS,
            description: "Get transactions and investment activity for a time period.",
            kind: ToolKind::Transactions,
            minimum_mode: Some(PrivacyMode::Strict),
            input_schema: schemars::schema_for!(TransactionsParams).into(),
        },
        StaticToolDeclaration {
            name: GET_PORTFOLIO_ALLOCATION,
            description: "Get portfolio allocation by asset class with total portfolio value.",
            kind: ToolKind::Summary,
            minimum_mode: None,
            input_schema: schemars::schema_for!(PortfolioAllocationParams).into(),
        },
        StaticToolDeclaration {
            name: GET_ACCOUNT_DETAILS,
            description: "Get one account with exact balance, institution and every holding.",
            kind: ToolKind::Accounts,
            minimum_mode: Some(PrivacyMode::Full),
            input_schema: schemars::schema_for!(AccountDetailsParams).into(),
        },
    ]
}

/// Data kind of a static tool, by name
pub fn declared_kind(name: &str) -> Option<ToolKind> {
    match name {
        GET_FINANCIAL_SUMMARY | GET_PORTFOLIO_ALLOCATION => Some(ToolKind::Summary),
        GET_ACCOUNTS | GET_ACCOUNT_DETAILS => Some(ToolKind::Accounts),
        GET_TRANSACTIONS => Some(ToolKind::Transactions),
        _ => None,
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Serialize)]
struct AccountsResult {
    accounts: Vec<Account>,
}

#[derive(Debug, Serialize)]
struct TransactionsResult {
    transactions: Vec<crate::models::Transaction>,
    from_date: NaiveDate,
    to_date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct AllocationResult {
    total_value: f64,
    currency: Option<String>,
    /// Asset class -> percentage of portfolio
    allocation: BTreeMap<String, f64>,
}

// =============================================================================
// Provider
// =============================================================================

/// Static tools over a finance data provider
pub struct StaticToolProvider {
    data: Arc<dyn FinanceDataProvider>,
}

impl StaticToolProvider {
    pub fn new(data: Arc<dyn FinanceDataProvider>) -> Self {
        Self { data }
    }

    fn get_financial_summary(&self) -> std::result::Result<Value, ToolError> {
        let summary = self
            .data
            .summary()
            .map_err(|e| provider_error(GET_FINANCIAL_SUMMARY, e))?;
        to_json(&summary)
    }

    fn get_accounts(&self, params: AccountsParams) -> std::result::Result<Value, ToolError> {
        let mut accounts = self
            .data
            .accounts()
            .map_err(|e| provider_error(GET_ACCOUNTS, e))?;

        if let Some(wanted) = params.account_type.as_deref() {
            accounts.retain(|a| {
                a.account_type
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(wanted))
            });
        }

        to_json(&AccountsResult { accounts })
    }

    fn get_transactions(&self, params: TransactionsParams) -> std::result::Result<Value, ToolError> {
        let (from_date, to_date) = transaction_window(&params)
            .map_err(|e| ToolError::invalid_arguments(e.to_string()))?;
        let limit = params
            .limit
            .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
            .clamp(1, MAX_TRANSACTION_LIMIT) as usize;

        let query = TransactionQuery {
            from: Some(from_date),
            to: Some(to_date),
            account: params.account,
            limit,
        };
        debug!(
            "Fetching transactions {} to {} (limit {})",
            from_date, to_date, limit
        );

        let mut transactions = self
            .data
            .transactions(&query)
            .map_err(|e| provider_error(GET_TRANSACTIONS, e))?;
        transactions.retain(|t| query.matches(t));
        transactions.truncate(limit);

        to_json(&TransactionsResult {
            transactions,
            from_date,
            to_date,
        })
    }

    fn get_portfolio_allocation(&self) -> std::result::Result<Value, ToolError> {
        let summary = self
            .data
            .summary()
            .map_err(|e| provider_error(GET_PORTFOLIO_ALLOCATION, e))?;

        let (total_value, allocation) = if summary.allocation.is_empty() {
            let accounts = self
                .data
                .accounts()
                .map_err(|e| provider_error(GET_PORTFOLIO_ALLOCATION, e))?;
            allocation_from_accounts(&accounts)
        } else {
            (summary.total_value, summary.allocation)
        };

        to_json(&AllocationResult {
            total_value,
            currency: summary.currency,
            allocation,
        })
    }

    fn get_account_details(
        &self,
        params: AccountDetailsParams,
    ) -> std::result::Result<Value, ToolError> {
        let account = self
            .data
            .account(&params.account_id)
            .map_err(|e| provider_error(GET_ACCOUNT_DETAILS, e))?
            .ok_or_else(|| {
                ToolError::new(
                    ToolErrorCode::NotFound,
                    format!("No account with id '{}'", params.account_id),
                )
            })?;
        to_json(&AccountsResult {
            accounts: vec![account],
        })
    }
}

impl ToolProvider for StaticToolProvider {
    fn source(&self) -> ToolSource {
        ToolSource::Static
    }

    fn list_tools(&self) -> Vec<ToolDescriptor> {
        static_tools()
            .into_iter()
            .map(|d| {
                let minimum_mode = d.effective_minimum_mode();
                ToolDescriptor::new(d.name, d.description, ToolSource::Static, d.input_schema)
                    .with_kind(d.kind)
                    .with_minimum_mode(minimum_mode)
            })
            .collect()
    }

    fn execute(&self, name: &str, args: &Value) -> std::result::Result<Value, ToolError> {
        match name {
            GET_FINANCIAL_SUMMARY => self.get_financial_summary(),
            GET_ACCOUNTS => self.get_accounts(parse_params(args)?),
            GET_TRANSACTIONS => self.get_transactions(parse_params(args)?),
            GET_PORTFOLIO_ALLOCATION => self.get_portfolio_allocation(),
            GET_ACCOUNT_DETAILS => self.get_account_details(parse_params(args)?),
            _ => Err(ToolError::tool_not_found(name)),
        }
    }
}

fn transaction_window(params: &TransactionsParams) -> Result<(NaiveDate, NaiveDate)> {
    if let Some(period) = params.period.as_deref() {
        resolve_period(period)
    } else if params.from_date.is_some() || params.to_date.is_some() {
        let from = match parse_date_opt(params.from_date.as_deref())? {
            Some(date) => date,
            None => ymd(2000, 1, 1)?,
        };
        let to = parse_date_opt(params.to_date.as_deref())?.unwrap_or_else(|| Utc::now().date_naive());
        if from > to {
            return Err(Error::InvalidData(format!(
                "from_date {} is after to_date {}",
                from, to
            )));
        }
        Ok((from, to))
    } else {
        resolve_period("last-30-days")
    }
}

/// Allocation percentages weighted by account balance
fn allocation_from_accounts(accounts: &[Account]) -> (f64, BTreeMap<String, f64>) {
    let total: f64 = accounts.iter().map(|a| a.balance).sum();
    let positive: f64 = accounts.iter().map(|a| a.balance.max(0.0)).sum();

    let mut allocation = BTreeMap::new();
    if positive <= 0.0 {
        return (total, allocation);
    }
    for account in accounts.iter().filter(|a| a.balance > 0.0) {
        for (class, share) in asset_class_breakdown(account.holdings.as_deref()) {
            *allocation.entry(class).or_insert(0.0) += share * account.balance / positive * 100.0;
        }
    }
    for pct in allocation.values_mut() {
        *pct = anonymizer::round_to(*pct, 1);
    }
    (total, allocation)
}

/// Deserialize tool arguments; `null` means all defaults
pub(crate) fn parse_params<T: DeserializeOwned + Default>(args: &Value) -> std::result::Result<T, ToolError> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args.clone())
        .map_err(|e| ToolError::invalid_arguments(format!("Invalid arguments: {}", e)))
}

fn to_json<T: Serialize>(value: &T) -> std::result::Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::from(Error::from(e)))
}

/// Provider failures are logged in full but surfaced generically
fn provider_error(tool: &str, err: anyhow::Error) -> ToolError {
    warn!("{} failed: {:#}", tool, err);
    ToolError::execution(format!("{} could not load data", tool))
}
