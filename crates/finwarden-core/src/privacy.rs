//! Privacy filter: per-mode transformation of raw tool results
//!
//! - `strict` folds accounts and transactions to counts, tiers and breakdowns
//! - `anonymized` delegates to the [`anonymizer`](crate::anonymizer)
//! - `standard` keeps names and categories, hides exact amounts
//! - `full` returns the raw result unchanged
//!
//! Results from tools that declare no data kind are handled by the configured
//! [`UnclassifiedPolicy`]: passthrough with a warning (the default, favoring
//! availability) or rejection.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::anonymizer::{
    self, anonymize_accounts, anonymize_summary, anonymize_transactions,
    normalize_transaction_type, value_to_tier, ValueTier,
};
use crate::config::{PrivacySettings, UnclassifiedPolicy};
use crate::error::{ToolError, ToolErrorCode};
use crate::models::{Account, PrivacyMode, ToolKind, Transaction};
use crate::{parser_tools, search, tools};

/// Tools callable in strict mode; all return aggregates once filtered
pub const STRICT_ALLOWED_TOOLS: &[&str] = &[
    tools::GET_FINANCIAL_SUMMARY,
    tools::GET_ACCOUNTS,
    tools::GET_TRANSACTIONS,
    search::SEARCH_TOOLS,
];

/// Coarse pre-check: strict mode admits only the aggregate allow-list
///
/// Other modes always pass here; they are gated by minimum-mode comparison
/// in the registry.
pub fn mode_allows(tool_name: &str, mode: PrivacyMode) -> bool {
    match mode {
        PrivacyMode::Strict => STRICT_ALLOWED_TOOLS.contains(&tool_name),
        _ => true,
    }
}

/// Kind of data a tool returns, by name, for the built-in tools
pub fn classify_tool(tool_name: &str) -> ToolKind {
    if tool_name == search::SEARCH_TOOLS {
        ToolKind::Meta
    } else if parser_tools::is_parser_tool(tool_name) {
        ToolKind::Action
    } else {
        tools::declared_kind(tool_name).unwrap_or(ToolKind::Unclassified)
    }
}

/// Mode dispatcher over raw tool results
///
/// Holds no per-call state; safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct PrivacyFilter {
    settings: PrivacySettings,
    unclassified: UnclassifiedPolicy,
}

impl PrivacyFilter {
    pub fn new(settings: PrivacySettings, unclassified: UnclassifiedPolicy) -> Self {
        Self {
            settings,
            unclassified,
        }
    }

    /// Filter a result keyed by tool name
    ///
    /// `mode` defaults to the process-wide setting.
    pub fn filter_result(
        &self,
        raw: &Value,
        tool_name: &str,
        mode: Option<PrivacyMode>,
    ) -> Result<Value, ToolError> {
        let mode = mode.unwrap_or_else(|| self.settings.current());
        self.filter_kind(raw, tool_name, classify_tool(tool_name), mode)
    }

    /// Filter a result whose kind is already known (e.g. from its descriptor)
    pub fn filter_kind(
        &self,
        raw: &Value,
        tool_name: &str,
        kind: ToolKind,
        mode: PrivacyMode,
    ) -> Result<Value, ToolError> {
        self.filter_kind_as_of(raw, tool_name, kind, mode, Utc::now().date_naive())
    }

    pub(crate) fn filter_kind_as_of(
        &self,
        raw: &Value,
        tool_name: &str,
        kind: ToolKind,
        mode: PrivacyMode,
        today: NaiveDate,
    ) -> Result<Value, ToolError> {
        debug!("Filtering {} result ({}) for {} mode", tool_name, kind, mode);

        match kind {
            ToolKind::Meta | ToolKind::Action => return Ok(raw.clone()),
            ToolKind::Unclassified => return self.unclassified_result(raw, tool_name, mode),
            ToolKind::Accounts | ToolKind::Transactions | ToolKind::Summary => {}
        }

        let filtered = match mode {
            PrivacyMode::Full => return Ok(raw.clone()),
            PrivacyMode::Anonymized => {
                match anonymizer::anonymize_as_of(raw, kind, today) {
                    Some(view) => to_value(&view)?,
                    None => return Ok(raw.clone()),
                }
            }
            PrivacyMode::Strict => strict_view(raw, kind)?,
            PrivacyMode::Standard => standard_view(raw, kind)?,
        };

        Ok(filtered)
    }

    fn unclassified_result(
        &self,
        raw: &Value,
        tool_name: &str,
        mode: PrivacyMode,
    ) -> Result<Value, ToolError> {
        if mode == PrivacyMode::Full {
            return Ok(raw.clone());
        }
        match self.unclassified {
            UnclassifiedPolicy::Passthrough => {
                warn!(
                    "No privacy transformation for tool '{}'; passing result through in {} mode",
                    tool_name, mode
                );
                Ok(raw.clone())
            }
            UnclassifiedPolicy::Reject => {
                warn!(
                    "Blocked unclassified result from tool '{}' in {} mode",
                    tool_name, mode
                );
                Err(ToolError::new(
                    ToolErrorCode::UnfilteredResultBlocked,
                    format!(
                        "Tool '{}' declares no data kind and cannot be filtered for {} mode",
                        tool_name, mode
                    ),
                ))
            }
        }
    }
}

// =============================================================================
// Strict views
// =============================================================================

#[derive(Debug, Serialize)]
struct StrictAccounts {
    account_count: usize,
    value_tier: ValueTier,
    account_types: BTreeMap<String, usize>,
    asset_class_mix: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
struct StrictTransactions {
    count: usize,
    by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
struct StrictSummary {
    value_tier: ValueTier,
    risk_level: Option<String>,
}

fn strict_view(raw: &Value, kind: ToolKind) -> Result<Value, ToolError> {
    match kind {
        ToolKind::Accounts => {
            let accounts: Vec<Account> = anonymizer::records_from_value(raw, "accounts");
            let digest = anonymize_accounts(&accounts).portfolio;

            let mut account_types = BTreeMap::new();
            for account in &accounts {
                let key = account
                    .account_type
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                *account_types.entry(key).or_insert(0) += 1;
            }

            to_value(&StrictAccounts {
                account_count: digest.account_count,
                value_tier: digest.value_tier,
                account_types,
                asset_class_mix: digest.asset_class_mix,
            })
        }
        ToolKind::Transactions => {
            let transactions: Vec<Transaction> =
                anonymizer::records_from_value(raw, "transactions");
            let summary = anonymize_transactions(&transactions, Utc::now().date_naive());
            to_value(&StrictTransactions {
                count: summary.count,
                by_type: summary.by_type,
            })
        }
        ToolKind::Summary => {
            let summary = anonymizer::summary_from_value(raw);
            to_value(&StrictSummary {
                value_tier: value_to_tier(summary.total_value),
                risk_level: summary.risk_level,
            })
        }
        _ => Ok(raw.clone()),
    }
}

// =============================================================================
// Standard views
// =============================================================================

#[derive(Debug, Serialize)]
struct StandardHolding {
    ticker: Option<String>,
    name: Option<String>,
    asset_class: &'static str,
}

#[derive(Debug, Serialize)]
struct StandardAccount {
    name: String,
    account_type: Option<String>,
    institution: Option<String>,
    currency: Option<String>,
    value_tier: ValueTier,
    is_liability: bool,
    holdings: Vec<StandardHolding>,
}

#[derive(Debug, Serialize)]
struct StandardAccounts {
    accounts: Vec<StandardAccount>,
    total_value_tier: ValueTier,
}

#[derive(Debug, Serialize)]
struct StandardTransaction {
    date: Option<NaiveDate>,
    name: String,
    #[serde(rename = "type")]
    transaction_type: &'static str,
    category: Option<String>,
    ticker: Option<String>,
    account_name: Option<String>,
    direction: &'static str,
    amount_tier: ValueTier,
}

#[derive(Debug, Serialize)]
struct StandardTransactions {
    transactions: Vec<StandardTransaction>,
    count: usize,
}

fn standard_view(raw: &Value, kind: ToolKind) -> Result<Value, ToolError> {
    match kind {
        ToolKind::Accounts => {
            let accounts: Vec<Account> = anonymizer::records_from_value(raw, "accounts");
            let total: f64 = accounts.iter().map(|a| a.balance).sum();
            let accounts = accounts
                .into_iter()
                .map(|a| StandardAccount {
                    value_tier: value_to_tier(a.balance.abs()),
                    is_liability: a.balance < 0.0,
                    holdings: a
                        .holdings
                        .unwrap_or_default()
                        .into_iter()
                        .map(|h| StandardHolding {
                            asset_class: anonymizer::normalize_asset_class(
                                h.asset_class.as_deref(),
                            ),
                            ticker: h.ticker,
                            name: h.name,
                        })
                        .collect(),
                    name: a.name,
                    account_type: a.account_type,
                    institution: a.institution,
                    currency: a.currency,
                })
                .collect();
            to_value(&StandardAccounts {
                accounts,
                total_value_tier: value_to_tier(total),
            })
        }
        ToolKind::Transactions => {
            let transactions: Vec<Transaction> =
                anonymizer::records_from_value(raw, "transactions");
            let count = transactions.len();
            let transactions = transactions
                .into_iter()
                .map(|t| StandardTransaction {
                    transaction_type: normalize_transaction_type(t.transaction_type.as_deref()),
                    direction: if t.amount < 0.0 { "outflow" } else { "inflow" },
                    amount_tier: value_to_tier(t.amount.abs()),
                    date: t.date,
                    name: t.name,
                    category: t.category,
                    ticker: t.ticker,
                    account_name: t.account_name,
                })
                .collect();
            to_value(&StandardTransactions {
                transactions,
                count,
            })
        }
        ToolKind::Summary => {
            let summary = anonymizer::summary_from_value(raw);
            to_value(&anonymize_summary(&summary))
        }
        _ => Ok(raw.clone()),
    }
}

fn to_value<T: Serialize>(view: &T) -> Result<Value, ToolError> {
    serde_json::to_value(view)
        .map_err(|e| ToolError::new(ToolErrorCode::Internal, format!("Failed to serialize view: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_accounts() -> Value {
        json!({
            "accounts": [
                { "name": "Everyday Checking", "account_type": "depository",
                  "institution": "First Federal", "balance": 125432.17 },
                { "name": "Taxable Brokerage", "account_type": "investment", "balance": 50000.0,
                  "holdings": [
                      { "ticker": "VTI", "name": "Vanguard Total Market", "asset_class": "equity", "value": 40000.0 },
                      { "ticker": "BND", "asset_class": "bond", "value": 10000.0 }
                  ] },
                { "name": "Rewards Card", "account_type": "credit_card", "balance": 10000.0 }
            ]
        })
    }

    fn raw_transactions() -> Value {
        json!([
            { "date": "2024-05-01", "name": "Blue Bottle Coffee", "amount": -6.5,
              "type": "expense", "category": "dining", "account_name": "Everyday Checking" },
            { "date": "2024-05-03", "name": "Buy VTI", "amount": -2500.0,
              "type": "buy", "ticker": "VTI" }
        ])
    }

    fn filter() -> PrivacyFilter {
        PrivacyFilter::default()
    }

    #[test]
    fn test_mode_allows_strict_allow_list() {
        assert!(mode_allows("get_financial_summary", PrivacyMode::Strict));
        assert!(mode_allows("search_tools", PrivacyMode::Strict));
        assert!(!mode_allows("get_account_details", PrivacyMode::Strict));
        assert!(!mode_allows("parse_transaction", PrivacyMode::Strict));
        assert!(mode_allows("get_account_details", PrivacyMode::Anonymized));
    }

    #[test]
    fn test_classify_tool() {
        assert_eq!(classify_tool("get_accounts"), ToolKind::Accounts);
        assert_eq!(classify_tool("get_transactions"), ToolKind::Transactions);
        assert_eq!(classify_tool("get_financial_summary"), ToolKind::Summary);
        assert_eq!(classify_tool("search_tools"), ToolKind::Meta);
        assert_eq!(classify_tool("parse_transaction"), ToolKind::Action);
        assert_eq!(classify_tool("custom_widget"), ToolKind::Unclassified);
    }

    #[test]
    fn test_full_is_identity() {
        let raw = raw_accounts();
        let out = filter()
            .filter_result(&raw, "get_accounts", Some(PrivacyMode::Full))
            .unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_default_mode_is_anonymized() {
        let out = filter().filter_result(&raw_accounts(), "get_accounts", None).unwrap();
        assert_eq!(out["accounts"][0]["id"], "A");
        assert_eq!(out["portfolio"]["value_tier"], "six_figures");
    }

    #[test]
    fn test_mode_read_from_settings() {
        let settings = PrivacySettings::new(PrivacyMode::Full);
        let filter = PrivacyFilter::new(settings.clone(), UnclassifiedPolicy::Passthrough);
        let raw = raw_accounts();
        assert_eq!(filter.filter_result(&raw, "get_accounts", None).unwrap(), raw);

        settings.set(PrivacyMode::Strict);
        let out = filter.filter_result(&raw, "get_accounts", None).unwrap();
        assert_eq!(out["account_count"], 3);
    }

    #[test]
    fn test_strict_accounts_fold_to_aggregates() {
        let out = filter()
            .filter_result(&raw_accounts(), "get_accounts", Some(PrivacyMode::Strict))
            .unwrap();
        assert_eq!(out["account_count"], 3);
        assert_eq!(out["value_tier"], "six_figures");
        assert_eq!(out["account_types"]["depository"], 1);
        assert!(out.get("accounts").is_none());

        let text = out.to_string();
        for literal in ["Everyday", "First Federal", "VTI", "125432.17"] {
            assert!(!text.contains(literal), "leaked {}", literal);
        }
    }

    #[test]
    fn test_strict_transactions_are_counts() {
        let out = filter()
            .filter_result(&raw_transactions(), "get_transactions", Some(PrivacyMode::Strict))
            .unwrap();
        assert_eq!(out, json!({ "count": 2, "by_type": { "buy": 1, "expense": 1 } }));
    }

    #[test]
    fn test_strict_summary() {
        let raw = json!({ "total_value": 2_500_000.0, "risk_level": "aggressive", "savings_rate": 0.4 });
        let out = filter()
            .filter_result(&raw, "get_financial_summary", Some(PrivacyMode::Strict))
            .unwrap();
        assert_eq!(out, json!({ "value_tier": "seven_figures", "risk_level": "aggressive" }));
    }

    #[test]
    fn test_anonymized_transactions_hide_literals() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let out = filter()
            .filter_kind_as_of(
                &raw_transactions(),
                "get_transactions",
                ToolKind::Transactions,
                PrivacyMode::Anonymized,
                today,
            )
            .unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["date_range"]["latest"], "1 weeks ago");
        assert_eq!(out["date_range"]["span_days"], 2);

        let text = out.to_string();
        for literal in ["Blue Bottle", "VTI", "2500", "6.5"] {
            assert!(!text.contains(literal), "leaked {}", literal);
        }
    }

    #[test]
    fn test_standard_accounts_keep_names_hide_amounts() {
        let out = filter()
            .filter_result(&raw_accounts(), "get_accounts", Some(PrivacyMode::Standard))
            .unwrap();
        assert_eq!(out["accounts"][0]["name"], "Everyday Checking");
        assert_eq!(out["accounts"][0]["value_tier"], "six_figures");
        assert_eq!(out["accounts"][1]["holdings"][0]["ticker"], "VTI");
        assert_eq!(out["accounts"][1]["holdings"][1]["asset_class"], "fixed_income");
        assert_eq!(out["total_value_tier"], "six_figures");

        let text = out.to_string();
        assert!(!text.contains("125432.17"));
        assert!(!text.contains("40000"));
    }

    #[test]
    fn test_standard_transactions() {
        let out = filter()
            .filter_result(&raw_transactions(), "get_transactions", Some(PrivacyMode::Standard))
            .unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["transactions"][0]["name"], "Blue Bottle Coffee");
        assert_eq!(out["transactions"][0]["direction"], "outflow");
        assert_eq!(out["transactions"][0]["amount_tier"], "under_10k");
        assert!(out["transactions"][0].get("amount").is_none());
        assert!(!out.to_string().contains("2500"));
    }

    #[test]
    fn test_unclassified_passthrough_by_default() {
        let raw = json!({ "secret_balance": 1234.56 });
        let out = filter()
            .filter_result(&raw, "custom_widget", Some(PrivacyMode::Anonymized))
            .unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_unclassified_reject_policy() {
        let filter = PrivacyFilter::new(PrivacySettings::default(), UnclassifiedPolicy::Reject);
        let raw = json!({ "secret_balance": 1234.56 });
        let err = filter
            .filter_result(&raw, "custom_widget", Some(PrivacyMode::Standard))
            .unwrap_err();
        assert_eq!(err.code, ToolErrorCode::UnfilteredResultBlocked);

        // Full mode never filters
        let out = filter
            .filter_result(&raw, "custom_widget", Some(PrivacyMode::Full))
            .unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_meta_results_pass_through() {
        let raw = json!({ "tools": [{ "name": "get_accounts" }], "count": 1, "query": "accounts" });
        let out = filter()
            .filter_result(&raw, "search_tools", Some(PrivacyMode::Strict))
            .unwrap();
        assert_eq!(out, raw);
    }
}
