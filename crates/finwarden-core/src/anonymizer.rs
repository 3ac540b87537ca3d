//! Anonymizer: raw finance records to non-identifying projections
//!
//! Every function here is pure. Accounts become letter ids with balance
//! weights and asset-class mixes, transactions collapse to counts and a
//! relative date range, and summaries swap their total for a value tier.
//! No name, ticker or exact amount from the input survives.
//!
//! Letter ids follow input order, so a caller whose ordering correlates with
//! something sensitive (e.g. account creation date) still leaks that order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::models::{Account, FinancialSummary, Holding, ToolKind, Transaction};

/// Asset class assigned to accounts without holdings
pub const CASH_ASSET_CLASS: &str = "cash";

/// Weights are reported in ten-thousandths
const WEIGHT_UNITS: u64 = 10_000;

// =============================================================================
// Value tiers
// =============================================================================

/// Coarse order-of-magnitude bucket replacing an exact amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ValueTier {
    #[serde(rename = "under_10k")]
    Under10k,
    #[serde(rename = "five_figures")]
    FiveFigures,
    #[serde(rename = "six_figures")]
    SixFigures,
    #[serde(rename = "seven_figures")]
    SevenFigures,
    #[serde(rename = "eight_figures_plus")]
    EightFiguresPlus,
}

impl ValueTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Under10k => "under_10k",
            Self::FiveFigures => "five_figures",
            Self::SixFigures => "six_figures",
            Self::SevenFigures => "seven_figures",
            Self::EightFiguresPlus => "eight_figures_plus",
        }
    }
}

impl std::fmt::Display for ValueTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map a monetary value to its tier (half-open boundaries)
///
/// Zero, negative and NaN values land in `under_10k`.
pub fn value_to_tier(value: f64) -> ValueTier {
    if value >= 10_000_000.0 {
        ValueTier::EightFiguresPlus
    } else if value >= 1_000_000.0 {
        ValueTier::SevenFigures
    } else if value >= 100_000.0 {
        ValueTier::SixFigures
    } else if value >= 10_000.0 {
        ValueTier::FiveFigures
    } else {
        ValueTier::Under10k
    }
}

// =============================================================================
// Concentration and diversification
// =============================================================================

/// How unevenly value is spread across accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Concentration {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl Concentration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

/// Concentration level from the largest single weight
///
/// A single account is always `very_high`, whatever its balance.
pub fn concentration_level(largest_weight: f64, account_count: usize) -> Concentration {
    if account_count == 1 || largest_weight >= 0.75 {
        Concentration::VeryHigh
    } else if largest_weight >= 0.5 {
        Concentration::High
    } else if largest_weight >= 0.25 {
        Concentration::Moderate
    } else {
        Concentration::Low
    }
}

/// Diversification score in [0, 1]
///
/// Breadth (distinct asset classes beyond the first, distinct holdings) makes
/// up 70% of the score; evenness of the account weights (1 - HHI) the rest.
pub fn diversification_score(
    distinct_asset_classes: usize,
    distinct_holdings: usize,
    weights: &[f64],
) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }

    let class_breadth = (distinct_asset_classes.saturating_sub(1) as f64 / 4.0).min(1.0);
    let holding_breadth = (distinct_holdings as f64 / 20.0).min(1.0);
    let breadth = 0.5 * class_breadth + 0.5 * holding_breadth;

    let hhi: f64 = weights.iter().map(|w| w * w).sum();
    let evenness = if weights.iter().any(|w| *w > 0.0) {
        (1.0 - hhi).max(0.0)
    } else {
        0.0
    };

    round_to(0.7 * breadth + 0.3 * evenness, 2).clamp(0.0, 1.0)
}

// =============================================================================
// Relative dates
// =============================================================================

/// Render a day count as a relative date string
///
/// Future dates (negative counts) read as "today".
pub fn days_ago(days: i64) -> String {
    match days {
        i64::MIN..=0 => "today".to_string(),
        1 => "yesterday".to_string(),
        2..=6 => format!("{} days ago", days),
        7..=29 => format!("{} weeks ago", (days / 7).max(1)),
        30..=364 => format!("{} months ago", days / 30),
        _ => format!("{} years ago", days / 365),
    }
}

// =============================================================================
// Views
// =============================================================================

/// One account, reduced to its letter id, category, weight and asset mix
#[derive(Debug, Clone, Serialize)]
pub struct AnonymizedAccountView {
    pub id: String,
    pub account_type: String,
    pub weight: f64,
    pub asset_classes: BTreeMap<String, f64>,
}

/// Portfolio-level digest accompanying anonymized accounts
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioDigest {
    pub account_count: usize,
    pub value_tier: ValueTier,
    pub concentration: Concentration,
    /// Largest single account weight, two decimals
    pub largest_share: f64,
    pub diversification_score: f64,
    /// Balance-weighted asset class mix across all accounts
    pub asset_class_mix: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnonymizedAccounts {
    pub accounts: Vec<AnonymizedAccountView>,
    pub portfolio: PortfolioDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRangeSummary {
    pub span_days: i64,
    pub earliest: String,
    pub latest: String,
}

/// Transaction list collapsed to counts
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub count: usize,
    pub by_type: BTreeMap<String, usize>,
    pub date_range: Option<DateRangeSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnonymizedSummary {
    pub value_tier: ValueTier,
    pub savings_rate: Option<f64>,
    pub debt_to_income: Option<f64>,
    pub allocation: BTreeMap<String, f64>,
    pub risk_level: Option<String>,
}

/// Output of [`anonymize`]
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnonymizedView {
    Accounts(AnonymizedAccounts),
    Transactions(TransactionSummary),
    Summary(AnonymizedSummary),
}

// =============================================================================
// Entry points
// =============================================================================

/// Anonymize a raw tool result, dispatching on its kind
///
/// Returns `None` for kinds that carry no finance records.
pub fn anonymize(data: &Value, kind: ToolKind) -> Option<AnonymizedView> {
    anonymize_as_of(data, kind, Utc::now().date_naive())
}

/// [`anonymize`] with an explicit reference date for relative dates
pub fn anonymize_as_of(data: &Value, kind: ToolKind, today: NaiveDate) -> Option<AnonymizedView> {
    match kind {
        ToolKind::Accounts => {
            let accounts: Vec<Account> = records_from_value(data, "accounts");
            Some(AnonymizedView::Accounts(anonymize_accounts(&accounts)))
        }
        ToolKind::Transactions => {
            let transactions: Vec<Transaction> = records_from_value(data, "transactions");
            Some(AnonymizedView::Transactions(anonymize_transactions(
                &transactions,
                today,
            )))
        }
        ToolKind::Summary => {
            let summary = summary_from_value(data);
            Some(AnonymizedView::Summary(anonymize_summary(&summary)))
        }
        ToolKind::Meta | ToolKind::Action | ToolKind::Unclassified => None,
    }
}

/// Reduce accounts to letter ids, weights and asset-class mixes
pub fn anonymize_accounts(accounts: &[Account]) -> AnonymizedAccounts {
    let balances: Vec<f64> = accounts.iter().map(|a| a.balance).collect();
    let total: f64 = balances.iter().sum();
    let raw_weights = raw_weights(&balances);
    let weights = rounded_weights(&raw_weights);

    let breakdowns: Vec<BTreeMap<String, f64>> = accounts
        .iter()
        .map(|a| asset_class_breakdown(a.holdings.as_deref()))
        .collect();

    let views = accounts
        .iter()
        .zip(weights.iter())
        .zip(breakdowns.iter())
        .enumerate()
        .map(|(index, ((account, weight), breakdown))| AnonymizedAccountView {
            id: letter_id(index),
            account_type: account
                .account_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            weight: *weight,
            asset_classes: breakdown.clone(),
        })
        .collect();

    let largest = raw_weights.iter().cloned().fold(0.0_f64, f64::max);

    let mut asset_class_mix: BTreeMap<String, f64> = BTreeMap::new();
    for (weight, breakdown) in raw_weights.iter().zip(breakdowns.iter()) {
        for (class, share) in breakdown {
            *asset_class_mix.entry(class.clone()).or_insert(0.0) += weight * share;
        }
    }
    asset_class_mix.retain(|_, share| *share > 0.0);
    for share in asset_class_mix.values_mut() {
        *share = round_to(*share, 4);
    }

    let distinct_classes: BTreeSet<&String> = breakdowns.iter().flat_map(|b| b.keys()).collect();

    let portfolio = PortfolioDigest {
        account_count: accounts.len(),
        value_tier: value_to_tier(total),
        concentration: if accounts.is_empty() {
            Concentration::Low
        } else {
            concentration_level(largest, accounts.len())
        },
        largest_share: round_to(largest, 2),
        diversification_score: diversification_score(
            distinct_classes.len(),
            distinct_holdings(accounts),
            &raw_weights,
        ),
        asset_class_mix,
    };

    AnonymizedAccounts {
        accounts: views,
        portfolio,
    }
}

/// Collapse transactions to counts and a relative date range
pub fn anonymize_transactions(transactions: &[Transaction], today: NaiveDate) -> TransactionSummary {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for tx in transactions {
        let kind = normalize_transaction_type(tx.transaction_type.as_deref());
        *by_type.entry(kind.to_string()).or_insert(0) += 1;
    }

    TransactionSummary {
        count: transactions.len(),
        by_type,
        date_range: date_range(transactions, today),
    }
}

/// Replace the total with its tier; ratios and categories pass through
pub fn anonymize_summary(summary: &FinancialSummary) -> AnonymizedSummary {
    AnonymizedSummary {
        value_tier: value_to_tier(summary.total_value),
        savings_rate: summary.savings_rate,
        debt_to_income: summary.debt_to_income,
        allocation: summary.allocation.clone(),
        risk_level: summary.risk_level.clone(),
    }
}

// =============================================================================
// Helpers (shared with the privacy filter)
// =============================================================================

/// Sequential spreadsheet-style id: A..Z, AA, AB, ...
pub fn letter_id(index: usize) -> String {
    let mut n = index + 1;
    let mut id = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        id.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    id.reverse();
    String::from_utf8(id).unwrap_or_default()
}

/// Fold a free-form asset class label into a fixed vocabulary
pub fn normalize_asset_class(label: Option<&str>) -> &'static str {
    let label = match label {
        Some(l) => l.trim().to_lowercase().replace([' ', '-'], "_"),
        None => return "other",
    };
    match label.as_str() {
        "equity" | "equities" | "stock" | "stocks" | "etf" | "mutual_fund" => "equity",
        "fixed_income" | "bond" | "bonds" => "fixed_income",
        "cash" | "money_market" | "cash_equivalent" => CASH_ASSET_CLASS,
        "real_estate" | "reit" | "property" => "real_estate",
        "commodity" | "commodities" => "commodity",
        "crypto" | "cryptocurrency" => "crypto",
        "alternative" | "alternatives" => "alternative",
        _ => "other",
    }
}

/// Fold a free-form transaction type into a fixed vocabulary
pub fn normalize_transaction_type(label: Option<&str>) -> &'static str {
    let label = match label {
        Some(l) => l.trim().to_lowercase(),
        None => return "other",
    };
    match label.as_str() {
        "expense" | "debit" | "purchase" => "expense",
        "income" | "credit" => "income",
        "transfer" => "transfer",
        "buy" => "buy",
        "sell" => "sell",
        "dividend" => "dividend",
        "interest" => "interest",
        "fee" => "fee",
        "deposit" => "deposit",
        "withdrawal" => "withdrawal",
        "contribution" => "contribution",
        "refund" => "refund",
        _ => "other",
    }
}

/// Asset class shares from holdings; no usable holdings means all cash
pub fn asset_class_breakdown(holdings: Option<&[Holding]>) -> BTreeMap<String, f64> {
    let mut breakdown = BTreeMap::new();
    let holdings = holdings.unwrap_or_default();
    let total: f64 = holdings.iter().map(|h| h.value.max(0.0)).sum();

    if total <= 0.0 {
        breakdown.insert(CASH_ASSET_CLASS.to_string(), 1.0);
        return breakdown;
    }

    for holding in holdings {
        let class = normalize_asset_class(holding.asset_class.as_deref());
        *breakdown.entry(class.to_string()).or_insert(0.0) += holding.value.max(0.0) / total;
    }
    breakdown.retain(|_, share| *share > 0.0);
    for share in breakdown.values_mut() {
        *share = round_to(*share, 4);
    }
    breakdown
}

/// Pull a list of records out of a raw result
///
/// Accepts a bare array or an object wrapping the array under `key`.
/// Elements that fail to parse are skipped; anything else yields an empty
/// list so callers fall into their "no data" branch.
pub(crate) fn records_from_value<T: DeserializeOwned>(data: &Value, key: &str) -> Vec<T> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(map) => match map.get(key) {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("Result has no '{}' list; treating as empty", key);
                return Vec::new();
            }
        },
        Value::Null => return Vec::new(),
        _ => {
            warn!("Unexpected result shape for '{}'; treating as empty", key);
            return Vec::new();
        }
    };

    let mut skipped = 0usize;
    let records: Vec<T> = items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(record) => Some(record),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        warn!("Skipped {} malformed '{}' records", skipped, key);
    }
    records
}

/// Pull a summary out of a raw result (bare or under `summary`)
pub(crate) fn summary_from_value(data: &Value) -> FinancialSummary {
    let inner = data.get("summary").unwrap_or(data);
    serde_json::from_value(inner.clone()).unwrap_or_else(|_| {
        warn!("Malformed summary result; treating as empty");
        FinancialSummary::default()
    })
}

/// Round to a number of decimal places
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Share of the positive balances held by each account
///
/// Liabilities weigh 0 and do not shrink the denominator, so the weights
/// sum to 1 whenever any balance is positive and are all 0 otherwise.
fn raw_weights(balances: &[f64]) -> Vec<f64> {
    let positive: f64 = balances.iter().map(|b| b.max(0.0)).sum();
    if positive <= 0.0 {
        return vec![0.0; balances.len()];
    }
    balances.iter().map(|b| b.max(0.0) / positive).collect()
}

/// Round weights to four places while keeping their sum exact
///
/// Largest-remainder apportionment: every weight is floored to ten-thousandths
/// and the leftover units go to the largest fractional parts.
fn rounded_weights(weights: &[f64]) -> Vec<f64> {
    if weights.iter().all(|w| *w <= 0.0) {
        return vec![0.0; weights.len()];
    }

    let scaled: Vec<f64> = weights
        .iter()
        .map(|w| w.max(0.0) * WEIGHT_UNITS as f64)
        .collect();
    let mut units: Vec<u64> = scaled.iter().map(|s| s.floor() as u64).collect();
    let assigned: u64 = units.iter().sum();
    let mut leftover = WEIGHT_UNITS.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..scaled.len()).collect();
    order.sort_by(|a, b| {
        let fa = scaled[*a] - scaled[*a].floor();
        let fb = scaled[*b] - scaled[*b].floor();
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });
    for index in order {
        if leftover == 0 {
            break;
        }
        if scaled[index] > 0.0 {
            units[index] += 1;
            leftover -= 1;
        }
    }

    units
        .into_iter()
        .map(|u| u as f64 / WEIGHT_UNITS as f64)
        .collect()
}

fn distinct_holdings(accounts: &[Account]) -> usize {
    let mut seen = BTreeSet::new();
    for holding in accounts
        .iter()
        .flat_map(|a| a.holdings.as_deref().unwrap_or_default())
    {
        let key = holding
            .ticker
            .as_deref()
            .or(holding.name.as_deref())
            .map(|k| k.to_lowercase());
        if let Some(key) = key {
            seen.insert(key);
        }
    }
    seen.len()
}

fn date_range(transactions: &[Transaction], today: NaiveDate) -> Option<DateRangeSummary> {
    let earliest = transactions.iter().filter_map(|t| t.date).min()?;
    let latest = transactions.iter().filter_map(|t| t.date).max()?;

    Some(DateRangeSummary {
        span_days: (latest - earliest).num_days(),
        earliest: days_ago((today - earliest).num_days()),
        latest: days_ago((today - latest).num_days()),
    })
}
