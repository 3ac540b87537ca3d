//! Domain models for finwarden

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Privacy mode
// =============================================================================

/// Configured fidelity level for data handed to the agent.
///
/// Variants are declared in disclosure order, so the derived `Ord` is the
/// rank comparison used for tool gating: `Strict < Anonymized < Standard < Full`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    /// Aggregate-only tools, folded to counts and tiers
    Strict,
    /// Non-identifying projections (letter ids, weights, tiers)
    #[default]
    Anonymized,
    /// Names and categories visible, exact amounts hidden
    Standard,
    /// Raw data, unchanged
    Full,
}

impl PrivacyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Anonymized => "anonymized",
            Self::Standard => "standard",
            Self::Full => "full",
        }
    }

    /// Disclosure rank, 0 (strict) through 3 (full)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Strict => 0,
            Self::Anonymized => 1,
            Self::Standard => 2,
            Self::Full => 3,
        }
    }

    pub(crate) fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Self::Strict,
            1 => Self::Anonymized,
            2 => Self::Standard,
            _ => Self::Full,
        }
    }

    /// Whether a tool declaring `minimum` may run under this mode
    pub fn permits(&self, minimum: PrivacyMode) -> bool {
        self.rank() >= minimum.rank()
    }

    /// Get all modes, least disclosure first
    pub fn all() -> &'static [PrivacyMode] {
        &[Self::Strict, Self::Anonymized, Self::Standard, Self::Full]
    }
}

impl std::str::FromStr for PrivacyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "anonymized" | "anonymised" => Ok(Self::Anonymized),
            "standard" => Ok(Self::Standard),
            "full" => Ok(Self::Full),
            _ => Err(format!("Unknown privacy mode: {}", s)),
        }
    }
}

impl std::fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tool metadata enums
// =============================================================================

/// Where a tool descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    /// Declared by the finance domain at build time
    Static,
    /// Found by scanning parser tool definitions
    Discovered,
    /// Registered while the process is running
    Runtime,
}

impl ToolSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Discovered => "discovered",
            Self::Runtime => "runtime",
        }
    }

    /// Only runtime entries may be removed or replaced
    pub fn is_mutable(&self) -> bool {
        matches!(self, Self::Runtime)
    }
}

impl std::fmt::Display for ToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The shape of data a tool returns, which selects the privacy transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Accounts,
    Transactions,
    Summary,
    /// Catalog metadata (tool search results)
    Meta,
    /// Parser tool guidance and created entities
    Action,
    /// No declared kind; handled by the configured unclassified policy
    #[default]
    Unclassified,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Transactions => "transactions",
            Self::Summary => "summary",
            Self::Meta => "meta",
            Self::Action => "action",
            Self::Unclassified => "unclassified",
        }
    }
}

impl std::str::FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accounts" => Ok(Self::Accounts),
            "transactions" => Ok(Self::Transactions),
            "summary" => Ok(Self::Summary),
            "meta" => Ok(Self::Meta),
            "action" => Ok(Self::Action),
            "unclassified" => Ok(Self::Unclassified),
            _ => Err(format!("Unknown tool kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result status of an audited invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Pending,
    Success,
    Error,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for InvocationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown invocation status: {}", s)),
        }
    }
}

impl std::fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Raw finance records (as returned by the data provider)
// =============================================================================

/// A financial account with its current balance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub id: Option<String>,
    pub name: String,
    /// Account category (depository, investment, credit_card, ...)
    #[serde(alias = "category")]
    pub account_type: Option<String>,
    pub balance: f64,
    pub currency: Option<String>,
    pub institution: Option<String>,
    /// Positions held in the account; absent for cash-only accounts
    pub holdings: Option<Vec<Holding>>,
}

/// A single position inside an investment account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Holding {
    #[serde(alias = "symbol")]
    pub ticker: Option<String>,
    pub name: Option<String>,
    /// equity, fixed_income, cash, real_estate, crypto, ...
    pub asset_class: Option<String>,
    pub quantity: Option<f64>,
    /// Market value in the account currency
    pub value: f64,
}

/// A transaction or investment activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    pub id: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(alias = "description")]
    pub name: String,
    /// Negative = outflow, positive = inflow
    pub amount: f64,
    pub currency: Option<String>,
    /// expense, income, transfer, buy, sell, dividend, ...
    #[serde(rename = "type", alias = "kind")]
    pub transaction_type: Option<String>,
    pub category: Option<String>,
    pub ticker: Option<String>,
    pub account_name: Option<String>,
}

/// Household-level figures computed by the finance domain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialSummary {
    #[serde(alias = "net_worth")]
    pub total_value: f64,
    pub currency: Option<String>,
    /// Fraction of income saved, 0.0 - 1.0
    pub savings_rate: Option<f64>,
    pub debt_to_income: Option<f64>,
    /// Asset class -> percentage of portfolio
    pub allocation: BTreeMap<String, f64>,
    pub risk_level: Option<String>,
}

// =============================================================================
// Audit records
// =============================================================================

/// One audited tool call
///
/// Carries only structural metadata about the arguments: the shape map and a
/// content hash. Literal argument values are never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub id: i64,
    pub tool_name: String,
    pub session_id: Option<String>,
    pub privacy_mode: PrivacyMode,
    /// Argument name -> coarse type tag
    pub argument_shape: BTreeMap<String, String>,
    /// SHA-256 of the canonical argument serialization
    pub argument_hash: String,
    pub status: InvocationStatus,
    pub result_count: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub invoked_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// New invocation row (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewInvocation {
    pub tool_name: String,
    pub session_id: Option<String>,
    pub privacy_mode: PrivacyMode,
    pub argument_shape: BTreeMap<String, String>,
    pub argument_hash: String,
    pub invoked_at: DateTime<Utc>,
}

/// Completion data for a pending invocation
#[derive(Debug, Clone)]
pub struct InvocationCompletion {
    pub status: InvocationStatus,
    pub result_count: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Aggregated audit statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationStats {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub by_tool: BTreeMap<String, i64>,
    pub avg_duration_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_mode_ordering() {
        assert!(PrivacyMode::Strict < PrivacyMode::Anonymized);
        assert!(PrivacyMode::Anonymized < PrivacyMode::Standard);
        assert!(PrivacyMode::Standard < PrivacyMode::Full);
        for mode in PrivacyMode::all() {
            assert_eq!(PrivacyMode::from_rank(mode.rank()), *mode);
        }
    }

    #[test]
    fn test_privacy_mode_permits() {
        assert!(PrivacyMode::Full.permits(PrivacyMode::Strict));
        assert!(PrivacyMode::Anonymized.permits(PrivacyMode::Anonymized));
        assert!(!PrivacyMode::Strict.permits(PrivacyMode::Full));
    }

    #[test]
    fn test_privacy_mode_parse() {
        assert_eq!("STRICT".parse::<PrivacyMode>().unwrap(), PrivacyMode::Strict);
        assert_eq!(
            " anonymized ".parse::<PrivacyMode>().unwrap(),
            PrivacyMode::Anonymized
        );
        assert!("open".parse::<PrivacyMode>().is_err());
        assert_eq!(PrivacyMode::default(), PrivacyMode::Anonymized);
    }

    #[test]
    fn test_tool_source_mutability() {
        assert!(ToolSource::Runtime.is_mutable());
        assert!(!ToolSource::Static.is_mutable());
        assert!(!ToolSource::Discovered.is_mutable());
    }

    #[test]
    fn test_transaction_deserialize_aliases() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "description": "Coffee",
            "amount": -4.5,
            "kind": "expense"
        }))
        .unwrap();
        assert_eq!(tx.name, "Coffee");
        assert_eq!(tx.transaction_type.as_deref(), Some("expense"));
        assert!(tx.date.is_none());
    }

    #[test]
    fn test_account_missing_fields_default() {
        let account: Account =
            serde_json::from_value(serde_json::json!({ "balance": 10.0 })).unwrap();
        assert_eq!(account.balance, 10.0);
        assert!(account.holdings.is_none());
        assert!(account.name.is_empty());
    }
}
