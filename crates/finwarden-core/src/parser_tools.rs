//! Parser tools: let the agent create domain entities from free text
//!
//! The agent does the parsing. Each tool runs in two phases:
//!
//! 1. **Guidance**: called with only `text`, the tool returns the schema the
//!    agent must fill, an example and instructions. Nothing is created.
//! 2. **Structured**: called with the payload object (e.g. `transaction`),
//!    the tool validates every field, coerces numeric strings like `"$1,250"`
//!    or `"1.2k"`, and hands the typed input to [`DomainActions`].
//!
//! Definitions are discovered from [`parser_tool_definitions`] on every
//! registry refresh. All parser tools require `standard` mode.

use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ToolError, ToolErrorCode};
use crate::models::{PrivacyMode, ToolKind, ToolSource};
use crate::provider::DomainActions;
use crate::registry::{ToolDescriptor, ToolProvider};

pub const PARSE_TRANSACTION: &str = "parse_transaction";
pub const PARSE_ACCOUNT: &str = "parse_account";
pub const PARSE_TRADE: &str = "parse_trade";

/// Free-text argument that selects the guidance phase
pub const TEXT_FIELD: &str = "text";

/// Mode every parser tool requires
pub const PARSER_MINIMUM_MODE: PrivacyMode = PrivacyMode::Standard;

// =============================================================================
// Typed inputs
// =============================================================================

/// Validated input for a new transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub date: NaiveDate,
    pub name: String,
    /// Negative = outflow
    pub amount: f64,
    pub account: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "type")]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Validated input for a new account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAccount {
    pub name: String,
    pub account_type: String,
    pub balance: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
}

/// Validated input for a buy or sell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTrade {
    pub ticker: String,
    pub side: String,
    pub quantity: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub account: String,
}

// =============================================================================
// Definitions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    Text,
    Number,
    /// Number strictly greater than zero
    PositiveNumber,
    Date,
    Choice(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub description: &'static str,
}

const fn field(
    name: &'static str,
    field_type: FieldType,
    required: bool,
    description: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        required,
        description,
    }
}

/// A parser tool's contract with the agent
#[derive(Debug)]
pub struct ParserToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    /// Argument holding the structured payload
    pub payload_key: &'static str,
    pub fields: &'static [FieldSpec],
    pub instructions: &'static str,
    example: fn() -> Value,
}

impl ParserToolDefinition {
    pub fn example(&self) -> Value {
        (self.example)()
    }

    /// JSON Schema for the structured payload
    pub fn payload_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in self.fields {
            properties.insert(spec.name.to_string(), field_schema(spec));
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Tool input schema: free text or the structured payload
    pub fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                TEXT_FIELD: {
                    "type": "string",
                    "description": "The user's original wording. Send this alone to get the schema to fill."
                },
                self.payload_key: self.payload_schema(),
            },
        })
    }
}

const TRANSACTION_TYPES: &[&str] = &[
    "expense",
    "income",
    "transfer",
    "buy",
    "sell",
    "dividend",
    "interest",
    "fee",
    "deposit",
    "withdrawal",
    "contribution",
    "refund",
];

const ACCOUNT_TYPES: &[&str] = &[
    "depository",
    "investment",
    "retirement",
    "credit_card",
    "loan",
    "mortgage",
    "real_estate",
    "crypto",
    "other",
];

const TRADE_SIDES: &[&str] = &["buy", "sell"];

const TRANSACTION_FIELDS: &[FieldSpec] = &[
    field("date", FieldType::Date, true, "Transaction date, YYYY-MM-DD"),
    field("name", FieldType::Text, true, "Payee or short description"),
    field("amount", FieldType::Number, true, "Signed amount; negative for money leaving the account"),
    field("account", FieldType::Text, true, "Name of the account it belongs to"),
    field("category", FieldType::Text, false, "Spending category, e.g. groceries"),
    field("type", FieldType::Choice(TRANSACTION_TYPES), false, "Kind of transaction"),
    field("currency", FieldType::Text, false, "ISO currency code, e.g. USD"),
];

const ACCOUNT_FIELDS: &[FieldSpec] = &[
    field("name", FieldType::Text, true, "Account name as the user refers to it"),
    field("account_type", FieldType::Choice(ACCOUNT_TYPES), true, "Kind of account"),
    field("balance", FieldType::Number, true, "Current balance; negative for debts"),
    field("currency", FieldType::Text, false, "ISO currency code, e.g. USD"),
    field("institution", FieldType::Text, false, "Bank or brokerage"),
];

const TRADE_FIELDS: &[FieldSpec] = &[
    field("ticker", FieldType::Text, true, "Security symbol, e.g. VTI"),
    field("side", FieldType::Choice(TRADE_SIDES), true, "buy or sell"),
    field("quantity", FieldType::PositiveNumber, true, "Number of shares or units"),
    field("price", FieldType::PositiveNumber, false, "Price per unit"),
    field("date", FieldType::Date, false, "Trade date, YYYY-MM-DD; defaults to today"),
    field("account", FieldType::Text, true, "Name of the brokerage account"),
];

static PARSER_TOOLS: [ParserToolDefinition; 3] = [
    ParserToolDefinition {
        name: PARSE_TRANSACTION,
        description: "Record a transaction described in plain language, e.g. \"spent $42 at the grocery store yesterday\".",
        payload_key: "transaction",
        fields: TRANSACTION_FIELDS,
        instructions: "Extract the transaction from the user's text and call parse_transaction again with a `transaction` object matching the schema. Use negative amounts for spending. Ask the user about any required field you cannot infer.",
        example: transaction_example,
    },
    ParserToolDefinition {
        name: PARSE_ACCOUNT,
        description: "Add an account described in plain language, e.g. \"I have a Chase checking account with about 3k\".",
        payload_key: "account",
        fields: ACCOUNT_FIELDS,
        instructions: "Extract the account from the user's text and call parse_account again with an `account` object matching the schema. Ask the user about any required field you cannot infer.",
        example: account_example,
    },
    ParserToolDefinition {
        name: PARSE_TRADE,
        description: "Record a buy or sell trade described in plain language, e.g. \"bought 10 shares of VTI at 250\".",
        payload_key: "trade",
        fields: TRADE_FIELDS,
        instructions: "Extract the trade from the user's text and call parse_trade again with a `trade` object matching the schema. Quantity is always positive; use `side` for direction.",
        example: trade_example,
    },
];

fn transaction_example() -> Value {
    json!({
        "date": "2024-03-14",
        "name": "Trader Joe's",
        "amount": -42.17,
        "account": "Everyday Checking",
        "category": "groceries",
        "type": "expense"
    })
}

fn account_example() -> Value {
    json!({
        "name": "Chase Checking",
        "account_type": "depository",
        "balance": 3000.0,
        "institution": "Chase"
    })
}

fn trade_example() -> Value {
    json!({
        "ticker": "VTI",
        "side": "buy",
        "quantity": 10,
        "price": 250.0,
        "date": "2024-03-14",
        "account": "Taxable Brokerage"
    })
}

/// All parser tool definitions
pub fn parser_tool_definitions() -> &'static [ParserToolDefinition] {
    &PARSER_TOOLS
}

pub fn find_definition(name: &str) -> Option<&'static ParserToolDefinition> {
    PARSER_TOOLS.iter().find(|d| d.name == name)
}

pub fn is_parser_tool(name: &str) -> bool {
    find_definition(name).is_some()
}

// =============================================================================
// Coercion
// =============================================================================

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(-)?(\d+(?:\.\d+)?|\.\d+)([km])?$").expect("valid regex")
    })
}

/// Parse an amount string, handling currency symbols, commas, parentheses
/// for negatives and `k`/`m` suffixes
pub fn coerce_amount(s: &str) -> Option<f64> {
    let mut cleaned: String = s
        .trim()
        .to_lowercase()
        .replace(['$', '€', '£', '¥', ',', ' ', '_'], "");

    let parenthesized = cleaned.starts_with('(') && cleaned.ends_with(')');
    if parenthesized {
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }

    let caps = amount_pattern().captures(&cleaned)?;
    let mut value: f64 = caps.get(2)?.as_str().parse().ok()?;
    value *= match caps.get(3).map(|m| m.as_str()) {
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        _ => 1.0,
    };
    if caps.get(1).is_some() || parenthesized {
        value = -value;
    }
    Some(value)
}

/// Parse a date in the common formats, normalized to YYYY-MM-DD
pub fn coerce_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    // Try common date formats
    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
        "%Y/%m/%d", // 2024/01/15
    ];

    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

// =============================================================================
// Validation
// =============================================================================

/// Validate a payload against a definition
///
/// Returns the cleaned payload (declared fields only, coerced values) or
/// every problem found.
pub fn validate_payload(
    definition: &ParserToolDefinition,
    payload: &Map<String, Value>,
) -> Result<Map<String, Value>, ToolError> {
    let mut cleaned = Map::new();
    let mut problems = Vec::new();

    for spec in definition.fields {
        let value = match payload.get(spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    problems.push(format!("{} is required", spec.name));
                }
                continue;
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                if spec.required {
                    problems.push(format!("{} is required", spec.name));
                }
                continue;
            }
            Some(value) => value,
        };

        match coerce_field(spec, value) {
            Ok(coerced) => {
                cleaned.insert(spec.name.to_string(), coerced);
            }
            Err(problem) => problems.push(problem),
        }
    }

    if problems.is_empty() {
        Ok(cleaned)
    } else {
        debug!(
            "{} payload rejected with {} problems",
            definition.name,
            problems.len()
        );
        Err(ToolError::validation(problems))
    }
}

fn coerce_field(spec: &FieldSpec, value: &Value) -> Result<Value, String> {
    match spec.field_type {
        FieldType::Text => match value {
            Value::String(s) => Ok(Value::String(s.trim().to_string())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(format!("{} must be text", spec.name)),
        },
        FieldType::Number | FieldType::PositiveNumber => {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => coerce_amount(s),
                _ => None,
            }
            .filter(|n| n.is_finite())
            .ok_or_else(|| {
                format!(
                    "{} must be a number (e.g. 1250.00, \"$1,250\", \"1.2k\")",
                    spec.name
                )
            })?;
            if spec.field_type == FieldType::PositiveNumber && number <= 0.0 {
                return Err(format!("{} must be greater than zero", spec.name));
            }
            Ok(json!(number))
        }
        FieldType::Date => value
            .as_str()
            .and_then(coerce_date)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| format!("{} must be a date in YYYY-MM-DD format", spec.name)),
        FieldType::Choice(options) => {
            let choice = value
                .as_str()
                .map(|s| s.trim().to_lowercase().replace([' ', '-'], "_"));
            match choice {
                Some(c) if options.contains(&c.as_str()) => Ok(Value::String(c)),
                _ => Err(format!("{} must be one of: {}", spec.name, options.join(", "))),
            }
        }
    }
}

fn field_schema(spec: &FieldSpec) -> Value {
    match spec.field_type {
        FieldType::Text => json!({ "type": "string", "description": spec.description }),
        FieldType::Number => json!({
            "type": ["number", "string"],
            "description": spec.description,
        }),
        FieldType::PositiveNumber => json!({
            "type": ["number", "string"],
            "exclusiveMinimum": 0,
            "description": spec.description,
        }),
        FieldType::Date => json!({
            "type": "string",
            "format": "date",
            "description": spec.description,
        }),
        FieldType::Choice(options) => json!({
            "type": "string",
            "enum": options,
            "description": spec.description,
        }),
    }
}

// =============================================================================
// Executor
// =============================================================================

#[derive(Debug, Serialize)]
struct Guidance<'a> {
    tool: &'a str,
    status: &'static str,
    needs_structure: bool,
    instructions: &'a str,
    payload_key: &'a str,
    schema: Value,
    required_fields: Vec<&'a str>,
    example: Value,
}

/// Runs parser tools against the domain actions
#[derive(Clone)]
pub struct ParserToolExecutor {
    actions: Arc<dyn DomainActions>,
}

impl ParserToolExecutor {
    pub fn new(actions: Arc<dyn DomainActions>) -> Self {
        Self { actions }
    }

    /// Guidance when no payload is present, otherwise validate and create
    pub fn execute(&self, tool_name: &str, args: &Value) -> Result<Value, ToolError> {
        let definition =
            find_definition(tool_name).ok_or_else(|| ToolError::tool_not_found(tool_name))?;

        match args.get(definition.payload_key) {
            None | Some(Value::Null) => guidance(definition),
            Some(Value::Object(payload)) => self.create(definition, payload),
            Some(_) => Err(ToolError::validation(vec![format!(
                "{} must be an object",
                definition.payload_key
            )])),
        }
    }

    fn create(
        &self,
        definition: &ParserToolDefinition,
        payload: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let cleaned = validate_payload(definition, payload)?;

        let created = match definition.name {
            PARSE_TRANSACTION => {
                let input: ParsedTransaction = typed(cleaned)?;
                self.actions.create_transaction(&input)
            }
            PARSE_ACCOUNT => {
                let input: ParsedAccount = typed(cleaned)?;
                self.actions.create_account(&input)
            }
            PARSE_TRADE => {
                let input: ParsedTrade = typed(cleaned)?;
                self.actions.record_trade(&input)
            }
            other => return Err(ToolError::tool_not_found(other)),
        }
        .map_err(|e| {
            // domain errors name accounts and tickers; keep them in the log only
            warn!("{} failed: {:#}", definition.name, e);
            ToolError::execution(format!(
                "{} could not create the {}",
                definition.name, definition.payload_key
            ))
        })?;

        info!("{} created a {}", definition.name, definition.payload_key);
        Ok(json!({
            "tool": definition.name,
            "status": "created",
            definition.payload_key: created,
        }))
    }
}

fn guidance(definition: &ParserToolDefinition) -> Result<Value, ToolError> {
    let guidance = Guidance {
        tool: definition.name,
        status: "needs_structure",
        needs_structure: true,
        instructions: definition.instructions,
        payload_key: definition.payload_key,
        schema: definition.payload_schema(),
        required_fields: definition
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect(),
        example: json!({ definition.payload_key: definition.example() }),
    };
    serde_json::to_value(guidance)
        .map_err(|e| ToolError::new(ToolErrorCode::Internal, e.to_string()))
}

fn typed<T: DeserializeOwned>(cleaned: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(cleaned))
        .map_err(|e| ToolError::validation(vec![format!("invalid payload: {}", e)]))
}

/// Discovered parser tools, executed by [`ParserToolExecutor`]
pub struct ParserToolProvider {
    executor: ParserToolExecutor,
}

impl ParserToolProvider {
    pub fn new(actions: Arc<dyn DomainActions>) -> Self {
        Self {
            executor: ParserToolExecutor::new(actions),
        }
    }
}

impl ToolProvider for ParserToolProvider {
    fn source(&self) -> ToolSource {
        ToolSource::Discovered
    }

    fn list_tools(&self) -> Vec<ToolDescriptor> {
        parser_tool_definitions()
            .iter()
            .map(|d| {
                ToolDescriptor::new(d.name, d.description, ToolSource::Discovered, d.input_schema())
                    .with_kind(ToolKind::Action)
                    .with_minimum_mode(PARSER_MINIMUM_MODE)
            })
            .collect()
    }

    fn execute(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        self.executor.execute(name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingActions;

    fn executor() -> (ParserToolExecutor, Arc<RecordingActions>) {
        let actions = Arc::new(RecordingActions::default());
        (ParserToolExecutor::new(actions.clone()), actions)
    }

    #[test]
    fn test_coerce_amount() {
        assert_eq!(coerce_amount("1250"), Some(1250.0));
        assert_eq!(coerce_amount("$1,250.50"), Some(1250.5));
        assert_eq!(coerce_amount("1.2k"), Some(1200.0));
        assert_eq!(coerce_amount("2M"), Some(2_000_000.0));
        assert_eq!(coerce_amount("-42.17"), Some(-42.17));
        assert_eq!(coerce_amount("($99.00)"), Some(-99.0));
        assert_eq!(coerce_amount("€ 3 000"), Some(3000.0));
        assert_eq!(coerce_amount("about fifty"), None);
        assert_eq!(coerce_amount("12..5"), None);
        assert_eq!(coerce_amount(""), None);
    }

    #[test]
    fn test_coerce_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 14);
        assert_eq!(coerce_date("2024-03-14"), expected);
        assert_eq!(coerce_date("03/14/2024"), expected);
        assert_eq!(coerce_date("2024/03/14"), expected);
        assert_eq!(coerce_date("yesterday"), None);
    }

    #[test]
    fn test_is_parser_tool() {
        assert!(is_parser_tool(PARSE_TRANSACTION));
        assert!(is_parser_tool(PARSE_ACCOUNT));
        assert!(is_parser_tool(PARSE_TRADE));
        assert!(!is_parser_tool("get_accounts"));
    }

    #[test]
    fn test_guidance_phase_creates_nothing() {
        let (executor, actions) = executor();
        let out = executor
            .execute(PARSE_TRANSACTION, &json!({ "text": "spent 42 at trader joes" }))
            .unwrap();

        assert_eq!(out["status"], "needs_structure");
        assert_eq!(out["needs_structure"], true);
        assert_eq!(out["payload_key"], "transaction");
        assert!(out["schema"]["properties"]["amount"].is_object());
        assert!(out["example"]["transaction"]["date"].is_string());
        let required: Vec<&str> = out["required_fields"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, vec!["date", "name", "amount", "account"]);
        assert!(actions.created().is_empty());
    }

    #[test]
    fn test_structured_phase_coerces_and_creates() {
        let (executor, actions) = executor();
        let out = executor
            .execute(
                PARSE_TRANSACTION,
                &json!({
                    "text": "ignored once a payload is present",
                    "transaction": {
                        "date": "03/14/2024",
                        "name": " Trader Joe's ",
                        "amount": "-$42.17",
                        "account": "Everyday Checking",
                        "type": "Expense",
                        "note": "unknown fields are dropped"
                    }
                }),
            )
            .unwrap();

        assert_eq!(out["status"], "created");
        let created = actions.transactions();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Trader Joe's");
        assert_eq!(created[0].amount, -42.17);
        assert_eq!(created[0].date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(created[0].transaction_type.as_deref(), Some("expense"));
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let (executor, actions) = executor();
        let err = executor
            .execute(
                PARSE_TRANSACTION,
                &json!({ "transaction": { "name": "Coffee", "amount": "a few bucks", "date": "soon" } }),
            )
            .unwrap_err();

        assert_eq!(err.code, ToolErrorCode::ValidationFailed);
        assert_eq!(err.details.len(), 3);
        assert!(err.details.iter().any(|d| d.starts_with("date must be a date")));
        assert!(err.details.iter().any(|d| d.starts_with("amount must be a number")));
        assert!(err.details.contains(&"account is required".to_string()));
        assert!(actions.created().is_empty());
    }

    #[test]
    fn test_choice_fields() {
        let (executor, actions) = executor();
        executor
            .execute(
                PARSE_ACCOUNT,
                &json!({ "account": { "name": "Visa", "account_type": "Credit Card", "balance": "(1,200)" } }),
            )
            .unwrap();
        let accounts = actions.accounts();
        assert_eq!(accounts[0].account_type, "credit_card");
        assert_eq!(accounts[0].balance, -1200.0);

        let err = executor
            .execute(
                PARSE_ACCOUNT,
                &json!({ "account": { "name": "Jar", "account_type": "piggy_bank", "balance": 5 } }),
            )
            .unwrap_err();
        assert!(err.details[0].starts_with("account_type must be one of"));
    }

    #[test]
    fn test_trade_quantity_must_be_positive() {
        let (executor, _) = executor();
        let err = executor
            .execute(
                PARSE_TRADE,
                &json!({ "trade": { "ticker": "VTI", "side": "sell", "quantity": -5, "account": "Brokerage" } }),
            )
            .unwrap_err();
        assert_eq!(err.details, vec!["quantity must be greater than zero".to_string()]);
    }

    #[test]
    fn test_trade_created() {
        let (executor, actions) = executor();
        executor
            .execute(
                PARSE_TRADE,
                &json!({ "trade": { "ticker": "VTI", "side": "BUY", "quantity": "10", "price": "$250", "account": "Brokerage" } }),
            )
            .unwrap();
        let trades = actions.trades();
        assert_eq!(trades[0].side, "buy");
        assert_eq!(trades[0].quantity, 10.0);
        assert_eq!(trades[0].price, Some(250.0));
        assert!(trades[0].date.is_none());
    }

    #[test]
    fn test_payload_must_be_object() {
        let (executor, _) = executor();
        let err = executor
            .execute(PARSE_TRADE, &json!({ "trade": "buy 10 VTI" }))
            .unwrap_err();
        assert_eq!(err.code, ToolErrorCode::ValidationFailed);
    }

    #[test]
    fn test_unknown_tool() {
        let (executor, _) = executor();
        let err = executor.execute("parse_budget", &json!({})).unwrap_err();
        assert_eq!(err.code, ToolErrorCode::ToolNotFound);
        assert_eq!(err.message.as_deref(), Some("Unknown tool: parse_budget"));
    }

    #[test]
    fn test_domain_failure_is_execution_error() {
        let actions = Arc::new(RecordingActions::failing("account 'Nowhere' does not exist"));
        let executor = ParserToolExecutor::new(actions);
        let err = executor
            .execute(
                PARSE_TRADE,
                &json!({ "trade": { "ticker": "VTI", "side": "buy", "quantity": 1, "account": "Nowhere" } }),
            )
            .unwrap_err();
        assert_eq!(err.code, ToolErrorCode::ExecutionFailed);
        let message = err.message.unwrap();
        assert_eq!(message, "parse_trade could not create the trade");
        assert!(!message.contains("Nowhere"));
    }

    #[test]
    fn test_provider_lists_discovered_tools() {
        let provider = ParserToolProvider::new(Arc::new(RecordingActions::default()));
        let tools = provider.list_tools();
        assert_eq!(tools.len(), 3);
        for tool in tools {
            assert_eq!(tool.source, ToolSource::Discovered);
            assert_eq!(tool.minimum_mode, PrivacyMode::Standard);
            assert_eq!(tool.kind, ToolKind::Action);
            assert!(tool.input_schema["properties"]["text"].is_object());
        }
    }
}
