//! finwarden Core Library
//!
//! Privacy boundary between personal finance data and an AI agent:
//! - Privacy modes and the per-mode result filter
//! - Anonymizer for non-identifying projections of accounts and transactions
//! - Tool registry merging static, discovered and runtime tools
//! - Keyword search over the tool catalog
//! - Two-phase parser tools for agent-driven data entry
//! - Encrypted audit log of every tool invocation

pub mod anonymizer;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod parser_tools;
pub mod privacy;
pub mod provider;
pub mod registry;
pub mod search;
pub mod tools;

/// Test utilities: mock data provider and recording domain actions
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use anonymizer::{anonymize, value_to_tier, AnonymizedView, ValueTier};
pub use audit::{AuditLog, InvocationOutcome, PendingInvocation};
pub use config::{AuditConfig, Config, PrivacyConfig, PrivacySettings, UnclassifiedPolicy};
pub use db::{Database, InvocationFilter};
pub use error::{Error, Result, ToolError, ToolErrorCode};
pub use models::{
    Account, FinancialSummary, Holding, InvocationStats, InvocationStatus, PrivacyMode, ToolKind,
    ToolInvocationRecord, ToolSource, Transaction,
};
pub use parser_tools::{
    ParsedAccount, ParsedTrade, ParsedTransaction, ParserToolExecutor, ParserToolProvider,
};
pub use privacy::{classify_tool, mode_allows, PrivacyFilter};
pub use provider::{DomainActions, FinanceDataProvider, TransactionQuery};
pub use registry::{
    ToolAttributes, ToolDescriptor, ToolExecutor, ToolHandler, ToolProvider, ToolRegistry,
    ToolRegistryBuilder,
};
pub use search::{ToolMatch, ToolSearch};
pub use tools::StaticToolProvider;
