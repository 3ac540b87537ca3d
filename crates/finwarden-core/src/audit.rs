//! Audit log of tool invocations
//!
//! Every call through the registry produces one record: written as `pending`
//! before the tool runs and completed once with the outcome. Arguments are
//! reduced to a shape map (argument name -> type tag) and a SHA-256 hash of
//! their canonical serialization, so the trail proves what was asked for
//! without holding any of the values.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{AuditConfig, DEFAULT_RETENTION_DAYS};
use crate::db::{Database, InvocationFilter};
use crate::error::{Error, Result};
use crate::models::{
    InvocationCompletion, InvocationStats, InvocationStatus, NewInvocation, PrivacyMode,
    ToolInvocationRecord,
};

/// Longest error message kept in a record
pub const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Outcome of a call, as recorded on completion
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    Success { result_count: Option<i64> },
    Failure { code: String, message: Option<String> },
}

/// A started invocation awaiting completion
///
/// Consumed by [`AuditLog::complete_invocation`], so each record is
/// completed at most once.
#[derive(Debug)]
pub struct PendingInvocation {
    record: ToolInvocationRecord,
    started: Instant,
}

impl PendingInvocation {
    pub fn record(&self) -> &ToolInvocationRecord {
        &self.record
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }
}

/// Durable store of invocation records
#[derive(Clone)]
pub struct AuditLog {
    db: Database,
    retention_days: u32,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// Open the store described by config, creating its directory
    pub fn open(config: &AuditConfig) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let path = path_str(&config.database_path)?;
        let db = if config.encrypt {
            Database::new(path)?
        } else {
            Database::new_unencrypted(path)?
        };
        Ok(Self::new(db).with_retention_days(config.retention_days))
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Record the start of a call
    pub fn log_invocation(
        &self,
        tool_name: &str,
        session_id: Option<&str>,
        mode: PrivacyMode,
        args: &Value,
    ) -> Result<PendingInvocation> {
        let started = Instant::now();
        let invocation = NewInvocation {
            tool_name: tool_name.to_string(),
            session_id: session_id.map(String::from),
            privacy_mode: mode,
            argument_shape: argument_shape(args),
            argument_hash: argument_hash(args),
            invoked_at: Utc::now(),
        };

        let id = self.db.insert_invocation(&invocation)?;
        debug!("Audit #{} started: {} ({} mode)", id, tool_name, mode);

        Ok(PendingInvocation {
            record: ToolInvocationRecord {
                id,
                tool_name: invocation.tool_name,
                session_id: invocation.session_id,
                privacy_mode: invocation.privacy_mode,
                argument_shape: invocation.argument_shape,
                argument_hash: invocation.argument_hash,
                status: InvocationStatus::Pending,
                result_count: None,
                error_code: None,
                error_message: None,
                invoked_at: invocation.invoked_at,
                completed_at: None,
                duration_ms: None,
            },
            started,
        })
    }

    /// Record the outcome of a call
    pub fn complete_invocation(
        &self,
        pending: PendingInvocation,
        outcome: &InvocationOutcome,
    ) -> Result<ToolInvocationRecord> {
        let PendingInvocation {
            mut record,
            started,
        } = pending;

        // Round up so the recorded duration never undercounts
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_nanos().div_ceil(1_000_000) as i64;
        let completed_at = Utc::now().max(record.invoked_at);

        let completion = match outcome {
            InvocationOutcome::Success { result_count } => InvocationCompletion {
                status: InvocationStatus::Success,
                result_count: *result_count,
                error_code: None,
                error_message: None,
                completed_at,
                duration_ms,
            },
            InvocationOutcome::Failure { code, message } => InvocationCompletion {
                status: InvocationStatus::Error,
                result_count: None,
                error_code: Some(code.clone()),
                error_message: message.as_deref().map(scrub_message),
                completed_at,
                duration_ms,
            },
        };

        if !self.db.complete_invocation(record.id, &completion)? {
            return Err(Error::InvalidData(format!(
                "Invocation {} is not pending",
                record.id
            )));
        }
        debug!(
            "Audit #{} completed: {} in {}ms",
            record.id, completion.status, duration_ms
        );

        record.status = completion.status;
        record.result_count = completion.result_count;
        record.error_code = completion.error_code;
        record.error_message = completion.error_message;
        record.completed_at = Some(completion.completed_at);
        record.duration_ms = Some(completion.duration_ms);
        Ok(record)
    }

    /// Records matching a filter, newest first unless the filter says otherwise
    pub fn query(&self, filter: &InvocationFilter) -> Result<Vec<ToolInvocationRecord>> {
        self.db.query_invocations(filter)
    }

    /// Aggregate statistics, optionally bounded to `[from, to)`
    pub fn stats(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<InvocationStats> {
        let filter = match range {
            Some((from, to)) => InvocationFilter::new().time_range(Some(from), Some(to)),
            None => InvocationFilter::new(),
        };
        self.db.invocation_stats(&filter)
    }

    /// Delete records older than `retention_days`; returns the count removed
    pub fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let removed = self.db.delete_invocations_before(cutoff)?;
        if removed > 0 {
            info!(
                "Audit cleanup removed {} records older than {} days",
                removed, retention_days
            );
        }
        Ok(removed)
    }

    /// Cleanup using the configured retention window
    pub fn cleanup_with_config(&self) -> Result<usize> {
        self.cleanup(self.retention_days)
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Config(format!("Audit path is not valid UTF-8: {}", path.display())))
}

/// Argument name -> coarse type tag
///
/// Non-object arguments are recorded under `$value`; `null` has no shape.
pub fn argument_shape(args: &Value) -> BTreeMap<String, String> {
    match args {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), type_tag(v).to_string()))
            .collect(),
        Value::Null => BTreeMap::new(),
        other => BTreeMap::from([("$value".to_string(), type_tag(other).to_string())]),
    }
}

fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// SHA-256 (hex) of the canonical argument serialization
///
/// `serde_json::Map` is a `BTreeMap` unless the `preserve_order` feature is
/// enabled, so compact serialization already sorts keys at every level.
pub fn argument_hash(args: &Value) -> String {
    let canonical = serde_json::to_vec(args).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

/// Truncate and mask digit runs so amounts and account numbers in error
/// text do not land in the trail
pub fn scrub_message(message: &str) -> String {
    let mut scrubbed = String::with_capacity(message.len().min(MAX_ERROR_MESSAGE_CHARS));
    let mut in_digits = false;
    for c in message.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                scrubbed.push('#');
            }
            in_digits = true;
        } else {
            scrubbed.push(c);
            in_digits = false;
        }
    }
    scrubbed.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}
