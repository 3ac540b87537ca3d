//! Invocation filter builder for constructing dynamic SQL queries
//!
//! Builds the WHERE / ORDER BY / LIMIT components for audit queries so the
//! query and stats paths share one set of conditions.

use chrono::{DateTime, Utc};

use super::format_timestamp;
use crate::models::InvocationStatus;

/// Builder for constructing audit query filters
#[derive(Debug, Clone, Default)]
pub struct InvocationFilter {
    pub tool_name: Option<String>,
    pub session_id: Option<String>,
    pub status: Option<InvocationStatus>,
    /// Inclusive lower bound on `invoked_at`
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `invoked_at`
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    /// Oldest first instead of newest first
    pub ascending: bool,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: &'static str,
    /// LIMIT clause (empty if unlimited)
    pub limit_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl InvocationFilter {
    /// Create a new filter builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set tool name filter
    pub fn tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    /// Set router session filter
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Set status filter
    pub fn status(mut self, status: InvocationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set time range filter (`from` inclusive, `to` exclusive)
    pub fn time_range(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Set maximum number of rows
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return oldest invocations first
    pub fn ascending(mut self, value: bool) -> Self {
        self.ascending = value;
        self
    }

    /// Build the filter components
    pub fn build(&self) -> FilterResult {
        let mut conditions: Vec<&'static str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(name) = &self.tool_name {
            conditions.push("tool_name = ?");
            params.push(Box::new(name.clone()));
        }
        if let Some(session) = &self.session_id {
            conditions.push("session_id = ?");
            params.push(Box::new(session.clone()));
        }
        if let Some(status) = self.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        if let Some(from) = &self.from {
            conditions.push("invoked_at >= ?");
            params.push(Box::new(format_timestamp(from)));
        }
        if let Some(to) = &self.to {
            conditions.push("invoked_at < ?");
            params.push(Box::new(format_timestamp(to)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let order_clause = if self.ascending {
            "ORDER BY invoked_at ASC, id ASC"
        } else {
            "ORDER BY invoked_at DESC, id DESC"
        };

        let limit_clause = match self.limit {
            Some(limit) if limit > 0 => format!("LIMIT {}", limit),
            _ => String::new(),
        };

        FilterResult {
            where_clause,
            order_clause,
            limit_clause,
            params,
        }
    }
}
