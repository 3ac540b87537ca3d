//! Tool invocation audit operations

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{format_timestamp, parse_datetime, Database, InvocationFilter};
use crate::error::{Error, Result};
use crate::models::{
    InvocationCompletion, InvocationStats, InvocationStatus, NewInvocation, PrivacyMode,
    ToolInvocationRecord,
};

const RECORD_COLUMNS: &str = "id, tool_name, session_id, privacy_mode, argument_shape, \
    argument_hash, status, result_count, error_code, error_message, invoked_at, \
    completed_at, duration_ms";

impl Database {
    /// Record a pending invocation
    pub fn insert_invocation(&self, invocation: &NewInvocation) -> Result<i64> {
        let conn = self.conn()?;
        let shape = serde_json::to_string(&invocation.argument_shape)?;

        conn.execute(
            r#"
            INSERT INTO tool_invocations (
                tool_name, session_id, privacy_mode, argument_shape,
                argument_hash, status, invoked_at
            ) VALUES (?, ?, ?, ?, ?, 'pending', ?)
            "#,
            params![
                invocation.tool_name,
                invocation.session_id,
                invocation.privacy_mode.as_str(),
                shape,
                invocation.argument_hash,
                format_timestamp(&invocation.invoked_at),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Complete a pending invocation
    ///
    /// Returns `false` when no pending row with this id exists (unknown id or
    /// already completed); completed rows are never rewritten.
    pub fn complete_invocation(&self, id: i64, completion: &InvocationCompletion) -> Result<bool> {
        let conn = self.conn()?;

        let updated = conn.execute(
            r#"
            UPDATE tool_invocations
            SET status = ?, result_count = ?, error_code = ?, error_message = ?,
                completed_at = ?, duration_ms = ?
            WHERE id = ? AND status = 'pending'
            "#,
            params![
                completion.status.as_str(),
                completion.result_count,
                completion.error_code,
                completion.error_message,
                format_timestamp(&completion.completed_at),
                completion.duration_ms,
                id,
            ],
        )?;

        Ok(updated == 1)
    }

    /// Get one invocation by id
    pub fn get_invocation(&self, id: i64) -> Result<Option<ToolInvocationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tool_invocations WHERE id = ?",
            RECORD_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], row_to_record)?;
        match rows.next() {
            Some(record) => Ok(Some(record??)),
            None => Ok(None),
        }
    }

    /// List invocations matching a filter (newest first unless ascending)
    pub fn query_invocations(&self, filter: &InvocationFilter) -> Result<Vec<ToolInvocationRecord>> {
        let conn = self.conn()?;
        let built = filter.build();

        let sql = format!(
            "SELECT {} FROM tool_invocations {} {} {}",
            RECORD_COLUMNS, built.where_clause, built.order_clause, built.limit_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = built.params.iter().map(|p| p.as_ref()).collect();

        let records = stmt
            .query_map(params.as_slice(), row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        records.into_iter().collect()
    }

    /// Aggregate statistics over invocations matching a filter
    ///
    /// Limit and ordering on the filter are ignored.
    pub fn invocation_stats(&self, filter: &InvocationFilter) -> Result<InvocationStats> {
        let conn = self.conn()?;
        let built = filter.build();
        let params: Vec<&dyn rusqlite::ToSql> = built.params.iter().map(|p| p.as_ref()).collect();

        let (total, successful, failed, avg_duration): (i64, i64, i64, f64) = conn.query_row(
            &format!(
                r#"
                SELECT
                    COUNT(*) as total,
                    COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0) as successful,
                    COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0) as failed,
                    COALESCE(AVG(duration_ms), 0) as avg_duration
                FROM tool_invocations
                {}
                "#,
                built.where_clause
            ),
            params.as_slice(),
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let by_tool: BTreeMap<String, i64> = {
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT tool_name, COUNT(*) as call_count
                FROM tool_invocations
                {}
                GROUP BY tool_name
                "#,
                built.where_clause
            ))?;
            let result = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
            result
        };

        Ok(InvocationStats {
            total,
            successful,
            failed,
            by_tool,
            avg_duration_ms: avg_duration,
        })
    }

    /// Delete invocations started before `cutoff`; returns rows removed
    pub fn delete_invocations_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM tool_invocations WHERE invoked_at < ?",
            params![format_timestamp(&cutoff)],
        )?;
        Ok(deleted)
    }
}

/// Map a row to a record; enum/JSON decode problems surface as the inner error
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Result<ToolInvocationRecord>> {
    let privacy_mode: String = row.get(3)?;
    let shape: String = row.get(4)?;
    let status: String = row.get(6)?;
    let invoked_at: String = row.get(10)?;
    let completed_at: Option<String> = row.get(11)?;

    let id: i64 = row.get(0)?;
    let tool_name: String = row.get(1)?;
    let session_id: Option<String> = row.get(2)?;
    let argument_hash: String = row.get(5)?;
    let result_count: Option<i64> = row.get(7)?;
    let error_code: Option<String> = row.get(8)?;
    let error_message: Option<String> = row.get(9)?;
    let duration_ms: Option<i64> = row.get(12)?;

    Ok(decode_record(
        id,
        tool_name,
        session_id,
        &privacy_mode,
        &shape,
        argument_hash,
        &status,
        result_count,
        error_code,
        error_message,
        &invoked_at,
        completed_at.as_deref(),
        duration_ms,
    ))
}

#[allow(clippy::too_many_arguments)]
fn decode_record(
    id: i64,
    tool_name: String,
    session_id: Option<String>,
    privacy_mode: &str,
    shape: &str,
    argument_hash: String,
    status: &str,
    result_count: Option<i64>,
    error_code: Option<String>,
    error_message: Option<String>,
    invoked_at: &str,
    completed_at: Option<&str>,
    duration_ms: Option<i64>,
) -> Result<ToolInvocationRecord> {
    let privacy_mode: PrivacyMode = privacy_mode.parse().map_err(Error::InvalidData)?;
    let status: InvocationStatus = status.parse().map_err(Error::InvalidData)?;
    let argument_shape: BTreeMap<String, String> = serde_json::from_str(shape)?;

    Ok(ToolInvocationRecord {
        id,
        tool_name,
        session_id,
        privacy_mode,
        argument_shape,
        argument_hash,
        status,
        result_count,
        error_code,
        error_message,
        invoked_at: parse_datetime(invoked_at),
        completed_at: completed_at.map(parse_datetime),
        duration_ms,
    })
}
