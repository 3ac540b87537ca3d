//! Database tests

use super::*;
use crate::models::*;

use chrono::Duration;
use std::collections::BTreeMap;

fn new_invocation(tool: &str, invoked_at: DateTime<Utc>) -> NewInvocation {
    NewInvocation {
        tool_name: tool.to_string(),
        session_id: Some("session-1".to_string()),
        privacy_mode: PrivacyMode::Anonymized,
        argument_shape: BTreeMap::from([("period".to_string(), "string".to_string())]),
        argument_hash: "ab".repeat(32),
        invoked_at,
    }
}

fn completion(status: InvocationStatus, invoked_at: DateTime<Utc>) -> InvocationCompletion {
    InvocationCompletion {
        status,
        result_count: Some(3),
        error_code: None,
        error_message: None,
        completed_at: invoked_at + Duration::milliseconds(12),
        duration_ms: 12,
    }
}

#[test]
fn test_in_memory_db() {
    let db = Database::in_memory().unwrap();
    let records = db.query_invocations(&InvocationFilter::new()).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_migrations_are_idempotent() {
    let db = Database::in_memory().unwrap();
    db.run_migrations().unwrap();
    db.run_migrations().unwrap();
}

#[test]
fn test_insert_and_get_invocation() {
    let db = Database::in_memory().unwrap();
    let now = Utc::now();
    let id = db.insert_invocation(&new_invocation("get_accounts", now)).unwrap();
    assert!(id > 0);

    let record = db.get_invocation(id).unwrap().unwrap();
    assert_eq!(record.tool_name, "get_accounts");
    assert_eq!(record.status, InvocationStatus::Pending);
    assert_eq!(record.privacy_mode, PrivacyMode::Anonymized);
    assert_eq!(record.argument_shape["period"], "string");
    assert_eq!(record.session_id.as_deref(), Some("session-1"));
    assert!(record.completed_at.is_none());
    // Millisecond precision survives the round trip
    assert_eq!(record.invoked_at.timestamp_millis(), now.timestamp_millis());

    assert!(db.get_invocation(id + 100).unwrap().is_none());
}

#[test]
fn test_complete_only_once() {
    let db = Database::in_memory().unwrap();
    let now = Utc::now();
    let id = db.insert_invocation(&new_invocation("get_accounts", now)).unwrap();

    assert!(db
        .complete_invocation(id, &completion(InvocationStatus::Success, now))
        .unwrap());
    // Second completion is refused
    assert!(!db
        .complete_invocation(id, &completion(InvocationStatus::Error, now))
        .unwrap());

    let record = db.get_invocation(id).unwrap().unwrap();
    assert_eq!(record.status, InvocationStatus::Success);
    assert_eq!(record.result_count, Some(3));
    assert_eq!(record.duration_ms, Some(12));
    assert!(record.completed_at.unwrap() >= record.invoked_at);
}

#[test]
fn test_complete_unknown_id() {
    let db = Database::in_memory().unwrap();
    assert!(!db
        .complete_invocation(42, &completion(InvocationStatus::Success, Utc::now()))
        .unwrap());
}

#[test]
fn test_query_filters_and_order() {
    let db = Database::in_memory().unwrap();
    let base = Utc::now() - Duration::hours(1);
    for (i, tool) in ["get_accounts", "get_transactions", "get_accounts"]
        .iter()
        .enumerate()
    {
        db.insert_invocation(&new_invocation(tool, base + Duration::minutes(i as i64)))
            .unwrap();
    }

    let all = db.query_invocations(&InvocationFilter::new()).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[0].invoked_at >= all[1].invoked_at);

    let accounts = db
        .query_invocations(&InvocationFilter::new().tool_name("get_accounts"))
        .unwrap();
    assert_eq!(accounts.len(), 2);

    let oldest = db
        .query_invocations(&InvocationFilter::new().ascending(true).limit(1))
        .unwrap();
    assert_eq!(oldest.len(), 1);
    assert_eq!(oldest[0].tool_name, "get_accounts");
    assert_eq!(oldest[0].invoked_at.timestamp_millis(), base.timestamp_millis());

    let pending = db
        .query_invocations(&InvocationFilter::new().status(InvocationStatus::Pending))
        .unwrap();
    assert_eq!(pending.len(), 3);

    let other_session = db
        .query_invocations(&InvocationFilter::new().session_id("session-2"))
        .unwrap();
    assert!(other_session.is_empty());
}

#[test]
fn test_query_time_range() {
    let db = Database::in_memory().unwrap();
    let now = Utc::now();
    db.insert_invocation(&new_invocation("old", now - Duration::days(10)))
        .unwrap();
    db.insert_invocation(&new_invocation("recent", now - Duration::hours(1)))
        .unwrap();

    let recent = db
        .query_invocations(
            &InvocationFilter::new().time_range(Some(now - Duration::days(1)), Some(now)),
        )
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].tool_name, "recent");
}

#[test]
fn test_invocation_stats() {
    let db = Database::in_memory().unwrap();
    let now = Utc::now();

    let ok = db.insert_invocation(&new_invocation("get_accounts", now)).unwrap();
    db.complete_invocation(ok, &completion(InvocationStatus::Success, now))
        .unwrap();

    let failed = db.insert_invocation(&new_invocation("get_transactions", now)).unwrap();
    let mut error = completion(InvocationStatus::Error, now);
    error.duration_ms = 30;
    error.error_code = Some("execution_failed".to_string());
    db.complete_invocation(failed, &error).unwrap();

    db.insert_invocation(&new_invocation("get_accounts", now)).unwrap();

    let stats = db.invocation_stats(&InvocationFilter::new()).unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.by_tool["get_accounts"], 2);
    assert_eq!(stats.by_tool["get_transactions"], 1);
    // Pending rows have no duration and do not count toward the average
    assert!((stats.avg_duration_ms - 21.0).abs() < f64::EPSILON);
}

#[test]
fn test_stats_empty() {
    let db = Database::in_memory().unwrap();
    let stats = db.invocation_stats(&InvocationFilter::new()).unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.successful, 0);
    assert!(stats.by_tool.is_empty());
    assert_eq!(stats.avg_duration_ms, 0.0);
}

#[test]
fn test_delete_before_cutoff() {
    let db = Database::in_memory().unwrap();
    let now = Utc::now();
    db.insert_invocation(&new_invocation("old", now - Duration::days(100)))
        .unwrap();
    db.insert_invocation(&new_invocation("fresh", now - Duration::days(1)))
        .unwrap();

    let removed = db
        .delete_invocations_before(now - Duration::days(90))
        .unwrap();
    assert_eq!(removed, 1);

    let remaining = db.query_invocations(&InvocationFilter::new()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].tool_name, "fresh");
}

#[test]
fn test_encrypted_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.db");
    let path = path.to_string_lossy();

    let db = Database::new_with_key(&path, Some("correct horse")).unwrap();
    db.insert_invocation(&new_invocation("get_accounts", Utc::now()))
        .unwrap();
    drop(db);

    let reopened = Database::new_with_key(&path, Some("correct horse")).unwrap();
    assert_eq!(
        reopened
            .query_invocations(&InvocationFilter::new())
            .unwrap()
            .len(),
        1
    );

    assert!(Database::new_with_key(&path, Some("wrong passphrase")).is_err());
}

#[test]
fn test_parse_datetime_formats() {
    let dt = parse_datetime("2024-05-01 12:30:45.123");
    assert_eq!(dt.timestamp_millis() % 1000, 123);
    let dt = parse_datetime("2024-05-01 12:30:45");
    assert_eq!(format_timestamp(&dt), "2024-05-01 12:30:45.000");
}

#[test]
fn test_derive_key_is_stable() {
    let a = derive_key("passphrase").unwrap();
    let b = derive_key("passphrase").unwrap();
    let c = derive_key("other").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
}
