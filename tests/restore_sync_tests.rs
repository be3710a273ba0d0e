//! Integration tests for the MySqlRestore sync handler
//!
//! These run the reconciler against in-memory stores and record every write,
//! condition update and event it produces.

mod common;

use common::*;
use kube::ResourceExt;
use mysql_restore_operator::adapters::ObjectStore;
use mysql_restore_operator::crd::{
    ConditionStatus, RestoreCondition, RestoreConditionType, OPERATOR_VERSION,
    OPERATOR_VERSION_LABEL,
};
use mysql_restore_operator::reconcilers::field::FieldErrorKind;
use mysql_restore_operator::reconcilers::restore::{self, SyncOutcome};
use mysql_restore_operator::Error;

// ============================================================================
// Local validation
// ============================================================================

#[test]
fn valid_spec_passes_validation() {
    assert!(restore::validate(&restore("r1", "db1", "b1")).is_none());
}

#[test]
fn missing_names_are_required() {
    let err = restore::validate(&restore("r1", "", "")).expect("validation error");
    assert_eq!(err.errors().len(), 2);
    assert!(err
        .errors()
        .iter()
        .all(|e| e.kind == FieldErrorKind::Required));
    let message = err.to_string();
    assert!(message.contains("spec.cluster.name: Required value"));
    assert!(message.contains("spec.backup.name: Required value"));
}

#[test]
fn malformed_reference_name_is_invalid() {
    let err = restore::validate(&restore("r1", "DB_1", "b1")).expect("validation error");
    assert_eq!(err.errors().len(), 1);
    assert_eq!(err.errors()[0].kind, FieldErrorKind::Invalid);
    assert!(err.to_string().starts_with(r#"spec.cluster.name: Invalid value: "DB_1""#));
}

#[test]
fn malformed_version_label_is_invalid() {
    let mut r = restore("r1", "db1", "b1");
    r.metadata.labels = Some(
        [(OPERATOR_VERSION_LABEL.to_string(), "-bad-".to_string())]
            .into_iter()
            .collect(),
    );
    let err = restore::validate(&r).expect("validation error");
    assert!(err.to_string().contains(OPERATOR_VERSION_LABEL));
}

#[test]
fn dns_subdomain_rules() {
    assert!(restore::is_dns1123_subdomain("db1"));
    assert!(restore::is_dns1123_subdomain("db-1.prod"));
    assert!(!restore::is_dns1123_subdomain("-db"));
    assert!(!restore::is_dns1123_subdomain("db..1"));
    assert!(!restore::is_dns1123_subdomain("Db1"));
    assert!(!restore::is_dns1123_subdomain(&"a".repeat(254)));
}

// ============================================================================
// Reference checks
// ============================================================================

#[tokio::test]
async fn missing_backup_marks_restore_failed() {
    let fx = Fixture::new().with_defaults();
    fx.restores.put(restore("r1", "db1", "missing-backup"));

    let outcome = fx.reconciler().sync("ns/r1").await.unwrap();

    let SyncOutcome::Invalid(err) = outcome else {
        panic!("expected validation failure, got {:?}", outcome);
    };
    assert_eq!(err.errors().len(), 1);
    assert_eq!(err.errors()[0].path.to_string(), "spec.backup.name");
    assert_eq!(err.errors()[0].kind, FieldErrorKind::NotFound);

    let condition = fx.conditions.last().expect("condition update");
    assert_eq!(condition.type_, RestoreConditionType::Failed);
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, "FailedValidation");
    assert!(condition.message.contains("missing-backup"));

    assert_eq!(fx.writer.calls(), 0);

    let events = fx.recorder.all();
    assert_eq!(events.len(), 1);
    assert!(events[0].warning);
    assert_eq!(events[0].reason, "FailedValidation");
    assert!(events[0].note.contains("missing-backup"));
}

#[tokio::test]
async fn both_missing_references_are_reported_together() {
    let fx = Fixture::new();
    fx.restores.put(restore("r1", "nocluster", "nobackup"));

    let outcome = fx.reconciler().sync("ns/r1").await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Invalid(ref e) if e.errors().len() == 2));
    let condition = fx.conditions.last().expect("condition update");
    assert!(condition.message.contains("spec.cluster.name"));
    assert!(condition.message.contains("spec.backup.name"));
    assert_eq!(fx.conditions.calls(), 1);
}

#[tokio::test]
async fn local_validation_failure_skips_reference_lookups() {
    let fx = Fixture::new();
    fx.clusters.fail_with("cluster cache unavailable");
    fx.restores.put(restore("r1", "", "b1"));

    let outcome = fx.reconciler().sync("ns/r1").await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Invalid(_)));
    let condition = fx.conditions.last().unwrap();
    assert!(condition.message.contains("spec.cluster.name: Required value"));
}

#[tokio::test]
async fn reference_lookup_error_is_retryable() {
    let fx = Fixture::new().with_defaults();
    fx.backups.fail_with("backup cache unavailable");
    fx.restores.put(restore("r1", "db1", "b1"));

    let err = fx.reconciler().sync("ns/r1").await.unwrap_err();

    assert!(matches!(err, Error::Store(_)));
    assert_eq!(fx.conditions.calls(), 0);
    assert!(fx.recorder.all().is_empty());
}

#[tokio::test]
async fn failed_condition_write_is_returned() {
    let fx = Fixture::new();
    fx.conditions.fail_all();
    fx.restores.put(restore("r1", "db1", "missing-backup"));

    let err = fx.reconciler().sync("ns/r1").await.unwrap_err();
    assert!(err.is_conflict());
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test]
async fn valid_restore_is_scheduled_on_primary() {
    let fx = Fixture::new().with_defaults();
    fx.pods.put(secondary_pod("pod-1", "db1"));
    fx.restores.put(restore("r2", "db1", "b1"));

    let outcome = fx.reconciler().sync("ns/r2").await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Scheduled {
            member: "pod-0".to_string()
        }
    );
    assert_eq!(fx.writer.calls(), 1);
    let written = fx.writer.last().unwrap();
    assert_eq!(written.spec.scheduled_member, "pod-0");
    assert!(written.is_scheduled());
    assert_eq!(
        written.labels().get(OPERATOR_VERSION_LABEL).map(String::as_str),
        Some(OPERATOR_VERSION)
    );

    let events = fx.recorder.all();
    assert_eq!(events.len(), 1);
    assert!(!events[0].warning);
    assert_eq!(events[0].reason, "SuccessScheduled");
    assert_eq!(events[0].note, r#"Scheduled on Pod "pod-0""#);
    assert_eq!(fx.conditions.calls(), 0);
}

#[tokio::test]
async fn assigned_member_is_kept_when_condition_is_missing() {
    let fx = Fixture::new();
    fx.clusters.put(cluster("db1"));
    fx.backups.put(backup("b1"));
    fx.pods.put(primary_pod("pod-a", "db1"));
    let mut r = restore("r2", "db1", "b1");
    r.spec.scheduled_member = "pod-0".to_string();
    fx.restores.put(r);

    let outcome = fx.reconciler().sync("ns/r2").await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Scheduled {
            member: "pod-0".to_string()
        }
    );
    let written = fx.writer.last().unwrap();
    assert_eq!(written.spec.scheduled_member, "pod-0");
    assert!(written.is_scheduled());
}

#[tokio::test]
async fn cached_object_is_not_mutated() {
    let fx = Fixture::new().with_defaults();
    fx.restores.put(restore("r2", "db1", "b1"));

    fx.reconciler().sync("ns/r2").await.unwrap();

    let cached = fx.restores.get("ns", "r2").unwrap().unwrap();
    assert!(cached.spec.scheduled_member.is_empty());
    assert!(cached.status.is_none());
    assert!(cached.metadata.labels.is_none());
}

#[tokio::test]
async fn no_primary_is_retryable_and_writes_nothing() {
    let fx = Fixture::new();
    fx.clusters.put(cluster("db1"));
    fx.backups.put(backup("b1"));
    fx.pods.put(secondary_pod("pod-1", "db1"));
    fx.restores.put(restore("r2", "db1", "b1"));

    let err = fx.reconciler().sync("ns/r2").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Schedule(ref inner) if matches!(**inner, Error::NoPrimary { .. })
    ));
    assert!(err.to_string().contains("no primaries found"));
    assert_eq!(fx.writer.calls(), 0);
    assert_eq!(fx.conditions.calls(), 0);
    assert!(fx.recorder.all().is_empty());
}

#[tokio::test]
async fn primary_of_another_cluster_is_ignored() {
    let fx = Fixture::new();
    fx.clusters.put(cluster("db1"));
    fx.backups.put(backup("b1"));
    fx.pods.put(primary_pod("other-0", "db2"));
    fx.restores.put(restore("r2", "db1", "b1"));

    assert!(fx.reconciler().sync("ns/r2").await.is_err());
}

#[tokio::test]
async fn several_primaries_pick_lowest_name() {
    let fx = Fixture::new();
    fx.clusters.put(cluster("db1"));
    fx.backups.put(backup("b1"));
    fx.pods.put(primary_pod("pod-2", "db1"));
    fx.pods.put(primary_pod("pod-1", "db1"));
    fx.restores.put(restore("r2", "db1", "b1"));

    let outcome = fx.reconciler().sync("ns/r2").await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Scheduled {
            member: "pod-1".to_string()
        }
    );
}

#[tokio::test]
async fn write_conflict_is_retryable() {
    let fx = Fixture::new().with_defaults();
    fx.writer.conflict_next();
    fx.restores.put(restore("r2", "db1", "b1"));

    let err = fx.reconciler().sync("ns/r2").await.unwrap_err();

    assert!(matches!(err, Error::Update(_)));
    assert!(err.is_conflict());
    assert!(fx.recorder.all().is_empty());

    // The next attempt goes through.
    assert!(fx.reconciler().sync("ns/r2").await.is_ok());
    assert_eq!(fx.writer.calls(), 1);
}

#[tokio::test]
async fn scheduled_restore_is_not_rescheduled() {
    let fx = Fixture::new().with_defaults();
    fx.restores.put(restore("r2", "db1", "b1"));
    let reconciler = fx.reconciler();

    reconciler.sync("ns/r2").await.unwrap();
    // The watch delivers the written object back into the cache.
    fx.restores.put(fx.writer.last().unwrap());
    fx.pods.put(primary_pod("pod-00", "db1"));

    let outcome = reconciler.sync("ns/r2").await.unwrap();

    assert_eq!(outcome, SyncOutcome::AlreadyScheduled);
    assert_eq!(fx.writer.calls(), 1);
    let cached = fx.restores.get("ns", "r2").unwrap().unwrap();
    assert_eq!(cached.spec.scheduled_member, "pod-0");
}

#[tokio::test]
async fn failed_restore_is_terminal() {
    let fx = Fixture::new().with_defaults();
    let mut r = restore("r3", "db1", "b1");
    r.set_condition(RestoreCondition::new(
        RestoreConditionType::Failed,
        ConditionStatus::True,
    ));
    fx.restores.put(r);

    let outcome = fx.reconciler().sync("ns/r3").await.unwrap();

    assert_eq!(outcome, SyncOutcome::Terminal);
    assert_eq!(fx.writer.calls(), 0);
    assert_eq!(fx.conditions.calls(), 0);
}

// ============================================================================
// Fetch
// ============================================================================

#[tokio::test]
async fn missing_restore_is_an_error() {
    // A restore deleted between enqueue and processing surfaces as an error
    // and is retried with backoff.
    let fx = Fixture::new().with_defaults();

    let err = fx.reconciler().sync("ns/gone").await.unwrap_err();
    assert!(matches!(err, Error::RestoreNotFound(ref key) if key == "ns/gone"));
}

#[tokio::test]
async fn malformed_key_is_rejected() {
    let fx = Fixture::new();
    let err = fx.reconciler().sync("a/b/c").await.unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)));
}
