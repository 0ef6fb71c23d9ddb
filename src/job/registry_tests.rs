use super::*;
use crate::domain::{JobPhase, ProgressKind};
use std::path::Path;

fn registry() -> JobRegistry {
    JobRegistry::new(RegistryConfig::default())
}

fn age(entry: &JobEntry, hours: i64) {
    entry.update(|job| job.updated_at = Utc::now() - TimeDelta::hours(hours));
}

#[test]
fn test_create_inserts_idle_job() {
    let registry = registry();
    let entry = registry.create(PathBuf::from("/tmp/p"), "");
    let job = entry.snapshot();
    assert_eq!(job.phase, JobPhase::Idle);
    assert_eq!(job.id.len(), 12);
    assert_eq!(registry.len(), 1);
    assert!(registry.get(entry.id()).is_ok());
}

#[test]
fn test_get_unknown_is_not_found() {
    let registry = registry();
    let err = registry.get("nope").err().unwrap();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
}

#[test]
fn test_create_or_reuse_matches_session_and_project() {
    let registry = registry();
    let first = registry.create_or_reuse(PathBuf::from("/tmp/p"), Some("sess-1"));
    let again = registry.create_or_reuse(PathBuf::from("/tmp/p"), Some("sess-1"));
    assert_eq!(first.id(), again.id());

    let other_project = registry.create_or_reuse(PathBuf::from("/tmp/q"), Some("sess-1"));
    assert_ne!(first.id(), other_project.id());

    let no_session = registry.create_or_reuse(PathBuf::from("/tmp/p"), None);
    assert_ne!(first.id(), no_session.id());
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_create_or_reuse_skips_busy_job() {
    let registry = registry();
    let first = registry.create_or_reuse(PathBuf::from("/tmp/p"), Some("sess-1"));
    first.update(|job| job.begin_ask()).unwrap();

    let second = registry.create_or_reuse(PathBuf::from("/tmp/p"), Some("sess-1"));
    assert_ne!(first.id(), second.id());
    assert_eq!(second.snapshot().session_id, "sess-1");
}

#[test]
fn test_expired_job_is_purged_on_access() {
    let registry = registry();
    let entry = registry.create(PathBuf::from("/tmp/p"), "");
    age(&entry, 2);

    assert!(registry.get(entry.id()).is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_in_flight_job_is_never_expired() {
    let registry = registry();
    let entry = registry.create(PathBuf::from("/tmp/p"), "");
    entry.update(|job| job.begin_plan()).unwrap();
    age(&entry, 5);

    assert_eq!(registry.sweep(), 0);
    assert!(registry.get(entry.id()).is_ok());

    // Once the terminal event is recorded the job becomes eligible.
    entry.update(|job| job.fail_with_event("boom")).unwrap();
    age(&entry, 5);
    assert_eq!(registry.sweep(), 1);
    assert!(registry.get(entry.id()).is_err());
}

#[test]
fn test_sweep_keeps_recent_jobs() {
    let registry = registry();
    let old = registry.create(PathBuf::from("/tmp/a"), "");
    let fresh = registry.create(PathBuf::from("/tmp/b"), "");
    age(&old, 3);

    assert_eq!(registry.sweep(), 1);
    assert_eq!(registry.len(), 1);
    assert!(registry.get(fresh.id()).is_ok());
}

#[test]
fn test_capacity_evicts_oldest_settled() {
    let registry = JobRegistry::new(RegistryConfig {
        max_jobs: 2,
        ..RegistryConfig::default()
    });
    let busy = registry.create(PathBuf::from("/tmp/a"), "");
    busy.update(|job| job.begin_ask()).unwrap();
    age(&busy, 1);
    let settled = registry.create(PathBuf::from("/tmp/b"), "");
    let newest = registry.create(PathBuf::from("/tmp/c"), "");

    assert_eq!(registry.len(), 2);
    assert!(registry.get(busy.id()).is_ok());
    assert!(registry.get(settled.id()).is_err());
    assert!(registry.get(newest.id()).is_ok());
}

#[test]
fn test_find_by_plan_id() {
    let registry = registry();
    let entry = registry.create(PathBuf::from("/tmp/p"), "");
    let plan_id = entry
        .update(|job| {
            job.begin_plan()?;
            job.complete_plan("plan".to_string(), None)
        })
        .unwrap();

    let found = registry.find_by_plan_id(&plan_id).unwrap();
    assert_eq!(found.id(), entry.id());
    assert!(matches!(
        registry.find_by_plan_id("missing"),
        Err(OrchestratorError::NotFound(_))
    ));
}

#[test]
fn test_update_bumps_generation() {
    let registry = registry();
    let entry = registry.create(PathBuf::from("/tmp/p"), "");
    let mut generation = entry.watch();
    generation.borrow_and_update();
    entry.update(|job| job.push_event(ProgressKind::Log, "x"));
    assert!(generation.has_changed().unwrap());
    assert_eq!(entry.status().event_count, 1);
}

#[tokio::test]
async fn test_subscription_sees_only_new_events() {
    let registry = registry();
    let entry = registry.create(PathBuf::from("/tmp/p"), "");
    entry.update(|job| job.begin_ask()).unwrap();
    entry.update(|job| job.push_event(ProgressKind::Log, "before"));

    let mut sub = entry.subscribe();
    let writer = entry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.update(|job| job.push_event(ProgressKind::Log, "after"));
        writer
            .update(|job| job.complete_ask("answer".to_string(), None))
            .unwrap();
    });

    let first = sub.next().await.unwrap();
    assert_eq!(first.text, "after");
    assert_eq!(first.seq, 1);
    let done = sub.next().await.unwrap();
    assert_eq!(done.kind, ProgressKind::Done);
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn test_subscription_follows_new_turn() {
    let registry = registry();
    let entry = registry.create(PathBuf::from("/tmp/p"), "");
    entry.update(|job| job.begin_ask()).unwrap();
    entry.update(|job| job.fail_with_event("boom")).unwrap();

    let mut sub = entry.subscribe();
    entry.update(|job| job.begin_ask()).unwrap();
    entry
        .update(|job| job.complete_ask("ok".to_string(), None))
        .unwrap();

    let event = sub.next().await.unwrap();
    assert_eq!(event.seq, 0);
    assert_eq!(event.text, "Ask completed");
}

#[tokio::test]
async fn test_subscription_ends_when_job_evicted() {
    let registry = registry();
    let entry = registry.create(PathBuf::from("/tmp/p"), "");
    let mut sub = entry.subscribe();
    age(&entry, 2);
    assert_eq!(registry.sweep(), 1);
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn test_sweeper_runs_and_stops() {
    let registry = Arc::new(JobRegistry::new(RegistryConfig {
        retention: Duration::from_secs(60),
        max_jobs: 16,
    }));
    let entry = registry.create(Path::new("/tmp/p").to_path_buf(), "");
    age(&entry, 1);

    let sweeper = registry.spawn_sweeper(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.is_empty());

    tokio::time::timeout(Duration::from_secs(1), sweeper.shutdown())
        .await
        .unwrap();
}
