//! End-to-end visit flow tests
//!
//! Drive `AppContext` with an in-memory store, a recording sink and a manual
//! clock so that delivery, batching and grace periods are deterministic.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use visit_notify::app::{AppContext, VisitOutcome};
use visit_notify::clock::ManualClock;
use visit_notify::models::{
    Frequency, GraceContext, PageKind, Schedule, Settings, TargetConfig, TargetId, VisitContext,
};
use visit_notify::notify::{
    MemorySink, NotificationPayload, NotificationSink, SinkError, TemplateKind,
};
use visit_notify::storage::{MemoryStore, SqliteStore};
use visit_notify::visits::{DenyReason, DispatchOutcome};

const START: i64 = 1_700_000_000;

struct Harness {
    app: AppContext,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
}

fn create_harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new(START));
    let app = AppContext::new(
        store.clone(),
        store,
        sink.clone(),
        clock.clone(),
        "Test Site",
        None,
    );
    Harness { app, sink, clock }
}

async fn enable(app: &AppContext, target: TargetId, schedule: Schedule, title: &str) {
    let config = TargetConfig {
        enabled: true,
        schedule,
        title: Some(title.to_string()),
        ..Default::default()
    };
    app.settings()
        .save_target_config(&target, &config)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_on_visit_sends_single_notification() {
    let h = create_harness();
    let post = TargetId::post(12);
    enable(&h.app, post, Schedule::OnVisit, "Hello World").await;

    let ctx = VisitContext::singular(post)
        .with_ip("203.0.113.77")
        .with_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0");
    let outcome = h.app.record_visit(&ctx).await.unwrap();

    assert_eq!(
        outcome,
        VisitOutcome::Recorded {
            dispatch: DispatchOutcome::Sent
        }
    );

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, TemplateKind::Single);
    assert_eq!(sent[0].subject, "[Test Site] New Visitor on Hello World");
    match &sent[0].payload {
        NotificationPayload::Single { record, .. } => {
            assert_eq!(record.timestamp, START);
            assert_eq!(record.anonymized_ip.as_deref(), Some("203.0.113.0"));
        }
        other => panic!("expected a single-visit payload, got {:?}", other),
    }

    // Nothing is left waiting for a digest
    assert!(h.app.batches().is_empty(&post).await.unwrap());
}

#[tokio::test]
async fn test_hourly_digest_in_arrival_order() {
    let h = create_harness();
    let post = TargetId::post(7);
    enable(&h.app, post, Schedule::Hourly, "Pricing").await;

    for agent in ["agent-a", "agent-b", "agent-c"] {
        let ctx = VisitContext::singular(post).with_user_agent(agent);
        let outcome = h.app.record_visit(&ctx).await.unwrap();
        assert!(matches!(
            outcome,
            VisitOutcome::Recorded {
                dispatch: DispatchOutcome::Batched { .. }
            }
        ));
        h.clock.advance(10);
    }
    assert!(h.sink.sent().is_empty());

    let report = h.app.run_tick(Frequency::Hourly).await.unwrap().unwrap();
    assert_eq!(report.notified, 1);

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, TemplateKind::Grouped);
    assert_eq!(sent[0].subject, "[Test Site] Visitor Report for Pricing");
    match &sent[0].payload {
        NotificationPayload::Grouped { records, .. } => {
            let agents: Vec<&str> = records.iter().map(|r| r.user_agent.as_str()).collect();
            assert_eq!(agents, vec!["agent-a", "agent-b", "agent-c"]);
        }
        other => panic!("expected a grouped payload, got {:?}", other),
    }

    // Second tick finds an empty batch and sends nothing
    let report = h.app.run_tick(Frequency::Hourly).await.unwrap().unwrap();
    assert_eq!(report.notified, 0);
    assert_eq!(report.skipped_empty, 1);
    assert_eq!(h.sink.sent().len(), 1);
}

#[tokio::test]
async fn test_daily_tick_ignores_hourly_targets() {
    let h = create_harness();
    let hourly = TargetId::post(1);
    let daily = TargetId::term(2);
    enable(&h.app, hourly, Schedule::Hourly, "Hourly Post").await;
    enable(&h.app, daily, Schedule::Daily, "Daily Category").await;

    h.app
        .record_visit(&VisitContext::singular(hourly))
        .await
        .unwrap();
    let archive = VisitContext {
        page_kind: PageKind::Archive,
        ..VisitContext::singular(daily)
    };
    h.app.record_visit(&archive).await.unwrap();

    let report = h.app.run_tick(Frequency::Daily).await.unwrap().unwrap();
    assert_eq!(report.notified, 1);

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload.target(), &daily);
    assert!(!h.app.batches().is_empty(&hourly).await.unwrap());
}

#[tokio::test]
async fn test_failed_digest_is_retried_next_tick() {
    let h = create_harness();
    let post = TargetId::post(3);
    enable(&h.app, post, Schedule::Hourly, "Retry").await;
    h.app
        .record_visit(&VisitContext::singular(post))
        .await
        .unwrap();

    h.sink.set_failing(true);
    let report = h.app.run_tick(Frequency::Hourly).await.unwrap().unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(h.app.batches().snapshot(&post).await.unwrap().len(), 1);

    h.sink.set_failing(false);
    let report = h.app.run_tick(Frequency::Hourly).await.unwrap().unwrap();
    assert_eq!(report.notified, 1);
    assert!(h.app.batches().is_empty(&post).await.unwrap());
}

#[tokio::test]
async fn test_site_grace_period_suppresses_repeat_visits() {
    let h = create_harness();
    let post = TargetId::post(12);
    let other = TargetId::post(13);
    enable(&h.app, post, Schedule::OnVisit, "Hello").await;
    enable(&h.app, other, Schedule::OnVisit, "Other").await;

    let settings = Settings {
        ip_grace_period: true,
        ip_grace_period_context: Some(GraceContext::Site),
        ip_grace_period_duration: 300,
        ..Default::default()
    };
    h.app.settings().save_settings(&settings).await.unwrap();

    let visit = VisitContext::singular(post).with_ip("198.51.100.23");
    assert!(matches!(
        h.app.record_visit(&visit).await.unwrap(),
        VisitOutcome::Recorded { .. }
    ));

    // Same /24 on another post: site scope still applies
    h.clock.advance(60);
    let repeat = VisitContext::singular(other).with_ip("198.51.100.99");
    assert_eq!(
        h.app.record_visit(&repeat).await.unwrap(),
        VisitOutcome::Denied {
            reason: DenyReason::GracePeriod
        }
    );

    h.clock.set(START + 301);
    assert!(matches!(
        h.app.record_visit(&visit).await.unwrap(),
        VisitOutcome::Recorded { .. }
    ));
    assert_eq!(h.sink.sent().len(), 2);
}

/// Takes a while to deliver, like a slow mail server
#[derive(Default)]
struct SlowSink {
    delivered: AtomicUsize,
}

#[async_trait]
impl NotificationSink for SlowSink {
    async fn send(
        &self,
        _subject: &str,
        _payload: &NotificationPayload,
        _template: TemplateKind,
    ) -> Result<(), SinkError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_visits_from_same_ip_notify_once() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(SlowSink::default());
    let app = Arc::new(AppContext::new(
        store.clone(),
        store,
        sink.clone(),
        Arc::new(ManualClock::new(START)),
        "Test Site",
        None,
    ));

    let post = TargetId::post(12);
    enable(&app, post, Schedule::OnVisit, "Hello").await;
    let settings = Settings {
        ip_grace_period: true,
        ip_grace_period_context: Some(GraceContext::Site),
        ip_grace_period_duration: 300,
        ..Default::default()
    };
    app.settings().save_settings(&settings).await.unwrap();

    let visit = VisitContext::singular(post).with_ip("203.0.113.5");
    let first = tokio::spawn({
        let app = Arc::clone(&app);
        let visit = visit.clone();
        async move { app.record_visit(&visit).await.unwrap() }
    });
    let second = tokio::spawn({
        let app = Arc::clone(&app);
        async move { app.record_visit(&visit).await.unwrap() }
    });
    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    let recorded = outcomes
        .iter()
        .filter(|o| matches!(o, VisitOutcome::Recorded { .. }))
        .count();
    assert_eq!(recorded, 1);
    assert!(outcomes.contains(&VisitOutcome::Denied {
        reason: DenyReason::GracePeriod
    }));
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tick_releases_idle_grace_locks() {
    let h = create_harness();
    let settings = Settings {
        ip_grace_period: true,
        ip_grace_period_context: Some(GraceContext::Post),
        ..Default::default()
    };
    h.app.settings().save_settings(&settings).await.unwrap();

    for id in 1..=4 {
        let post = TargetId::post(id);
        enable(&h.app, post, Schedule::OnVisit, "Post").await;
        h.app
            .record_visit(&VisitContext::singular(post).with_ip("192.0.2.1"))
            .await
            .unwrap();
    }
    assert_eq!(h.app.grace().lock_count(), 4);

    h.app.run_tick(Frequency::Hourly).await.unwrap();
    assert_eq!(h.app.grace().lock_count(), 0);
}

#[tokio::test]
async fn test_post_grace_period_is_per_target() {
    let h = create_harness();
    let first = TargetId::post(20);
    let second = TargetId::post(21);
    enable(&h.app, first, Schedule::OnVisit, "First").await;
    enable(&h.app, second, Schedule::OnVisit, "Second").await;

    let settings = Settings {
        ip_grace_period: true,
        ip_grace_period_context: Some(GraceContext::Post),
        ip_grace_period_duration: 300,
        ..Default::default()
    };
    h.app.settings().save_settings(&settings).await.unwrap();

    let ip = "192.0.2.10";
    h.app
        .record_visit(&VisitContext::singular(first).with_ip(ip))
        .await
        .unwrap();

    assert!(matches!(
        h.app
            .record_visit(&VisitContext::singular(second).with_ip(ip))
            .await
            .unwrap(),
        VisitOutcome::Recorded { .. }
    ));
    assert_eq!(
        h.app
            .record_visit(&VisitContext::singular(first).with_ip(ip))
            .await
            .unwrap(),
        VisitOutcome::Denied {
            reason: DenyReason::GracePeriod
        }
    );
}

#[tokio::test]
async fn test_crawler_is_denied() {
    let h = create_harness();
    let post = TargetId::post(5);
    enable(&h.app, post, Schedule::OnVisit, "Crawled").await;

    let ctx = VisitContext::singular(post).with_user_agent(
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
    );
    assert_eq!(
        h.app.record_visit(&ctx).await.unwrap(),
        VisitOutcome::Denied {
            reason: DenyReason::Crawler
        }
    );
    assert!(h.sink.sent().is_empty());
}

#[tokio::test]
async fn test_admin_context_is_denied() {
    let h = create_harness();
    let post = TargetId::post(5);
    enable(&h.app, post, Schedule::OnVisit, "Admin").await;

    let ctx = VisitContext {
        is_admin_context: true,
        ..VisitContext::singular(post)
    };
    assert_eq!(
        h.app.record_visit(&ctx).await.unwrap(),
        VisitOutcome::Denied {
            reason: DenyReason::AdminContext
        }
    );
}

#[tokio::test]
async fn test_master_switch_disables_everything() {
    let h = create_harness();
    let post = TargetId::post(8);
    enable(&h.app, post, Schedule::Hourly, "Switched").await;
    h.app
        .record_visit(&VisitContext::singular(post))
        .await
        .unwrap();

    let settings = Settings {
        enable_notifications: false,
        ..Default::default()
    };
    h.app.settings().save_settings(&settings).await.unwrap();

    assert_eq!(
        h.app
            .record_visit(&VisitContext::singular(post))
            .await
            .unwrap(),
        VisitOutcome::NotificationsDisabled
    );
    assert!(h.app.run_tick(Frequency::Hourly).await.unwrap().is_none());
    assert!(h.sink.sent().is_empty());
    assert_eq!(h.app.batches().snapshot(&post).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_flow_on_sqlite_store() {
    let store = SqliteStore::new("sqlite::memory:", 1).await.unwrap();
    store.init().await.unwrap();
    let store = Arc::new(store);
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new(START));
    let app = AppContext::new(store.clone(), store, sink.clone(), clock, "Test Site", None);

    let post = TargetId::post(99);
    enable(&app, post, Schedule::Daily, "Archive").await;

    for _ in 0..2 {
        app.record_visit(&VisitContext::singular(post))
            .await
            .unwrap();
    }
    assert_eq!(app.batches().snapshot(&post).await.unwrap().len(), 2);

    let report = app.run_tick(Frequency::Daily).await.unwrap().unwrap();
    assert_eq!(report.notified, 1);
    assert_eq!(sink.sent()[0].payload.visit_count(), 2);
    assert!(app.batches().is_empty(&post).await.unwrap());
}
