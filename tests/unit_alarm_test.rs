// tests/unit_alarm_test.rs

use async_trait::async_trait;
use loglens::core::alarm::engine::{AlarmEngine, EvaluationOutcome};
use loglens::core::alarm::notifier::Notifier;
use loglens::core::alarm::{Alarm, AlarmStore, ChannelType, NotificationChannel};
use loglens::core::cache::SearchCache;
use loglens::core::events::RecordEventBus;
use loglens::core::index::bucket::BucketType;
use loglens::core::index::fields::FieldRegistry;
use loglens::core::index::{IndexOptions, PartitionedIndex};
use loglens::core::model::{LogLevel, LogRecord};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct CountingNotifier {
    deliveries: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send(&self, _channel: &NotificationChannel, subject: &str, body: &str) -> bool {
        self.deliveries
            .lock()
            .push((subject.to_string(), body.to_string()));
        true
    }
}

fn setup(dir: &TempDir) -> (Arc<AlarmEngine>, Arc<CountingNotifier>, Arc<PartitionedIndex>) {
    let index = Arc::new(
        PartitionedIndex::open(
            IndexOptions {
                base_dir: dir.path().to_path_buf(),
                partitioning_enabled: true,
                bucket_type: BucketType::Daily,
                max_active_partitions: 7,
                auto_archive: false,
            },
            Arc::new(FieldRegistry::default()),
            Arc::new(SearchCache::new(100, 300_000, false)),
            Arc::new(RecordEventBus::new()),
            None,
        )
        .unwrap(),
    );
    let notifier = Arc::new(CountingNotifier::default());
    let engine = Arc::new(AlarmEngine::new(
        Arc::new(AlarmStore::new()),
        index.clone(),
        notifier.clone(),
    ));
    (engine, notifier, index)
}

fn slack() -> NotificationChannel {
    NotificationChannel {
        channel_type: ChannelType::Slack,
        destination: "http://slack-hook".into(),
    }
}

fn error_records(n: usize) -> Vec<LogRecord> {
    (0..n)
        .map(|i| {
            let mut record =
                LogRecord::new(format!("ERROR case {i}"), "app.log", format!("raw ERROR {i}"));
            record.level = LogLevel::Error;
            record
        })
        .collect()
}

#[tokio::test]
async fn test_throttle_two_delivered_one_suppressed() {
    let dir = TempDir::new().unwrap();
    let (engine, notifier, index) = setup(&dir);
    index.index_all(error_records(5)).unwrap();

    let mut alarm = Alarm::new("errors", "ERROR", "count > 0", 0, 1);
    alarm.throttle_window_minutes = Some(10);
    alarm.max_notifications_per_window = 2;
    alarm.channels = vec![slack()];
    let alarm = engine.store().create(alarm).unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(engine.evaluate(alarm.clone()).await.unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            EvaluationOutcome::Delivered,
            EvaluationOutcome::Delivered,
            EvaluationOutcome::Throttled,
        ]
    );
    assert_eq!(notifier.deliveries.lock().len(), 2);
}

#[tokio::test]
async fn test_grouping_combines_two_alarms() {
    let dir = TempDir::new().unwrap();
    let (engine, notifier, index) = setup(&dir);
    index.index_all(error_records(1)).unwrap();

    for name in ["svcA latency", "svcA failures"] {
        let mut alarm = Alarm::new(name, "ERROR", "count > 0", 0, 5);
        alarm.grouping_key = Some("svcA".into());
        alarm.grouping_window_minutes = Some(0);
        alarm.channels = vec![slack()];
        let alarm = engine.store().create(alarm).unwrap();
        assert_eq!(
            engine.evaluate(alarm).await.unwrap(),
            EvaluationOutcome::Grouped
        );
    }

    engine.process_groups().await;

    let deliveries = notifier.deliveries.lock();
    assert_eq!(deliveries.len(), 1, "union of identical channels dedups");
    let (subject, body) = &deliveries[0];
    assert!(subject.contains("svcA"));
    assert!(body.contains("svcA latency"));
    assert!(body.contains("svcA failures"));
    drop(deliveries);

    for alarm in engine.store().list() {
        assert_eq!(engine.history_len(&alarm.id), 1);
    }
}

#[tokio::test]
async fn test_grouped_alarm_never_uses_direct_path() {
    let dir = TempDir::new().unwrap();
    let (engine, notifier, index) = setup(&dir);
    index.index_all(error_records(1)).unwrap();

    let mut alarm = Alarm::new("grouped-only", "ERROR", "count > 0", 0, 5);
    alarm.grouping_key = Some("svcB".into());
    alarm.channels = vec![slack()];
    let alarm = engine.store().create(alarm).unwrap();

    for _ in 0..3 {
        let outcome = engine.evaluate(alarm.clone()).await.unwrap();
        assert_eq!(outcome, EvaluationOutcome::Grouped);
    }
    assert!(notifier.deliveries.lock().is_empty());
    assert_eq!(engine.pending_group_len("svcB"), 3);
}

#[tokio::test]
async fn test_condition_operators() {
    let dir = TempDir::new().unwrap();
    let (engine, _notifier, index) = setup(&dir);
    index.index_all(error_records(3)).unwrap();

    let eq = Alarm::new("exactly-three", "ERROR", "count ==", 3, 5);
    let eq = engine.store().create(eq).unwrap();
    assert_eq!(
        engine.evaluate(eq).await.unwrap(),
        EvaluationOutcome::Delivered
    );

    let lt = Alarm::new("fewer-than-two", "ERROR", "count <", 2, 5);
    let lt = engine.store().create(lt).unwrap();
    assert_eq!(
        engine.evaluate(lt).await.unwrap(),
        EvaluationOutcome::NotTriggered
    );
}

#[tokio::test]
async fn test_evaluate_all_isolates_alarms() {
    let dir = TempDir::new().unwrap();
    let (engine, notifier, index) = setup(&dir);
    index.index_all(error_records(1)).unwrap();

    engine
        .store()
        .create(Alarm::new("broken", "ERROR", "count between", 0, 5))
        .unwrap();
    let mut ok = Alarm::new("working", "ERROR", "count > 0", 0, 5);
    ok.channels = vec![slack()];
    engine.store().create(ok).unwrap();

    engine.evaluate_all().await;
    assert_eq!(notifier.deliveries.lock().len(), 1);
}
