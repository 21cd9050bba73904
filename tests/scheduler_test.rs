//! Cron triggers feeding the run queue.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use leadpress::db::pgmq::RunRequest;
use leadpress::engine::{CronScheduler, RunQueue};
use leadpress::error::{Error, Result};
use leadpress::model::schedule::Schedule;

#[derive(Default)]
struct CountingQueue {
    sent: AtomicI64,
}

#[async_trait]
impl RunQueue for CountingQueue {
    async fn enqueue(&self, _request: RunRequest) -> Result<i64> {
        Ok(self.sent.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn schedule(name: &str, cron: &str, enabled: bool) -> Schedule {
    Schedule {
        id: Uuid::new_v4(),
        name: name.to_string(),
        cron_expression: cron.to_string(),
        enabled,
        last_run: None,
        run_count: 0,
        created_at: Utc::now(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn registers_only_enabled_schedules() {
    let queue = Arc::new(CountingQueue::default());
    let schedules = vec![
        schedule("quarter hour", "0 */15 * * * *", true),
        schedule("paused", "0 0 * * * *", false),
        schedule("nightly", "0 0 3 * * *", true),
    ];

    let scheduler = CronScheduler::start(&schedules, queue).await.unwrap();
    assert_eq!(scheduler.job_count(), 2);
    scheduler.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_cron_is_a_config_error() {
    let queue = Arc::new(CountingQueue::default());
    let schedules = vec![schedule("broken", "every tuesday", true)];

    let err = CronScheduler::start(&schedules, queue).await.err().unwrap();
    assert!(matches!(err, Error::Config(ref m) if m.contains("broken")), "{err:?}");
}

#[test]
fn run_request_payload_shape() {
    let id = Uuid::new_v4();
    let json = serde_json::to_value(RunRequest { schedule_id: Some(id) }).unwrap();
    assert_eq!(json, serde_json::json!({ "schedule_id": id }));

    let manual: RunRequest = serde_json::from_value(serde_json::json!({})).unwrap();
    assert_eq!(manual.schedule_id, None);
}

#[test]
fn run_request_origin_labels() {
    assert_eq!(RunRequest::default().origin(), "manual");
    let scheduled = RunRequest {
        schedule_id: Some(Uuid::new_v4()),
    };
    assert_eq!(scheduled.origin(), "schedule");
}
