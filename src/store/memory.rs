//! In-process store for tests and dry runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ExecutionStore, ScheduleStore, WorkItemPatch, WorkStore};
use crate::error::{Error, Result};
use crate::model::execution::{
    ExecutionEntry, ExecutionFinish, ExecutionLog, ExecutionStatus,
};
use crate::model::schedule::{NewSchedule, Schedule};
use crate::model::work::{Checkpoint, NewWorkItem, Status, WorkId, WorkItem};

/// All three store traits over plain maps behind one async mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    items: HashMap<WorkId, WorkItem>,
    /// Insertion order; breaks ties between equal timestamps.
    order: Vec<WorkId>,
    checkpoint_writes: HashMap<WorkId, Vec<Checkpoint>>,
    executions: HashMap<Uuid, ExecutionLog>,
    schedules: HashMap<Uuid, Schedule>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every checkpoint value written for an item, in write order.
    pub async fn checkpoint_writes(&self, id: WorkId) -> Vec<Checkpoint> {
        let inner = self.inner.lock().await;
        inner.checkpoint_writes.get(&id).cloned().unwrap_or_default()
    }

    pub async fn delete_schedule(&self, id: Uuid) -> bool {
        self.inner.lock().await.schedules.remove(&id).is_some()
    }

    pub async fn get_schedule(&self, id: Uuid) -> Option<Schedule> {
        self.inner.lock().await.schedules.get(&id).cloned()
    }

    /// Execution logs for one item, oldest first.
    pub async fn executions_for(&self, work_item_id: WorkId) -> Vec<ExecutionLog> {
        let inner = self.inner.lock().await;
        let mut logs: Vec<ExecutionLog> = inner
            .executions
            .values()
            .filter(|log| log.work_item_id == work_item_id)
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.started_at);
        logs
    }

    pub async fn all_items(&self) -> Vec<WorkItem> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl WorkStore for MemoryStore {
    async fn create_work_item(&self, new: NewWorkItem) -> Result<WorkItem> {
        let item = new.into_work_item(Utc::now());
        let mut inner = self.inner.lock().await;
        inner.order.push(item.id);
        inner.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_work_item(&self, id: WorkId) -> Result<WorkItem> {
        let inner = self.inner.lock().await;
        inner
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("work item {id}")))
    }

    async fn update_work_item(&self, id: WorkId, patch: WorkItemPatch) -> Result<WorkItem> {
        let mut inner = self.inner.lock().await;
        let item = inner
            .items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("work item {id}")))?;
        patch.apply_to(item, Utc::now());
        let updated = item.clone();
        if let Some(checkpoint) = patch.checkpoint {
            inner.checkpoint_writes.entry(id).or_default().push(checkpoint);
        }
        Ok(updated)
    }

    async fn find_eligible(&self, statuses: &[Status], limit: i64) -> Result<Vec<WorkItem>> {
        let inner = self.inner.lock().await;
        let mut matches: Vec<WorkItem> = inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id))
            .filter(|item| statuses.contains(&item.status) && item.content_id.is_none())
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        matches.truncate(limit.max(0) as usize);
        Ok(matches)
    }

    async fn find_retriable(&self) -> Result<Vec<WorkItem>> {
        let inner = self.inner.lock().await;
        let mut failed: Vec<WorkItem> = inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id))
            .filter(|item| item.status == Status::Failed && item.retry.can_retry)
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.retry.failed_at.cmp(&a.retry.failed_at));
        Ok(failed)
    }

    async fn find_by_image_task(&self, task_id: &str) -> Result<Option<WorkItem>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .items
            .values()
            .find(|item| item.image_task_id.as_deref() == Some(task_id))
            .cloned())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_execution(
        &self,
        schedule_id: Option<Uuid>,
        work_item_id: WorkId,
    ) -> Result<ExecutionLog> {
        let log = ExecutionLog {
            id: Uuid::new_v4(),
            schedule_id,
            work_item_id,
            status: ExecutionStatus::Running,
            entries: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            content_id: None,
            published_url: None,
            error: None,
            failed_stage: None,
        };
        self.inner
            .lock()
            .await
            .executions
            .insert(log.id, log.clone());
        Ok(log)
    }

    async fn append_execution_entry(&self, id: Uuid, entry: ExecutionEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let log = running_execution(&mut inner, id, "running")?;
        log.entries.push(entry);
        Ok(())
    }

    async fn finish_execution(&self, id: Uuid, finish: ExecutionFinish) -> Result<ExecutionLog> {
        let mut inner = self.inner.lock().await;
        let log = running_execution(&mut inner, id, finish.status.as_str())?;
        log.status = finish.status;
        log.finished_at = Some(Utc::now());
        log.duration_ms = Some(finish.duration_ms);
        log.content_id = finish.content_id;
        log.published_url = finish.published_url;
        log.error = finish.error;
        log.failed_stage = finish.failed_stage;
        Ok(log.clone())
    }

    async fn get_execution(&self, id: Uuid) -> Result<ExecutionLog> {
        let inner = self.inner.lock().await;
        inner
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("execution log {id}")))
    }
}

/// Look up a log that may still be written to.
fn running_execution<'a>(
    inner: &'a mut Inner,
    id: Uuid,
    to: &str,
) -> Result<&'a mut ExecutionLog> {
    let log = inner
        .executions
        .get_mut(&id)
        .ok_or_else(|| Error::NotFound(format!("execution log {id}")))?;
    if log.status.is_terminal() {
        return Err(Error::InvalidTransition {
            from: log.status.to_string(),
            to: to.to_string(),
        });
    }
    Ok(log)
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule> {
        let schedule = Schedule {
            id: Uuid::new_v4(),
            name: new.name,
            cron_expression: new.cron_expression,
            enabled: true,
            last_run: None,
            run_count: 0,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .await
            .schedules
            .insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn record_schedule_run(&self, id: Uuid) -> Result<Option<Schedule>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.schedules.get_mut(&id).map(|schedule| {
            schedule.last_run = Some(Utc::now());
            schedule.run_count += 1;
            schedule.clone()
        }))
    }

    async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>> {
        let inner = self.inner.lock().await;
        let mut schedules: Vec<Schedule> = inner
            .schedules
            .values()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.created_at);
        Ok(schedules)
    }
}
