use crate::domain::contract::{Attachments, ReportDraft};
use crate::domain::report::Report;
use crate::storage::reports::ReportStore;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEvent {
    Created(i64),
    Updated(i64),
    Deleted(i64),
}

/// Report collection over a key-value store. Reads fail soft; a mutation loads strictly,
/// rewrites the full collection and then publishes a [`ReportEvent`]. A mutation that cannot
/// read the stored collection fails without writing.
#[derive(Clone)]
pub struct ReportRepository {
    store: ReportStore,
    write_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<ReportEvent>,
}

impl ReportRepository {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: ReportStore::new(kv),
            write_lock: Arc::new(Mutex::new(())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReportEvent> {
        self.events.subscribe()
    }

    pub async fn list(&self) -> Vec<Report> {
        self.store.load().await
    }

    pub async fn find_by_id(&self, id: i64) -> Option<Report> {
        self.store.load().await.into_iter().find(|r| r.id == id)
    }

    pub async fn create(&self, draft: ReportDraft, attachments: Attachments) -> anyhow::Result<Report> {
        self.create_at(draft, attachments, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        draft: ReportDraft,
        attachments: Attachments,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Report> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.store.try_load().await?;

        let id = next_id(snapshot.max_id(), now);
        let report = draft.into_new_report(id, attachments, now);
        snapshot.push(report.clone());
        self.store.save(&snapshot).await?;

        tracing::info!(report_id = id, ticker = %report.ticker, "report created");
        self.publish(ReportEvent::Created(id));
        Ok(report)
    }

    /// `Ok(None)` when no record has `id`; nothing is written in that case.
    pub async fn update(
        &self,
        id: i64,
        draft: ReportDraft,
        attachments: Attachments,
    ) -> anyhow::Result<Option<Report>> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.store.try_load().await?;

        let Some(slot) = snapshot.find_mut(id) else {
            tracing::debug!(report_id = id, "update skipped; report not found");
            return Ok(None);
        };
        let updated = draft.into_updated_report(slot, attachments);
        *slot = updated.clone();
        self.store.save(&snapshot).await?;

        tracing::info!(report_id = id, "report updated");
        self.publish(ReportEvent::Updated(id));
        Ok(Some(updated))
    }

    /// Returns whether a record was removed. The collection is persisted either way.
    pub async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.store.try_load().await?;

        let removed = snapshot.remove(id);
        self.store.save(&snapshot).await?;

        if removed {
            tracing::info!(report_id = id, "report deleted");
            self.publish(ReportEvent::Deleted(id));
        }
        Ok(removed)
    }

    fn publish(&self, event: ReportEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Millisecond timestamp, bumped past the largest existing id if the clock would collide.
fn next_id(max: Option<i64>, now: DateTime<Utc>) -> i64 {
    let candidate = now.timestamp_millis();
    match max {
        Some(max) if max >= candidate => max + 1,
        _ => candidate,
    }
}
