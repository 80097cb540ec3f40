use crate::domain::report::Report;
use crate::storage::kv::KeyValueStore;
use crate::storage::REPORTS_KEY;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Entry {
    Report(Report),
    /// A stored record that no longer decodes, written back exactly as it was read.
    Unreadable(Value),
}

impl Entry {
    fn id(&self) -> Option<i64> {
        match self {
            Entry::Report(r) => Some(r.id),
            Entry::Unreadable(v) => v.get("id").and_then(Value::as_i64),
        }
    }
}

/// The stored collection as read for a rewrite. Records that fail to decode are carried along
/// in place so saving the snapshot never drops them.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<Entry>,
}

impl Snapshot {
    pub fn reports(&self) -> impl Iterator<Item = &Report> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Report(r) => Some(r),
            Entry::Unreadable(_) => None,
        })
    }

    pub fn into_reports(self) -> Vec<Report> {
        self.entries
            .into_iter()
            .filter_map(|e| match e {
                Entry::Report(r) => Some(r),
                Entry::Unreadable(_) => None,
            })
            .collect()
    }

    pub fn find_mut(&mut self, id: i64) -> Option<&mut Report> {
        self.entries.iter_mut().find_map(|e| match e {
            Entry::Report(r) if r.id == id => Some(r),
            _ => None,
        })
    }

    pub fn push(&mut self, report: Report) {
        self.entries.push(Entry::Report(report));
    }

    /// Drops every entry carrying `id`, undecodable ones included.
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id() != Some(id));
        self.entries.len() != before
    }

    /// Largest id in the collection, counting undecodable records that still carry one.
    pub fn max_id(&self) -> Option<i64> {
        self.entries.iter().filter_map(Entry::id).max()
    }

    pub fn unreadable(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Unreadable(_)))
            .count()
    }
}

impl From<Vec<Report>> for Snapshot {
    fn from(reports: Vec<Report>) -> Self {
        Self {
            entries: reports.into_iter().map(Entry::Report).collect(),
        }
    }
}

fn decode(raw: &str) -> anyhow::Result<Snapshot> {
    let values: Vec<Value> =
        serde_json::from_str(raw).context("stored report collection is not a JSON array")?;

    let entries = values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match Report::deserialize(&value) {
            Ok(report) => Entry::Report(report),
            Err(e) => {
                tracing::warn!(index, id = ?value.get("id"), error = %e, "stored report does not decode; keeping it as is");
                Entry::Unreadable(value)
            }
        })
        .collect();
    Ok(Snapshot { entries })
}

/// Whole-collection persistence of reports under a single key. Last writer wins.
#[derive(Clone)]
pub struct ReportStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ReportStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// For readers. An absent, unreadable or unparsable value loads as an empty collection;
    /// individual records that fail to decode are skipped.
    pub async fn load(&self) -> Vec<Report> {
        match self.try_load().await {
            Ok(snapshot) => snapshot.into_reports(),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "report collection unavailable; treating as empty");
                Vec::new()
            }
        }
    }

    /// For writers. A failed read or a value that is not a report array is an error, so a
    /// rewrite never replaces data it could not see.
    pub async fn try_load(&self) -> anyhow::Result<Snapshot> {
        let raw = self
            .kv
            .get(REPORTS_KEY)
            .await
            .context("read report collection failed")?;
        match raw {
            None => Ok(Snapshot::default()),
            Some(raw) => decode(&raw),
        }
    }

    pub async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let raw =
            serde_json::to_string(&snapshot.entries).context("serialize report collection failed")?;
        self.kv
            .set(REPORTS_KEY, &raw)
            .await
            .context("write report collection failed")?;
        tracing::debug!(
            count = snapshot.entries.len(),
            unreadable = snapshot.unreadable(),
            bytes = raw.len(),
            "report collection saved"
        );
        Ok(())
    }
}
