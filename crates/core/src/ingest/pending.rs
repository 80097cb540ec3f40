use crate::domain::contract::Attachments;
use crate::ingest::embed::{AttachmentSlot, EmbeddedFile};
use anyhow::Context;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

/// Reads a file and encodes it as a data URL.
pub async fn ingest_path(path: &Path) -> anyhow::Result<EmbeddedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read attachment {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment");
    let file = EmbeddedFile::from_bytes(name, None, &bytes);
    tracing::debug!(name, bytes = bytes.len(), media_type = %file.media_type, "attachment ingested");
    Ok(file)
}

enum Pending {
    Reading(JoinHandle<anyhow::Result<EmbeddedFile>>),
    Ready(EmbeddedFile),
}

/// At most one ingestion per slot. A newer selection supersedes the older one; the older read
/// is left to finish on its own and its result is dropped.
#[derive(Default)]
pub struct PendingUploads {
    slots: HashMap<AttachmentSlot, Pending>,
}

impl PendingUploads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_path(&mut self, slot: AttachmentSlot, path: PathBuf) {
        if !slot.accepts(&path.to_string_lossy()) {
            tracing::warn!(?slot, path = %path.display(), "file type not expected for slot");
        }
        let handle = tokio::spawn(async move { ingest_path(&path).await });
        if self.slots.insert(slot, Pending::Reading(handle)).is_some() {
            tracing::debug!(?slot, "pending attachment superseded");
        }
    }

    /// Records an already-encoded file (e.g. an HTTP upload).
    pub fn select_ready(&mut self, slot: AttachmentSlot, file: EmbeddedFile) {
        self.slots.insert(slot, Pending::Ready(file));
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Waits for every outstanding read and returns the encoded strings per slot. Settled files
    /// stay selected until [`PendingUploads::clear`]; a slot whose read failed is dropped.
    pub async fn settle(&mut self) -> anyhow::Result<Attachments> {
        let mut failed = None;
        for (slot, pending) in self.slots.iter_mut() {
            let Pending::Reading(handle) = pending else {
                continue;
            };
            match handle.await {
                Ok(Ok(file)) => *pending = Pending::Ready(file),
                Ok(Err(e)) => {
                    failed = Some((*slot, e));
                    break;
                }
                Err(e) => {
                    failed = Some((*slot, anyhow::Error::new(e).context("ingestion task failed")));
                    break;
                }
            }
        }

        if let Some((slot, err)) = failed {
            self.slots.remove(&slot);
            return Err(err.context(format!("{} attachment could not be read", slot.form_name())));
        }

        let mut out = Attachments::default();
        for (slot, pending) in &self.slots {
            let Pending::Ready(file) = pending else {
                continue;
            };
            let data = Some(file.data_url.clone());
            match slot {
                AttachmentSlot::Pdf => out.pdf = data,
                AttachmentSlot::Spreadsheet => out.excel = data,
                AttachmentSlot::Logo => out.logo = data,
            }
        }
        Ok(out)
    }

    /// Display names of the files currently selected, per slot.
    pub fn selected_names(&self) -> Vec<(AttachmentSlot, Option<&str>)> {
        AttachmentSlot::ALL
            .into_iter()
            .filter_map(|slot| {
                let pending = self.slots.get(&slot)?;
                let name = match pending {
                    Pending::Ready(file) => Some(file.name.as_str()),
                    Pending::Reading(_) => None,
                };
                Some((slot, name))
            })
            .collect()
    }
}
