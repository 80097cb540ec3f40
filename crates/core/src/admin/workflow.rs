use crate::admin::error::WorkflowError;
use crate::admin::fields::FieldUpdate;
use crate::auth::{SessionGate, SessionToken};
use crate::domain::contract::ReportDraft;
use crate::domain::report::Report;
use crate::ingest::{AttachmentSlot, EmbeddedFile, PendingUploads};
use crate::repository::ReportRepository;
use anyhow::{bail, Context};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub const LOGIN_ROUTE: &str = "/admin";
pub const STATUS_TTL: Duration = Duration::from_secs(3);
pub const DELETE_PROMPT: &str = "Are you sure you want to delete this report?";

const CREATED: &str = "Report created successfully!";
const UPDATED: &str = "Report updated successfully!";
const DELETED: &str = "Report deleted successfully!";
const SAVE_FAILED: &str = "Error saving report. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    CreateForm,
    ListView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    CreateForm,
    ListView,
    EditDialog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
    shown_at: Instant,
}

impl StatusMessage {
    pub fn is_visible_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.shown_at) < STATUS_TTL
    }
}

/// Asks the operator before a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Admin dashboard state: a create form tab, a list tab, and an edit dialog over the list.
pub struct AdminWorkflow {
    repo: ReportRepository,
    gate: SessionGate,
    session: SessionToken,
    tab: Tab,
    editing: Option<Report>,
    form: ReportDraft,
    uploads: PendingUploads,
    reports: Vec<Report>,
    status: Option<StatusMessage>,
}

impl AdminWorkflow {
    /// Fails unless `session` is open; callers should send the user to [`LOGIN_ROUTE`].
    pub async fn enter(
        repo: ReportRepository,
        gate: SessionGate,
        session: SessionToken,
    ) -> anyhow::Result<Self> {
        if !gate.is_authenticated(&session).await {
            bail!("admin session required; redirect to {LOGIN_ROUTE}");
        }
        let reports = repo.list().await;
        Ok(Self {
            repo,
            gate,
            session,
            tab: Tab::CreateForm,
            editing: None,
            form: ReportDraft::default(),
            uploads: PendingUploads::new(),
            reports,
            status: None,
        })
    }

    pub fn view(&self) -> View {
        match (self.editing.is_some(), self.tab) {
            (true, _) => View::EditDialog,
            (false, Tab::CreateForm) => View::CreateForm,
            (false, Tab::ListView) => View::ListView,
        }
    }

    pub fn select_tab(&mut self, tab: Tab) {
        self.tab = tab;
    }

    pub fn form(&self) -> &ReportDraft {
        &self.form
    }

    /// The list-view snapshot as of the last mutation or [`AdminWorkflow::refresh`].
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn editing(&self) -> Option<&Report> {
        self.editing.as_ref()
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> Option<&StatusMessage> {
        self.status.as_ref().filter(|s| s.is_visible_at(now))
    }

    pub fn apply(&mut self, update: FieldUpdate) -> anyhow::Result<()> {
        update.apply(&mut self.form)
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> anyhow::Result<()> {
        self.apply(FieldUpdate::from_form(name, value)?)
    }

    pub fn select_file(&mut self, slot: AttachmentSlot, path: PathBuf) {
        self.uploads.select_path(slot, path);
    }

    pub fn select_upload(&mut self, slot: AttachmentSlot, file: EmbeddedFile) {
        self.uploads.select_ready(slot, file);
    }

    pub fn selected_files(&self) -> Vec<(AttachmentSlot, Option<&str>)> {
        self.uploads.selected_names()
    }

    pub async fn refresh(&mut self) {
        self.reports = self.repo.list().await;
    }

    /// Creates a report from the form. Missing required fields fail before anything is
    /// written; storage failures leave the form as it was and show an error status.
    pub async fn submit(&mut self) -> anyhow::Result<Report> {
        if self.editing.is_some() {
            bail!("edit dialog is open; save or cancel it first");
        }
        self.form.check_required()?;

        let result: anyhow::Result<Report> = async {
            let attachments = self.uploads.settle().await?;
            self.repo.create(self.form.clone(), attachments).await
        }
        .await;

        match result {
            Ok(report) => {
                self.reset_form();
                self.refresh().await;
                self.show(StatusKind::Success, CREATED);
                self.tab = Tab::ListView;
                Ok(report)
            }
            Err(e) => Err(self.fail("create", e)),
        }
    }

    /// Opens the edit dialog populated with the record's values. `false` if it no longer exists.
    pub async fn begin_edit(&mut self, id: i64) -> bool {
        let Some(report) = self.repo.find_by_id(id).await else {
            tracing::debug!(report_id = id, "edit requested for missing report");
            return false;
        };
        self.form = ReportDraft::from_report(&report);
        self.uploads.clear();
        self.editing = Some(report);
        true
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.reset_form();
    }

    /// Saves the dialog. A record deleted meanwhile is skipped without an error.
    pub async fn save_edit(&mut self) -> anyhow::Result<Option<Report>> {
        let Some(editing) = self.editing.as_ref() else {
            bail!("no report is being edited");
        };
        let id = editing.id;

        let result: anyhow::Result<Option<Report>> = async {
            let attachments = self.uploads.settle().await?;
            self.repo.update(id, self.form.clone(), attachments).await
        }
        .await;

        match result {
            Ok(updated) => {
                self.editing = None;
                self.reset_form();
                self.refresh().await;
                self.tab = Tab::ListView;
                if updated.is_some() {
                    self.show(StatusKind::Success, UPDATED);
                }
                Ok(updated)
            }
            Err(e) => Err(self.fail("update", e)),
        }
    }

    /// Deletes after the operator confirms. Returns whether a record was removed.
    pub async fn delete(&mut self, id: i64, confirm: &(dyn Confirm + Sync)) -> anyhow::Result<bool> {
        if !confirm.confirm(DELETE_PROMPT) {
            tracing::debug!(report_id = id, "delete cancelled");
            return Ok(false);
        }

        match self.repo.delete(id).await {
            Ok(removed) => {
                self.refresh().await;
                self.show(StatusKind::Success, DELETED);
                Ok(removed)
            }
            Err(e) => Err(self.fail("delete", e)),
        }
    }

    pub async fn logout(self) -> anyhow::Result<()> {
        self.gate.logout(&self.session).await.context("logout failed")
    }

    fn reset_form(&mut self) {
        self.form = ReportDraft::default();
        self.uploads.clear();
    }

    fn show(&mut self, kind: StatusKind, text: &str) {
        self.status = Some(StatusMessage {
            kind,
            text: text.to_string(),
            shown_at: Instant::now(),
        });
    }

    fn fail(&mut self, action: &'static str, err: anyhow::Error) -> anyhow::Error {
        tracing::error!(action, error = %err, "admin action failed");
        self.show(StatusKind::Error, SAVE_FAILED);
        anyhow::Error::new(WorkflowError {
            action,
            detail: format!("{err:#}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, Credential, LoginOutcome};
    use crate::domain::report::{Recommendation, Tone};
    use crate::storage::{KeyValueStore, MemoryStore, REPORTS_KEY};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const PASSWORD: &str = "s3cret";

    fn gate(kv: &Arc<MemoryStore>) -> SessionGate {
        let credential = Credential::from_phc(hash_password(PASSWORD).unwrap()).unwrap();
        SessionGate::new(kv.clone(), Some(credential))
    }

    async fn login(gate: &SessionGate) -> SessionToken {
        match gate.login(PASSWORD).await.unwrap() {
            LoginOutcome::Granted { session } => session,
            other => panic!("expected login to succeed, got {other:?}"),
        }
    }

    async fn setup() -> (AdminWorkflow, ReportRepository, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let gate = gate(&kv);
        let session = login(&gate).await;

        let repo = ReportRepository::new(kv.clone());
        let wf = AdminWorkflow::enter(repo.clone(), gate, session).await.unwrap();
        (wf, repo, kv)
    }

    fn fill(wf: &mut AdminWorkflow, title: &str, ticker: &str, sector: &str) {
        wf.set_field("title", title).unwrap();
        wf.set_field("ticker", ticker).unwrap();
        wf.set_field("sector", sector).unwrap();
    }

    #[tokio::test]
    async fn entry_requires_an_open_session() {
        let kv = Arc::new(MemoryStore::new());
        let gate = gate(&kv);
        let repo = ReportRepository::new(kv.clone());
        login(&gate).await;

        let stranger = SessionToken::parse("9f1c2e4a7b3d4c5e8f6a0b1c2d3e4f50").unwrap();
        let err = AdminWorkflow::enter(repo, gate, stranger)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("/admin"));
    }

    #[tokio::test]
    async fn submit_creates_and_switches_to_list() {
        let (mut wf, repo, _) = setup().await;
        assert_eq!(wf.view(), View::CreateForm);

        fill(&mut wf, "Acme Corp", "acme", "Tech");
        wf.set_field("recommendation", "Buy").unwrap();
        let report = wf.submit().await.unwrap();

        assert_eq!(wf.view(), View::ListView);
        assert_eq!(wf.form(), &ReportDraft::default());
        assert_eq!(wf.reports().len(), 1);
        assert_eq!(wf.reports()[0].ticker, "ACME");

        let status = wf.status().unwrap();
        assert_eq!(status.kind, StatusKind::Success);
        assert_eq!(status.text, "Report created successfully!");
        assert!(wf.status_at(Instant::now() + STATUS_TTL).is_none());

        let stored = repo.find_by_id(report.id).await.unwrap();
        assert_eq!(stored.recommendation(), Some(Recommendation::Buy));
        assert_eq!(stored.recommendation_tone(), Some(Tone::Positive));
    }

    #[tokio::test]
    async fn missing_required_field_keeps_form() {
        let (mut wf, repo, _) = setup().await;
        wf.set_field("title", "Untitled").unwrap();

        assert!(wf.submit().await.is_err());
        assert_eq!(wf.view(), View::CreateForm);
        assert_eq!(wf.form().title, "Untitled");
        assert!(repo.list().await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_attachment_surfaces_error_and_preserves_form() {
        let (mut wf, repo, _) = setup().await;
        fill(&mut wf, "Acme Corp", "acme", "Tech");
        wf.select_file(AttachmentSlot::Pdf, PathBuf::from("/nonexistent/acme.pdf"));

        let err = wf.submit().await.unwrap_err();
        let diag = err.downcast_ref::<WorkflowError>().unwrap();
        assert_eq!(diag.action, "create");
        assert_eq!(wf.status().unwrap().kind, StatusKind::Error);
        assert_eq!(wf.form().ticker, "acme");
        assert!(repo.list().await.is_empty());
    }

    #[tokio::test]
    async fn edit_dialog_updates_in_place() {
        let (mut wf, _, _) = setup().await;
        fill(&mut wf, "Acme Corp", "acme", "Tech");
        wf.select_upload(
            AttachmentSlot::Pdf,
            EmbeddedFile::from_bytes("acme.pdf", None, b"%PDF"),
        );
        let created = wf.submit().await.unwrap();

        assert!(wf.begin_edit(created.id).await);
        assert_eq!(wf.view(), View::EditDialog);
        assert_eq!(wf.form().title, "Acme Corp");

        wf.set_field("valuation.metrics.targetPrice", "$42").unwrap();
        let updated = wf.save_edit().await.unwrap().unwrap();

        assert_eq!(wf.view(), View::ListView);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.pdf_url, created.pdf_url);
        assert_eq!(updated.metrics().target_price.as_deref(), Some("$42"));
        assert_eq!(wf.status().unwrap().text, "Report updated successfully!");
        assert_eq!(wf.reports(), &[updated]);
    }

    #[tokio::test]
    async fn cancel_edit_discards_changes() {
        let (mut wf, repo, _) = setup().await;
        fill(&mut wf, "Acme Corp", "acme", "Tech");
        let created = wf.submit().await.unwrap();

        assert!(wf.begin_edit(created.id).await);
        wf.set_field("title", "Changed").unwrap();
        wf.cancel_edit();

        assert_eq!(wf.view(), View::ListView);
        assert_eq!(repo.find_by_id(created.id).await.unwrap().title, "Acme Corp");
        assert!(!wf.begin_edit(created.id + 1).await);
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let (mut wf, repo, _) = setup().await;
        fill(&mut wf, "Acme Corp", "acme", "Tech");
        let created = wf.submit().await.unwrap();

        let declined = wf.delete(created.id, &|_: &str| false).await.unwrap();
        assert!(!declined);
        assert_eq!(repo.list().await.len(), 1);

        let asked = AtomicBool::new(false);
        let confirm = |prompt: &str| {
            asked.store(prompt == DELETE_PROMPT, Ordering::SeqCst);
            true
        };
        assert!(wf.delete(created.id, &confirm).await.unwrap());
        assert!(asked.load(Ordering::SeqCst));
        assert!(repo.list().await.is_empty());
        assert_eq!(wf.status().unwrap().text, "Report deleted successfully!");
    }

    #[tokio::test]
    async fn logout_closes_only_its_session() {
        let kv = Arc::new(MemoryStore::new());
        let gate = gate(&kv);
        let repo = ReportRepository::new(kv.clone());
        let mine = login(&gate).await;
        let other = login(&gate).await;

        let wf = AdminWorkflow::enter(repo.clone(), gate.clone(), mine.clone()).await.unwrap();
        wf.logout().await.unwrap();

        assert!(!gate.is_authenticated(&mine).await);
        assert!(AdminWorkflow::enter(repo.clone(), gate.clone(), mine).await.is_err());
        assert!(AdminWorkflow::enter(repo, gate, other).await.is_ok());
    }

    #[tokio::test]
    async fn unreadable_collection_fails_submit_without_writing() {
        let (mut wf, _, kv) = setup().await;
        kv.set(REPORTS_KEY, "{not json").await.unwrap();
        fill(&mut wf, "Acme Corp", "acme", "Tech");

        let err = wf.submit().await.unwrap_err();
        assert_eq!(err.downcast_ref::<WorkflowError>().unwrap().action, "create");
        assert_eq!(wf.status().unwrap().text, "Error saving report. Please try again.");
        assert_eq!(wf.view(), View::CreateForm);
        assert_eq!(wf.form().ticker, "acme");
        assert_eq!(kv.get(REPORTS_KEY).await.unwrap().as_deref(), Some("{not json"));
    }
}
