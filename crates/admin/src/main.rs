use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_core::admin::{AdminWorkflow, StatusKind, WorkflowError};
use folio_core::auth::{LoginOutcome, SessionGate, SessionToken};
use folio_core::domain::browse::{filter_by_sector, SectorFilter};
use folio_core::ingest::AttachmentSlot;
use folio_core::repository::ReportRepository;

mod render;

#[derive(Debug, Parser)]
#[command(name = "folio_admin")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print an Argon2 hash suitable for ADMIN_PASSWORD_HASH.
    HashPassword { password: String },

    #[command(flatten)]
    Admin(AdminCommand),
}

/// Commands that need the store.
#[derive(Debug, Subcommand)]
enum AdminCommand {
    /// Open an admin session and remember it for later commands. Prompts for the password
    /// when not given.
    Login {
        #[arg(long)]
        password: Option<String>,
    },

    /// Close the remembered admin session.
    Logout,

    /// List reports, optionally for one sector ("all" lists everything).
    List {
        #[arg(long)]
        sector: Option<String>,
    },

    /// Show one report.
    Show { id: i64 },

    /// Create a report.
    Create(ReportFields),

    /// Edit a report; only the given fields and files change.
    Edit {
        id: i64,
        #[command(flatten)]
        fields: ReportFields,
    },

    /// Delete a report after confirmation.
    Delete {
        id: i64,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, clap::Args)]
struct ReportFields {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    ticker: Option<String>,
    #[arg(long)]
    sector: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Year-month (YYYY-MM). Defaults to the current month on create.
    #[arg(long)]
    date: Option<String>,
    /// Executive summary HTML.
    #[arg(long)]
    summary: Option<String>,
    /// Strong Buy, Buy, Hold, Sell or Strong Sell.
    #[arg(long)]
    recommendation: Option<String>,
    #[arg(long)]
    target_price: Option<String>,
    #[arg(long)]
    upside: Option<String>,
    #[arg(long)]
    pdf: Option<PathBuf>,
    #[arg(long)]
    excel: Option<PathBuf>,
    #[arg(long)]
    logo: Option<PathBuf>,
}

impl ReportFields {
    fn apply(self, wf: &mut AdminWorkflow) -> anyhow::Result<()> {
        if let Some(date) = self.date.as_deref() {
            validate_year_month(date)?;
        }

        let text = [
            ("title", self.title),
            ("ticker", self.ticker),
            ("sector", self.sector),
            ("description", self.description),
            ("date", self.date),
            ("methodology", self.summary),
            ("recommendation", self.recommendation),
            ("targetPrice", self.target_price),
            ("upside", self.upside),
        ];
        for (name, value) in text {
            if let Some(value) = value {
                wf.set_field(name, value)
                    .with_context(|| format!("invalid --{name}"))?;
            }
        }

        let files = [
            (AttachmentSlot::Pdf, self.pdf),
            (AttachmentSlot::Spreadsheet, self.excel),
            (AttachmentSlot::Logo, self.logo),
        ];
        for (slot, path) in files {
            if let Some(path) = path {
                wf.select_file(slot, path);
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = folio_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let command = match Args::parse().command {
        Command::HashPassword { password } => {
            println!("{}", folio_core::auth::hash_password(&password)?);
            return Ok(());
        }
        Command::Admin(command) => command,
    };

    let kv = folio_core::storage::open_store(&settings).await?;
    let admin = Admin {
        repo: ReportRepository::new(kv.clone()),
        gate: SessionGate::new(kv, settings.admin_credential()),
        session_file: settings.session_file(),
    };

    let result = run(command, admin).await;
    if let Err(err) = &result {
        if let Some(diag) = err.downcast_ref::<WorkflowError>() {
            sentry_anyhow::capture_anyhow(err);
            tracing::error!(action = diag.action, detail = %diag.detail, "admin action failed");
        }
    }
    result
}

struct Admin {
    repo: ReportRepository,
    gate: SessionGate,
    session_file: PathBuf,
}

impl Admin {
    async fn workflow(self) -> anyhow::Result<AdminWorkflow> {
        let session = load_session(&self.session_file).await?;
        AdminWorkflow::enter(self.repo, self.gate, session).await
    }
}

async fn run(command: AdminCommand, admin: Admin) -> anyhow::Result<()> {
    match command {
        AdminCommand::Login { password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ")?,
            };
            match admin.gate.login(&password).await? {
                LoginOutcome::Granted { session } => {
                    save_session(&admin.session_file, &session).await?;
                    println!("Logged in.");
                }
                LoginOutcome::Denied { message } => anyhow::bail!(message),
            }
        }
        AdminCommand::Logout => {
            match load_session(&admin.session_file).await {
                Ok(session) => admin.gate.logout(&session).await?,
                Err(e) => {
                    tracing::debug!(error = %e, "no remembered session to close");
                }
            }
            match tokio::fs::remove_file(&admin.session_file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to remove {}", admin.session_file.display())
                    })
                }
            }
            println!("Logged out.");
        }
        AdminCommand::List { sector } => {
            let filter = SectorFilter::parse(sector.as_deref());
            let reports = filter_by_sector(admin.repo.list().await, &filter);
            if reports.is_empty() {
                println!("No reports.");
            }
            for report in &reports {
                println!("{}", render::summary_line(report));
            }
        }
        AdminCommand::Show { id } => {
            let report = admin
                .repo
                .find_by_id(id)
                .await
                .with_context(|| format!("report {id} not found"))?;
            print!("{}", render::detail(&report));
        }
        AdminCommand::Create(fields) => {
            let mut wf = admin.workflow().await?;
            fields.apply(&mut wf)?;
            let report = wf.submit().await?;
            print_status(&wf);
            println!("{}", render::summary_line(&report));
        }
        AdminCommand::Edit { id, fields } => {
            let mut wf = admin.workflow().await?;
            anyhow::ensure!(wf.begin_edit(id).await, "report {id} not found");
            fields.apply(&mut wf)?;
            match wf.save_edit().await? {
                Some(report) => {
                    print_status(&wf);
                    println!("{}", render::summary_line(&report));
                }
                None => println!("Report {id} no longer exists; nothing changed."),
            }
        }
        AdminCommand::Delete { id, yes } => {
            let mut wf = admin.workflow().await?;
            let confirm = move |question: &str| yes || ask_yes_no(question);
            if wf.delete(id, &confirm).await? {
                print_status(&wf);
            } else if wf.status().is_some() {
                println!("Report {id} was not present.");
            } else {
                println!("Cancelled.");
            }
        }
    }
    Ok(())
}

async fn save_session(path: &Path, session: &SessionToken) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    tokio::fs::write(path, session.as_str())
        .await
        .with_context(|| format!("failed to write session file {}", path.display()))
}

async fn load_session(path: &Path) -> anyhow::Result<SessionToken> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!("not logged in; run `folio_admin login` first")
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read session file {}", path.display()))
        }
    };
    SessionToken::parse(&raw)
        .with_context(|| format!("malformed session file {}", path.display()))
}

fn print_status(wf: &AdminWorkflow) {
    if let Some(status) = wf.status() {
        match status.kind {
            StatusKind::Success => println!("{}", status.text),
            StatusKind::Error => eprintln!("{}", status.text),
        }
    }
}

fn validate_year_month(s: &str) -> anyhow::Result<()> {
    chrono::NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .with_context(|| format!("--date must be YYYY-MM (got {s:?})"))?;
    Ok(())
}

fn prompt(question: &str) -> anyhow::Result<String> {
    print!("{question}");
    std::io::stdout().flush().context("stdout flush failed")?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn ask_yes_no(question: &str) -> bool {
    match prompt(&format!("{question} [y/N] ")) {
        Ok(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            tracing::warn!(error = %e, "confirmation prompt failed");
            false
        }
    }
}

fn init_sentry(settings: &folio_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
