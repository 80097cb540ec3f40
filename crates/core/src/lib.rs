pub mod admin;
pub mod auth;
pub mod domain;
pub mod ingest;
pub mod repository;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_STORE_DIR: &str = ".folio";
    const DEFAULT_PORT: u16 = 3000;
    const SESSION_FILE: &str = "admin-session";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub store_dir: Option<String>,
        pub database_url: Option<String>,
        pub admin_password_hash: Option<String>,
        pub sentry_dsn: Option<String>,
        pub port: Option<u16>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let port = match std::env::var("PORT").ok() {
                Some(v) => Some(
                    v.parse::<u16>()
                        .with_context(|| format!("PORT must be a port number (got {v:?})"))?,
                ),
                None => None,
            };

            Ok(Self {
                store_dir: std::env::var("FOLIO_STORE_DIR").ok(),
                database_url: std::env::var("DATABASE_URL").ok(),
                admin_password_hash: std::env::var("ADMIN_PASSWORD_HASH").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                port,
            })
        }

        pub fn store_dir(&self) -> PathBuf {
            PathBuf::from(
                self.store_dir
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(DEFAULT_STORE_DIR),
            )
        }

        /// Where `folio_admin` keeps the token of its open session.
        pub fn session_file(&self) -> PathBuf {
            self.store_dir().join(SESSION_FILE)
        }

        pub fn port(&self) -> u16 {
            self.port.unwrap_or(DEFAULT_PORT)
        }

        pub fn require_admin_password_hash(&self) -> anyhow::Result<&str> {
            self.admin_password_hash
                .as_deref()
                .context("ADMIN_PASSWORD_HASH is required")
        }

        /// The configured credential, or `None` (with a warning) when it is missing or malformed.
        pub fn admin_credential(&self) -> Option<crate::auth::Credential> {
            let phc = match self.require_admin_password_hash() {
                Ok(phc) => phc,
                Err(e) => {
                    tracing::warn!(error = %e, "admin login disabled");
                    return None;
                }
            };
            match crate::auth::Credential::from_phc(phc) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!(error = %e, "admin login disabled");
                    None
                }
            }
        }
    }
}
