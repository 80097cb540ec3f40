use crate::storage::{KeyValueStore, AUTH_FLAG_KEY};
use anyhow::Context;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

const FLAG_SET: &str = "true";
pub const INVALID_PASSWORD: &str = "Invalid password";

/// The admin credential, held only as an Argon2 PHC string.
#[derive(Debug, Clone)]
pub struct Credential {
    phc: String,
}

impl Credential {
    pub fn from_phc(phc: impl Into<String>) -> anyhow::Result<Self> {
        let phc = phc.into();
        PasswordHash::new(&phc)
            .map_err(|e| anyhow::anyhow!("invalid admin password hash: {e}"))?;
        Ok(Self { phc })
    }

    pub fn verify(&self, password: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(&self.phc)
            .map_err(|e| anyhow::anyhow!("invalid admin password hash: {e}"))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("password verification failed: {e}")),
        }
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Opaque per-login session id. Each one owns its own flag in the store, so a session is only
/// open for the client holding the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// `None` unless `raw` is a well-formed token.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim())
            .ok()
            .map(|id| Self(id.simple().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn flag_key(&self) -> String {
        format!("{AUTH_FLAG_KEY}_{}", self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Granted { session: SessionToken },
    Denied { message: String },
}

/// Per-session boolean flags in the shared store. A matching password opens a new session;
/// logout closes only that session. There is no expiry.
#[derive(Clone)]
pub struct SessionGate {
    kv: Arc<dyn KeyValueStore>,
    credential: Option<Credential>,
}

impl SessionGate {
    /// A gate without a credential can be checked and closed but never opened.
    pub fn new(kv: Arc<dyn KeyValueStore>, credential: Option<Credential>) -> Self {
        Self { kv, credential }
    }

    pub async fn login(&self, password: &str) -> anyhow::Result<LoginOutcome> {
        let granted = match &self.credential {
            Some(credential) => credential.verify(password)?,
            None => {
                tracing::warn!("login attempted but no admin credential is configured");
                false
            }
        };

        if !granted {
            tracing::info!("admin login denied");
            return Ok(LoginOutcome::Denied {
                message: INVALID_PASSWORD.to_string(),
            });
        }

        let session = SessionToken::generate();
        self.kv
            .set(&session.flag_key(), FLAG_SET)
            .await
            .context("failed to set admin session flag")?;
        tracing::info!("admin login granted");
        Ok(LoginOutcome::Granted { session })
    }

    pub async fn logout(&self, session: &SessionToken) -> anyhow::Result<()> {
        self.kv
            .remove(&session.flag_key())
            .await
            .context("failed to clear admin session flag")?;
        tracing::info!("admin logged out");
        Ok(())
    }

    /// Read failures count as signed out.
    pub async fn is_authenticated(&self, session: &SessionToken) -> bool {
        match self.kv.get(&session.flag_key()).await {
            Ok(v) => v.as_deref() == Some(FLAG_SET),
            Err(e) => {
                tracing::warn!(error = %e, "admin session flag read failed");
                false
            }
        }
    }
}
