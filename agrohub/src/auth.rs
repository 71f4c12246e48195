//! One-time verification codes, bearer sessions and admin password digests.
//!
//! Codes and sessions live in an injected [`ExpiringStore`], so several
//! server instances can share them and a restart does not matter when the
//! store is durable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AuthFailure, MarketError, MarketResult, Operation};
use crate::store::ExpiringStore;
use crate::types::{AdminUsername, Email};
use crate::user::Principal;

/// How long an issued code stays valid.
pub const CODE_TTL: Duration = Duration::from_secs(15 * 60);

/// Wrong guesses allowed before a code is thrown away.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Default lifetime of a bearer session.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Six decimal digits sent to the user.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Draws a uniformly random code from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let value: u32 = rand::rng().random_range(0..1_000_000);
        Self(format!("{value:06}"))
    }

    /// The digits, for handing to a [`CodeSender`].
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn matches(&self, submitted: &str) -> bool {
        blake3::hash(self.0.as_bytes()) == blake3::hash(submitted.trim().as_bytes())
    }
}

impl std::fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VerificationCode(******)")
    }
}

/// A [`CodeSender`] could not hand the code over. Holds the gateway's reason.
#[derive(Debug, Error)]
#[error("failed to deliver verification code: {0}")]
pub struct DeliveryError(pub String);

/// Outbound channel for verification codes (email or SMS gateway).
#[async_trait]
pub trait CodeSender: Send + Sync {
    /// Delivers `code` to `destination`.
    async fn send_code(
        &self,
        destination: &Email,
        code: &VerificationCode,
    ) -> Result<(), DeliveryError>;
}

/// Writes codes to the log instead of sending them. For development.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCodeSender;

#[async_trait]
impl CodeSender for TracingCodeSender {
    async fn send_code(
        &self,
        destination: &Email,
        code: &VerificationCode,
    ) -> Result<(), DeliveryError> {
        info!(
            destination = %destination,
            code = code.as_str(),
            "[auth.send_code] verification code issued"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingCode {
    code: String,
    attempts: u32,
    expires_at: DateTime<Utc>,
}

fn code_key(email: &Email) -> String {
    format!("otp:{email}")
}

/// Issues and checks one-time codes keyed by email address.
#[derive(Clone)]
pub struct CodeIssuer {
    store: Arc<dyn ExpiringStore>,
    sender: Arc<dyn CodeSender>,
    ttl: Duration,
    max_attempts: u32,
}

impl CodeIssuer {
    /// Issuer with the default lifetime and attempt limit.
    pub fn new(store: Arc<dyn ExpiringStore>, sender: Arc<dyn CodeSender>) -> Self {
        Self {
            store,
            sender,
            ttl: CODE_TTL,
            max_attempts: MAX_CODE_ATTEMPTS,
        }
    }

    /// Overrides [`CODE_TTL`].
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Replaces any outstanding code for `email` and sends a fresh one.
    #[instrument(name = "auth.issue_code", skip_all, fields(email = %email))]
    pub async fn issue(&self, email: &Email) -> MarketResult<()> {
        let code = VerificationCode::generate();
        let lifetime =
            chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let pending = PendingCode {
            code: code.as_str().to_string(),
            attempts: 0,
            expires_at: Utc::now() + lifetime,
        };
        let value = serde_json::to_string(&pending)
            .map_err(|_| MarketError::StorageFailure(Operation::WriteEntry))?;
        self.store.put(&code_key(email), value, self.ttl).await?;

        if let Err(error) = self.sender.send_code(email, &code).await {
            warn!(error = %error, "[auth.issue_code] delivery failed, discarding code");
            self.store.remove(&code_key(email)).await?;
            return Err(MarketError::DeliveryFailed);
        }
        Ok(())
    }

    /// Consumes the code for `email` when `submitted` matches it.
    ///
    /// A wrong guess keeps the code alive until it expires or
    /// [`MAX_CODE_ATTEMPTS`] guesses have been made.
    #[instrument(name = "auth.verify_code", skip_all, fields(email = %email))]
    pub async fn verify(&self, email: &Email, submitted: &str) -> MarketResult<()> {
        let key = code_key(email);
        let Some(raw) = self.store.take(&key).await? else {
            return Err(MarketError::Unauthorized(AuthFailure::InvalidCode));
        };
        let mut pending: PendingCode = serde_json::from_str(&raw)
            .map_err(|_| MarketError::StorageFailure(Operation::DecodeRow))?;

        if VerificationCode(pending.code.clone()).matches(submitted) {
            return Ok(());
        }

        pending.attempts += 1;
        let remaining = (pending.expires_at - Utc::now()).to_std().ok();
        match remaining {
            Some(ttl) if pending.attempts < self.max_attempts && !ttl.is_zero() => {
                let value = serde_json::to_string(&pending)
                    .map_err(|_| MarketError::StorageFailure(Operation::WriteEntry))?;
                // A code issued since the take wins over this stale one.
                if !self.store.put_if_absent(&key, value, ttl).await? {
                    info!("[auth.verify_code] newer code issued meanwhile, keeping it");
                }
            }
            _ => warn!(
                attempts = pending.attempts,
                "[auth.verify_code] code discarded after failed attempts"
            ),
        }
        Err(MarketError::Unauthorized(AuthFailure::InvalidCode))
    }
}

/// Opaque bearer token handed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(Uuid);

impl SessionToken {
    fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionToken {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| MarketError::Unauthorized(AuthFailure::InvalidSession))
    }
}

fn session_key(token: SessionToken) -> String {
    format!("session:{token}")
}

/// Bearer sessions that remember the resolved [`Principal`].
#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn ExpiringStore>,
    ttl: Duration,
}

impl Sessions {
    /// Sessions that last `ttl` from sign-in.
    pub fn new(store: Arc<dyn ExpiringStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Stores `principal` under a new token.
    pub async fn open(&self, principal: Principal) -> MarketResult<SessionToken> {
        let token = SessionToken::generate();
        let value = serde_json::to_string(&principal)
            .map_err(|_| MarketError::StorageFailure(Operation::WriteEntry))?;
        self.store.put(&session_key(token), value, self.ttl).await?;
        Ok(token)
    }

    /// The principal behind `token`, or `InvalidSession` once it expired.
    pub async fn resolve(&self, token: SessionToken) -> MarketResult<Principal> {
        let raw = self
            .store
            .get(&session_key(token))
            .await?
            .ok_or(MarketError::Unauthorized(AuthFailure::InvalidSession))?;
        serde_json::from_str(&raw).map_err(|_| MarketError::StorageFailure(Operation::DecodeRow))
    }

    /// Forgets the token.
    pub async fn close(&self, token: SessionToken) -> MarketResult<()> {
        Ok(self.store.remove(&session_key(token)).await?)
    }
}

/// Keyed blake3 digests of admin passwords.
///
/// The key is derived from a server-side pepper, and the username is mixed
/// into the input so equal passwords of two admins digest differently.
#[derive(Clone)]
pub struct PasswordDigester {
    key: [u8; 32],
}

impl PasswordDigester {
    const CONTEXT: &'static str = "agrohub 2024 admin password digest";

    /// Derives the digest key from `pepper`.
    pub fn new(pepper: &str) -> Self {
        Self {
            key: blake3::derive_key(Self::CONTEXT, pepper.as_bytes()),
        }
    }

    fn hash(&self, username: &AdminUsername, password: &str) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(username.as_bytes());
        hasher.update(&[0]);
        hasher.update(password.as_bytes());
        hasher.finalize()
    }

    /// Hex digest to store for `username`'s password.
    pub fn digest(&self, username: &AdminUsername, password: &str) -> String {
        self.hash(username, password).to_hex().to_string()
    }

    /// Compares in constant time.
    pub fn verify(&self, username: &AdminUsername, password: &str, stored: &str) -> bool {
        blake3::Hash::from_hex(stored).is_ok_and(|expected| expected == self.hash(username, password))
    }
}

impl std::fmt::Debug for PasswordDigester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordDigester").finish_non_exhaustive()
    }
}
