//! Secure-mailing registry and policy evaluation.
//!
//! Outbound notifications may require signing and/or encryption. Backends
//! (S/MIME, PGP) are registered once at process start under a typed tag and
//! looked up through [`SecurityRegistry`]; there is no by-name dynamic
//! dispatch. Policy semantics per operation:
//!
//! - `no` — never attempted, marker stays unsuccessful.
//! - `always` — attempted; missing key material records a failure marker on
//!   the produced artifact but does not block it.
//! - `discard` — missing key material suppresses the whole action, reported
//!   as [`EngineError::SecurityPolicy`].

use serde::{Deserialize, Serialize};

use deskflow_core::error::EngineError;
use deskflow_core::message::{SecurityOutcome, SecurityResult};
use deskflow_core::rule::{EmailNotification, SecurityPolicy};

// ---------------------------------------------------------------------------
// SecurityTag
// ---------------------------------------------------------------------------

/// Typed identifier of a secure-mailing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityTag {
    Smime,
    Pgp,
}

impl SecurityTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smime => "smime",
            Self::Pgp => "pgp",
        }
    }
}

impl std::fmt::Display for SecurityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SecureMailer
// ---------------------------------------------------------------------------

/// Key-material capability of one secure-mailing backend.
pub trait SecureMailer: Send + Sync {
    /// Whether key material exists to sign as `sender`.
    fn can_sign(&self, sender: &str) -> bool;

    /// Whether every address in `recipients` has usable encryption material.
    fn can_encrypt(&self, recipients: &[String]) -> bool;
}

/// Static backend registry, populated at process start.
#[derive(Default)]
pub struct SecurityRegistry {
    backends: Vec<(SecurityTag, Box<dyn SecureMailer>)>,
}

impl SecurityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one under the same tag.
    pub fn register(&mut self, tag: SecurityTag, backend: Box<dyn SecureMailer>) {
        self.backends.retain(|(existing, _)| *existing != tag);
        self.backends.push((tag, backend));
    }

    fn can_sign(&self, sender: &str) -> bool {
        self.backends.iter().any(|(_, b)| b.can_sign(sender))
    }

    fn can_encrypt(&self, recipients: &[String]) -> bool {
        self.backends.iter().any(|(_, b)| b.can_encrypt(recipients))
    }

    /// Apply the notification's sign/encryption policies.
    ///
    /// Returns the markers to record on the produced artifact, or an
    /// [`EngineError::SecurityPolicy`] when a `discard` policy is
    /// unsatisfiable (the caller must suppress the whole action).
    pub fn evaluate(
        &self,
        notification: &EmailNotification,
        sender: &str,
        recipients: &[String],
    ) -> Result<SecurityResult, EngineError> {
        let sign = apply_policy(notification.sign, self.can_sign(sender), "sign")?;
        let encryption = apply_policy(
            notification.encryption,
            self.can_encrypt(recipients),
            "encryption",
        )?;
        Ok(SecurityResult { sign, encryption })
    }
}

fn apply_policy(
    policy: SecurityPolicy,
    available: bool,
    operation: &str,
) -> Result<SecurityOutcome, EngineError> {
    match policy {
        SecurityPolicy::No => Ok(SecurityOutcome::default()),
        SecurityPolicy::Always => {
            if available {
                Ok(SecurityOutcome::success())
            } else {
                Ok(SecurityOutcome::failed(format!(
                    "no {operation} key material available"
                )))
            }
        }
        SecurityPolicy::Discard => {
            if available {
                Ok(SecurityOutcome::success())
            } else {
                Err(EngineError::SecurityPolicy(format!(
                    "{operation} key material unavailable"
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryKeyStore
// ---------------------------------------------------------------------------

/// Address-keyed key store for tests and simple deployments.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    signing: std::collections::HashSet<String>,
    encryption: std::collections::HashSet<String>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signing_key(&mut self, address: &str) {
        self.signing.insert(address.to_lowercase());
    }

    pub fn add_encryption_key(&mut self, address: &str) {
        self.encryption.insert(address.to_lowercase());
    }
}

impl SecureMailer for InMemoryKeyStore {
    fn can_sign(&self, sender: &str) -> bool {
        self.signing.contains(&sender.to_lowercase())
    }

    fn can_encrypt(&self, recipients: &[String]) -> bool {
        !recipients.is_empty()
            && recipients
                .iter()
                .all(|r| self.encryption.contains(&r.to_lowercase()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
