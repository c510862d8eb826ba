//! Credential pair and the storage seam that persists it.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access + refresh credential as issued by `POST auth/token/`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(rename = "access")]
    pub access_token: String,
    #[serde(rename = "refresh")]
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CredentialPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Credential storage error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted holder of the access and refresh credentials.
///
/// Each call must be atomic with respect to concurrent readers; callers
/// provide any ordering beyond that.
pub trait CredentialStore: Send + Sync {
    fn save(&self, pair: &CredentialPair) -> StoreResult<()>;
    /// Replace only the access credential, keeping the refresh credential.
    fn save_access_token(&self, access_token: &str) -> StoreResult<()>;
    fn access_token(&self) -> StoreResult<Option<String>>;
    fn refresh_token(&self) -> StoreResult<Option<String>>;
    fn clear(&self) -> StoreResult<()>;
}

#[derive(Default)]
struct StoredCredentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Process-local store, used by tests and embedders that keep credentials in
/// memory only.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: &CredentialPair) -> Self {
        Self {
            inner: RwLock::new(StoredCredentials {
                access_token: Some(pair.access_token.clone()),
                refresh_token: Some(pair.refresh_token.clone()),
            }),
        }
    }
}

impl fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("MemoryCredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, pair: &CredentialPair) -> StoreResult<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.access_token = Some(pair.access_token.clone());
        guard.refresh_token = Some(pair.refresh_token.clone());
        Ok(())
    }

    fn save_access_token(&self, access_token: &str) -> StoreResult<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.access_token = Some(access_token.to_string());
        Ok(())
    }

    fn access_token(&self) -> StoreResult<Option<String>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.access_token.clone())
    }

    fn refresh_token(&self) -> StoreResult<Option<String>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.refresh_token.clone())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = StoredCredentials::default();
        Ok(())
    }
}
