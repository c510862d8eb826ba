//! Credential persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
use std::sync::Mutex;
#[cfg(test)]
use std::sync::OnceLock;

#[cfg(not(test))]
use keyring::Entry;

use simplenote_core::auth::{CredentialPair, CredentialStore, StoreError, StoreResult};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "simplenote-cli";
const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Keychain-backed store with one entry per credential, scoped by profile.
pub struct KeyringCredentialStore {
    access_key: String,
    refresh_key: String,
    /// Keeps the two-entry writes of `save` and `clear` from interleaving.
    write_lock: Mutex<()>,
}

impl KeyringCredentialStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            access_key: format!("{profile_name}:{ACCESS_TOKEN_KEY}"),
            refresh_key: format!("{profile_name}:{REFRESH_TOKEN_KEY}"),
            write_lock: Mutex::new(()),
        }
    }

    fn write_guard(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|error| StoreError::Backend(error.to_string()))
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(key: &str) -> StoreResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, key).map_err(|error| StoreError::Backend(error.to_string()))
    }

    #[cfg(not(test))]
    fn read(key: &str) -> StoreResult<Option<String>> {
        match Self::entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(StoreError::Backend(error.to_string())),
        }
    }

    #[cfg(test)]
    fn read(key: &str) -> StoreResult<Option<String>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| StoreError::Backend(error.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    #[cfg(not(test))]
    fn write(key: &str, value: &str) -> StoreResult<()> {
        Self::entry(key)?
            .set_password(value)
            .map_err(|error| StoreError::Backend(error.to_string()))
    }

    #[cfg(test)]
    fn write(key: &str, value: &str) -> StoreResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| StoreError::Backend(error.to_string()))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn delete(key: &str) -> StoreResult<()> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(StoreError::Backend(error.to_string())),
        }
    }

    #[cfg(test)]
    fn delete(key: &str) -> StoreResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| StoreError::Backend(error.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save(&self, pair: &CredentialPair) -> StoreResult<()> {
        let _guard = self.write_guard()?;
        Self::write(&self.refresh_key, &pair.refresh_token)?;
        Self::write(&self.access_key, &pair.access_token)
    }

    fn save_access_token(&self, access_token: &str) -> StoreResult<()> {
        let _guard = self.write_guard()?;
        Self::write(&self.access_key, access_token)
    }

    fn access_token(&self) -> StoreResult<Option<String>> {
        Self::read(&self.access_key)
    }

    fn refresh_token(&self) -> StoreResult<Option<String>> {
        Self::read(&self.refresh_key)
    }

    fn clear(&self) -> StoreResult<()> {
        let _guard = self.write_guard()?;
        Self::delete(&self.access_key)?;
        Self::delete(&self.refresh_key)
    }
}
