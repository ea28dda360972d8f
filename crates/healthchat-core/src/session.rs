//! Auth state: the in-memory session and its persisted mirror.
//!
//! `AuthStore` is the single owner of the session. It is created once per
//! process and handed (as `Arc<AuthStore>`) to whatever needs a bearer token,
//! most notably [`crate::api::ApiClient`]. Only `set_credentials`, `hydrate`
//! and `logout` mutate it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{HealthchatError, Result};
use crate::model::AuthResponse;

/// Storage key for the access token.
pub const TOKEN_KEY: &str = "token";
/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    token: Option<String>,
    refresh_token: Option<String>,
    is_authenticated: bool,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }
}

/// Token payload accepted by [`AuthStore::set_credentials`].
///
/// The upstream answers with either `{access, refresh}` or
/// `{accessToken, idToken}`; both are accepted and the camelCase pair wins
/// when both are present.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(
        default,
        rename = "accessToken",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<String>,
    #[serde(default, rename = "idToken", skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl Credentials {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
            ..Default::default()
        }
    }

    fn normalized(&self) -> (Option<String>, Option<String>) {
        let token = non_empty(&self.access_token).or_else(|| non_empty(&self.access));
        let refresh = non_empty(&self.id_token).or_else(|| non_empty(&self.refresh));
        (token, refresh)
    }
}

impl From<&AuthResponse> for Credentials {
    fn from(resp: &AuthResponse) -> Self {
        Self {
            access: resp.access.clone(),
            refresh: resp.refresh.clone(),
            access_token: resp.access_token.clone(),
            id_token: resp.id_token.clone(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

// ---------------------------------------------------------------------------
// Token persistence
// ---------------------------------------------------------------------------

/// Client-side key/value storage for the two session keys.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// JSON file on disk, e.g. `~/.config/healthchat/session.json`.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Returns an empty map if the file is missing or unparseable.
    fn read_map(&self) -> HashMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if map.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(HealthchatError::Storage(format!(
                    "failed to remove {}: {e}",
                    self.path.display()
                ))),
            };
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HealthchatError::Storage(format!("failed to create session dir: {e}"))
            })?;
        }
        let json = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, json).map_err(|e| {
            HealthchatError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.guard();
        self.read_map().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.guard();
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard();
        let mut map = self.read_map();
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_map(&map)
    }
}

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Enum wrapper over the token stores, dispatching to the concrete one.
#[derive(Debug)]
pub enum TokenStorage {
    File(FileTokenStore),
    Memory(MemoryTokenStore),
}

impl TokenStore for TokenStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            TokenStorage::File(s) => s.get(key),
            TokenStorage::Memory(s) => s.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        match self {
            TokenStorage::File(s) => s.set(key, value),
            TokenStorage::Memory(s) => s.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self {
            TokenStorage::File(s) => s.remove(key),
            TokenStorage::Memory(s) => s.remove(key),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AuthStore {
    session: RwLock<Session>,
    storage: TokenStorage,
}

impl AuthStore {
    /// New store with an empty session.
    pub fn new(storage: TokenStorage) -> Self {
        Self {
            session: RwLock::new(Session::default()),
            storage,
        }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(TokenStorage::Memory(MemoryTokenStore::new()))
    }

    pub fn storage(&self) -> &TokenStorage {
        &self.storage
    }

    /// Copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated
    }

    /// Apply a sign-in/sign-up response.
    ///
    /// Both tokens are persisted only when both are present. The in-memory
    /// session is updated even if persisting fails; the storage error is
    /// returned afterwards.
    pub fn set_credentials(&self, credentials: &Credentials) -> Result<()> {
        let (token, refresh_token) = credentials.normalized();
        let persist = match (&token, &refresh_token) {
            (Some(t), Some(r)) => Some((t.clone(), r.clone())),
            _ => None,
        };

        {
            let mut session = self.write();
            session.is_authenticated = token.is_some();
            session.token = token;
            session.refresh_token = refresh_token;
        }

        match persist {
            Some((token, refresh)) => {
                tracing::debug!("persisting session tokens");
                self.storage.set(TOKEN_KEY, &token)?;
                self.storage.set(REFRESH_TOKEN_KEY, &refresh)?;
            }
            None => tracing::debug!("partial credentials, not persisting"),
        }
        Ok(())
    }

    /// Restore a session read from storage. Does not write to storage.
    pub fn hydrate(&self, access: &str, refresh: &str) {
        let mut session = self.write();
        session.token = Some(access.to_string());
        session.refresh_token = Some(refresh.to_string());
        session.is_authenticated = true;
    }

    /// Clear the session and both storage keys. Safe to call repeatedly.
    pub fn logout(&self) -> Result<()> {
        {
            let mut session = self.write();
            *session = Session::default();
        }
        let token = self.storage.remove(TOKEN_KEY);
        let refresh = self.storage.remove(REFRESH_TOKEN_KEY);
        token.and(refresh)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_session_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "healthchat-session-{name}-{}.json",
            uuid::Uuid::now_v7()
        ))
    }

    #[test]
    fn test_initial_session_empty() {
        let store = AuthStore::in_memory();
        let session = store.snapshot();
        assert_eq!(session.token(), None);
        assert_eq!(session.refresh_token(), None);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_set_credentials_access_refresh() {
        let store = AuthStore::in_memory();
        store.set_credentials(&Credentials::new("a", "b")).unwrap();

        let session = store.snapshot();
        assert_eq!(session.token(), Some("a"));
        assert_eq!(session.refresh_token(), Some("b"));
        assert!(session.is_authenticated());
        assert_eq!(store.storage().get(TOKEN_KEY).as_deref(), Some("a"));
        assert_eq!(store.storage().get(REFRESH_TOKEN_KEY).as_deref(), Some("b"));
    }

    #[test]
    fn test_set_credentials_camel_case_convention() {
        let store = AuthStore::in_memory();
        let creds: Credentials =
            serde_json::from_str(r#"{"accessToken": "at", "idToken": "it"}"#).unwrap();
        store.set_credentials(&creds).unwrap();

        let session = store.snapshot();
        assert_eq!(session.token(), Some("at"));
        assert_eq!(session.refresh_token(), Some("it"));
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_camel_case_wins_over_short_names() {
        let creds = Credentials {
            access: Some("short".into()),
            refresh: Some("short-r".into()),
            access_token: Some("long".into()),
            id_token: Some("long-r".into()),
        };
        let store = AuthStore::in_memory();
        store.set_credentials(&creds).unwrap();
        assert_eq!(store.access_token().as_deref(), Some("long"));
        assert_eq!(store.snapshot().refresh_token(), Some("long-r"));
    }

    #[test]
    fn test_set_credentials_missing_access() {
        let store = AuthStore::in_memory();
        let creds = Credentials {
            refresh: Some("r".into()),
            ..Default::default()
        };
        store.set_credentials(&creds).unwrap();

        assert!(!store.is_authenticated());
        assert_eq!(store.storage().get(TOKEN_KEY), None);
        assert_eq!(store.storage().get(REFRESH_TOKEN_KEY), None);
    }

    #[test]
    fn test_partial_credentials_not_persisted() {
        let store = AuthStore::in_memory();
        let creds = Credentials {
            access: Some("a".into()),
            ..Default::default()
        };
        store.set_credentials(&creds).unwrap();

        // Authenticated in memory, but nothing written.
        assert!(store.is_authenticated());
        assert_eq!(store.storage().get(TOKEN_KEY), None);
    }

    #[test]
    fn test_empty_strings_count_as_absent() {
        let store = AuthStore::in_memory();
        store.set_credentials(&Credentials::new("", "b")).unwrap();
        assert!(!store.is_authenticated());
        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn test_hydrate_does_not_touch_storage() {
        let store = AuthStore::in_memory();
        store.hydrate("t1", "r1");

        let session = store.snapshot();
        assert!(session.is_authenticated());
        assert_eq!(session.token(), Some("t1"));
        assert_eq!(store.storage().get(TOKEN_KEY), None);

        // Same values again is a no-op.
        store.hydrate("t1", "r1");
        assert_eq!(store.snapshot(), session);
    }

    #[test]
    fn test_logout_clears_everything() {
        let store = AuthStore::in_memory();
        store.set_credentials(&Credentials::new("a", "b")).unwrap();
        store.logout().unwrap();

        assert_eq!(store.snapshot(), Session::default());
        assert_eq!(store.storage().get(TOKEN_KEY), None);
        assert_eq!(store.storage().get(REFRESH_TOKEN_KEY), None);

        // Idempotent.
        store.logout().unwrap();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let path = temp_session_path("roundtrip");
        let store = FileTokenStore::new(&path);
        store.set(TOKEN_KEY, "abc").unwrap();
        store.set(REFRESH_TOKEN_KEY, "def").unwrap();

        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.get(TOKEN_KEY).as_deref(), Some("abc"));
        assert_eq!(reopened.get(REFRESH_TOKEN_KEY).as_deref(), Some("def"));

        reopened.remove(TOKEN_KEY).unwrap();
        reopened.remove(REFRESH_TOKEN_KEY).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_file_store_remove_missing_is_ok() {
        let path = temp_session_path("missing");
        let store = FileTokenStore::new(&path);
        assert!(store.remove(TOKEN_KEY).is_ok());
        assert_eq!(store.get(TOKEN_KEY), None);
    }

    #[test]
    fn test_file_store_corrupt_file_reads_empty() {
        let path = temp_session_path("corrupt");
        std::fs::write(&path, "not json").unwrap();
        let store = FileTokenStore::new(&path);
        assert_eq!(store.get(TOKEN_KEY), None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_session_serializes_snake_case() {
        let store = AuthStore::in_memory();
        store.hydrate("t", "r");
        let json = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(json["token"], "t");
        assert_eq!(json["refresh_token"], "r");
        assert_eq!(json["is_authenticated"], true);
    }
}
