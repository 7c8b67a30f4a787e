//! Session context — bearer tokens for the customer and admin namespaces
//!
//! Tokens live in a key/value `TokenStorage` (durable file or in-memory).
//! Each `Session` is bound to one `SessionScope`; `Sessions` holds the two
//! named instances and picks one from a request path.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ParcelError;

/// Which token namespace a request or route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionScope {
    Customer,
    Admin,
}

impl SessionScope {
    /// Admin-prefixed API paths authenticate with the admin token.
    pub fn for_path(path: &str) -> Self {
        if path.starts_with("/admin") {
            SessionScope::Admin
        } else {
            SessionScope::Customer
        }
    }

    pub fn token_key(self) -> &'static str {
        match self {
            SessionScope::Customer => "auth_token",
            SessionScope::Admin => "adminToken",
        }
    }

    pub fn user_key(self) -> &'static str {
        match self {
            SessionScope::Customer => "user",
            SessionScope::Admin => "adminUser",
        }
    }

    pub fn login_route(self) -> &'static str {
        match self {
            SessionScope::Customer => "/login",
            SessionScope::Admin => "/admin/login",
        }
    }

    pub fn verify_path(self) -> &'static str {
        match self {
            SessionScope::Customer => "/auth/verify",
            SessionScope::Admin => "/admin/auth/verify",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SessionScope::Customer => "customer",
            SessionScope::Admin => "admin",
        }
    }
}

/// Durable string storage, the client-side equivalent of a key/value store.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), ParcelError>;
    fn remove(&self, key: &str) -> Result<(), ParcelError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ParcelError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ParcelError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// JSON-object file storage. Every write rewrites the file through a
/// temporary sibling and a rename.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file. A missing file is empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ParcelError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Map::new(),
            Ok(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => {
                    return Err(ParcelError::Storage(format!(
                        "{} does not contain a JSON object",
                        path.display()
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "Session storage opened");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), ParcelError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .get(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ParcelError> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), Value::String(value.to_string()));
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<(), ParcelError> {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

/// One token namespace over shared storage.
#[derive(Clone)]
pub struct Session {
    scope: SessionScope,
    storage: Arc<dyn TokenStorage>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("scope", &self.scope)
            .field("has_token", &self.token().is_some())
            .finish()
    }
}

impl Session {
    pub fn new(scope: SessionScope, storage: Arc<dyn TokenStorage>) -> Self {
        Self { scope, storage }
    }

    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    /// Stored bearer token; empty strings count as absent.
    pub fn token(&self) -> Option<String> {
        self.storage
            .get(self.scope.token_key())
            .filter(|t| !t.is_empty())
    }

    pub fn is_present(&self) -> bool {
        self.token().is_some()
    }

    /// Cached user record stored next to the token at login.
    pub fn user(&self) -> Option<Value> {
        self.storage
            .get(self.scope.user_key())
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub fn store_login(&self, token: &str, user: &Value) -> Result<(), ParcelError> {
        self.storage.set(self.scope.token_key(), token)?;
        self.storage
            .set(self.scope.user_key(), &serde_json::to_string(user)?)?;
        tracing::info!(scope = self.scope.name(), "Session stored");
        Ok(())
    }

    /// Drop only the token (used before a fresh login attempt).
    pub fn clear_token(&self) -> Result<(), ParcelError> {
        self.storage.remove(self.scope.token_key())
    }

    pub fn clear(&self) -> Result<(), ParcelError> {
        self.storage.remove(self.scope.token_key())?;
        self.storage.remove(self.scope.user_key())?;
        tracing::info!(scope = self.scope.name(), "Session cleared");
        Ok(())
    }
}

/// The customer and admin sessions, injected into the HTTP client.
#[derive(Clone, Debug)]
pub struct Sessions {
    pub customer: Session,
    pub admin: Session,
}

impl Sessions {
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            customer: Session::new(SessionScope::Customer, storage.clone()),
            admin: Session::new(SessionScope::Admin, storage),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn get(&self, scope: SessionScope) -> &Session {
        match scope {
            SessionScope::Customer => &self.customer,
            SessionScope::Admin => &self.admin,
        }
    }

    pub fn for_path(&self, path: &str) -> &Session {
        self.get(SessionScope::for_path(path))
    }
}
