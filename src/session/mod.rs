//! Cookie-identified sessions with flash storage
//!
//! A [`Session`] keeps two JSON objects: persistent data and flash data.
//! Flash values are consumed on read. One-time notifications shown by the
//! `@notification` directive are stored as data under `notification_<type>`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod storage;

pub use storage::{MemorySessionStorage, SessionStorage, SessionStore};

/// Notification kinds returned by [`Session::all_notifications`]
pub const NOTIFICATION_TYPES: [&str; 4] = ["success", "error", "info", "warning"];

/// Session data structure for storage backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub data: Value,
    pub flash: Value,
    pub created_at: u64,
    pub last_accessed: u64,
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionData {
    pub fn new() -> Self {
        let now = unix_timestamp();
        Self {
            data: Value::Object(serde_json::Map::new()),
            flash: Value::Object(serde_json::Map::new()),
            created_at: now,
            last_accessed: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = unix_timestamp();
    }

    pub fn is_expired(&self, idle_timeout_secs: u64) -> bool {
        unix_timestamp().saturating_sub(self.last_accessed) > idle_timeout_secs
    }
}

/// Get current Unix timestamp in seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Generate a random alphanumeric session ID
pub fn generate_secure_id(length: usize) -> String {
    use rand::distributions::Alphanumeric;
    use rand::{thread_rng, Rng};

    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Thread-safe session shared between middleware, handlers and views
#[derive(Clone)]
pub struct Session {
    id: String,
    data: Arc<RwLock<Value>>,
    flash: Arc<RwLock<Value>>,
    created_at: u64,
}

impl Session {
    pub fn new(id: &str) -> Self {
        Self::from_data(id, SessionData::new())
    }

    pub fn from_data(id: &str, session_data: SessionData) -> Self {
        Self {
            id: id.to_string(),
            data: Arc::new(RwLock::new(session_data.data)),
            flash: Arc::new(RwLock::new(session_data.flash)),
            created_at: session_data.created_at,
        }
    }

    /// Snapshot for the storage backend
    pub fn to_data(&self) -> Result<SessionData> {
        let data = self
            .data
            .read()
            .map_err(|_| Error::session("Failed to acquire read lock for session data"))?
            .clone();
        let flash = self
            .flash
            .read()
            .map_err(|_| Error::session("Failed to acquire read lock for flash data"))?
            .clone();

        Ok(SessionData {
            data,
            flash,
            created_at: self.created_at,
            last_accessed: unix_timestamp(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut data = self
            .data
            .write()
            .map_err(|_| Error::session("Failed to acquire write lock for session data"))?;
        if let Value::Object(ref mut map) = *data {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = self.data.read().ok()?;
        data.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Raw JSON value stored under `key`
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.data.read().ok()?.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut data = self.data.write().ok()?;
        match *data {
            Value::Object(ref mut map) => map.remove(key),
            _ => None,
        }
    }

    /// Drop all persistent data, keeping the id
    pub fn clear(&self) {
        if let Ok(mut data) = self.data.write() {
            *data = Value::Object(serde_json::Map::new());
        }
    }

    pub fn flash_set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut flash = self
            .flash
            .write()
            .map_err(|_| Error::session("Failed to acquire write lock for flash data"))?;
        if let Value::Object(ref mut map) = *flash {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Read and consume a flash value
    pub fn flash_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut flash = self.flash.write().ok()?;
        match *flash {
            Value::Object(ref mut map) => {
                map.remove(key).and_then(|v| serde_json::from_value(v).ok())
            }
            _ => None,
        }
    }

    /// Read and consume every flash value
    pub fn flash_get_all(&self) -> HashMap<String, Value> {
        let mut flash = match self.flash.write() {
            Ok(flash) => flash,
            Err(_) => return HashMap::new(),
        };
        match std::mem::replace(&mut *flash, Value::Object(serde_json::Map::new())) {
            Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    pub fn flash_clear(&self) {
        if let Ok(mut flash) = self.flash.write() {
            *flash = Value::Object(serde_json::Map::new());
        }
    }

    /// Store a one-time notification of the given type
    pub fn notify(&self, kind: &str, message: impl Into<String>) -> Result<()> {
        self.set(&notification_key(kind), message.into())
    }

    /// Take the notification of the given type, clearing it
    ///
    /// An empty message counts as absent and is left untouched.
    pub fn take_notification(&self, kind: &str) -> Option<String> {
        let key = notification_key(kind);
        match self.get::<String>(&key) {
            Some(message) if !message.is_empty() => {
                self.remove(&key);
                Some(message)
            }
            _ => None,
        }
    }

    /// Take every known notification type that currently holds a message
    pub fn all_notifications(&self) -> HashMap<String, String> {
        NOTIFICATION_TYPES
            .iter()
            .filter_map(|kind| {
                self.take_notification(kind)
                    .map(|message| (kind.to_string(), message))
            })
            .collect()
    }

    /// Persistent data as a JSON value, for templates
    pub fn to_value(&self) -> Value {
        self.data
            .read()
            .map(|data| data.clone())
            .unwrap_or(Value::Null)
    }
}

fn notification_key(kind: &str) -> String {
    format!("notification_{}", kind)
}
