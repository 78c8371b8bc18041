use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::{generate_secure_id, Session, SessionData};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Abstract session storage backend
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Get session data by ID; expired sessions are reported as missing
    async fn get(&self, session_id: &str) -> Result<Option<SessionData>>;

    async fn set(&self, session_id: &str, data: &SessionData) -> Result<()>;

    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Remove expired sessions, returning how many were dropped
    async fn cleanup_expired(&self) -> Result<usize>;

    fn backend_name(&self) -> &'static str;
}

/// In-memory session storage on a concurrent map
#[derive(Clone)]
pub struct MemorySessionStorage {
    sessions: Arc<DashMap<String, SessionData>>,
    idle_timeout: Duration,
}

impl MemorySessionStorage {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for MemorySessionStorage {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn get(&self, session_id: &str) -> Result<Option<SessionData>> {
        let timeout = self.idle_timeout.as_secs();
        if let Some(mut session_data) = self.sessions.get_mut(session_id) {
            if session_data.is_expired(timeout) {
                drop(session_data);
                self.sessions.remove(session_id);
                log::debug!("MemoryStorage: Session {} expired and removed", session_id);
                return Ok(None);
            }
            session_data.touch();
            Ok(Some(session_data.clone()))
        } else {
            log::debug!("MemoryStorage: Session {} not found", session_id);
            Ok(None)
        }
    }

    async fn set(&self, session_id: &str, data: &SessionData) -> Result<()> {
        self.sessions.insert(session_id.to_string(), data.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let timeout = self.idle_timeout.as_secs();
        let before = self.sessions.len();
        self.sessions.retain(|_, data| !data.is_expired(timeout));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            log::debug!("MemoryStorage: cleaned up {} expired sessions", removed);
        }
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Session lifecycle on top of a storage backend, plus cookie formatting
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    config: SessionConfig,
}

impl SessionStore {
    /// In-memory store configured from the `[session]` section
    pub fn new(config: SessionConfig) -> Self {
        let storage = MemorySessionStorage::new(Duration::from_secs(config.idle_timeout));
        Self::with_storage(Arc::new(storage), config)
    }

    pub fn with_storage(storage: Arc<dyn SessionStorage>, config: SessionConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self
            .storage
            .get(session_id)
            .await?
            .map(|data| Session::from_data(session_id, data)))
    }

    /// Create and persist a fresh session
    pub async fn create(&self) -> Result<Session> {
        let session = Session::new(&generate_secure_id(32));
        self.storage.set(session.id(), &session.to_data()?).await?;
        log::debug!("Created session {}", session.id());
        Ok(session)
    }

    /// Load the session for `session_id`, or create a new one
    pub async fn load_or_create(&self, session_id: Option<&str>) -> Result<Session> {
        if let Some(id) = session_id {
            if let Some(session) = self.load(id).await? {
                return Ok(session);
            }
        }
        self.create().await
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        self.storage.set(session.id(), &session.to_data()?).await
    }

    pub async fn destroy(&self, session_id: &str) -> Result<()> {
        self.storage.delete(session_id).await
    }

    pub async fn cleanup_expired(&self) -> Result<usize> {
        self.storage.cleanup_expired().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }

    /// `Set-Cookie` value carrying the session id
    pub fn create_cookie(&self, session_id: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
            self.config.cookie_name, session_id, self.config.same_site, self.config.idle_timeout
        );
        if self.config.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_or_create_round_trip() {
        let store = SessionStore::new(SessionConfig::default());

        let session = store.load_or_create(None).await.unwrap();
        session.set("name", "ada").unwrap();
        store.save(&session).await.unwrap();

        let loaded = store.load_or_create(Some(session.id())).await.unwrap();
        assert_eq!(loaded.id(), session.id());
        assert_eq!(loaded.get::<String>("name"), Some("ada".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_id_creates_new_session() {
        let store = SessionStore::new(SessionConfig::default());
        let session = store.load_or_create(Some("missing")).await.unwrap();
        assert_ne!(session.id(), "missing");
        assert_eq!(session.id().len(), 32);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_dropped() {
        let storage = MemorySessionStorage::new(Duration::from_secs(0));
        let mut data = SessionData::new();
        data.last_accessed = data.last_accessed.saturating_sub(10);
        storage.set("old", &data).await.unwrap();

        assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
        assert_eq!(storage.session_count(), 0);
    }

    #[test]
    fn test_cookie_format() {
        let mut config = SessionConfig::default();
        config.secure = true;
        let store = SessionStore::new(config);

        let cookie = store.create_cookie("abc");
        assert!(cookie.starts_with("squehub_session=abc; Path=/; HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.ends_with("; Secure"));
    }
}
