//! Session registry: which connection is joined under which username.
//!
//! Pure state, no transport knowledge. All mutation goes through a single
//! `RwLock`, so the uniqueness check and the insert are one atomic step.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Opaque id for one live transport connection.
pub type ConnId = String;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("username is already taken")]
    UsernameTaken,

    #[error("connection already has a session")]
    AlreadyRegistered,
}

/// A joined connection's state. Immutable once created.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

/// Live mapping from connection id to session.
///
/// Invariants: no duplicate usernames (case-sensitive exact match) among
/// live sessions, and at most one session per connection id.
pub struct Registry {
    sessions: RwLock<HashMap<ConnId, Session>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session for `conn` under `username`.
    ///
    /// Fails without mutating anything if the connection already has a
    /// session or the username is held by another connection. Both checks
    /// happen under the same write lock as the insert, so two simultaneous
    /// registrations of the same name cannot both succeed.
    pub async fn register(&self, conn: &ConnId, username: String) -> RegistryResult<Session> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(conn) {
            return Err(RegistryError::AlreadyRegistered);
        }

        if sessions.values().any(|s| s.username == username) {
            return Err(RegistryError::UsernameTaken);
        }

        let session = Session {
            username,
            joined_at: Utc::now(),
        };
        sessions.insert(conn.clone(), session.clone());
        Ok(session)
    }

    /// Remove and return the session for `conn`, if any. Safe to call on
    /// connections that never joined or were already unregistered.
    pub async fn unregister(&self, conn: &ConnId) -> Option<Session> {
        self.sessions.write().await.remove(conn)
    }

    /// Look up the session for `conn`.
    pub async fn get(&self, conn: &ConnId) -> Option<Session> {
        self.sessions.read().await.get(conn).cloned()
    }

    /// Snapshot of all joined connections, taken under one read lock.
    pub async fn joined(&self) -> Vec<(ConnId, Session)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(conn, session)| (conn.clone(), session.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn conn() -> ConnId {
        ulid::Ulid::new().to_string()
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = Registry::new();
        let a = conn();

        let session = registry.register(&a, "alice".to_string()).await.unwrap();
        assert_eq!(session.username, "alice");

        let found = registry.get(&a).await.unwrap();
        assert_eq!(found.username, "alice");
        assert_eq!(found.joined_at, session.joined_at);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected_without_mutation() {
        let registry = Registry::new();
        let a = conn();
        let b = conn();

        registry.register(&a, "alice".to_string()).await.unwrap();
        let err = registry.register(&b, "alice".to_string()).await.unwrap_err();
        assert_eq!(err, RegistryError::UsernameTaken);

        // Loser left no trace, winner untouched
        assert!(registry.get(&b).await.is_none());
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(&a).await.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_usernames_are_case_sensitive() {
        let registry = Registry::new();

        registry.register(&conn(), "Alice".to_string()).await.unwrap();
        registry.register(&conn(), "alice".to_string()).await.unwrap();
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_second_session_per_connection_is_rejected() {
        let registry = Registry::new();
        let a = conn();

        registry.register(&a, "alice".to_string()).await.unwrap();
        let err = registry.register(&a, "alice2".to_string()).await.unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered);

        // Existing session survives
        assert_eq!(registry.get(&a).await.unwrap().username, "alice");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = Registry::new();
        let a = conn();

        registry.register(&a, "alice".to_string()).await.unwrap();
        assert_eq!(registry.unregister(&a).await.unwrap().username, "alice");
        assert!(registry.unregister(&a).await.is_none());
        assert!(registry.unregister(&conn()).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_username_is_free_again_after_unregister() {
        let registry = Registry::new();
        let a = conn();
        let b = conn();

        registry.register(&a, "alice".to_string()).await.unwrap();
        registry.unregister(&a).await;
        registry.register(&b, "alice".to_string()).await.unwrap();
        assert_eq!(registry.get(&b).await.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_joined_snapshot() {
        let registry = Registry::new();
        let a = conn();
        let b = conn();

        registry.register(&a, "alice".to_string()).await.unwrap();
        registry.register(&b, "bob".to_string()).await.unwrap();

        let mut names: Vec<String> = registry
            .joined()
            .await
            .into_iter()
            .map(|(_, s)| s.username)
            .collect();
        names.sort();
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_registrations_of_same_name_admit_one() {
        let registry = Arc::new(Registry::new());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.register(&conn(), "alice".to_string()).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(registry.len().await, 1);
    }
}
