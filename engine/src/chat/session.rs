//! Conversation sessions
//!
//! Sessions live only in memory. Each one is behind its own lock so a
//! conversation runs one turn at a time while different conversations run
//! independently. Idle sessions are removed by a periodic sweeper task.

use crate::llm::Message;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// One conversation's history.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub history: Vec<Message>,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            history: Vec::new(),
            created_at: now,
            last_accessed_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Instant::now();
    }
}

/// Session table keyed by id.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Arc<Mutex<Session>>>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Fetch a session, creating it when the id is unknown or absent.
    pub async fn get_or_create(&self, id: Option<&str>) -> Arc<Mutex<Session>> {
        let id = id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(id.clone())
            .or_insert_with(|| {
                debug!("Session {} created", id);
                Arc::new(Mutex::new(Session::new(id.clone())))
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    /// Drop every session idle for longer than the TTL. Returns how many went.
    ///
    /// A session whose lock is held is mid-turn and therefore not idle.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(session) => now.duration_since(session.last_accessed_at) <= self.ttl,
            Err(_) => true,
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Swept {} idle sessions ({} remain)", removed, sessions.len());
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the handle is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_reuses_ids() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.get_or_create(Some("s1")).await;
        a.lock().await.history.push(Message::user("hello"));

        let again = store.get_or_create(Some("s1")).await;
        assert_eq!(again.lock().await.history.len(), 1);

        let fresh = store.get_or_create(None).await;
        assert_ne!(fresh.lock().await.id, "s1");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_sessions() {
        let store = SessionStore::new(Duration::from_millis(20));
        store.get_or_create(Some("old")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let recent = store.get_or_create(Some("recent")).await;
        recent.lock().await.touch();

        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(!store.remove("old").await);
    }

    #[tokio::test]
    async fn test_busy_session_survives_sweep() {
        let store = SessionStore::new(Duration::from_millis(10));
        let session = store.get_or_create(Some("busy")).await;
        let _turn = session.lock().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_and_aborts() {
        let store = SessionStore::new(Duration::from_millis(10));
        store.get_or_create(Some("idle")).await;

        let handle = store.spawn_sweeper(Duration::from_millis(15));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty().await);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
