//! Per-session review state and the concurrent session map

use crate::scoring::ScoringResult;
use crate::types::performance::PerformanceTable;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Where a session is in the upload -> score -> export sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NoUpload,
    Uploaded,
    Scored,
    Exported,
    Error,
}

/// Everything one client session carries between requests.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub phase: SessionPhase,
    /// Fully written upload, if any
    pub uploaded_path: Option<PathBuf>,
    /// Always a key of `performance_table` when set
    pub selected_model_name: Option<String>,
    pub performance_table: PerformanceTable,
    /// Cached result for the current upload
    pub scoring: Option<ScoringResult>,
    /// Last user-facing message
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            phase: SessionPhase::NoUpload,
            uploaded_path: None,
            selected_model_name: None,
            performance_table: PerformanceTable::new(),
            scoring: None,
            message: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Move to `Error` with a message for the operator.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.phase = SessionPhase::Error;
        self.message = Some(message.into());
    }

    pub fn is_idle_for(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > ttl
    }
}

/// Thread-safe session map keyed by session id.
///
/// Callers work on snapshots and write them back; sessions never share state.
/// A read-modify-write of one session runs under [`with_session_lock`], so
/// concurrent requests on the same id are serialised and expiry never removes
/// a session that is mid-request.
///
/// [`with_session_lock`]: SessionManager::with_session_lock
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, SessionState>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Run `f` while holding the lock of `session_id`.
    pub fn with_session_lock<T>(&self, session_id: &str, f: impl FnOnce() -> T) -> T {
        loop {
            let lock = self.session_lock(session_id);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            // expiry may have retired this lock while we waited on it
            let current = self
                .locks
                .get(session_id)
                .is_some_and(|registered| Arc::ptr_eq(registered.value(), &lock));
            if current {
                return f();
            }
        }
    }

    /// Snapshot of a session, if it exists.
    pub fn get_session(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    /// Snapshot of a session, creating it when missing.
    pub fn get_or_create(&self, session_id: &str) -> SessionState {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(session_id))
            .clone()
    }

    pub fn update_session(&self, state: SessionState) {
        self.sessions.insert(state.session_id.clone(), state);
    }

    pub fn remove_session(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.remove(session_id).map(|(_, v)| v)
    }

    /// Remove and return every session idle for longer than `ttl`.
    pub fn take_expired(&self, ttl: Duration) -> Vec<SessionState> {
        self.take_expired_with(ttl, |_| {})
    }

    /// [`take_expired`](Self::take_expired), calling `on_expire` for each
    /// removed session while its lock is still held. Sessions with a request
    /// in flight are skipped.
    pub fn take_expired_with(
        &self,
        ttl: Duration,
        mut on_expire: impl FnMut(&SessionState),
    ) -> Vec<SessionState> {
        let now = Utc::now();
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle_for(ttl, now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut expired = Vec::with_capacity(candidates.len());
        for id in candidates {
            let lock = self.session_lock(&id);
            let Ok(_guard) = lock.try_lock() else {
                continue;
            };
            let still_idle = self
                .get_session(&id)
                .is_some_and(|state| state.is_idle_for(ttl, now));
            if !still_idle {
                continue;
            }
            self.locks.remove(&id);
            if let Some(state) = self.remove_session(&id) {
                on_expire(&state);
                expired.push(state);
            }
        }
        expired
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_has_no_upload() {
        let state = SessionState::new("s1");
        assert_eq!(state.phase, SessionPhase::NoUpload);
        assert!(state.uploaded_path.is_none());
        assert!(state.selected_model_name.is_none());
        assert!(state.performance_table.is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let manager = SessionManager::new();
        let mut a = manager.get_or_create("a");
        manager.get_or_create("b");

        a.selected_model_name = Some("ECOD".to_string());
        manager.update_session(a);

        assert_eq!(
            manager.get_session("a").unwrap().selected_model_name.as_deref(),
            Some("ECOD")
        );
        assert!(manager.get_session("b").unwrap().selected_model_name.is_none());
        assert_eq!(manager.session_count(), 2);
    }

    #[test]
    fn test_get_or_create_keeps_existing_state() {
        let manager = SessionManager::new();
        let mut state = manager.get_or_create("a");
        state.phase = SessionPhase::Scored;
        manager.update_session(state);

        assert_eq!(manager.get_or_create("a").phase, SessionPhase::Scored);
    }

    #[test]
    fn test_take_expired() {
        let manager = SessionManager::new();
        manager.get_or_create("fresh");
        let mut stale = manager.get_or_create("stale");
        stale.last_activity = Utc::now() - Duration::hours(3);
        manager.update_session(stale);

        let removed = manager.take_expired(Duration::hours(1));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].session_id, "stale");
        assert!(manager.get_session("fresh").is_some());
        assert!(manager.get_session("stale").is_none());
    }

    #[test]
    fn test_concurrent_updates_on_one_session_are_not_lost() {
        let manager = SessionManager::new();
        manager.get_or_create("shared");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        manager.with_session_lock("shared", || {
                            let mut state = manager.get_session("shared").unwrap();
                            let count: u32 =
                                state.message.as_deref().unwrap_or("0").parse().unwrap();
                            std::thread::yield_now();
                            state.message = Some((count + 1).to_string());
                            manager.update_session(state);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = manager.get_session("shared").unwrap();
        assert_eq!(state.message.as_deref(), Some("800"));
    }

    #[test]
    fn test_expiry_skips_session_in_flight() {
        let manager = SessionManager::new();
        let mut stale = manager.get_or_create("busy");
        stale.last_activity = Utc::now() - Duration::hours(3);
        manager.update_session(stale);

        let removed =
            manager.with_session_lock("busy", || manager.take_expired(Duration::hours(1)));
        assert!(removed.is_empty());
        assert!(manager.get_session("busy").is_some());

        let mut seen = Vec::new();
        let removed =
            manager.take_expired_with(Duration::hours(1), |s| seen.push(s.session_id.clone()));
        assert_eq!(removed.len(), 1);
        assert_eq!(seen, vec!["busy".to_string()]);
        assert!(manager.get_session("busy").is_none());

        // the id is usable again after its lock was retired
        manager.with_session_lock("busy", || manager.get_or_create("busy"));
        assert!(manager.get_session("busy").is_some());
    }

    #[test]
    fn test_fail_sets_error_phase() {
        let mut state = SessionState::new("s");
        state.fail("File not found");
        assert_eq!(state.phase, SessionPhase::Error);
        assert_eq!(state.message.as_deref(), Some("File not found"));
    }
}
