//! Registry of live P4Runtime sessions.
//!
//! The registry is an ordinary value owned by whoever needs bulk shutdown
//! (typically the process driver). Sessions register on creation; the
//! registry keeps weak references only, so it never extends a session's
//! lifetime.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{P4rtError, P4rtResult};

/// A session the registry can shut down.
pub trait ManagedSession: Send + Sync {
    /// Session name (for logging and reports).
    fn name(&self) -> &str;

    /// Shuts the session down.
    fn shutdown(&self) -> P4rtResult<()>;
}

/// Outcome of [`SessionRegistry::shutdown_all`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Sessions shut down cleanly.
    pub shut_down: usize,
    /// Sessions whose shutdown failed, in registration order.
    pub failed: Vec<(String, P4rtError)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Process-scoped list of live sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Weak<dyn ManagedSession>>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("active", &self.active_sessions())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a session.
    pub fn register<S: ManagedSession + 'static>(&self, session: &Arc<S>) {
        let weak: Weak<dyn ManagedSession> = Arc::downgrade(session) as Weak<dyn ManagedSession>;
        self.sessions.lock().push(weak);
    }

    /// Names of sessions still alive, in registration order.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock();
        sessions.retain(|s| s.strong_count() > 0);
        sessions
            .iter()
            .filter_map(Weak::upgrade)
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shuts down every live session in registration order and clears the
    /// registry.
    ///
    /// A failing session is recorded in the report and does not stop the
    /// remaining shutdowns.
    pub fn shutdown_all(&self) -> ShutdownReport {
        // Snapshot under the lock; shut down outside it so a session may
        // register or query the registry from its own shutdown path.
        let sessions: Vec<Arc<dyn ManagedSession>> = {
            let mut guard = self.sessions.lock();
            std::mem::take(&mut *guard)
                .iter()
                .filter_map(Weak::upgrade)
                .collect()
        };

        let mut report = ShutdownReport::default();
        for session in sessions {
            match session.shutdown() {
                Ok(()) => report.shut_down += 1,
                Err(e) => {
                    warn!(session = session.name(), error = %e, "Session shutdown failed");
                    report.failed.push((session.name().to_string(), e));
                }
            }
        }

        info!(
            shut_down = report.shut_down,
            failed = report.failed.len(),
            "Shut down all P4Runtime sessions"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSession {
        name: String,
        fail: bool,
        shutdowns: AtomicUsize,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl FakeSession {
        fn new(name: &str, fail: bool, order: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                shutdowns: AtomicUsize::new(0),
                order: order.clone(),
            })
        }
    }

    impl ManagedSession for FakeSession {
        fn name(&self) -> &str {
            &self.name
        }

        fn shutdown(&self) -> P4rtResult<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.order.lock().push(self.name.clone());
            if self.fail {
                Err(P4rtError::Config("stream already torn down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_shutdown_all_continues_past_failure() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = SessionRegistry::new();
        let s1 = FakeSession::new("s1", false, &order);
        let s2 = FakeSession::new("s2", true, &order);
        let s3 = FakeSession::new("s3", false, &order);
        registry.register(&s1);
        registry.register(&s2);
        registry.register(&s3);

        let report = registry.shutdown_all();

        assert_eq!(report.shut_down, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "s2");
        assert!(!report.is_clean());
        for s in [&s1, &s2, &s3] {
            assert_eq!(s.shutdowns.load(Ordering::SeqCst), 1);
        }
        assert_eq!(*order.lock(), vec!["s1", "s2", "s3"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dropped_sessions_are_pruned() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = SessionRegistry::new();
        let s1 = FakeSession::new("s1", false, &order);
        let s2 = FakeSession::new("s2", false, &order);
        registry.register(&s1);
        registry.register(&s2);
        assert_eq!(registry.active_sessions(), vec!["s1", "s2"]);

        drop(s1);
        assert_eq!(registry.active_sessions(), vec!["s2"]);

        let report = registry.shutdown_all();
        assert_eq!(report.shut_down, 1);
        assert_eq!(*order.lock(), vec!["s2"]);
    }

    #[test]
    fn test_concurrent_registration() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(SessionRegistry::new());
        let sessions: Vec<_> = (0..8)
            .map(|i| FakeSession::new(&format!("s{}", i), false, &order))
            .collect();

        std::thread::scope(|scope| {
            for session in &sessions {
                let registry = registry.clone();
                scope.spawn(move || registry.register(session));
            }
        });

        assert_eq!(registry.len(), 8);
        assert_eq!(registry.shutdown_all().shut_down, 8);
    }
}
