//! Per-request protocol sessions.
//!
//! A [`SessionFactory`] builds a fresh [`SchemaService`] for every inbound
//! HTTP request. Each service owns one [`SessionLifecycle`] that walks
//! `Created -> Bound -> Active -> Closed`. The HTTP handler holds a
//! [`SessionScope`] for the length of the request, so the session closes when
//! the response is written or the client goes away. Dropping the last handle
//! closes it too.

use crate::db::{ConnectionPool, ReadOnlyExecutor};
use crate::mcp::SchemaService;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    /// Adopted by a transport, waiting for or between operations
    Bound = 1,
    /// Processing a request
    Active = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Bound,
            2 => Self::Active,
            _ => Self::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Bound => "bound",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State tracker for one session.
///
/// Closed is terminal; transitions requested after it are ignored.
#[derive(Debug)]
pub struct SessionLifecycle {
    id: String,
    state: AtomicU8,
    in_flight: AtomicUsize,
    live_sessions: Arc<AtomicUsize>,
}

impl SessionLifecycle {
    fn new(live_sessions: Arc<AtomicUsize>) -> Self {
        let id = Uuid::new_v4().to_string();
        let live = live_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(session_id = %id, live_sessions = live, "Session created");
        Self {
            id,
            state: AtomicU8::new(SessionState::Created as u8),
            in_flight: AtomicUsize::new(0),
            live_sessions,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Mark the session as adopted by its transport.
    pub fn bind(&self) {
        self.transition(&[SessionState::Created], SessionState::Bound);
    }

    /// Mark the start of an operation. The session stays `Active` until every
    /// returned guard has dropped.
    pub fn enter(self: &Arc<Self>) -> ActiveOperation {
        self.bind();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.transition(&[SessionState::Bound, SessionState::Active], SessionState::Active);
        ActiveOperation {
            lifecycle: Arc::clone(self),
        }
    }

    /// Guard that closes the session when dropped, however the owner exits.
    pub fn scope(self: &Arc<Self>) -> SessionScope {
        SessionScope {
            lifecycle: Arc::clone(self),
        }
    }

    /// Close the session. Idempotent.
    pub fn close(&self) {
        let previous = self.state.swap(SessionState::Closed as u8, Ordering::SeqCst);
        if SessionState::from_u8(previous) != SessionState::Closed {
            let live = self.live_sessions.fetch_sub(1, Ordering::SeqCst) - 1;
            debug!(session_id = %self.id, live_sessions = live, "Session closed");
        }
    }

    fn leave(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.transition(&[SessionState::Active], SessionState::Bound);
        }
    }

    fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        let current = self.state();
        if current == to {
            return true;
        }
        if !from.contains(&current) {
            debug!(session_id = %self.id, from = %current, to = %to, "Ignoring session transition");
            return false;
        }
        self.state
            .compare_exchange(current as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Drop for SessionLifecycle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Keeps its session `Active` while alive.
#[derive(Debug)]
pub struct ActiveOperation {
    lifecycle: Arc<SessionLifecycle>,
}

impl Drop for ActiveOperation {
    fn drop(&mut self) {
        self.lifecycle.leave();
    }
}

/// Closes its session on drop. Held by the transport for the length of one
/// request, so a dropped request closes the session even if spawned work still
/// holds a handle to it.
#[derive(Debug)]
pub struct SessionScope {
    lifecycle: Arc<SessionLifecycle>,
}

impl SessionScope {
    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        self.lifecycle.close();
    }
}

/// Builds one [`SchemaService`] per inbound request.
///
/// Holds only shared handles; nothing request-specific survives a session.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    pool: Arc<ConnectionPool>,
    executor: Arc<ReadOnlyExecutor>,
    live_sessions: Arc<AtomicUsize>,
    sessions_created: Arc<AtomicU64>,
}

impl SessionFactory {
    pub fn new(pool: Arc<ConnectionPool>, query_timeout: Duration) -> Self {
        let executor = Arc::new(ReadOnlyExecutor::new(Arc::clone(&pool), query_timeout));
        Self {
            pool,
            executor,
            live_sessions: Arc::new(AtomicUsize::new(0)),
            sessions_created: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A new session in the `Created` state.
    pub fn create(&self) -> SchemaService {
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        let lifecycle = Arc::new(SessionLifecycle::new(Arc::clone(&self.live_sessions)));
        SchemaService::new(Arc::clone(&self.pool), Arc::clone(&self.executor), lifecycle)
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Sessions not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    pub fn sessions_created(&self) -> u64 {
        self.sessions_created.load(Ordering::SeqCst)
    }
}
