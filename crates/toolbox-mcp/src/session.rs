//! Streaming session management.
//!
//! A session is one persistent client connection. Each owns a single
//! outbound queue drained by exactly one writer (the SSE stream), so
//! messages leave in the order they were sent and never interleave.

use crate::dispatcher::Connection;
use crate::error::{McpError, McpResult};
use crate::protocol::Outbound;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// An active streaming session.
pub struct Session {
    id: String,
    created_at: Instant,
    alive: AtomicBool,
    tx: mpsc::UnboundedSender<Outbound>,
    /// Protocol state; held for the duration of each request so requests on
    /// one session are handled one at a time.
    connection: Mutex<Connection>,
    cancel: CancellationToken,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn connection(&self) -> &Mutex<Connection> {
        &self.connection
    }

    /// Cancelled when the session closes.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a message for the writer.
    pub fn send(&self, message: Outbound) -> McpResult<()> {
        if !self.is_alive() {
            return Err(McpError::SessionNotFound(self.id.clone()));
        }
        self.tx
            .send(message)
            .map_err(|_| McpError::SessionNotFound(self.id.clone()))
    }

    /// Mark the session dead. Returns false if it already was.
    fn mark_closed(&self) -> bool {
        let was_alive = self.alive.swap(false, Ordering::AcqRel);
        if was_alive {
            self.cancel.cancel();
        }
        was_alive
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// The set of live sessions.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session listing the tools of `toolset`.
    ///
    /// The receiver is the session's outbound queue; whoever holds it is the
    /// session's only writer. `cancel` is the parent of the session's own
    /// token.
    pub async fn open(
        &self,
        toolset: &str,
        cancel: &CancellationToken,
    ) -> (Arc<Session>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Instant::now(),
            alive: AtomicBool::new(true),
            tx,
            connection: Mutex::new(Connection::new(toolset)),
            cancel: cancel.child_token(),
        });

        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        info!(session_id = %session.id, toolset = %toolset, "MCP session registered");
        (session, rx)
    }

    /// Look up a live session.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|s| s.is_alive())
            .cloned()
    }

    /// Queue a message on a session.
    pub async fn send(&self, id: &str, message: Outbound) -> McpResult<()> {
        match self.get(id).await {
            Some(session) => session.send(message),
            None => Err(McpError::SessionNotFound(id.to_string())),
        }
    }

    /// Close and forget a session. Closing twice is a no-op.
    pub async fn close(&self, id: &str) {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = removed {
            if session.mark_closed() {
                session.connection.lock().await.close();
            }
            info!(session_id = %id, "MCP session unregistered");
        }
    }

    /// Close every session.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in drained {
            session.mark_closed();
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Closes its session when dropped.
///
/// Held by the writer so the session is released however the stream ends,
/// including when the client simply goes away.
pub struct SessionGuard {
    manager: Arc<SessionManager>,
    session: Arc<Session>,
}

impl SessionGuard {
    pub fn new(manager: Arc<SessionManager>, session: Arc<Session>) -> Self {
        Self { manager, session }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.mark_closed();
        let manager = self.manager.clone();
        let id = self.session.id.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { manager.close(&id).await });
        }
    }
}
