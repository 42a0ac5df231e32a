//! Live connection bookkeeping.
//!
//! The registry only records which connections exist; it is never used to
//! mutate a connection. Per-connection counters and timestamps live on the
//! [`Connection`] struct owned by that connection's loop, so they disappear
//! with the loop.
//!
//! # Thread Safety
//!
//! The map is behind a `RwLock` and every method takes `&self`, so one
//! `Arc<ConnectionRegistry>` is shared by the accept path, every connection
//! loop and the health endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Stable identity of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable state of one connection, owned by its handling loop.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    accepted_at: Instant,
    last_admitted_at: Instant,
    frame_sequence: u64,
}

impl Connection {
    /// Create the state for a connection accepted at `accepted_at`.
    pub fn new(id: ConnectionId, peer: Option<SocketAddr>, accepted_at: Instant) -> Self {
        Self {
            id,
            peer,
            accepted_at,
            last_admitted_at: accepted_at,
            frame_sequence: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn accepted_at(&self) -> Instant {
        self.accepted_at
    }

    pub fn last_admitted_at(&self) -> Instant {
        self.last_admitted_at
    }

    /// Number of frames processed successfully so far.
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    pub(crate) fn mark_admitted(&mut self, now: Instant) {
        self.last_admitted_at = now;
    }

    pub(crate) fn record_processed(&mut self) {
        self.frame_sequence += 1;
    }
}

/// Registry entry, exposed for observability.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
}

/// Process-wide set of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionInfo>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every write is a single insert/remove/clear, so a poisoned map is still
    // consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, ConnectionInfo>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, ConnectionInfo>> {
        self.connections.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a freshly accepted connection.
    ///
    /// The returned guard deregisters the connection when dropped, so every
    /// exit path of the connection loop releases its entry exactly once.
    pub fn register(self: &Arc<Self>, connection: &Connection) -> ConnectionGuard {
        let info = ConnectionInfo {
            id: connection.id(),
            peer: connection.peer(),
            connected_at: Utc::now(),
        };
        let total = {
            let mut connections = self.write();
            connections.insert(info.id, info);
            connections.len()
        };
        info!(
            "Client {} connected. Total connections: {}",
            connection.id(),
            total
        );

        ConnectionGuard {
            registry: Arc::clone(self),
            id: connection.id(),
        }
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let (removed, total) = {
            let mut connections = self.write();
            let removed = connections.remove(&id).is_some();
            (removed, connections.len())
        };
        if removed {
            info!("Client {} disconnected. Total connections: {}", id, total);
        }
        removed
    }

    /// Number of live connections.
    pub fn snapshot(&self) -> usize {
        self.read().len()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.read().contains_key(&id)
    }

    /// Registry entries, reported by the health endpoint.
    pub fn list(&self) -> Vec<ConnectionInfo> {
        self.read().values().cloned().collect()
    }

    /// Drop every entry (server shutdown). Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut connections = self.write();
        let count = connections.len();
        connections.clear();
        count
    }
}

/// Deregisters its connection when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Whether the connection is still registered (false after shutdown).
    pub fn is_live(&self) -> bool {
        self.registry.is_registered(self.id)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
