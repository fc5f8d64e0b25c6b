// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use super::registry::ConnectionRegistry;
use crate::core::metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Releases a connection's registry entry and gauge slot on every exit path of its handler.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    conn_id: u64,
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub fn new(registry: Arc<ConnectionRegistry>, conn_id: u64, addr: SocketAddr) -> Self {
        Self {
            registry,
            conn_id,
            addr,
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        match self.registry.remove(self.conn_id) {
            Some(info) => debug!(
                "ConnectionGuard dropping, cleaned up {} connection {} ({}) after {:?}.",
                info.encoding,
                self.conn_id,
                self.addr,
                info.connected_at.elapsed()
            ),
            None => debug!(
                "Connection {} ({}) was already gone from the registry.",
                self.conn_id, self.addr
            ),
        }
    }
}
