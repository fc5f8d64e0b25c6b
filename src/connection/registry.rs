// src/connection/registry.rs

use crate::core::protocol::Encoding;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// What the server knows about one accepted connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub addr: SocketAddr,
    pub encoding: Encoding,
    pub connected_at: Instant,
}

/// Tracks every open connection across both listeners.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: DashMap<u64, ConnectionInfo>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new connection and returns its id.
    pub fn register(&self, addr: SocketAddr, encoding: Encoding) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.connections.insert(
            id,
            ConnectionInfo {
                addr,
                encoding,
                connected_at: Instant::now(),
            },
        );
        id
    }

    pub fn remove(&self, id: u64) -> Option<ConnectionInfo> {
        self.connections.remove(&id).map(|(_, info)| info)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of open connections speaking `encoding`.
    pub fn count_for(&self, encoding: Encoding) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().encoding == encoding)
            .count()
    }
}
