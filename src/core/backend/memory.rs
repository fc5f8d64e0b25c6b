// src/core/backend/memory.rs

//! An in-process execution backend holding one replicated state machine in memory.
//!
//! Every operation goes through a single lock, so calls are linearized in arrival
//! order. Requests are applied exactly once per `(client_id, seq_id)`: the last reply
//! for each client is cached and replayed when the same sequence number arrives again,
//! and anything older is rejected as stale. Sharing one `Arc<MemoryBackend>` between
//! several nodes therefore behaves like several replica groups over one consistent log.
//!
//! The cached reply of a client that closed its session is kept for a replay window so a
//! retried `CloseConnection` still gets its `Ack`, then dropped. Clients that never close
//! keep one cached reply each.

use super::ExecutionBackend;
use super::statement::Catalog;
use crate::config::ClusterConfig;
use crate::core::CortadoError;
use crate::core::types::{ClientId, ConnectionParams, ResultSet, SeqId, SessionHandle, Statement};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_REPLAY_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum Reply {
    Opened(SessionHandle),
    Rows(ResultSet),
    Closed,
}

type Outcome = Result<Reply, CortadoError>;

#[derive(Debug, Default)]
struct EngineState {
    catalog: Catalog,
    sessions: HashMap<ClientId, SessionHandle>,
    last_replies: HashMap<ClientId, (SeqId, Outcome)>,
    /// Closed clients in closing order, with the seq of their close.
    retired: VecDeque<(Instant, ClientId, SeqId)>,
}

impl EngineState {
    fn prune_retired(&mut self, window: Duration) {
        while let Some(&(closed_at, client_id, seq_id)) = self.retired.front() {
            if closed_at.elapsed() < window {
                break;
            }
            self.retired.pop_front();
            // A client that reopened since has a newer entry that must stay.
            if matches!(self.last_replies.get(&client_id), Some((last, _)) if *last == seq_id) {
                self.last_replies.remove(&client_id);
                debug!("Dropped cached reply of closed client {}.", client_id);
            }
        }
    }
}

#[derive(Debug)]
pub struct MemoryBackend {
    cluster: ClusterConfig,
    replica_index: usize,
    replay_window: Duration,
    state: Mutex<EngineState>,
}

impl MemoryBackend {
    /// Creates the backend for the member at `replica_index` of `cluster.members`.
    pub fn new(cluster: ClusterConfig, replica_index: usize) -> Self {
        info!(
            "Execution backend ready as replica {} of {} (storage port {}, replication port {}, coordinator: {}).",
            replica_index,
            cluster.members.len(),
            cluster.storage_port(replica_index),
            cluster.replication_port(replica_index),
            cluster.use_coordinator,
        );
        Self {
            cluster,
            replica_index,
            replay_window: DEFAULT_REPLAY_WINDOW,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Sets how long a closed client's last reply stays available for replay.
    pub fn with_replay_window(mut self, window: Duration) -> Self {
        self.replay_window = window;
        self
    }

    /// A single-member backend on the loopback address.
    pub fn standalone() -> Self {
        Self::new(ClusterConfig::default(), 0)
    }

    pub fn replica_index(&self) -> usize {
        self.replica_index
    }

    pub fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    /// Number of clients with an open session.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of clients whose last reply is cached.
    pub fn cached_replies(&self) -> usize {
        self.state.lock().last_replies.len()
    }

    /// Runs `op` unless this `(client_id, seq_id)` was already applied.
    fn apply(
        &self,
        client_id: ClientId,
        seq_id: SeqId,
        op: impl FnOnce(&mut EngineState) -> Outcome,
    ) -> Outcome {
        let mut state = self.state.lock();
        state.prune_retired(self.replay_window);
        if let Some((last_applied, cached)) = state.last_replies.get(&client_id) {
            if seq_id == *last_applied {
                debug!("Replaying cached reply for client {} seq {}.", client_id, seq_id);
                return cached.clone();
            }
            if seq_id < *last_applied {
                return Err(CortadoError::StaleRequest {
                    client_id,
                    seq_id,
                    last_applied: *last_applied,
                });
            }
        }

        let outcome = op(&mut *state);
        state
            .last_replies
            .insert(client_id, (seq_id, outcome.clone()));
        outcome
    }
}

fn reused_seq(seq_id: SeqId) -> CortadoError {
    CortadoError::Protocol(format!(
        "sequence number {seq_id} was already used for a different operation"
    ))
}

#[async_trait]
impl ExecutionBackend for MemoryBackend {
    async fn open_connection(&self, params: ConnectionParams) -> Result<SessionHandle, CortadoError> {
        let (client_id, seq_id) = (params.client_id, params.seq_id);
        let outcome = self.apply(client_id, seq_id, move |state| {
            let handle = SessionHandle::from(params);
            state.sessions.insert(handle.client_id, handle.clone());
            debug!("Opened session for client {}.", handle.client_id);
            Ok(Reply::Opened(handle))
        })?;
        match outcome {
            Reply::Opened(handle) => Ok(handle),
            _ => Err(reused_seq(seq_id)),
        }
    }

    async fn execute_sql(
        &self,
        connection: SessionHandle,
        statement: Statement,
    ) -> Result<ResultSet, CortadoError> {
        let (client_id, seq_id) = (connection.client_id, connection.seq_id);
        let outcome = self.apply(client_id, seq_id, move |state| {
            if !state.sessions.contains_key(&client_id) {
                return Err(CortadoError::UnknownSession(client_id));
            }
            state.catalog.execute(&statement).map(Reply::Rows)
        })?;
        match outcome {
            Reply::Rows(rows) => Ok(rows),
            _ => Err(reused_seq(seq_id)),
        }
    }

    async fn close_connection(&self, connection: SessionHandle) -> Result<(), CortadoError> {
        let (client_id, seq_id) = (connection.client_id, connection.seq_id);
        let outcome = self.apply(client_id, seq_id, move |state| {
            if state.sessions.remove(&client_id).is_none() {
                return Err(CortadoError::UnknownSession(client_id));
            }
            state.retired.push_back((Instant::now(), client_id, seq_id));
            debug!("Closed session for client {}.", client_id);
            Ok(Reply::Closed)
        })?;
        match outcome {
            Reply::Closed => Ok(()),
            _ => Err(reused_seq(seq_id)),
        }
    }
}
