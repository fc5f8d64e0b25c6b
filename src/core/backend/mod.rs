// src/core/backend/mod.rs

//! The capability boundary between the dispatch layer and the replicated SQL engine.

use crate::core::CortadoError;
use crate::core::types::{ConnectionParams, ResultSet, SessionHandle, Statement};
use async_trait::async_trait;
use std::sync::Arc;

mod memory;
mod statement;

pub use memory::MemoryBackend;

/// What a node needs from its execution engine.
///
/// Implementations are shared by every connection on both listeners, so they must be
/// safe to call concurrently. They are also expected to order and deduplicate calls by
/// `(client_id, seq_id)`: a repeated pair must not be applied twice.
#[async_trait]
pub trait ExecutionBackend: Send + Sync + 'static {
    async fn open_connection(&self, params: ConnectionParams) -> Result<SessionHandle, CortadoError>;

    async fn execute_sql(
        &self,
        connection: SessionHandle,
        statement: Statement,
    ) -> Result<ResultSet, CortadoError>;

    async fn close_connection(&self, connection: SessionHandle) -> Result<(), CortadoError>;
}

pub type SharedBackend = Arc<dyn ExecutionBackend>;
