// src/core/errors.rs

//! Defines the primary error type for the entire application.

use crate::core::types::{ClientId, SeqId};
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure the client and server layers can report.
///
/// Cloneable so that a backend can cache the exact outcome of a request and replay it
/// when the same `(client id, seq id)` pair is delivered again.
#[derive(Error, Debug, Clone)]
pub enum CortadoError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    /// Dialing a single address failed.
    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// A peer sent something that could not be decoded or was not the expected reply.
    #[error("Protocol Error: {0}")]
    Protocol(String),

    /// The execution backend rejected the operation.
    #[error("{0}")]
    Application(String),

    #[error("unknown or closed session for client {0}")]
    UnknownSession(ClientId),

    #[error("stale request {seq_id} from client {client_id} (last applied {last_applied})")]
    StaleRequest {
        client_id: ClientId,
        seq_id: SeqId,
        last_applied: SeqId,
    },

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("replica group has no addresses")]
    EmptyGroup,

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl CortadoError {
    /// True for failures that happened before a reply could be read from a peer:
    /// dial errors, socket errors, and streams that ended mid-exchange.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            CortadoError::Connect { .. } | CortadoError::Io(_) | CortadoError::IncompleteData
        )
    }
}

impl From<std::io::Error> for CortadoError {
    fn from(e: std::io::Error) -> Self {
        CortadoError::Io(Arc::new(e))
    }
}

impl From<bincode::error::EncodeError> for CortadoError {
    fn from(e: bincode::error::EncodeError) -> Self {
        CortadoError::Protocol(format!("binary encode failed: {e}"))
    }
}

impl From<bincode::error::DecodeError> for CortadoError {
    fn from(e: bincode::error::DecodeError) -> Self {
        CortadoError::Protocol(format!("binary decode failed: {e}"))
    }
}

impl From<serde_json::Error> for CortadoError {
    fn from(e: serde_json::Error) -> Self {
        CortadoError::Protocol(format!("json: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for CortadoError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CortadoError::Io(Arc::new(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "request timed out",
        )))
    }
}
