// src/core/protocol/message.rs

//! The encoding-agnostic operation set exchanged between clerks and server nodes.

use crate::core::CortadoError;
use crate::core::types::{ClientId, ConnectionParams, ResultSet, SeqId, SessionHandle, Statement};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// The wire encodings a node serves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Encoding {
    /// Length-prefixed `bincode` frames.
    #[default]
    Binary,
    /// Newline-delimited JSON documents.
    Json,
}

/// Names of the three operations, used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    OpenConnection,
    ExecuteSql,
    CloseConnection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum Request {
    OpenConnection(ConnectionParams),
    ExecuteSql {
        connection: SessionHandle,
        statement: Statement,
    },
    CloseConnection(SessionHandle),
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::OpenConnection(_) => Operation::OpenConnection,
            Request::ExecuteSql { .. } => Operation::ExecuteSql,
            Request::CloseConnection(_) => Operation::CloseConnection,
        }
    }

    pub fn client_id(&self) -> ClientId {
        match self {
            Request::OpenConnection(params) => params.client_id,
            Request::ExecuteSql { connection, .. } | Request::CloseConnection(connection) => {
                connection.client_id
            }
        }
    }

    pub fn seq_id(&self) -> SeqId {
        match self {
            Request::OpenConnection(params) => params.seq_id,
            Request::ExecuteSql { connection, .. } | Request::CloseConnection(connection) => {
                connection.seq_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum Response {
    Connection(SessionHandle),
    ResultSet(ResultSet),
    Ack,
    Error(WireError),
}

impl Response {
    pub fn into_connection(self) -> Result<SessionHandle, CortadoError> {
        match self {
            Response::Connection(handle) => Ok(handle),
            Response::Error(e) => Err(e.into()),
            other => Err(unexpected("OpenConnection", &other)),
        }
    }

    pub fn into_result_set(self) -> Result<ResultSet, CortadoError> {
        match self {
            Response::ResultSet(rs) => Ok(rs),
            Response::Error(e) => Err(e.into()),
            other => Err(unexpected("ExecuteSql", &other)),
        }
    }

    pub fn into_ack(self) -> Result<(), CortadoError> {
        match self {
            Response::Ack => Ok(()),
            Response::Error(e) => Err(e.into()),
            other => Err(unexpected("CloseConnection", &other)),
        }
    }
}

fn unexpected(op: &str, reply: &Response) -> CortadoError {
    CortadoError::Protocol(format!("Unexpected {op} reply: {reply:?}"))
}

/// Errors as they travel on the wire. Transport-level failures collapse into `Internal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum WireError {
    Application(String),
    UnknownSession(ClientId),
    StaleRequest {
        client_id: ClientId,
        seq_id: SeqId,
        last_applied: SeqId,
    },
    Protocol(String),
    Internal(String),
}

impl From<CortadoError> for WireError {
    fn from(e: CortadoError) -> Self {
        match e {
            CortadoError::Application(msg) => WireError::Application(msg),
            CortadoError::UnknownSession(id) => WireError::UnknownSession(id),
            CortadoError::StaleRequest {
                client_id,
                seq_id,
                last_applied,
            } => WireError::StaleRequest {
                client_id,
                seq_id,
                last_applied,
            },
            CortadoError::Protocol(msg) => WireError::Protocol(msg),
            other => WireError::Internal(other.to_string()),
        }
    }
}

impl From<WireError> for CortadoError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Application(msg) => CortadoError::Application(msg),
            WireError::UnknownSession(id) => CortadoError::UnknownSession(id),
            WireError::StaleRequest {
                client_id,
                seq_id,
                last_applied,
            } => CortadoError::StaleRequest {
                client_id,
                seq_id,
                last_applied,
            },
            WireError::Protocol(msg) => CortadoError::Protocol(msg),
            WireError::Internal(msg) => CortadoError::Internal(msg),
        }
    }
}
