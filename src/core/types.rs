// src/core/types.rs

//! The request-identification data model shared by the client and the server:
//! client identities, sequence numbers, session handles, statements and result sets.

use crate::core::CortadoError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client identities are sampled from `[0, 2^62)`.
const CLIENT_ID_BITS: u32 = 62;

/// A process-unique identifier for one session manager.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Samples a new identity uniformly from the 62-bit space using the OS random source.
    pub fn generate() -> Result<Self, CortadoError> {
        let raw = getrandom::u64()
            .map_err(|e| CortadoError::Internal(format!("Failed to generate client id: {e}")))?;
        Ok(Self(raw >> (u64::BITS - CLIENT_ID_BITS)))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-identity request counter. Zero means "nothing issued yet".
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[serde(transparent)]
pub struct SeqId(u64);

impl SeqId {
    pub const ZERO: SeqId = SeqId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the following sequence number.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters sent with `OpenConnection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ConnectionParams {
    pub client_id: ClientId,
    pub seq_id: SeqId,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// The caller-held bundle identifying a logical session.
///
/// The session manager restamps `client_id` and `seq_id` before every call made with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SessionHandle {
    pub client_id: ClientId,
    pub seq_id: SeqId,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl From<ConnectionParams> for SessionHandle {
    fn from(params: ConnectionParams) -> Self {
        Self {
            client_id: params.client_id,
            seq_id: params.seq_id,
            user: params.user,
            password: params.password,
            database: params.database,
        }
    }
}

/// Query text plus its ordered binary parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Statement {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Vec<u8>>,
}

impl Statement {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }

    /// Appends a positional parameter, bound to `$1`, `$2`, ... in order.
    pub fn bind(mut self, param: impl Into<Vec<u8>>) -> Self {
        self.params.push(param.into());
        self
    }
}

impl From<&str> for Statement {
    fn from(query: &str) -> Self {
        Statement::new(query)
    }
}

/// One row of a result set, in column order.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Tuple {
    pub cells: Vec<String>,
}

/// Field names plus rows. Ordering of both is significant.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct ResultSet {
    pub field_names: Vec<String>,
    pub tuples: Vec<Tuple>,
}

impl ResultSet {
    /// The result of a statement that produces no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

/// Renders the header line, one tab-separated line per tuple and a trailing blank line.
impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.field_names {
            write!(f, "{name}\t")?;
        }
        writeln!(f)?;
        for tuple in &self.tuples {
            for cell in &tuple.cells {
                write!(f, "{cell}\t")?;
            }
            writeln!(f)?;
        }
        writeln!(f)
    }
}
