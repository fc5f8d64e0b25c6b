// src/client/clerk.rs

//! Defines the `Clerk`, the session manager applications use to talk to the service.

use super::config::ClientConfig;
use super::router::{FailoverPolicy, GroupRouter, ReplicaGroup};
use super::transport::{TcpTransport, Transport};
use crate::core::CortadoError;
use crate::core::protocol::Request;
use crate::core::types::{ClientId, ConnectionParams, ResultSet, SeqId, SessionHandle, Statement};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// The login sent with `OpenConnection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
        }
    }
}

impl From<&ClientConfig> for Credentials {
    fn from(config: &ClientConfig) -> Self {
        Self {
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
        }
    }
}

/// Owns one client identity and serializes every call made with it.
///
/// The sequence counter lock is held for the whole of each operation, failover included,
/// so a backend never sees two requests from one clerk overlap or arrive out of order.
/// Separate clerks are independent and may be used concurrently.
pub struct Clerk<T: Transport = TcpTransport> {
    me: ClientId,
    cur_request: Mutex<SeqId>,
    credentials: Credentials,
    router: GroupRouter,
    transport: T,
}

impl Clerk<TcpTransport> {
    /// Creates a clerk over TCP with a freshly sampled identity.
    pub fn new(config: &ClientConfig) -> Result<Self, CortadoError> {
        Self::with_transport(
            TcpTransport::from_config(config),
            config.failover,
            Credentials::from(config),
        )
    }
}

impl<T: Transport> Clerk<T> {
    pub fn with_transport(
        transport: T,
        policy: FailoverPolicy,
        credentials: Credentials,
    ) -> Result<Self, CortadoError> {
        Ok(Self::with_identity(
            ClientId::generate()?,
            transport,
            policy,
            credentials,
        ))
    }

    /// Creates a clerk with a caller-chosen identity.
    pub fn with_identity(
        me: ClientId,
        transport: T,
        policy: FailoverPolicy,
        credentials: Credentials,
    ) -> Self {
        info!("Clerk created with client id {}.", me);
        Self {
            me,
            cur_request: Mutex::new(SeqId::ZERO),
            credentials,
            router: GroupRouter::new(policy),
            transport,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.me
    }

    /// The sequence number of the most recently issued operation.
    pub async fn last_seq(&self) -> SeqId {
        *self.cur_request.lock().await
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens a session against the first reachable node of `group`.
    pub async fn open_connection(&self, group: &ReplicaGroup) -> Result<SessionHandle, CortadoError> {
        let mut seq = self.cur_request.lock().await;
        *seq = seq.next();

        let params = ConnectionParams {
            client_id: self.me,
            seq_id: *seq,
            user: self.credentials.user.clone(),
            password: self.credentials.password.clone(),
            database: self.credentials.database.clone(),
        };
        debug!("Client {} seq {}: OpenConnection via {}", self.me, *seq, group);
        self.router
            .dispatch(&self.transport, group, Request::OpenConnection(params))
            .await?
            .into_connection()
    }

    /// Executes one statement through `group`, restamping `handle` first.
    pub async fn execute_sql(
        &self,
        group: &ReplicaGroup,
        handle: &mut SessionHandle,
        statement: Statement,
    ) -> Result<ResultSet, CortadoError> {
        let mut seq = self.cur_request.lock().await;
        *seq = seq.next();
        self.stamp(handle, *seq);

        debug!(
            "Client {} seq {}: ExecuteSql via {}: {}",
            self.me, *seq, group, statement.query
        );
        let request = Request::ExecuteSql {
            connection: handle.clone(),
            statement,
        };
        self.router
            .dispatch(&self.transport, group, request)
            .await?
            .into_result_set()
    }

    /// Closes the session. The caller must not use `handle` afterwards.
    pub async fn close_connection(
        &self,
        group: &ReplicaGroup,
        handle: &mut SessionHandle,
    ) -> Result<(), CortadoError> {
        let mut seq = self.cur_request.lock().await;
        *seq = seq.next();
        self.stamp(handle, *seq);

        debug!("Client {} seq {}: CloseConnection via {}", self.me, *seq, group);
        self.router
            .dispatch(&self.transport, group, Request::CloseConnection(handle.clone()))
            .await?
            .into_ack()
    }

    fn stamp(&self, handle: &mut SessionHandle, seq: SeqId) {
        handle.client_id = self.me;
        handle.seq_id = seq;
    }
}
