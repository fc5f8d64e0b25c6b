// src/server/context.rs

use super::initialization::NodeIdentity;
use crate::config::Config;
use crate::connection::ConnectionRegistry;
use crate::core::backend::SharedBackend;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's accept loops.
pub struct ServerContext {
    pub config: Config,
    pub identity: NodeIdentity,
    pub backend: SharedBackend,
    pub binary_listener: TcpListener,
    pub json_listener: TcpListener,
    pub registry: Arc<ConnectionRegistry>,
    pub connection_permits: Arc<Semaphore>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
