// src/server/initialization.rs

//! Handles server initialization: resolving this node's identity within the cluster,
//! constructing the shared backend, and binding both listeners.

use super::context::ServerContext;
use crate::config::{ClusterConfig, Config};
use crate::connection::ConnectionRegistry;
use crate::core::CortadoError;
use crate::core::backend::{MemoryBackend, SharedBackend};
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Where this node sits in the member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    pub ip: IpAddr,
    pub replica_index: usize,
}

/// Determines the local address and derives the replica index from it.
///
/// Fails with `CortadoError::Configuration` when the address is not a member.
pub async fn resolve_identity(cluster: &ClusterConfig) -> Result<NodeIdentity, CortadoError> {
    let ip = local_ip(cluster).await?;
    locate(cluster, ip)
}

/// Finds `ip` in the member list.
pub fn locate(cluster: &ClusterConfig, ip: IpAddr) -> Result<NodeIdentity, CortadoError> {
    match cluster.position_of(ip) {
        Some(replica_index) => Ok(NodeIdentity { ip, replica_index }),
        None => Err(CortadoError::Configuration(format!(
            "local address {ip} is not in cluster.members {:?}",
            cluster.members
        ))),
    }
}

/// Uses `announce_ip` when set, otherwise the local address of the interface that
/// routes to the first member.
async fn local_ip(cluster: &ClusterConfig) -> Result<IpAddr, CortadoError> {
    if let Some(announce) = &cluster.announce_ip {
        return announce.parse().map_err(|_| {
            CortadoError::Configuration(format!("announce_ip '{announce}' is not an IP address"))
        });
    }

    let Some(first) = cluster.members.first() else {
        return Err(CortadoError::Configuration(
            "cluster.members is empty".to_string(),
        ));
    };
    match route_source(first, cluster.replication_port(0)).await {
        Ok(ip) if !ip.is_unspecified() => Ok(ip),
        Ok(_) => Ok(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        Err(e) => {
            warn!(
                "Could not determine the local address used to reach {}: {}. Assuming loopback.",
                first, e
            );
            Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
        }
    }
}

/// Connecting a UDP socket sends nothing but makes the OS pick the outgoing interface.
async fn route_source(member: &str, port: u16) -> std::io::Result<IpAddr> {
    let target: IpAddr = member
        .parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "not an IP address"))?;
    let unspecified = match target {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;
    socket.connect(SocketAddr::new(target, port)).await?;
    Ok(socket.local_addr()?.ip())
}

/// Initializes all server components before starting the accept loops.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);

    // Identity comes first: a node that is not a member must not bind anything.
    let identity = resolve_identity(&config.cluster).await?;
    info!(
        "Resolved local address {} as replica {} of {}.",
        identity.ip,
        identity.replica_index,
        config.cluster.members.len()
    );

    let backend: SharedBackend = Arc::new(MemoryBackend::new(
        config.cluster.clone(),
        identity.replica_index,
    ));

    let binary_listener = TcpListener::bind((identity.ip, config.binary_port))
        .await
        .with_context(|| format!("Failed to bind binary listener on {}:{}", identity.ip, config.binary_port))?;
    info!("Cortado binary listener on {}", binary_listener.local_addr()?);

    let json_listener = TcpListener::bind((identity.ip, config.json_port))
        .await
        .with_context(|| format!("Failed to bind JSON listener on {}:{}", identity.ip, config.json_port))?;
    info!("Cortado JSON listener on {}", json_listener.local_addr()?);

    let (shutdown_tx, _) = broadcast::channel(1);
    let connection_permits = Arc::new(Semaphore::new(config.max_clients));

    Ok(ServerContext {
        config,
        identity,
        backend,
        binary_listener,
        json_listener,
        registry: Arc::new(ConnectionRegistry::new()),
        connection_permits,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

fn log_startup_info(config: &Config) {
    info!("Cortado version {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Cluster of {} member(s); coordinator-managed membership: {}.",
        config.cluster.members.len(),
        config.cluster.use_coordinator
    );
    if config.cluster.members.len() == 1 {
        info!("Server starting in STANDALONE mode.");
    }
}
