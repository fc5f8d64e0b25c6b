// src/server/connection_loop.rs

//! Contains the accept loops for both encodings and the graceful shutdown sequence.

use super::context::ServerContext;
use crate::connection::{ConnectionGuard, ConnectionHandler, ConnectionRegistry};
use crate::core::backend::SharedBackend;
use crate::core::metrics;
use crate::core::protocol::{BinaryCodec, Encoding, JsonCodec, Request};
use anyhow::{Context, Result, anyhow};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Accepts connections on one listener until shutdown is broadcast, serving each on its
/// own task. Returns once every connection it spawned has finished.
///
/// `shutdown_rx` must be subscribed before the loop is spawned so a signal sent while
/// the task is still queued is not missed.
pub async fn accept_loop(
    listener: TcpListener,
    encoding: Encoding,
    backend: SharedBackend,
    permits: Arc<Semaphore>,
    registry: Arc<ConnectionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut client_tasks = JoinSet::new();
    let label: &'static str = encoding.into();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!("{} accept loop stopping.", encoding);
                break;
            }

            res = listener.accept() => {
                let (socket, addr) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept {} connection: {}", encoding, e);
                        continue;
                    }
                };
                let Ok(permit) = permits.clone().try_acquire_owned() else {
                    warn!("Max number of clients reached, rejecting {} connection from {}", encoding, addr);
                    continue;
                };

                info!("Accepted new {} connection from: {}", encoding, addr);
                metrics::CONNECTIONS_RECEIVED_TOTAL.with_label_values(&[label]).inc();
                metrics::CONNECTED_CLIENTS.inc();

                let conn_id = registry.register(addr, encoding);
                let guard = ConnectionGuard::new(registry.clone(), conn_id, addr);
                let backend = backend.clone();
                let conn_shutdown_rx = shutdown_tx.subscribe();

                client_tasks.spawn(async move {
                    let _permit = permit;
                    let result = match encoding {
                        Encoding::Binary => {
                            ConnectionHandler::new(socket, BinaryCodec::<Request>::new(), addr, encoding, backend, guard, conn_shutdown_rx)
                                .run()
                                .await
                        }
                        Encoding::Json => {
                            ConnectionHandler::new(socket, JsonCodec::<Request>::new(), addr, encoding, backend, guard, conn_shutdown_rx)
                                .run()
                                .await
                        }
                    };
                    if let Err(e) = result {
                        warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                    }
                });
            }

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            }
        }
    }

    while let Some(res) = client_tasks.join_next().await {
        if let Err(e) = res
            && e.is_panic()
        {
            error!("A client handler panicked during shutdown: {e:?}");
        }
    }
    info!("All {} client connections closed.", encoding);
}

/// Serves both encodings from already-bound listeners over one shared backend until
/// `shutdown` resolves.
pub async fn serve<F>(
    binary_listener: TcpListener,
    json_listener: TcpListener,
    backend: SharedBackend,
    max_clients: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (shutdown_tx, _) = broadcast::channel(1);
    drive(
        binary_listener,
        json_listener,
        backend,
        Arc::new(Semaphore::new(max_clients)),
        Arc::new(ConnectionRegistry::new()),
        shutdown_tx,
        shutdown,
    )
    .await
}

async fn drive<F>(
    binary_listener: TcpListener,
    json_listener: TcpListener,
    backend: SharedBackend,
    permits: Arc<Semaphore>,
    registry: Arc<ConnectionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut loops = JoinSet::new();
    for (listener, encoding) in [
        (binary_listener, Encoding::Binary),
        (json_listener, Encoding::Json),
    ] {
        loops.spawn(accept_loop(
            listener,
            encoding,
            backend.clone(),
            permits.clone(),
            registry.clone(),
            shutdown_tx.clone(),
            shutdown_tx.subscribe(),
        ));
    }

    tokio::pin!(shutdown);
    let result = tokio::select! {
        _ = &mut shutdown => Ok(()),
        Some(res) = loops.join_next() => match res {
            Ok(()) => Err(anyhow!("An accept loop exited unexpectedly.")),
            Err(e) => Err(anyhow!("An accept loop panicked: {e:?}")),
        },
    };

    info!("Shutting down. Sending signal to all tasks.");
    if shutdown_tx.send(()).is_err() {
        warn!("No task was listening for the shutdown signal.");
    }
    while let Some(res) = loops.join_next().await {
        if let Err(e) = res {
            error!("Accept loop failed during shutdown: {e:?}");
        }
    }
    info!("Both listeners stopped; {} connection(s) still registered.", registry.len());
    result
}

/// Runs the initialized server until SIGINT, SIGTERM, or a failed background task.
pub async fn run(ctx: ServerContext) -> Result<()> {
    let ServerContext {
        config,
        identity,
        backend,
        binary_listener,
        json_listener,
        registry,
        connection_permits,
        shutdown_tx,
        mut background_tasks,
    } = ctx;
    info!(
        "Replica {} ({}) serving binary on port {} and JSON on port {}.",
        identity.replica_index, identity.ip, config.binary_port, config.json_port
    );

    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let shutdown = async {
        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("SIGINT received, initiating graceful shutdown.");
                    return;
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received, initiating graceful shutdown.");
                    return;
                }
                Some(res) = background_tasks.join_next() => {
                    match res {
                        Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                        Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); return; }
                        Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); return; }
                    }
                }
            }
        }
    };

    let result = drive(
        binary_listener,
        json_listener,
        backend,
        connection_permits,
        registry,
        shutdown_tx,
        shutdown,
    )
    .await;

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
    result
}
