// src/connection/handler.rs

//! Defines the `ConnectionHandler` which serves one accepted connection to completion.

use super::guard::ConnectionGuard;
use crate::core::backend::{ExecutionBackend, SharedBackend};
use crate::core::metrics;
use crate::core::protocol::{Encoding, Request, Response, WireError};
use crate::core::CortadoError;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use strum_macros::Display;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{Instrument, debug, info, info_span, warn};

/// Where a connection is in its lifecycle.
///
/// `Idle -> AwaitingRequest -> Dispatching -> AwaitingRequest -> ... -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionPhase {
    Idle,
    AwaitingRequest,
    Dispatching,
    Closed,
}

impl ConnectionPhase {
    pub fn can_transition_to(self, next: ConnectionPhase) -> bool {
        use ConnectionPhase::*;
        matches!(
            (self, next),
            (Idle, AwaitingRequest)
                | (AwaitingRequest, Dispatching)
                | (Dispatching, AwaitingRequest)
                | (Idle | AwaitingRequest | Dispatching, Closed)
        )
    }
}

/// Serves requests from one peer, in order, until it disconnects or shutdown is signalled.
///
/// Generic over the stream and the codec so both listeners share the same loop.
pub struct ConnectionHandler<S, C> {
    framed: Framed<S, C>,
    addr: SocketAddr,
    encoding: Encoding,
    backend: SharedBackend,
    shutdown_rx: broadcast::Receiver<()>,
    phase: ConnectionPhase,
    guard: ConnectionGuard,
}

impl<S, C> ConnectionHandler<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Decoder<Item = Request, Error = CortadoError> + Encoder<Response, Error = CortadoError>,
{
    pub fn new(
        stream: S,
        codec: C,
        addr: SocketAddr,
        encoding: Encoding,
        backend: SharedBackend,
        guard: ConnectionGuard,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            framed: Framed::new(stream, codec),
            addr,
            encoding,
            backend,
            shutdown_rx,
            phase: ConnectionPhase::Idle,
            guard,
        }
    }

    /// The main event loop for the connection.
    pub async fn run(mut self) -> Result<(), CortadoError> {
        self.transition(ConnectionPhase::AwaitingRequest);
        let result = self.serve().await;
        self.transition(ConnectionPhase::Closed);
        result
    }

    async fn serve(&mut self) -> Result<(), CortadoError> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.addr);
                    return Ok(());
                }
                result = self.framed.next() => {
                    match result {
                        Some(Ok(request)) => {
                            self.transition(ConnectionPhase::Dispatching);
                            let response = dispatch(self.backend.as_ref(), request, self.encoding).await;
                            if let Err(e) = self.framed.send(response).await {
                                if is_normal_disconnect(&e) {
                                    debug!("Peer {} left before its reply was written: {}", self.addr, e);
                                    return Ok(());
                                }
                                return Err(e);
                            }
                            self.transition(ConnectionPhase::AwaitingRequest);
                        }
                        Some(Err(CortadoError::Protocol(msg))) => {
                            warn!("Undecodable {} request from {}: {}", self.encoding, self.addr, msg);
                            // The codec cannot resynchronise after a bad frame, so the stream ends here.
                            let _ = self.framed.send(Response::Error(WireError::Protocol(msg))).await;
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                                return Ok(());
                            }
                            return Err(e);
                        }
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: ConnectionPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid connection transition {} -> {}",
            self.phase,
            next
        );
        debug!(
            "Connection {} ({}): {} -> {}",
            self.guard.conn_id(),
            self.addr,
            self.phase,
            next
        );
        self.phase = next;
    }
}

/// Runs one request against the backend and converts the outcome into a reply.
///
/// Backend errors never end the connection; they travel back to the caller as
/// `Response::Error`.
pub async fn dispatch(
    backend: &dyn ExecutionBackend,
    request: Request,
    encoding: Encoding,
) -> Response {
    let op: &'static str = request.operation().into();
    let enc: &'static str = encoding.into();
    let span = info_span!(
        "request",
        op,
        encoding = enc,
        client_id = %request.client_id(),
        seq_id = %request.seq_id(),
    );

    async move {
        metrics::REQUESTS_TOTAL.with_label_values(&[op, enc]).inc();
        let timer = metrics::REQUEST_LATENCY_SECONDS
            .with_label_values(&[op])
            .start_timer();

        let result = match request {
            Request::OpenConnection(params) => backend
                .open_connection(params)
                .await
                .map(Response::Connection),
            Request::ExecuteSql {
                connection,
                statement,
            } => backend
                .execute_sql(connection, statement)
                .await
                .map(Response::ResultSet),
            Request::CloseConnection(connection) => backend
                .close_connection(connection)
                .await
                .map(|()| Response::Ack),
        };
        timer.observe_duration();

        match result {
            Ok(response) => {
                debug!("Request succeeded.");
                response
            }
            Err(e) => {
                metrics::REQUEST_ERRORS_TOTAL.with_label_values(&[op]).inc();
                debug!("Request failed: {}", e);
                Response::Error(e.into())
            }
        }
    }
    .instrument(span)
    .await
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &CortadoError) -> bool {
    match e {
        CortadoError::IncompleteData => true,
        CortadoError::Io(arc_err) => matches!(
            arc_err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}
