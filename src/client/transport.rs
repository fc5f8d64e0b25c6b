// src/client/transport.rs

//! Single-shot request delivery: one fresh connection per call, released on every exit path.

use super::config::ClientConfig;
use crate::core::CortadoError;
use crate::core::protocol::{BinaryCodec, Encoding, JsonCodec, Request, Response};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::debug;

/// Delivers one request to one address and returns its reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, addr: &str, request: Request) -> Result<Response, CortadoError>;
}

/// Dials a new TCP connection for every call. No pooling and no reuse.
///
/// Without timeouts an unresponsive peer blocks the call indefinitely.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    encoding: Encoding,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            encoding: config.encoding,
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    async fn connect(&self, addr: &str) -> Result<TcpStream, CortadoError> {
        let dial = TcpStream::connect(addr);
        let result = match self.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, dial).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
            },
            None => dial.await,
        };
        result.map_err(|e| CortadoError::Connect {
            addr: addr.to_string(),
            reason: e.to_string(),
        })
    }

    async fn exchange(&self, stream: TcpStream, request: Request) -> Result<Response, CortadoError> {
        match self.encoding {
            Encoding::Binary => round_trip(stream, BinaryCodec::<Response>::new(), request).await,
            Encoding::Json => round_trip(stream, JsonCodec::<Response>::new(), request).await,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, addr: &str, request: Request) -> Result<Response, CortadoError> {
        let stream = self.connect(addr).await?;
        debug!("Connected to {} for {}.", addr, request.operation());
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(stream, request)).await?,
            None => self.exchange(stream, request).await,
        }
    }
}

/// Writes one request and reads one reply. The stream is dropped, and so closed, on return.
async fn round_trip<C>(stream: TcpStream, codec: C, request: Request) -> Result<Response, CortadoError>
where
    C: Decoder<Item = Response, Error = CortadoError> + Encoder<Request, Error = CortadoError>,
{
    let mut framed = Framed::new(stream, codec);
    framed.send(request).await?;
    match framed.next().await {
        Some(reply) => reply,
        None => Err(CortadoError::Io(Arc::new(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before a reply arrived",
        )))),
    }
}
