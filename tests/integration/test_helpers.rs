// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use cortado::client::{Clerk, ClientConfig, FailoverPolicy, ReplicaGroup};
use cortado::core::backend::{MemoryBackend, SharedBackend};
use cortado::core::protocol::Encoding;
use cortado::server;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Set up minimal tracing for tests (ignore error if already initialized).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// One node serving both encodings on loopback ephemeral ports.
pub struct TestNode {
    pub binary_addr: String,
    pub json_addr: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestNode {
    pub async fn start(backend: SharedBackend) -> Self {
        let binary = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let json = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let binary_addr = binary.local_addr().unwrap().to_string();
        let json_addr = json.local_addr().unwrap().to_string();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server::serve(binary, json, backend, 64, async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            binary_addr,
            json_addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn addr(&self, encoding: Encoding) -> String {
        match encoding {
            Encoding::Binary => self.binary_addr.clone(),
            Encoding::Json => self.json_addr.clone(),
        }
    }

    /// Shuts the node down and waits for both accept loops to finish.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.task.take() {
            Some(task) => task.await?,
            None => Ok(()),
        }
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// TestContext provides several nodes that all front one shared backend, which is how
/// separate replica groups over one replicated state look to a client.
pub struct TestContext {
    pub backend: Arc<MemoryBackend>,
    pub nodes: Vec<TestNode>,
}

impl TestContext {
    pub async fn with_nodes(count: usize) -> Self {
        Self::with_backend(Arc::new(MemoryBackend::standalone()), count).await
    }

    pub async fn with_backend(backend: Arc<MemoryBackend>, count: usize) -> Self {
        init_tracing();
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            let shared: SharedBackend = backend.clone();
            nodes.push(TestNode::start(shared).await);
        }
        Self { backend, nodes }
    }

    /// A group made of the given nodes, in the given order.
    pub fn group(&self, indices: &[usize], encoding: Encoding) -> ReplicaGroup {
        ReplicaGroup::new(indices.iter().map(|&i| self.nodes[i].addr(encoding)))
    }

    pub fn clerk(&self, encoding: Encoding) -> Clerk {
        new_clerk(encoding, FailoverPolicy::ConnectOnly)
    }
}

pub fn new_clerk(encoding: Encoding, failover: FailoverPolicy) -> Clerk {
    let config = ClientConfig {
        encoding,
        failover,
        ..ClientConfig::default()
    };
    Clerk::new(&config).unwrap()
}

/// An address nothing is listening on.
pub async fn unreachable_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}
