// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;

pub use connection_loop::{accept_loop, serve};
pub use initialization::{NodeIdentity, locate, resolve_identity};

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Resolve identity, build the backend and bind both listeners.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn background tasks.
    spawner::spawn_all(&mut server_context);

    // 3. Serve both encodings until shutdown.
    connection_loop::run(server_context).await
}
