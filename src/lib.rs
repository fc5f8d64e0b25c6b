// src/lib.rs

pub mod client;
pub mod config;
pub mod connection;
pub mod core;
pub mod server;

// Re-export
pub use crate::client::{Clerk, ClientConfig, ReplicaGroup};
pub use crate::core::CortadoError;
