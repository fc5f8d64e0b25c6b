// src/core/mod.rs

//! The central module containing the shared types, wire protocol and execution backend of Cortado.

pub mod backend;
pub mod errors;
pub mod metrics;
pub mod protocol;
pub mod types;

pub use errors::CortadoError;
pub use protocol::{Request, Response};
