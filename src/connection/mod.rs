// src/connection/mod.rs

//! Manages the lifecycle of a single accepted connection on either listener:
//! decoding requests, dispatching them to the shared backend, and writing replies.

mod guard;
mod handler;
mod registry;

pub use guard::ConnectionGuard;
pub use handler::{ConnectionHandler, ConnectionPhase, dispatch};
pub use registry::{ConnectionInfo, ConnectionRegistry};
