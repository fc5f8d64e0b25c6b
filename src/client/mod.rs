// src/client/mod.rs

//! The client side: a session manager that stamps every call with one identity and an
//! increasing sequence number, and delivers it to the first reachable node of a replica group.

mod clerk;
pub mod config;
pub mod demo;
mod router;
mod transport;

pub use clerk::{Clerk, Credentials};
pub use config::ClientConfig;
pub use router::{FailoverPolicy, GroupRouter, ReplicaGroup};
pub use transport::{TcpTransport, Transport};
