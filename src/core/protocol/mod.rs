// src/core/protocol/mod.rs

pub mod binary;
pub mod json;
pub mod message;

pub use binary::BinaryCodec;
pub use json::JsonCodec;
pub use message::{Encoding, Operation, Request, Response, WireError};

/// Upper bound on a single encoded message, for either encoding.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
