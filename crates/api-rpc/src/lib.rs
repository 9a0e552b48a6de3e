//! JSON-RPC API Layer
//!
//! Upload streams are carried as a sequence of calls sharing a `stream_id`:
//! `media.upload.open.v1`, then ordered `media.upload.send.v1` messages, then
//! `media.upload.close.v1` which returns the terminal upload result.

pub mod error;
pub mod handler;
pub mod server;
pub mod streams;
pub mod types;

pub use jsonrpsee::server::ServerHandle;
pub use server::{RpcServer, RpcServerConfig};
pub use streams::{StreamRegistry, StreamRegistryConfig};
