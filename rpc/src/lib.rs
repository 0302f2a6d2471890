//! HTTP control surface for the harness.
//!
//! Provides endpoints for:
//! - Adding a worker of a named kind (`POST /add_worker`)
//! - Removing the first worker of a kind (`POST /delete_worker`)
//! - Listing live workers (`GET /workers`)
//! - Prometheus metrics (`GET /metrics`)

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{router, RpcServer};
