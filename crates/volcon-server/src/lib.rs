//! # volcon-server
//!
//! Routes volume commands from HTTP callers to devices holding a WebSocket
//! connection, and routes the devices' asynchronous replies back.
//!
//! - [`registry`]: which devices are live
//! - [`pending`]: outstanding commands keyed by correlation id
//! - [`dispatcher`] / [`router`]: the outbound and inbound paths
//! - [`liveness`]: keep-alive probing and stale sweeps
//! - [`server`] / [`handlers`]: the Axum surface

#![deny(unsafe_code)]

pub mod api;
pub mod connection;
pub mod discovery;
pub mod dispatcher;
pub mod handlers;
pub mod hub;
pub mod liveness;
pub mod pending;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{Dispatcher, PendingReply};
pub use hub::DeviceHub;
pub use router::{ReplyRouter, RouteOutcome};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use shutdown::ShutdownCoordinator;
pub use transport::{DeviceTransport, Outbound, TransportClosed};
