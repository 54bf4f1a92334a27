//! HTTP transport for the routing engine.
//!
//! [`HttpServer`] collects context registrations, freezes them into a
//! [`Router`](crate::routing::Router) and serves it over tokio TCP connections.

mod response;
mod config;
mod error;
mod http_server;

// Re-export public items
pub use response::{HttpResponse, StatusCode, SERVER_HEADER};
pub use config::ServerConfig;
pub use error::Error;
pub use http_server::HttpServer;
