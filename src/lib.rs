//! An embeddable HTTP server framework with servlet-style routing.
//!
//! Requests are routed through a layered matching and filter-chain mechanism:
//!
//! - contexts own their registrations under a one-segment path prefix
//! - servlets are bound to exact, placeholder, path-wildcard or extension patterns
//! - filters run before the terminal stages, ordered by their `order`
//! - handlers are looked up by exact url and method
//! - static resources come from embedded bytes or disk directories
//!
//! Registration happens before the server starts; afterwards the routing
//! tables are frozen and shared by every connection.
//!
//! # Examples
//!
//! ## Registering routes
//!
//! ```
//! use microrest_rs::{HttpServer, ServerConfig, Json};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: String,
//! }
//!
//! let server = HttpServer::new(ServerConfig::default());
//! let root = server.root().unwrap();
//! root.get("/hello", |_scope| Ok("Hello, world!")).unwrap();
//!
//! let api = server.context("/api").unwrap();
//! api.get("/users/me", |_scope| Ok(Json(User { id: "me".to_string() }))).unwrap();
//!
//! let router = server.init().unwrap();
//! assert_eq!(router.endpoints().len(), 2);
//! ```
//!
//! ## Dispatching a request
//!
//! ```
//! use microrest_rs::{parse_request, HttpServer, ServerConfig, StatusCode};
//!
//! let server = HttpServer::new(ServerConfig::default());
//! server.root().unwrap().get("/ping", |_scope| Ok("pong")).unwrap();
//! let router = server.init().unwrap();
//!
//! let request = parse_request(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
//! let response = router.dispatch(request, None).unwrap();
//! assert_eq!(response.status, StatusCode::Ok);
//! assert_eq!(response.body, b"pong");
//! ```
//!
//! ## Error handling
//!
//! ```
//! use microrest_rs::{parse_request, ParserError};
//!
//! let invalid_request = b"INVALID /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
//!
//! match parse_request(invalid_request) {
//!     Ok(_) => println!("Request parsed successfully"),
//!     Err(ParserError::InvalidMethod(method)) => println!("Invalid method: {}", method),
//!     Err(err) => println!("Other error: {}", err),
//! }
//! ```
//!
//! See the `demos` directory for a complete server.

// Export the parser module
pub mod parser;

// Export the routing engine
pub mod routing;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, parse_request};
pub use routing::{
    filter_fn, servlet_fn, Continuation, ContextHandle, ErrorContext, Filter, FilterHandle, HandlerConfig, Json,
    JsonFormat, Reply, RequestScope, Router, Servlet,
};
pub use server::{Error as ServerError, HttpResponse, HttpServer, ServerConfig, StatusCode};
