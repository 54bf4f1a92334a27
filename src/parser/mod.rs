//! HTTP parser module.
//!
//! Turns the raw bytes a connection delivers into an [`HttpRequest`]: request
//! line, headers, a `Content-Length` delimited body and the query string.

mod request;
mod method;
mod version;
mod error;
mod tests;

// Re-export public items
pub use request::HttpRequest;
pub use method::Method;
pub use version::HttpVersion;
pub use error::Error;

pub use request::{parse_request, request_length};
