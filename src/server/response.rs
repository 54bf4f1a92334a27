//! HTTP response types and utilities.

use std::collections::HashMap;
use serde::Serialize;

use crate::server::error::Error;

/// Value of the `Server` header every response starts with.
pub const SERVER_HEADER: &str = "microrest-rs";

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    PayloadTooLarge = 413,
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// Numeric code.
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// An HTTP response.
///
/// Built either with the `with_*` builder methods (transport-level replies) or
/// mutated in place by filter-chain stages through the `write_*` methods. The
/// `write_*` family may succeed only once per response; later stages consult
/// [`HttpResponse::is_written`] before producing output.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code
    pub status: StatusCode,
    /// The HTTP headers
    pub headers: HashMap<String, String>,
    /// The response body
    pub body: Vec<u8>,
    written: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code.
    pub fn new(status: StatusCode) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Server".to_string(), SERVER_HEADER.to_string());

        Self {
            status,
            headers,
            body: Vec::new(),
            written: false,
        }
    }

    /// Set the response body with a string.
    pub fn with_body_string(self, body: impl Into<String>) -> Self {
        self.with_body_bytes(body.into().into_bytes())
    }

    /// Set the response body with bytes.
    pub fn with_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        let content_length = self.body.len().to_string();
        self.with_header("Content-Length", content_length)
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set the content type.
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }

    /// Set the response body with a JSON value.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, Error> {
        let json = serde_json::to_vec(value)?;
        Ok(self
            .with_content_type("application/json")
            .with_body_bytes(json))
    }

    /// Add or replace a header in place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Look up a header by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Whether one of the `write_*` methods already ran.
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Write a status with an empty body.
    pub fn write(&mut self, status: StatusCode) -> Result<(), Error> {
        self.write_bytes(status, None, Vec::new())
    }

    /// Write a status and a `text/plain` body.
    pub fn write_text(&mut self, status: StatusCode, text: impl Into<String>) -> Result<(), Error> {
        self.write_bytes(status, Some("text/plain; charset=utf-8"), text.into().into_bytes())
    }

    /// Serialize `value` as JSON and write it with the given status.
    pub fn write_json<T: Serialize>(&mut self, status: StatusCode, value: &T) -> Result<(), Error> {
        let json = serde_json::to_vec(value)?;
        self.write_bytes(status, Some("application/json"), json)
    }

    /// Write a status, an optional content type and a raw body.
    pub fn write_bytes(&mut self, status: StatusCode, content_type: Option<&str>, body: Vec<u8>) -> Result<(), Error> {
        if self.written {
            return Err(Error::ResponseAlreadyWritten);
        }
        self.written = true;
        self.status = status;
        if let Some(content_type) = content_type {
            self.set_header("Content-Type", content_type);
        }
        self.set_header("Content-Length", body.len().to_string());
        self.body = body;
        Ok(())
    }

    /// Discard status, headers and body so the response can be written again.
    ///
    /// Used by error handling after a stage failed half way through.
    pub fn reset(&mut self) {
        *self = Self::new(StatusCode::Ok);
    }

    /// Drop the body but keep its `Content-Length`, as a `HEAD` answer must.
    pub fn discard_body(&mut self) {
        self.body = Vec::new();
    }

    /// Convert the response to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        let status_line = format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.status.reason_phrase());
        bytes.extend_from_slice(status_line.as_bytes());

        for (name, value) in &self.headers {
            let header_line = format!("{name}: {value}\r\n");
            bytes.extend_from_slice(header_line.as_bytes());
        }
        if !self.headers.contains_key("Content-Length") {
            bytes.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }

        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&self.body);

        bytes
    }
}
