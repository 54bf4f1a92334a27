//! HTTP request parsing and representation.

use std::collections::HashMap;
use std::str::FromStr;
use serde::de::DeserializeOwned;

use crate::parser::error::Error;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A parsed inbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The percent-decoded request path, without the query string
    pub path: String,
    /// The raw query string, without the leading `?`
    pub raw_query: Option<String>,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers
    pub headers: HashMap<String, String>,
    /// The request body
    pub body: Vec<u8>,
    /// Query parameters; the last occurrence of a repeated key wins
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a request from its request-line target, splitting off the query string.
    ///
    /// The path is percent-decoded (`+` stays literal). Query keys and values
    /// are form-decoded, so `+` becomes a space there.
    pub fn new(method: Method, target: impl Into<String>, version: HttpVersion, headers: HashMap<String, String>) -> Self {
        let target = target.into();
        let (raw_path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target.as_str(), None),
        };
        let path = decode_path(raw_path);

        let query_params = raw_query
            .as_deref()
            .map(|query| {
                serde_urlencoded::from_str::<Vec<(String, String)>>(query)
                    .unwrap_or_default()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();

        Self {
            method,
            path,
            raw_query,
            version,
            headers,
            body: Vec::new(),
            query_params,
        }
    }

    /// Create a request carrying a body.
    pub fn with_body(method: Method, target: impl Into<String>, version: HttpVersion, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        let mut request = Self::new(method, target, version, headers);
        request.body = body;
        request
    }

    /// Get a header value, ignoring the case of the name.
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                Some(v)
            } else {
                None
            }
        })
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    /// Parse the request body as JSON.
    ///
    /// Fails with [`Error::MissingHeader`] unless the request declares an
    /// `application/json` content type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is_json() {
            return Err(Error::MissingHeader("Content-Type: application/json".to_string()));
        }

        let json = serde_json::from_slice(&self.body)?;
        Ok(json)
    }

    /// Check if the request has a JSON body.
    pub fn is_json(&self) -> bool {
        self.get_header("Content-Type")
            .is_some_and(|content_type| content_type.starts_with("application/json"))
    }

    /// Get a query parameter value.
    pub fn get_query_param(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Check if a query parameter exists.
    pub fn has_query_param(&self, name: &str) -> bool {
        self.query_params.contains_key(name)
    }

    /// Whether the client asked to keep the connection open after this request.
    pub fn wants_keep_alive(&self) -> bool {
        match self.get_header("Connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version.keeps_alive_by_default(),
        }
    }

    /// Drop the body buffer. Called once when the request's dispatch cycle ends.
    pub fn release(&mut self) {
        self.body = Vec::new();
    }
}

// invalid UTF-8 after decoding is replaced rather than rejected here;
// `parse_request` refuses such targets up front
fn decode_path(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

fn find_header_end(input: &[u8]) -> Option<usize> {
    input
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

fn content_length<'a>(mut header_lines: impl Iterator<Item = &'a str>) -> Result<usize, Error> {
    let value = header_lines.find_map(|line| {
        line.split_once(':')
            .filter(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
            .map(|(_, value)| value.trim())
    });

    match value {
        Some(value) => value.parse().map_err(|_| Error::InvalidContentLength(value.to_string())),
        None => Ok(0),
    }
}

/// Report how many bytes the first request in `input` occupies.
///
/// Returns `Ok(None)` while the header section or the announced body is still
/// incomplete, so a transport can keep reading.
pub fn request_length(input: &[u8]) -> Result<Option<usize>, Error> {
    let Some(header_end) = find_header_end(input) else {
        return Ok(None);
    };

    let head = String::from_utf8_lossy(&input[..header_end]);
    let length = content_length(head.lines().skip(1))?;
    let total = header_end
        .checked_add(length)
        .ok_or_else(|| Error::InvalidContentLength(length.to_string()))?;

    Ok((input.len() >= total).then_some(total))
}

/// Parse an HTTP request from a byte slice.
///
/// The body is taken from the bytes following the header section, truncated
/// to `Content-Length`.
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    if input.is_empty() {
        return Err(Error::EmptyRequest);
    }

    let (head, rest) = match find_header_end(input) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, &[][..]),
    };

    let head = std::str::from_utf8(head)
        .map_err(|_| Error::MalformedRequestLine("Invalid UTF-8".to_string()))?;

    let mut lines = head.lines();

    let request_line = match lines.next() {
        Some(line) if !line.trim().is_empty() => line,
        _ => return Err(Error::EmptyRequest),
    };

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    }

    let method = Method::from_str(parts[0])?;

    let target = parts[1];
    if !target.starts_with('/') {
        return Err(Error::InvalidPath(target.to_string()));
    }
    let raw_path = target.split_once('?').map_or(target, |(path, _)| path);
    if urlencoding::decode(raw_path).is_err() {
        return Err(Error::InvalidPath(target.to_string()));
    }

    let version = HttpVersion::from_str(parts[2])?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeaderFormat(line.to_string()))?;

        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    if version.requires_host() && !headers.keys().any(|k| k.eq_ignore_ascii_case("Host")) {
        return Err(Error::MissingHeader("Host".to_string()));
    }

    let length = content_length(head.lines().skip(1))?;
    if rest.len() < length {
        return Err(Error::Incomplete);
    }

    Ok(HttpRequest::with_body(method, target, version, headers, rest[..length].to_vec()))
}
