//! Tests for the HTTP parser.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use serde::{Deserialize, Serialize};

    use crate::parser::{HttpRequest, Method, HttpVersion, Error, parse_request, request_length};

    #[test]
    fn test_parse_simple_get_request() {
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.method, Method::GET);
        assert_eq!(result.path, "/index.html");
        assert_eq!(result.raw_query, None);
        assert_eq!(result.version, HttpVersion::Http11);
        assert_eq!(result.headers.get("Host").unwrap(), "example.com");
        assert!(result.body.is_empty());
    }

    #[test]
    fn test_missing_host_header() {
        let request = b"GET /index.html HTTP/1.1\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::MissingHeader(ref h)) if h == "Host"));
    }

    #[test]
    fn test_http10_without_host() {
        let request = b"GET /index.html HTTP/1.0\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.version, HttpVersion::Http10);
        assert!(result.headers.is_empty());
    }

    #[test]
    fn test_invalid_method() {
        let request = b"BREW /pot HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::InvalidMethod(ref m)) if m == "BREW"));
    }

    #[test]
    fn test_invalid_http_version() {
        let request = b"GET /index.html HTTP/2\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::InvalidVersion(ref v)) if v == "HTTP/2"));
    }

    #[test]
    fn test_target_must_be_origin_form() {
        let request = b"GET index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::InvalidPath(ref p)) if p == "index.html"));
    }

    #[test]
    fn test_invalid_header_format() {
        let request = b"GET /index.html HTTP/1.1\r\nInvalidHeader\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::InvalidHeaderFormat(ref line)) if line == "InvalidHeader"));
    }

    #[test]
    fn test_empty_request() {
        assert!(matches!(parse_request(b""), Err(Error::EmptyRequest)));
        assert!(matches!(parse_request(b"\r\n\r\n"), Err(Error::EmptyRequest)));
    }

    #[test]
    fn test_incomplete_request_line() {
        let result = parse_request(b"GET\r\n");
        assert!(matches!(result, Err(Error::MalformedRequestLine(_))));
    }

    #[test]
    fn test_malformed_utf8_in_request() {
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nX-Test: \xFF\xFF\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::MalformedRequestLine(ref s)) if s == "Invalid UTF-8"));
    }

    #[test]
    fn test_all_methods() {
        for method in Method::ALL {
            let raw = format!("{method} /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n");
            let result = parse_request(raw.as_bytes()).unwrap();
            assert_eq!(result.method, method);
        }
    }

    #[test]
    fn test_mixed_line_endings() {
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\nUser-Agent: test\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.headers.get("Host").unwrap(), "example.com");
        assert_eq!(result.headers.get("User-Agent").unwrap(), "test");
    }

    #[test]
    fn test_path_and_query_are_split() {
        let request = b"GET /search?q=test&page=1&flag HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.path, "/search");
        assert_eq!(result.raw_query.as_deref(), Some("q=test&page=1&flag"));
        assert_eq!(result.get_query_param("q").unwrap(), "test");
        assert_eq!(result.get_query_param("page").unwrap(), "1");
        assert_eq!(result.get_query_param("flag").unwrap(), "");
        assert!(!result.has_query_param("missing"));
    }

    #[test]
    fn test_path_and_query_are_decoded() {
        let request = b"GET /user/J%C3%B6rg/a+b?name=J%C3%B6rg+M&tag=%26 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.path, "/user/J\u{f6}rg/a+b");
        assert_eq!(result.raw_query.as_deref(), Some("name=J%C3%B6rg+M&tag=%26"));
        assert_eq!(result.get_query_param("name").unwrap(), "J\u{f6}rg M");
        assert_eq!(result.get_query_param("tag").unwrap(), "&");
    }

    #[test]
    fn test_path_decoding_to_invalid_utf8_is_rejected() {
        let request = b"GET /bad%FF HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::InvalidPath(ref p)) if p == "/bad%FF"));
    }

    #[test]
    fn test_body_follows_content_length() {
        let request = b"POST /api/users HTTP/1.1\r\n\
            Host: example.com\r\n\
            Content-Type: application/json\r\n\
            Content-Length: 14\r\n\
            \r\n\
            {\"name\":\"Ada\"}GARBAGE";

        let result = parse_request(request).unwrap();
        assert_eq!(result.method, Method::POST);
        assert_eq!(result.body, b"{\"name\":\"Ada\"}".to_vec());
    }

    #[test]
    fn test_short_body_is_incomplete() {
        let request = b"POST /upload HTTP/1.1\r\nHost: example.com\r\nContent-Length: 10\r\n\r\nabc";
        assert!(matches!(parse_request(request), Err(Error::Incomplete)));
    }

    #[test]
    fn test_invalid_content_length() {
        let request = b"POST /upload HTTP/1.1\r\nHost: example.com\r\nContent-Length: ten\r\n\r\n";
        assert!(matches!(parse_request(request), Err(Error::InvalidContentLength(ref v)) if v == "ten"));
    }

    #[test]
    fn test_request_length() {
        let head = b"POST /a HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\n";
        assert_eq!(request_length(b"POST /a HTTP/1.1\r\nHost").unwrap(), None);
        assert_eq!(request_length(head).unwrap(), None);

        let mut full = head.to_vec();
        full.extend_from_slice(b"bodyGET /next");
        assert_eq!(request_length(&full).unwrap(), Some(head.len() + 4));

        let plain = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(request_length(plain).unwrap(), Some(plain.len()));
    }

    #[test]
    fn test_request_length_with_overflowing_content_length() {
        let request = b"GET / HTTP/1.1\r\nHost: x\r\nContent-Length: 18446744073709551615\r\n\r\n";
        let result = request_length(request);
        assert!(matches!(result, Err(Error::InvalidContentLength(_))));
    }

    #[test]
    fn test_keep_alive_negotiation() {
        let keep = parse_request(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert!(keep.wants_keep_alive());

        let close = parse_request(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!close.wants_keep_alive());

        let old = parse_request(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!old.wants_keep_alive());

        let old_keep = parse_request(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n").unwrap();
        assert!(old_keep.wants_keep_alive());
    }

    #[test]
    fn test_case_insensitive_headers() {
        let mut headers = HashMap::new();
        headers.insert("Host".to_string(), "example.com".to_string());
        let request = HttpRequest::new(Method::GET, "/index.html", HttpVersion::Http11, headers);

        assert_eq!(request.get_header("host").unwrap(), "example.com");
        assert!(request.has_header("HOST"));
        assert!(!request.has_header("X-Test"));
    }

    #[test]
    fn test_release_drops_body() {
        let mut request = HttpRequest::with_body(Method::POST, "/upload", HttpVersion::Http11, HashMap::new(), vec![1, 2, 3]);
        request.release();
        assert!(request.body.is_empty());
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestUser {
        name: String,
        email: String,
    }

    #[test]
    fn test_json_parsing() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let body = r#"{"name":"John Doe","email":"john@example.com"}"#.as_bytes().to_vec();
        let request = HttpRequest::with_body(Method::POST, "/api/users", HttpVersion::Http11, headers.clone(), body.clone());
        let user: TestUser = request.json().unwrap();
        assert_eq!(user.name, "John Doe");

        let mut plain = headers.clone();
        plain.insert("Content-Type".to_string(), "text/plain".to_string());
        let request = HttpRequest::with_body(Method::POST, "/api/users", HttpVersion::Http11, plain, body);
        let result: Result<TestUser, _> = request.json();
        assert!(matches!(result, Err(Error::MissingHeader(_))));

        let request = HttpRequest::with_body(Method::POST, "/api/users", HttpVersion::Http11, headers, b"{\"name\":}".to_vec());
        let result: Result<TestUser, _> = request.json();
        assert!(matches!(result, Err(Error::JsonError(_))));
    }
}
