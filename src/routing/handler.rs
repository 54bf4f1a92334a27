//! Request handlers and the exact (url, method) handler table.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::parser::Method;
use crate::routing::scope::RequestScope;
use crate::server::Error;

/// What a handler produced, before the dispatch stage writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to write. A `200 OK` is written unless the handler wrote the response itself.
    Empty,
    /// A `text/plain` body.
    Text(String),
    /// A JSON value, rendered in the owning context's [`JsonFormat`](crate::routing::serialize::JsonFormat).
    Json(serde_json::Value),
    /// A raw body with its content type.
    Bytes { content_type: String, body: Vec<u8> },
}

/// Wrapper marking a handler result for JSON serialization.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

/// Conversion of handler return values into a [`Reply`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, Error>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Empty)
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Text(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Text(self.to_string()))
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        Ok(Reply::Json(serde_json::to_value(&self.0)?))
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, Error> {
        match self {
            Some(value) => value.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

/// Type-erased handler stored in the table.
pub type HandlerFn = Arc<dyn Fn(&mut RequestScope<'_>) -> Result<Reply, Error> + Send + Sync>;

/// Box a typed handler into a [`HandlerFn`].
pub fn handler_fn<F, R>(handler: F) -> HandlerFn
where
    F: Fn(&mut RequestScope<'_>) -> Result<R, Error> + Send + Sync + 'static,
    R: IntoReply,
{
    Arc::new(move |scope: &mut RequestScope<'_>| handler(scope)?.into_reply())
}

/// Per-route settings applied by the dispatch stage before the handler runs.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    headers: Vec<(String, String)>,
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response header written for every request to this route.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// A handler bound to a URL and a set of methods.
#[derive(Clone)]
pub struct HandlerRegistration {
    pub url: String,
    pub methods: Vec<Method>,
    pub handler: HandlerFn,
    pub config: HandlerConfig,
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("url", &self.url)
            .field("methods", &self.methods)
            .field("config", &self.config)
            .finish()
    }
}

/// Exact-match table from URL to per-method handlers.
#[derive(Debug, Default)]
pub struct HandlerTable {
    routes: HashMap<String, HashMap<Method, Arc<HandlerRegistration>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `registration` for each of its methods. Fails without changing the
    /// table if any (url, method) pair is already bound.
    pub fn insert(&mut self, context: &str, registration: HandlerRegistration) -> Result<(), Error> {
        if let Some(existing) = self.routes.get(&registration.url) {
            if let Some(method) = registration.methods.iter().find(|m| existing.contains_key(m)) {
                return Err(Error::conflict(
                    context,
                    format!("url mapping conflict: {method} {}", registration.url),
                ));
            }
        }

        let registration = Arc::new(registration);
        let by_method = self.routes.entry(registration.url.clone()).or_default();
        for method in &registration.methods {
            by_method.insert(*method, Arc::clone(&registration));
        }
        Ok(())
    }

    /// Exact lookup; no pattern matching happens here.
    pub fn get(&self, url: &str, method: Method) -> Option<&Arc<HandlerRegistration>> {
        self.routes.get(url).and_then(|by_method| by_method.get(&method))
    }

    /// Methods bound for `url`, sorted.
    pub fn allowed_methods(&self, url: &str) -> Vec<Method> {
        self.routes
            .get(url)
            .map(|by_method| by_method.keys().copied().collect::<BTreeSet<_>>().into_iter().collect())
            .unwrap_or_default()
    }

    /// Every (methods, url) pair, sorted by url.
    pub fn endpoints(&self) -> Vec<(Vec<Method>, String)> {
        let mut endpoints: Vec<_> = self
            .routes
            .keys()
            .map(|url| (self.allowed_methods(url), url.clone()))
            .collect();
        endpoints.sort_by(|a, b| a.1.cmp(&b.1));
        endpoints
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(url: &str, methods: &[Method]) -> HandlerRegistration {
        HandlerRegistration {
            url: url.to_string(),
            methods: methods.to_vec(),
            handler: handler_fn(|_scope| Ok(())),
            config: HandlerConfig::new(),
        }
    }

    #[test]
    fn test_duplicate_pair_is_a_conflict() {
        let mut table = HandlerTable::new();
        table.insert("/", registration("/a", &[Method::GET])).unwrap();

        let result = table.insert("/", registration("/a", &[Method::POST, Method::GET]));
        assert!(matches!(result, Err(Error::MappingConflict { .. })));
        // the failed insert left POST unbound
        assert!(table.get("/a", Method::POST).is_none());

        table.insert("/", registration("/a", &[Method::POST])).unwrap();
        assert_eq!(table.allowed_methods("/a"), vec![Method::GET, Method::POST]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut table = HandlerTable::new();
        table.insert("/", registration("/users", &[Method::GET])).unwrap();

        assert!(table.get("/users", Method::GET).is_some());
        assert!(table.get("/users/", Method::GET).is_none());
        assert!(table.get("/users/1", Method::GET).is_none());
        assert!(table.get("/users", Method::DELETE).is_none());
    }

    #[test]
    fn test_into_reply_conversions() {
        assert_eq!(().into_reply().unwrap(), Reply::Empty);
        assert_eq!("hi".into_reply().unwrap(), Reply::Text("hi".to_string()));
        assert_eq!(Json(vec![1, 2]).into_reply().unwrap(), Reply::Json(serde_json::json!([1, 2])));
        assert_eq!(None::<String>.into_reply().unwrap(), Reply::Empty);
    }
}
