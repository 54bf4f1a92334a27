//! Routing contexts: registration while the server is being set up, and the
//! frozen tables every request reads afterwards.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};
use parking_lot::Mutex;

use crate::parser::{HttpRequest, Method};
use crate::routing::filter::{FilterHandle, FilterTable};
use crate::routing::handler::{handler_fn, HandlerConfig, HandlerRegistration, HandlerTable, IntoReply};
use crate::routing::pattern::{path_segments, trim_trailing_slash, PatternModel};
use crate::routing::resources::StaticResources;
use crate::routing::scope::RequestScope;
use crate::routing::serialize::JsonFormat;
use crate::routing::servlet::{ResolvedServlet, Servlet, ServletRegistration, ServletTable};
use crate::server::{Error, HttpResponse, StatusCode};

/// Path of the context every server has.
pub const ROOT_CONTEXT_PATH: &str = "/";

/// Everything an error handler gets to see about a failed request.
pub struct ErrorContext<'e> {
    pub peer: Option<SocketAddr>,
    pub request: &'e HttpRequest,
    pub response: &'e mut HttpResponse,
    pub cause: &'e Error,
}

/// Per-context handler for failed requests.
pub type ErrorHandlerFn = Arc<dyn Fn(ErrorContext<'_>) -> Result<(), Error> + Send + Sync>;

/// Check and normalize a context path: `/` or `/<one segment>`.
pub fn format_context_path(path: &str) -> Result<String, Error> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == ROOT_CONTEXT_PATH {
        return Ok(ROOT_CONTEXT_PATH.to_string());
    }
    let normalized = trim_trailing_slash(trimmed);
    let valid = normalized.starts_with('/')
        && path_segments(normalized).count() == 1
        && !normalized[1..].contains('/')
        && !normalized.chars().any(char::is_whitespace);
    if !valid {
        return Err(Error::InvalidContextPath(path.to_string()));
    }
    Ok(normalized.to_string())
}

fn format_mapping_url(url: &str) -> Result<String, Error> {
    let trimmed = url.trim();
    if trimmed.is_empty() || !trimmed.starts_with('/') {
        return Err(Error::InvalidPattern(url.to_string()));
    }
    Ok(trim_trailing_slash(trimmed).to_string())
}

fn describe(server_name: &str, path: &str) -> String {
    format!("Server[{server_name}] Context[{path}]")
}

/// A registration waiting for the server to start.
enum PendingRegistration {
    Handler(HandlerRegistration),
    Servlet(ServletRegistration),
    Filter(FilterHandle, Vec<String>),
}

/// Mutable registration state of one context before `init`.
pub struct ContextBuilder {
    server_name: String,
    path: String,
    pending: Vec<PendingRegistration>,
    resources: StaticResources,
    error_handler: Option<ErrorHandlerFn>,
    index_url: Option<String>,
    json_format: JsonFormat,
}

impl ContextBuilder {
    fn blank(server_name: String, path: String) -> Self {
        Self {
            server_name,
            path,
            pending: Vec::new(),
            resources: StaticResources::new(),
            error_handler: None,
            index_url: None,
            json_format: JsonFormat::default(),
        }
    }

    pub fn new(server_name: impl Into<String>, path: &str) -> Result<Self, Error> {
        Ok(Self::blank(server_name.into(), format_context_path(path)?))
    }

    /// Builder for the root context, which every server has.
    pub fn root(server_name: impl Into<String>) -> Self {
        Self::blank(server_name.into(), ROOT_CONTEXT_PATH.to_string())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Move the registrations out, leaving an empty builder for the same path.
    pub(crate) fn take(&mut self) -> ContextBuilder {
        let empty = ContextBuilder::blank(self.server_name.clone(), self.path.clone());
        std::mem::replace(self, empty)
    }

    /// Build the frozen context.
    ///
    /// Handlers are registered first, then servlets, then filters. The first
    /// conflict aborts the commit.
    pub fn commit(self) -> Result<Context, Error> {
        let description = describe(&self.server_name, &self.path);
        let mut handlers = HandlerTable::new();
        let mut servlets = ServletTable::new();
        let mut filters = FilterTable::new();

        let (mut handler_tasks, mut servlet_tasks, mut filter_tasks) = (Vec::new(), Vec::new(), Vec::new());
        for pending in self.pending {
            match pending {
                PendingRegistration::Handler(registration) => handler_tasks.push(registration),
                PendingRegistration::Servlet(registration) => servlet_tasks.push(registration),
                PendingRegistration::Filter(handle, patterns) => filter_tasks.push((handle, patterns)),
            }
        }

        for registration in handler_tasks {
            let summary = format!("{:?}, {}", registration.methods, registration.url);
            handlers.insert(&self.path, registration)?;
            info!("{description} register url handler success, {summary}");
        }
        for registration in servlet_tasks {
            let summary = format!("{} => {}", registration.pattern, registration.servlet.name());
            servlets.insert(&self.path, registration)?;
            info!("{description} register servlet success, {summary}");
        }
        for (handle, patterns) in filter_tasks {
            let summary = format!("{} (order {}) => {:?}", handle.name(), handle.order(), patterns);
            let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
            filters.insert(handle, &patterns)?;
            info!("{description} register filter success, {summary}");
        }

        Ok(Context {
            server_name: self.server_name,
            path: self.path,
            handlers,
            servlets,
            filters,
            resources: self.resources,
            error_handler: self.error_handler,
            index_url: self.index_url,
            json_format: self.json_format,
        })
    }
}

/// A frozen routing domain. Read concurrently by every request it owns.
pub struct Context {
    server_name: String,
    path: String,
    handlers: HandlerTable,
    servlets: ServletTable,
    filters: FilterTable,
    resources: StaticResources,
    error_handler: Option<ErrorHandlerFn>,
    index_url: Option<String>,
    json_format: JsonFormat,
}

impl Context {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `Server[name] Context[path]`, used as a log prefix.
    pub fn description(&self) -> String {
        describe(&self.server_name, &self.path)
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn servlets(&self) -> &ServletTable {
        &self.servlets
    }

    pub fn filters(&self) -> &FilterTable {
        &self.filters
    }

    pub fn resources(&self) -> &StaticResources {
        &self.resources
    }

    pub fn json_format(&self) -> JsonFormat {
        self.json_format
    }

    /// The url a request is routed by: the index url stands in for `/`.
    pub fn route_url(&self, url: String) -> String {
        match &self.index_url {
            Some(index) if url == ROOT_CONTEXT_PATH => index.clone(),
            _ => url,
        }
    }

    /// Methods mapped for `url`, sorted.
    pub fn allowed_methods(&self, url: &str) -> Vec<Method> {
        self.handlers.allowed_methods(url)
    }

    pub fn resolve_servlet(&self, url: &str) -> Result<Option<ResolvedServlet>, Error> {
        self.servlets.resolve(&self.path, url)
    }

    /// Mapped handler urls with the context path prepended.
    pub fn endpoints(&self) -> Vec<(Vec<Method>, String)> {
        self.handlers
            .endpoints()
            .into_iter()
            .map(|(methods, url)| (methods, self.full_url(&url)))
            .collect()
    }

    fn full_url(&self, url: &str) -> String {
        match (self.path.as_str(), url) {
            (ROOT_CONTEXT_PATH, url) => url.to_string(),
            (path, ROOT_CONTEXT_PATH) => path.to_string(),
            (path, url) => format!("{path}{url}"),
        }
    }

    /// Hand a failed request to the registered error handler, or to the
    /// built-in one that answers `500`.
    pub fn handle_error(&self, error_context: ErrorContext<'_>) -> Result<(), Error> {
        match &self.error_handler {
            Some(handler) => handler(error_context),
            None => default_error_handler(error_context),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("server_name", &self.server_name)
            .field("path", &self.path)
            .field("handlers", &self.handlers.len())
            .field("servlets", &self.servlets.len())
            .field("filters", &self.filters.len())
            .field("index_url", &self.index_url)
            .field("json_format", &self.json_format)
            .finish()
    }
}

fn default_error_handler(error_context: ErrorContext<'_>) -> Result<(), Error> {
    error!(
        "request {} {} failed: {}",
        error_context.request.method, error_context.request.path, error_context.cause
    );
    error_context.response.write(StatusCode::InternalServerError)
}

/// Registration handle for one context, valid until the server starts.
///
/// Every method fails with [`Error::AlreadyStarted`] once
/// [`HttpServer::init`](crate::server::HttpServer::init) has run. Patterns
/// are checked immediately; conflicts between registrations surface from
/// `init`.
#[derive(Clone)]
pub struct ContextHandle {
    builder: Arc<Mutex<ContextBuilder>>,
    started: Arc<AtomicBool>,
}

impl ContextHandle {
    pub(crate) fn new(builder: Arc<Mutex<ContextBuilder>>, started: Arc<AtomicBool>) -> Self {
        Self { builder, started }
    }

    pub fn path(&self) -> String {
        self.builder.lock().path.clone()
    }

    fn register<F>(&self, apply: F) -> Result<&Self, Error>
    where
        F: FnOnce(&mut ContextBuilder) -> Result<(), Error>,
    {
        let mut builder = self.builder.lock();
        if self.started.load(Ordering::SeqCst) {
            return Err(Error::AlreadyStarted(builder.server_name.clone()));
        }
        apply(&mut builder)?;
        Ok(self)
    }

    /// Map `url` for `methods`. No methods means every method.
    pub fn mapping<F, R>(&self, url: &str, methods: &[Method], handler: F) -> Result<&Self, Error>
    where
        F: Fn(&mut RequestScope<'_>) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoReply,
    {
        self.mapping_with_config(url, methods, HandlerConfig::new(), handler)
    }

    /// Map `url` for `methods`, applying `config` before the handler runs.
    pub fn mapping_with_config<F, R>(
        &self,
        url: &str,
        methods: &[Method],
        config: HandlerConfig,
        handler: F,
    ) -> Result<&Self, Error>
    where
        F: Fn(&mut RequestScope<'_>) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoReply,
    {
        let url = format_mapping_url(url)?;
        let methods = if methods.is_empty() {
            Method::ALL.to_vec()
        } else {
            methods.to_vec()
        };
        let registration = HandlerRegistration {
            url,
            methods,
            handler: handler_fn(handler),
            config,
        };
        self.register(|builder| {
            builder.pending.push(PendingRegistration::Handler(registration));
            Ok(())
        })
    }

    pub fn get<F, R>(&self, url: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&mut RequestScope<'_>) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoReply,
    {
        self.mapping(url, &[Method::GET], handler)
    }

    pub fn post<F, R>(&self, url: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&mut RequestScope<'_>) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoReply,
    {
        self.mapping(url, &[Method::POST], handler)
    }

    pub fn put<F, R>(&self, url: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&mut RequestScope<'_>) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoReply,
    {
        self.mapping(url, &[Method::PUT], handler)
    }

    pub fn delete<F, R>(&self, url: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&mut RequestScope<'_>) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoReply,
    {
        self.mapping(url, &[Method::DELETE], handler)
    }

    /// Bind a servlet to a url pattern.
    pub fn servlet(&self, pattern: &str, servlet: Arc<dyn Servlet>) -> Result<&Self, Error> {
        let pattern = PatternModel::parse(pattern)?;
        self.register(|builder| {
            builder
                .pending
                .push(PendingRegistration::Servlet(ServletRegistration { pattern, servlet }));
            Ok(())
        })
    }

    /// Bind a filter to url patterns. No patterns means `/*`.
    pub fn filter(&self, handle: FilterHandle, patterns: &[&str]) -> Result<&Self, Error> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let trimmed = pattern.trim();
                if trimmed.is_empty() {
                    Err(Error::InvalidPattern((*pattern).to_string()))
                } else {
                    Ok(trimmed.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.register(|builder| {
            builder.pending.push(PendingRegistration::Filter(handle, patterns));
            Ok(())
        })
    }

    /// Serve `bytes` at `prefix` + `/` + `path`.
    pub fn add_embedded_resource(&self, prefix: &str, path: &str, bytes: &'static [u8]) -> Result<&Self, Error> {
        self.register(|builder| {
            builder.resources.add_embedded(prefix, path, bytes)?;
            info!("{} add embedded resource, [{prefix}] => [{path}]", describe(&builder.server_name, &builder.path));
            Ok(())
        })
    }

    /// Serve the files below `dir` under `prefix`.
    pub fn add_disk_resource(&self, prefix: &str, dir: impl Into<PathBuf>) -> Result<&Self, Error> {
        let dir = dir.into();
        self.register(|builder| {
            let summary = format!("[{prefix}] => [{}]", dir.display());
            builder.resources.add_disk(prefix, dir)?;
            info!("{} add disk resource, {summary}", describe(&builder.server_name, &builder.path));
            Ok(())
        })
    }

    /// Route requests for the context root (`/`) as if they asked for `url`.
    pub fn index_url(&self, url: &str) -> Result<&Self, Error> {
        let url = format_mapping_url(url)?;
        self.register(|builder| {
            info!("{} set index url, [{url}]", describe(&builder.server_name, &builder.path));
            builder.index_url = Some(url);
            Ok(())
        })
    }

    /// How JSON replies of this context's handlers are rendered.
    pub fn json_format(&self, format: JsonFormat) -> Result<&Self, Error> {
        self.register(|builder| {
            builder.json_format = format;
            Ok(())
        })
    }

    /// Replace the built-in `500` error handler.
    pub fn error_handler<F>(&self, handler: F) -> Result<&Self, Error>
    where
        F: Fn(ErrorContext<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.register(|builder| {
            builder.error_handler = Some(Arc::new(handler));
            Ok(())
        })
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("path", &self.path())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

/// Commit every builder into frozen contexts keyed by path.
pub(crate) fn commit_all(
    builders: impl IntoIterator<Item = ContextBuilder>,
) -> Result<HashMap<String, Arc<Context>>, Error> {
    builders
        .into_iter()
        .map(|builder| {
            let context = builder.commit()?;
            Ok((context.path.clone(), Arc::new(context)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_context_path() {
        assert_eq!(format_context_path("").unwrap(), "/");
        assert_eq!(format_context_path(" / ").unwrap(), "/");
        assert_eq!(format_context_path("/api/").unwrap(), "/api");
        assert!(matches!(format_context_path("api"), Err(Error::InvalidContextPath(_))));
        assert!(matches!(format_context_path("/api/v1"), Err(Error::InvalidContextPath(_))));
        assert!(matches!(format_context_path("//"), Err(Error::InvalidContextPath(_))));
        assert!(matches!(format_context_path("/a b"), Err(Error::InvalidContextPath(_))));
    }

    #[test]
    fn test_registration_rejected_after_start() {
        let started = Arc::new(AtomicBool::new(false));
        let builder = Arc::new(Mutex::new(ContextBuilder::new("test", "/").unwrap()));
        let handle = ContextHandle::new(Arc::clone(&builder), Arc::clone(&started));

        handle.get("/a", |_scope| Ok("a")).unwrap();
        started.store(true, Ordering::SeqCst);

        assert!(matches!(handle.get("/b", |_scope| Ok("b")), Err(Error::AlreadyStarted(_))));
        assert_eq!(builder.lock().pending.len(), 1);
    }

    #[test]
    fn test_invalid_patterns_fail_at_declaration() {
        let handle = ContextHandle::new(
            Arc::new(Mutex::new(ContextBuilder::new("test", "/").unwrap())),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(matches!(handle.get("", |_scope| Ok(())), Err(Error::InvalidPattern(_))));
        assert!(matches!(
            handle.servlet("  ", crate::routing::servlet::servlet_fn("s", |_scope| Ok(()))),
            Err(Error::InvalidPattern(_))
        ));
        let noop = crate::routing::filter::filter_fn("noop", 0, |_scope, _chain| Ok(()));
        assert!(matches!(handle.filter(noop, &[""]), Err(Error::InvalidPattern(_))));
    }

    #[test]
    fn test_commit_surfaces_conflicts() {
        let builder = Arc::new(Mutex::new(ContextBuilder::new("test", "/shop").unwrap()));
        let handle = ContextHandle::new(Arc::clone(&builder), Arc::new(AtomicBool::new(false)));
        handle.get("/a", |_scope| Ok(())).unwrap();
        handle.mapping("/a", &[Method::POST, Method::GET], |_scope| Ok(())).unwrap();
        drop(handle);

        let builder = Arc::try_unwrap(builder).ok().unwrap().into_inner();
        match builder.commit() {
            Err(Error::MappingConflict { context, .. }) => assert_eq!(context, "/shop"),
            other => panic!("expected a mapping conflict, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_endpoints_carry_context_path() {
        let builder = Arc::new(Mutex::new(ContextBuilder::new("test", "/shop").unwrap()));
        let handle = ContextHandle::new(Arc::clone(&builder), Arc::new(AtomicBool::new(false)));
        handle.get("/", |_scope| Ok(())).unwrap();
        handle.post("/cart", |_scope| Ok(())).unwrap();
        drop(handle);

        let context = Arc::try_unwrap(builder).ok().unwrap().into_inner().commit().unwrap();
        assert_eq!(
            context.endpoints(),
            vec![
                (vec![Method::GET], "/shop".to_string()),
                (vec![Method::POST], "/shop/cart".to_string()),
            ]
        );
    }
}
