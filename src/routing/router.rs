//! The frozen router and the per-request dispatch cycle.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, error};

use crate::parser::{HttpRequest, Method};
use crate::routing::context::{Context, ContextBuilder, ErrorContext, ROOT_CONTEXT_PATH};
use crate::routing::pattern::trim_trailing_slash;
use crate::routing::scope::RequestScope;
use crate::server::{Error, HttpResponse};

/// Paths that bypass filters and servlets and go straight to static resources.
pub const COMMON_STATIC_PATHS: &[&str] = &["/favicon.ico"];

pub const FRAMEWORK_NAME_HEADER: &str = "X-Framework-Name";
pub const FRAMEWORK_VERSION_HEADER: &str = "X-Framework-Version";

/// Every context of a started server. Immutable and shared by all connections.
#[derive(Debug)]
pub struct Router {
    server_name: String,
    keep_alive: bool,
    root: Arc<Context>,
    contexts: HashMap<String, Arc<Context>>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `f`, turning a panic into [`Error::HandlerPanic`].
fn catch_panic<T>(f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(Error::HandlerPanic(panic_message(payload))))
}

impl Router {
    /// Build a router over committed contexts. A root context is added when
    /// none was committed.
    pub fn new(
        server_name: impl Into<String>,
        keep_alive: bool,
        mut contexts: HashMap<String, Arc<Context>>,
    ) -> Result<Self, Error> {
        let server_name = server_name.into();
        let root = match contexts.get(ROOT_CONTEXT_PATH) {
            Some(root) => Arc::clone(root),
            None => {
                let root = Arc::new(ContextBuilder::root(server_name.as_str()).commit()?);
                contexts.insert(ROOT_CONTEXT_PATH.to_string(), Arc::clone(&root));
                root
            }
        };
        Ok(Self {
            server_name,
            keep_alive,
            root,
            contexts,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn context(&self, path: &str) -> Option<&Arc<Context>> {
        self.contexts.get(path)
    }

    /// Pick the context owning `path` by its first segment and return the
    /// path relative to it. Unknown prefixes belong to the root context.
    pub fn resolve_context(&self, path: &str) -> (&Context, String) {
        let path = trim_trailing_slash(path);
        let candidate = match path.get(1..).and_then(|rest| rest.find('/')) {
            Some(end) => &path[..end + 1],
            None => path,
        };
        let context: &Context = self.contexts.get(candidate).unwrap_or(&self.root);

        let url = if path == context.path() || path.is_empty() {
            ROOT_CONTEXT_PATH.to_string()
        } else if context.path() != ROOT_CONTEXT_PATH {
            path[context.path().len()..].to_string()
        } else {
            path.to_string()
        };
        (context, url)
    }

    /// Run one request through its context's chain and produce the response.
    ///
    /// Failures anywhere in the chain, panics included, go to the context's
    /// error handler, which gets a reset response. Only a failing error
    /// handler makes this return `Err`. The request scope is released on
    /// every path.
    pub fn dispatch(&self, request: HttpRequest, peer: Option<SocketAddr>) -> Result<HttpResponse, Error> {
        let origin_url = trim_trailing_slash(&request.path).to_string();
        let head = request.method == Method::HEAD;
        let (context, url) = self.resolve_context(&origin_url);
        let url = context.route_url(url);
        let mut scope = RequestScope::new(request, context, url, peer);

        let outcome = catch_panic(|| self.run_chain(&mut scope, &origin_url));
        match outcome {
            Ok(()) => self.apply_framework_headers(scope.response_mut()),
            Err(cause) => {
                error!("{} request handle failed, url: {}: {}", context.description(), origin_url, cause);
                let (request, response) = scope.parts_mut();
                // error handlers always start from a blank response
                response.reset();
                let handled = catch_panic(|| {
                    context.handle_error(ErrorContext {
                        peer,
                        request,
                        response,
                        cause: &cause,
                    })
                });
                if let Err(source) = handled {
                    return Err(Error::ErrorHandlerFailure {
                        cause: Box::new(cause),
                        source: Box::new(source),
                    });
                }
            }
        }
        let mut response = scope.into_response();
        if head {
            response.discard_body();
        }
        Ok(response)
    }

    fn run_chain(&self, scope: &mut RequestScope<'_>, origin_url: &str) -> Result<(), Error> {
        let context = scope.context();
        let chain = if COMMON_STATIC_PATHS.contains(&origin_url) {
            context.common_resource_chain()
        } else {
            let (chain, bindings) = context.filter_chain(scope.url())?;
            scope.bind_placeholders(bindings);
            chain
        };
        let outcome = chain.execute(scope)?;
        debug!("{} {} {} finished: {:?}", context.description(), scope.request().method, origin_url, outcome);
        Ok(())
    }

    fn apply_framework_headers(&self, response: &mut HttpResponse) {
        response.set_header(FRAMEWORK_NAME_HEADER, env!("CARGO_PKG_NAME"));
        response.set_header(FRAMEWORK_VERSION_HEADER, env!("CARGO_PKG_VERSION"));
        if self.keep_alive {
            response.set_header("Connection", "keep-alive");
        }
    }

    /// Every mapped handler url across contexts, sorted by url.
    pub fn endpoints(&self) -> Vec<(Vec<Method>, String)> {
        let mut endpoints: Vec<_> = self.contexts.values().flat_map(|context| context.endpoints()).collect();
        endpoints.sort_by(|a, b| a.1.cmp(&b.1));
        endpoints
    }
}
