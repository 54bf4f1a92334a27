//! Per-request state carried through one dispatch cycle.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use log::debug;

use crate::parser::HttpRequest;
use crate::routing::context::Context;
use crate::server::HttpResponse;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// State owned by exactly one in-flight request.
///
/// A scope is created by [`Router::dispatch`](crate::routing::Router::dispatch)
/// right after context resolution and handed by `&mut` to every chain stage.
/// It is released exactly once: explicitly when the cycle converts it into the
/// final response, or on drop if the cycle is left any other way.
pub struct RequestScope<'a> {
    request: HttpRequest,
    response: HttpResponse,
    context: &'a Context,
    url: String,
    peer: Option<SocketAddr>,
    placeholders: HashMap<String, String>,
    release_hooks: Vec<ReleaseHook>,
    released: bool,
}

impl<'a> RequestScope<'a> {
    /// Create a scope for `request`, already resolved to `context`.
    ///
    /// `url` is the request path relative to the context path.
    pub fn new(request: HttpRequest, context: &'a Context, url: impl Into<String>, peer: Option<SocketAddr>) -> Self {
        Self {
            request,
            response: HttpResponse::default(),
            context,
            url: url.into(),
            peer,
            placeholders: HashMap::new(),
            release_hooks: Vec::new(),
            released: false,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.response
    }

    /// Borrow the request and the response at the same time.
    pub fn parts_mut(&mut self) -> (&HttpRequest, &mut HttpResponse) {
        (&self.request, &mut self.response)
    }

    /// The context that owns this request.
    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// Request path relative to the context path.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Remote address of the connection, when the transport knows it.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Value bound to a `{name}` placeholder by servlet resolution.
    pub fn placeholder(&self, name: &str) -> Option<&str> {
        self.placeholders.get(name).map(String::as_str)
    }

    pub fn placeholders(&self) -> &HashMap<String, String> {
        &self.placeholders
    }

    pub(crate) fn bind_placeholders(&mut self, bindings: HashMap<String, String>) {
        self.placeholders.extend(bindings);
    }

    /// Register cleanup that must run when this request's cycle ends.
    pub fn on_release(&mut self, hook: impl FnOnce() + Send + 'static) {
        if self.released {
            hook();
        } else {
            self.release_hooks.push(Box::new(hook));
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Run release hooks and drop request buffers. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for hook in self.release_hooks.drain(..) {
            hook();
        }
        self.request.release();
        self.placeholders.clear();
        debug!("{} released request scope for {}", self.context.description(), self.url);
    }

    /// Release the scope and hand back the response for the transport to flush.
    pub fn into_response(mut self) -> HttpResponse {
        self.release();
        std::mem::take(&mut self.response)
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RequestScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("context", &self.context.path())
            .field("url", &self.url)
            .field("method", &self.request.method)
            .field("placeholders", &self.placeholders)
            .field("released", &self.released)
            .finish()
    }
}
