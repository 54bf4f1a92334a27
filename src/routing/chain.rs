//! Terminal chain stages and chain assembly.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::routing::context::Context;
use crate::routing::filter::{Continuation, Filter, FilterChain};
use crate::routing::handler::Reply;
use crate::routing::scope::RequestScope;
use crate::routing::serialize;
use crate::routing::servlet::Servlet;
use crate::server::{Error, StatusCode};

/// Runs the servlet that won resolution, then lets the chain go on.
struct ServletStage {
    servlet: Arc<dyn Servlet>,
}

impl Filter for ServletStage {
    fn name(&self) -> &str {
        self.servlet.name()
    }

    fn do_filter(&self, scope: &mut RequestScope<'_>, chain: &mut Continuation) -> Result<(), Error> {
        self.servlet.service(scope)?;
        if !scope.response().is_written() {
            scope.response_mut().write(StatusCode::Ok)?;
        }
        chain.proceed();
        Ok(())
    }
}

/// Exact (url, method) handler lookup and invocation.
pub struct DispatchStage;

impl Filter for DispatchStage {
    fn name(&self) -> &str {
        "dispatch"
    }

    fn do_filter(&self, scope: &mut RequestScope<'_>, chain: &mut Continuation) -> Result<(), Error> {
        chain.proceed();
        if scope.response().is_written() {
            return Ok(());
        }
        let context = scope.context();
        let Some(registration) = context.handlers().get(scope.url(), scope.request().method) else {
            return Ok(());
        };

        debug!("{} dispatching {} {}", context.description(), scope.request().method, scope.url());
        for (name, value) in registration.config.headers() {
            scope.response_mut().set_header(name.as_str(), value.as_str());
        }
        let reply = (registration.handler)(scope)?;
        write_reply(scope, reply)
    }
}

fn write_reply(scope: &mut RequestScope<'_>, reply: Reply) -> Result<(), Error> {
    let format = scope.context().json_format();
    let response = scope.response_mut();
    match reply {
        Reply::Empty if response.is_written() => Ok(()),
        Reply::Empty => response.write(StatusCode::Ok),
        Reply::Text(text) => response.write_text(StatusCode::Ok, text),
        Reply::Json(value) => {
            let body = serialize::encode_with(&value, format)?;
            response.write_bytes(StatusCode::Ok, Some("application/json"), body)
        }
        Reply::Bytes { content_type, body } => response.write_bytes(StatusCode::Ok, Some(&content_type), body),
    }
}

/// Serves the context's static resources.
pub struct StaticResourceStage;

impl Filter for StaticResourceStage {
    fn name(&self) -> &str {
        "static-resource"
    }

    fn do_filter(&self, scope: &mut RequestScope<'_>, chain: &mut Continuation) -> Result<(), Error> {
        chain.proceed();
        scope.context().resources().serve(scope)?;
        Ok(())
    }
}

/// Answers whatever nothing else answered: `405` when the url is mapped
/// for other methods, `404` otherwise.
pub struct FinalizerStage;

impl Filter for FinalizerStage {
    fn name(&self) -> &str {
        "finalizer"
    }

    fn do_filter(&self, scope: &mut RequestScope<'_>, chain: &mut Continuation) -> Result<(), Error> {
        chain.proceed();
        if scope.response().is_written() {
            return Ok(());
        }
        let allowed = scope.context().allowed_methods(scope.url());
        if allowed.is_empty() || allowed.contains(&scope.request().method) {
            return scope.response_mut().write(StatusCode::NotFound);
        }
        let allow = allowed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        let response = scope.response_mut();
        response.set_header("Allow", allow);
        response.write(StatusCode::MethodNotAllowed)
    }
}

impl Context {
    /// Chain for a regular request: matching filters by order, the winning
    /// servlet if any, then dispatch, static resources and the finalizer.
    ///
    /// Also returns the placeholder bindings of the winning servlet.
    pub fn filter_chain(&self, url: &str) -> Result<(FilterChain, HashMap<String, String>), Error> {
        let mut chain = FilterChain::new();
        for handle in self.filters().collect(url) {
            chain.push(Arc::clone(handle.filter()));
        }

        let mut bindings = HashMap::new();
        if let Some(resolved) = self.resolve_servlet(url)? {
            bindings = resolved.bindings;
            chain.push(Arc::new(ServletStage {
                servlet: resolved.servlet,
            }));
        }

        chain.push(Arc::new(DispatchStage));
        chain.push(Arc::new(StaticResourceStage));
        chain.push(Arc::new(FinalizerStage));
        debug!("{} chain for {url}: {:?}", self.description(), chain);
        Ok((chain, bindings))
    }

    /// Short chain for common static paths such as `/favicon.ico`.
    pub fn common_resource_chain(&self) -> FilterChain {
        let mut chain = FilterChain::new();
        chain.push(Arc::new(StaticResourceStage));
        chain.push(Arc::new(DispatchStage));
        chain.push(Arc::new(FinalizerStage));
        chain
    }
}
