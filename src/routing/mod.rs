//! Request routing and filter-chain dispatch.
//!
//! Registrations are collected per context through [`ContextHandle`]s while
//! the server is being set up. [`HttpServer::init`](crate::server::HttpServer::init)
//! freezes them into a [`Router`], which every connection then shares.
//!
//! For each request the router picks the owning [`Context`] by the first path
//! segment, resolves the servlet that wins the URL, assembles a
//! [`FilterChain`] and runs it:
//!
//! 1. user filters whose patterns match, by ascending order;
//! 2. the winning servlet, if any;
//! 3. the dispatch stage (exact url + method handler lookup);
//! 4. the static resource stage;
//! 5. the finalizer, which answers `404` or `405` if nothing else did.

pub mod chain;
pub mod context;
pub mod filter;
pub mod handler;
pub mod pattern;
pub mod resources;
pub mod router;
pub mod scope;
pub mod serialize;
pub mod servlet;

pub use chain::{DispatchStage, FinalizerStage, StaticResourceStage};
pub use context::{format_context_path, Context, ContextBuilder, ContextHandle, ErrorContext, ErrorHandlerFn};
pub use filter::{filter_fn, ChainOutcome, Continuation, Filter, FilterChain, FilterHandle, FilterTable};
pub use handler::{handler_fn, HandlerConfig, HandlerFn, HandlerRegistration, HandlerTable, IntoReply, Json, Reply};
pub use pattern::{wildcard_match, MatchResult, PatternKind, PatternModel};
pub use resources::StaticResources;
pub use router::Router;
pub use scope::RequestScope;
pub use serialize::JsonFormat;
pub use servlet::{servlet_fn, ResolvedServlet, Servlet, ServletRegistration, ServletTable};
