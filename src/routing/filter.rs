//! Filters, the filter table and the chain executor.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

use crate::routing::pattern::wildcard_match;
use crate::routing::scope::RequestScope;
use crate::server::Error;

/// A stage of the filter chain.
///
/// Filters call [`Continuation::proceed`] to let the chain go on to the next
/// stage after they return. A filter that returns without proceeding ends the
/// chain, and no later stage runs.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Lower orders run first.
    fn order(&self) -> i32 {
        0
    }

    fn do_filter(&self, scope: &mut RequestScope<'_>, chain: &mut Continuation) -> Result<(), Error>;
}

struct FnFilter<F> {
    name: String,
    order: i32,
    filter: F,
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&mut RequestScope<'_>, &mut Continuation) -> Result<(), Error> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn do_filter(&self, scope: &mut RequestScope<'_>, chain: &mut Continuation) -> Result<(), Error> {
        (self.filter)(scope, chain)
    }
}

/// Build a filter from a closure.
pub fn filter_fn<F>(name: impl Into<String>, order: i32, filter: F) -> FilterHandle
where
    F: Fn(&mut RequestScope<'_>, &mut Continuation) -> Result<(), Error> + Send + Sync + 'static,
{
    FilterHandle::new(FnFilter {
        name: name.into(),
        order,
        filter,
    })
}

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

/// A filter with a stable identity.
///
/// Clones share the id, so binding one handle to several patterns still runs
/// the filter once per request.
#[derive(Clone)]
pub struct FilterHandle {
    id: u64,
    filter: Arc<dyn Filter>,
}

impl FilterHandle {
    pub fn new(filter: impl Filter + 'static) -> Self {
        Self::from_arc(Arc::new(filter))
    }

    pub fn from_arc(filter: Arc<dyn Filter>) -> Self {
        Self {
            id: NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed),
            filter,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        self.filter.name()
    }

    pub fn order(&self) -> i32 {
        self.filter.order()
    }

    pub(crate) fn filter(&self) -> &Arc<dyn Filter> {
        &self.filter
    }
}

impl fmt::Debug for FilterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterHandle")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("order", &self.order())
            .finish()
    }
}

/// Permission for the chain to go on past the current stage.
#[derive(Debug, Default)]
pub struct Continuation {
    proceed: bool,
}

impl Continuation {
    pub fn proceed(&mut self) {
        self.proceed = true;
    }

    pub fn is_proceeding(&self) -> bool {
        self.proceed
    }
}

/// How a chain run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every stage ran and proceeded.
    Completed,
    /// The stage at this index returned without proceeding.
    Stopped(usize),
}

/// An ordered list of stages run with an explicit cursor.
#[derive(Clone, Default)]
pub struct FilterChain {
    stages: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Arc<dyn Filter>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run the stages in order until one does not proceed or fails.
    pub fn execute(&self, scope: &mut RequestScope<'_>) -> Result<ChainOutcome, Error> {
        let mut cursor = 0;
        while let Some(stage) = self.stages.get(cursor) {
            let mut continuation = Continuation::default();
            stage.do_filter(scope, &mut continuation)?;
            if !continuation.is_proceeding() {
                debug!("chain for {} stopped at stage {} ({})", scope.url(), cursor, stage.name());
                return Ok(ChainOutcome::Stopped(cursor));
            }
            cursor += 1;
        }
        Ok(ChainOutcome::Completed)
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

struct FilterBinding {
    handle: FilterHandle,
    patterns: Vec<String>,
}

/// Filters of one context with the url-patterns they are bound to.
#[derive(Default)]
pub struct FilterTable {
    bindings: Vec<FilterBinding>,
}

impl FilterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `patterns`. No patterns means `/*`.
    pub fn insert(&mut self, handle: FilterHandle, patterns: &[&str]) -> Result<(), Error> {
        let patterns = if patterns.is_empty() {
            vec!["/*".to_string()]
        } else {
            patterns
                .iter()
                .map(|pattern| {
                    let trimmed = pattern.trim();
                    if trimmed.is_empty() {
                        Err(Error::InvalidPattern((*pattern).to_string()))
                    } else {
                        Ok(trimmed.to_string())
                    }
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        self.bindings.push(FilterBinding { handle, patterns });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Filters bound to a pattern matching `url`, once each, sorted by order.
    pub fn collect(&self, url: &str) -> Vec<FilterHandle> {
        let mut seen = HashSet::new();
        let mut matched: Vec<FilterHandle> = self
            .bindings
            .iter()
            .filter(|binding| binding.patterns.iter().any(|pattern| wildcard_match(pattern, url)))
            .filter(|binding| seen.insert(binding.handle.id()))
            .map(|binding| binding.handle.clone())
            .collect();
        matched.sort_by_key(FilterHandle::order);
        matched
    }
}
