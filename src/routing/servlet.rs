//! Servlets and the pattern-ranked servlet table.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::routing::pattern::{MatchResult, PatternKind, PatternModel};
use crate::routing::scope::RequestScope;
use crate::server::Error;

/// A component bound to a URL pattern that serves every request it wins.
pub trait Servlet: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn service(&self, scope: &mut RequestScope<'_>) -> Result<(), Error>;
}

struct FnServlet<F> {
    name: String,
    service: F,
}

impl<F> Servlet for FnServlet<F>
where
    F: Fn(&mut RequestScope<'_>) -> Result<(), Error> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn service(&self, scope: &mut RequestScope<'_>) -> Result<(), Error> {
        (self.service)(scope)
    }
}

/// Build a servlet from a closure.
pub fn servlet_fn<F>(name: impl Into<String>, service: F) -> Arc<dyn Servlet>
where
    F: Fn(&mut RequestScope<'_>) -> Result<(), Error> + Send + Sync + 'static,
{
    Arc::new(FnServlet {
        name: name.into(),
        service,
    })
}

pub struct ServletRegistration {
    pub pattern: PatternModel,
    pub servlet: Arc<dyn Servlet>,
}

/// The winner of servlet resolution for one URL.
pub struct ResolvedServlet {
    pub servlet: Arc<dyn Servlet>,
    pub pattern: String,
    pub bindings: HashMap<String, String>,
}

/// Servlet registrations in declaration order.
#[derive(Default)]
pub struct ServletTable {
    entries: Vec<ServletRegistration>,
}

struct Candidate<'t> {
    registration: &'t ServletRegistration,
    result: MatchResult,
}

impl ServletTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration unless a structurally equal pattern is already present.
    pub fn insert(&mut self, context: &str, registration: ServletRegistration) -> Result<(), Error> {
        if let Some(existing) = self.entries.iter().find(|e| e.pattern == registration.pattern) {
            return Err(Error::conflict(
                context,
                format!("servlet mapping conflict, url pattern: {} | {}", registration.pattern, existing.pattern),
            ));
        }
        self.entries.push(registration);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered patterns with their servlet names, in declaration order.
    pub fn patterns(&self) -> impl Iterator<Item = (&PatternModel, &str)> {
        self.entries.iter().map(|e| (&e.pattern, e.servlet.name()))
    }

    /// Pick the servlet that serves `url`.
    ///
    /// At most one match per pattern kind is allowed. A strict exact match
    /// wins outright; a placeholder match and a wildcard match are ranked by
    /// segment match count; an extension match is the last resort.
    pub fn resolve(&self, context: &str, url: &str) -> Result<Option<ResolvedServlet>, Error> {
        let mut extension: Option<Candidate<'_>> = None;
        let mut wildcard: Option<Candidate<'_>> = None;
        let mut placeholder: Option<Candidate<'_>> = None;
        let mut exact: Option<Candidate<'_>> = None;

        for registration in &self.entries {
            let result = registration.pattern.matches(url);
            if !result.matched {
                continue;
            }

            let slot = match result.kind {
                PatternKind::Extension => &mut extension,
                PatternKind::PathWildcard => &mut wildcard,
                PatternKind::StrictPlaceholder => &mut placeholder,
                PatternKind::StrictExact => &mut exact,
            };
            if let Some(previous) = slot {
                return Err(ambiguous(context, url, previous.registration, registration));
            }
            *slot = Some(Candidate { registration, result });
        }

        let winner = match (exact, placeholder, wildcard) {
            (Some(exact), _, _) => Some(exact),
            (None, Some(placeholder), Some(wildcard)) => {
                let (p, w) = (placeholder.result.segment_match_count, wildcard.result.segment_match_count);
                if p == w {
                    return Err(ambiguous(context, url, placeholder.registration, wildcard.registration));
                }
                Some(if p > w { placeholder } else { wildcard })
            }
            (None, Some(placeholder), None) => Some(placeholder),
            (None, None, Some(wildcard)) => Some(wildcard),
            (None, None, None) => extension,
        };

        Ok(winner.map(|candidate| {
            debug!(
                "Context[{context}] url {url} resolved to servlet {} via {}",
                candidate.registration.servlet.name(),
                candidate.registration.pattern
            );
            ResolvedServlet {
                servlet: Arc::clone(&candidate.registration.servlet),
                pattern: candidate.registration.pattern.raw().to_string(),
                bindings: candidate.result.bindings,
            }
        }))
    }
}

fn ambiguous(context: &str, url: &str, first: &ServletRegistration, second: &ServletRegistration) -> Error {
    Error::conflict(
        context,
        format!(
            "found more than one servlet mapping for url: {url}, url pattern: {} | {}",
            first.pattern, second.pattern
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(patterns: &[&str]) -> ServletTable {
        let mut table = ServletTable::new();
        for pattern in patterns {
            table
                .insert(
                    "/",
                    ServletRegistration {
                        pattern: PatternModel::parse(pattern).unwrap(),
                        servlet: servlet_fn(*pattern, |_scope| Ok(())),
                    },
                )
                .unwrap();
        }
        table
    }

    fn winner(table: &ServletTable, url: &str) -> Option<String> {
        table.resolve("/", url).unwrap().map(|resolved| resolved.pattern)
    }

    #[test]
    fn test_structural_duplicate_is_a_conflict() {
        let mut table = table(&["/user/{id}"]);
        let result = table.insert(
            "/",
            ServletRegistration {
                pattern: PatternModel::parse("/user/{uid}").unwrap(),
                servlet: servlet_fn("other", |_scope| Ok(())),
            },
        );
        assert!(matches!(result, Err(Error::MappingConflict { .. })));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_exact_beats_everything() {
        let table = table(&["*.do", "/user/*", "/user/list.do"]);
        assert_eq!(winner(&table, "/user/list.do").as_deref(), Some("/user/list.do"));
        assert_eq!(winner(&table, "/user/edit.do").as_deref(), Some("/user/*"));
        assert_eq!(winner(&table, "/order/edit.do").as_deref(), Some("*.do"));
        assert_eq!(winner(&table, "/order/edit"), None);
    }

    #[test]
    fn test_placeholder_beats_shallower_wildcard() {
        let table = table(&["/user/{id}", "/user/*"]);
        let resolved = table.resolve("/", "/user/42").unwrap().unwrap();
        assert_eq!(resolved.pattern, "/user/{id}");
        assert_eq!(resolved.bindings.get("id").map(String::as_str), Some("42"));

        // only the wildcard matches deeper paths
        assert_eq!(winner(&table, "/user/42/posts").as_deref(), Some("/user/*"));
    }

    #[test]
    fn test_placeholder_and_wildcard_tie_is_ambiguous() {
        let deep = table(&["/{section}/{id}", "/user/*"]);
        assert_eq!(winner(&deep, "/user/42").as_deref(), Some("/{section}/{id}"));

        let shallow = table(&["/{section}", "/user/*"]);
        // both count one segment
        assert!(matches!(shallow.resolve("/", "/user"), Err(Error::MappingConflict { .. })));
    }

    #[test]
    fn test_two_wildcards_are_ambiguous() {
        let table = table(&["/*", "/api/*"]);
        assert!(matches!(table.resolve("/", "/api/x"), Err(Error::MappingConflict { .. })));
        assert_eq!(winner(&table, "/other").as_deref(), Some("/*"));
    }
}
