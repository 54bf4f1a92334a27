//! URL pattern classification and matching.
//!
//! Servlet patterns come in four kinds, checked in this order:
//!
//! | Pattern        | Kind                | Matches                                  |
//! |----------------|---------------------|------------------------------------------|
//! | `*.do`         | `Extension`         | any path whose last segment ends in `.do`|
//! | `/user/*`      | `PathWildcard`      | `/user` and everything below it          |
//! | `/user/{id}`   | `StrictPlaceholder` | `/user/<one segment>`, binding `id`      |
//! | `/user/list`   | `StrictExact`       | exactly `/user/list`                     |

use std::collections::HashMap;
use std::fmt;

use crate::server::Error;

/// The kind of a servlet pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Extension,
    PathWildcard,
    StrictExact,
    StrictPlaceholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A classified servlet pattern.
///
/// Equality is structural: two patterns are equal when they have the same kind
/// and the same canonical text, where placeholder names are ignored. Such
/// patterns can never be told apart at request time.
#[derive(Debug, Clone)]
pub struct PatternModel {
    raw: String,
    kind: PatternKind,
    segments: Vec<Segment>,
    extension: Option<String>,
}

/// Outcome of matching one [`PatternModel`] against a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub kind: PatternKind,
    pub bindings: HashMap<String, String>,
    /// Pattern segments that matched the path: literal segments equal to the
    /// path segment plus placeholder segments bound to a value.
    pub segment_match_count: usize,
}

impl MatchResult {
    fn miss(kind: PatternKind) -> Self {
        Self {
            matched: false,
            kind,
            bindings: HashMap::new(),
            segment_match_count: 0,
        }
    }

    fn hit(kind: PatternKind, segment_match_count: usize, bindings: HashMap<String, String>) -> Self {
        Self {
            matched: true,
            kind,
            bindings,
            segment_match_count,
        }
    }
}

/// Split a path into its non-empty segments.
pub(crate) fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn placeholder_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

/// Drop a trailing `/` from anything but the root path.
pub(crate) fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

impl PatternModel {
    /// Classify a raw pattern.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let pattern = raw.trim();
        if pattern.is_empty() {
            return Err(Error::InvalidPattern(raw.to_string()));
        }

        if let Some(extension) = pattern.strip_prefix("*.") {
            if extension.is_empty() || extension.contains('/') {
                return Err(Error::InvalidPattern(raw.to_string()));
            }
            return Ok(Self {
                raw: pattern.to_string(),
                kind: PatternKind::Extension,
                segments: Vec::new(),
                extension: Some(extension.to_string()),
            });
        }

        if pattern.starts_with('/') && pattern.ends_with("/*") {
            let prefix = &pattern[..pattern.len() - 2];
            return Ok(Self {
                raw: pattern.to_string(),
                kind: PatternKind::PathWildcard,
                segments: path_segments(prefix)
                    .map(|segment| Segment::Literal(segment.to_string()))
                    .collect(),
                extension: None,
            });
        }

        let pattern = trim_trailing_slash(pattern);
        let segments: Vec<Segment> = path_segments(pattern)
            .map(|segment| match placeholder_name(segment) {
                Some(name) => Segment::Placeholder(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();

        let kind = if segments.iter().any(|s| matches!(s, Segment::Placeholder(_))) {
            PatternKind::StrictPlaceholder
        } else {
            PatternKind::StrictExact
        };

        Ok(Self {
            raw: pattern.to_string(),
            kind,
            segments,
            extension: None,
        })
    }

    /// The pattern text as registered (trimmed).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Text used for structural equality and as the registration key.
    pub fn canonical(&self) -> String {
        match self.kind {
            PatternKind::Extension | PatternKind::StrictExact => self.raw.clone(),
            PatternKind::PathWildcard => format!("{}/*", self.canonical_path()),
            PatternKind::StrictPlaceholder => self.canonical_path(),
        }
    }

    fn canonical_path(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => format!("/{literal}"),
                Segment::Placeholder(_) => "/{}".to_string(),
            })
            .collect()
    }

    /// Match this pattern against a request path.
    pub fn matches(&self, path: &str) -> MatchResult {
        let path = trim_trailing_slash(path);
        match self.kind {
            PatternKind::Extension => self.match_extension(path),
            PatternKind::PathWildcard => self.match_wildcard(path),
            PatternKind::StrictExact => self.match_exact(path),
            PatternKind::StrictPlaceholder => self.match_placeholder(path),
        }
    }

    fn match_extension(&self, path: &str) -> MatchResult {
        let extension = path_segments(path)
            .last()
            .and_then(|last| last.rsplit_once('.'))
            .map(|(_, extension)| extension);

        if extension.is_some() && extension == self.extension.as_deref() {
            MatchResult::hit(self.kind, 0, HashMap::new())
        } else {
            MatchResult::miss(self.kind)
        }
    }

    fn match_wildcard(&self, path: &str) -> MatchResult {
        let mut path_segments = path_segments(path);
        for segment in &self.segments {
            match (segment, path_segments.next()) {
                (Segment::Literal(literal), Some(actual)) if literal == actual => {}
                _ => return MatchResult::miss(self.kind),
            }
        }
        MatchResult::hit(self.kind, self.segments.len(), HashMap::new())
    }

    fn match_exact(&self, path: &str) -> MatchResult {
        if path == self.raw {
            MatchResult::hit(self.kind, self.segments.len(), HashMap::new())
        } else {
            MatchResult::miss(self.kind)
        }
    }

    fn match_placeholder(&self, path: &str) -> MatchResult {
        let actual: Vec<&str> = path_segments(path).collect();
        if actual.len() != self.segments.len() {
            return MatchResult::miss(self.kind);
        }

        let mut bindings = HashMap::new();
        for (segment, value) in self.segments.iter().zip(actual) {
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return MatchResult::miss(self.kind),
                Segment::Placeholder(name) => {
                    bindings.insert(name.clone(), value.to_string());
                }
            }
        }
        MatchResult::hit(self.kind, self.segments.len(), bindings)
    }
}

impl PartialEq for PatternModel {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.canonical() == other.canonical()
    }
}

impl Eq for PatternModel {}

impl fmt::Display for PatternModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Match `text` against a filter pattern in which `*` stands for any
/// sequence of characters, `/` included. Every other character is literal.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_order() {
        assert_eq!(PatternModel::parse("*.do").unwrap().kind(), PatternKind::Extension);
        assert_eq!(PatternModel::parse("/user/*").unwrap().kind(), PatternKind::PathWildcard);
        assert_eq!(PatternModel::parse("/*").unwrap().kind(), PatternKind::PathWildcard);
        assert_eq!(PatternModel::parse("/user/{id}").unwrap().kind(), PatternKind::StrictPlaceholder);
        assert_eq!(PatternModel::parse("/user/list").unwrap().kind(), PatternKind::StrictExact);
        // a placeholder below a wildcard stays a wildcard
        assert_eq!(PatternModel::parse("/user/{id}/*").unwrap().kind(), PatternKind::PathWildcard);
    }

    #[test]
    fn test_blank_patterns_are_invalid() {
        assert!(matches!(PatternModel::parse(""), Err(Error::InvalidPattern(_))));
        assert!(matches!(PatternModel::parse("   "), Err(Error::InvalidPattern(_))));
        assert!(matches!(PatternModel::parse("*."), Err(Error::InvalidPattern(_))));
    }

    #[test]
    fn test_extension_match_is_case_sensitive() {
        let pattern = PatternModel::parse("*.do").unwrap();
        assert!(pattern.matches("/orders/list.do").matched);
        assert!(!pattern.matches("/orders/list.DO").matched);
        assert!(!pattern.matches("/orders.do/list").matched);
        assert!(!pattern.matches("/").matched);
    }

    #[test]
    fn test_wildcard_matches_at_segment_boundary() {
        let pattern = PatternModel::parse("/user/*").unwrap();
        assert!(pattern.matches("/user").matched);
        assert!(pattern.matches("/user/7/posts").matched);
        assert!(!pattern.matches("/username").matched);
        assert_eq!(pattern.matches("/user/7").segment_match_count, 1);

        let root = PatternModel::parse("/*").unwrap();
        assert!(root.matches("/").matched);
        assert!(root.matches("/anything/at/all").matched);
        assert_eq!(root.matches("/a/b").segment_match_count, 0);
    }

    #[test]
    fn test_exact_match() {
        let pattern = PatternModel::parse("/user/list/").unwrap();
        assert_eq!(pattern.raw(), "/user/list");
        assert!(pattern.matches("/user/list").matched);
        assert!(pattern.matches("/user/list/").matched);
        assert!(!pattern.matches("/user/list/1").matched);

        let root = PatternModel::parse("/").unwrap();
        assert!(root.matches("/").matched);
        assert!(!root.matches("/a").matched);
    }

    #[test]
    fn test_placeholder_binding() {
        let pattern = PatternModel::parse("/user/{id}/post/{post}").unwrap();
        let result = pattern.matches("/user/42/post/7");
        assert!(result.matched);
        assert_eq!(result.bindings.get("id").map(String::as_str), Some("42"));
        assert_eq!(result.bindings.get("post").map(String::as_str), Some("7"));
        assert_eq!(result.segment_match_count, 4);

        assert!(!pattern.matches("/user/42/post").matched);
        assert!(!pattern.matches("/user/42/comment/7").matched);
        assert!(!pattern.matches("/user//post/7").matched);
    }

    #[test]
    fn test_structural_equality() {
        let a = PatternModel::parse("/user/{id}").unwrap();
        let b = PatternModel::parse(" /user/{uid} ").unwrap();
        assert_eq!(a, b);
        assert_eq!(PatternModel::parse("/a/").unwrap(), PatternModel::parse("/a").unwrap());
        assert_ne!(PatternModel::parse("/a/*").unwrap(), PatternModel::parse("/a").unwrap());
    }

    #[test]
    fn test_wildcard_match_crosses_slashes() {
        assert!(wildcard_match("/*", "/a/b/c"));
        assert!(wildcard_match("/api/*", "/api/v1/users"));
        assert!(wildcard_match("*.js", "/static/app.js"));
        assert!(wildcard_match("/a*c", "/abbbc"));
        assert!(wildcard_match("/exact", "/exact"));
        assert!(!wildcard_match("/exact", "/exact/more"));
        assert!(!wildcard_match("/api/*", "/apix"));
        assert!(wildcard_match("*", ""));
    }
}
