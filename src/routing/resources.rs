//! Static resources served from embedded bytes or disk directories.

use std::fs;
use std::path::PathBuf;

use log::debug;

use crate::parser::Method;
use crate::routing::pattern::{path_segments, trim_trailing_slash};
use crate::routing::scope::RequestScope;
use crate::server::{Error, StatusCode};

struct EmbeddedRoot {
    prefix: String,
    files: Vec<(String, &'static [u8])>,
}

struct DiskRoot {
    prefix: String,
    dirs: Vec<PathBuf>,
}

/// Static roots of one context, keyed by URL prefix.
///
/// Embedded roots are searched before disk roots. Within each, prefixes and
/// the entries under a prefix are tried in registration order.
#[derive(Default)]
pub struct StaticResources {
    embedded: Vec<EmbeddedRoot>,
    disk: Vec<DiskRoot>,
}

fn normalize_prefix(prefix: &str) -> Result<String, Error> {
    let prefix = prefix.trim();
    if prefix.is_empty() || !prefix.starts_with('/') {
        return Err(Error::InvalidPattern(prefix.to_string()));
    }
    Ok(trim_trailing_slash(prefix).to_string())
}

/// The part of `url` below `prefix`, if `url` lies under it.
fn relative_to<'u>(prefix: &str, url: &'u str) -> Option<&'u str> {
    if prefix == "/" {
        return Some(url);
    }
    let rest = url.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Content type for a file name, from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

impl StaticResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-binary file at `prefix` + `/` + `path`.
    pub fn add_embedded(&mut self, prefix: &str, path: &str, bytes: &'static [u8]) -> Result<(), Error> {
        let prefix = normalize_prefix(prefix)?;
        let path = path_segments(path).collect::<Vec<_>>().join("/");
        if path.is_empty() {
            return Err(Error::InvalidPattern(path));
        }
        match self.embedded.iter_mut().find(|root| root.prefix == prefix) {
            Some(root) => root.files.push((path, bytes)),
            None => self.embedded.push(EmbeddedRoot {
                prefix,
                files: vec![(path, bytes)],
            }),
        }
        Ok(())
    }

    /// Register a directory whose files are served under `prefix`.
    pub fn add_disk(&mut self, prefix: &str, dir: impl Into<PathBuf>) -> Result<(), Error> {
        let prefix = normalize_prefix(prefix)?;
        let dir = dir.into();
        match self.disk.iter_mut().find(|root| root.prefix == prefix) {
            Some(root) => root.dirs.push(dir),
            None => self.disk.push(DiskRoot { prefix, dirs: vec![dir] }),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.embedded.is_empty() && self.disk.is_empty()
    }

    /// Find the resource for `url` and its content type.
    pub fn lookup(&self, url: &str) -> Result<Option<(&'static str, Vec<u8>)>, Error> {
        let segments: Vec<&str> = path_segments(url).collect();
        if segments.is_empty() || segments.iter().any(|segment| *segment == "..") {
            return Ok(None);
        }
        let url = format!("/{}", segments.join("/"));

        for root in &self.embedded {
            let Some(relative) = relative_to(&root.prefix, &url) else {
                continue;
            };
            let relative = relative.trim_start_matches('/');
            if let Some((name, bytes)) = root.files.iter().find(|(name, _)| name == relative) {
                return Ok(Some((content_type_for(name), bytes.to_vec())));
            }
        }

        for root in &self.disk {
            let Some(relative) = relative_to(&root.prefix, &url) else {
                continue;
            };
            let relative = relative.trim_start_matches('/');
            if relative.is_empty() {
                continue;
            }
            for dir in &root.dirs {
                let candidate = dir.join(relative);
                if candidate.is_file() {
                    let bytes = fs::read(&candidate)?;
                    return Ok(Some((content_type_for(relative), bytes)));
                }
            }
        }
        Ok(None)
    }

    /// Write the resource for the scope's URL. Returns whether one was found.
    ///
    /// Only `GET` and `HEAD` are served, and nothing is written over a
    /// response that is already written. The router drops the body of a
    /// `HEAD` answer afterwards.
    pub fn serve(&self, scope: &mut RequestScope<'_>) -> Result<bool, Error> {
        if scope.response().is_written() || !matches!(scope.request().method, Method::GET | Method::HEAD) {
            return Ok(false);
        }
        let Some((content_type, body)) = self.lookup(scope.url())? else {
            return Ok(false);
        };
        debug!("serving static resource {} ({} bytes)", scope.url(), body.len());
        scope
            .response_mut()
            .write_bytes(StatusCode::Ok, Some(content_type), body)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_lookup() {
        let mut resources = StaticResources::new();
        resources.add_embedded("/assets", "css/site.css", b"body{}").unwrap();
        resources.add_embedded("/", "favicon.ico", b"\x00\x01").unwrap();

        let (content_type, body) = resources.lookup("/assets/css/site.css").unwrap().unwrap();
        assert_eq!(content_type, "text/css; charset=utf-8");
        assert_eq!(body, b"body{}");
        assert!(resources.lookup("/favicon.ico").unwrap().is_some());
        assert!(resources.lookup("/assetsx/css/site.css").unwrap().is_none());
        assert!(resources.lookup("/assets/../favicon.ico").unwrap().is_none());
    }

    #[test]
    fn test_disk_lookup() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("index.html"), "<h1>hi</h1>").unwrap();

        let mut resources = StaticResources::new();
        resources.add_disk("/site/", dir.path()).unwrap();

        let (content_type, body) = resources.lookup("/site/docs/index.html").unwrap().unwrap();
        assert_eq!(content_type, "text/html; charset=utf-8");
        assert_eq!(body, b"<h1>hi</h1>");
        // directories are not served
        assert!(resources.lookup("/site/docs").unwrap().is_none());
        assert!(resources.lookup("/site/missing.html").unwrap().is_none());
    }

    #[test]
    fn test_prefix_validation() {
        let mut resources = StaticResources::new();
        assert!(matches!(resources.add_disk("", "/tmp"), Err(Error::InvalidPattern(_))));
        assert!(matches!(resources.add_embedded("static", "a.txt", b""), Err(Error::InvalidPattern(_))));
        assert!(resources.is_empty());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("app.JS"), "application/javascript");
        assert_eq!(content_type_for("archive"), "application/octet-stream");
    }
}
