//! Static file serving from the output directory.
//!
//! Every request not matched by another route lands here. Paths are
//! percent-decoded, checked lexically against the output root, resolved
//! (`index.html` for directories) and checked again after canonicalization
//! so symlinks cannot escape the root. HTML responses carry the live reload
//! script.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Redirect, Response};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::state::AppState;

/// Path of the live reload script.
pub(crate) const RELOAD_SCRIPT_PATH: &str = "/__livereload.js";

/// Tag injected into every served HTML page.
const RELOAD_SCRIPT_TAG: &str = r#"<script src="/__livereload.js"></script>"#;

/// Client side of the status stream.
const RELOAD_SCRIPT: &str = include_str!("livereload.js");

/// Page served when the output has no `404.html`.
const NOT_FOUND_PAGE: &str = "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head><meta charset=\"utf-8\"><title>Not found</title></head>\n\
<body>\n\
<h1>404</h1>\n\
<p>Nothing has been built at this address.</p>\n\
</body>\n\
</html>\n";

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Characters escaped inside one path segment of a redirect location.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Serve a file from the output tree.
pub(crate) async fn serve(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let root = &state.output_dir;
    let Some(relative) = decode_path(uri.path()) else {
        return not_found(root).await;
    };
    let requested = root.join(&relative);
    if !is_contained(root, &requested) {
        tracing::debug!(path = %uri.path(), "Rejected path outside the output directory");
        return not_found(root).await;
    }

    let is_dir = tokio::fs::metadata(&requested)
        .await
        .is_ok_and(|m| m.is_dir());
    let target = if is_dir {
        if !uri.path().ends_with('/') {
            let location = directory_location(&relative, uri.query());
            return Redirect::permanent(&location).into_response();
        }
        requested.join("index.html")
    } else {
        requested
    };

    let Some(path) = canonical_within(root, &target).await else {
        return not_found(root).await;
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => file_response(StatusCode::OK, &path, bytes),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot read file");
            not_found(root).await
        }
    }
}

/// Serve the live reload client script.
pub(crate) async fn reload_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        RELOAD_SCRIPT,
    )
}

/// Decode a request path into a path relative to the output root.
fn decode_path(path: &str) -> Option<String> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    if decoded.contains('\0') {
        return None;
    }
    Some(decoded.trim_start_matches('/').to_owned())
}

/// Slash-terminated, origin-relative location for a directory.
///
/// Built from the decoded path so empty segments collapse and the result
/// always starts with a single `/`.
fn directory_location(relative: &str, query: Option<&str>) -> String {
    let mut location = String::from("/");
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        location.extend(utf8_percent_encode(segment, SEGMENT));
        location.push('/');
    }
    if let Some(query) = query {
        location.push('?');
        location.push_str(query);
    }
    location
}

/// Whether `path` is `root` or lies below it, after resolving `.` and `..`
/// lexically.
pub(crate) fn is_contained(root: &Path, path: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}

/// Canonicalize `target` and require it to stay under the canonical root.
async fn canonical_within(root: &Path, target: &Path) -> Option<PathBuf> {
    let canonical_root = tokio::fs::canonicalize(root).await.ok()?;
    let canonical = tokio::fs::canonicalize(target).await.ok()?;
    canonical.starts_with(&canonical_root).then_some(canonical)
}

/// Serve `<output>/404.html` if present, else the built-in page.
async fn not_found(root: &Path) -> Response {
    let page = tokio::fs::read_to_string(root.join("404.html"))
        .await
        .unwrap_or_else(|_| NOT_FOUND_PAGE.to_owned());
    (
        StatusCode::NOT_FOUND,
        [
            (header::CONTENT_TYPE, HTML_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        inject_script(&page),
    )
        .into_response()
}

fn file_response(status: StatusCode, path: &Path, bytes: Vec<u8>) -> Response {
    let content_type = mime_for(path);
    let body = if content_type.starts_with("text/html") {
        match String::from_utf8(bytes) {
            Ok(html) => inject_script(&html).into_bytes(),
            Err(e) => e.into_bytes(),
        }
    } else {
        bytes
    };
    (
        status,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_owned()),
        ],
        body,
    )
        .into_response()
}

/// Content type for a file, with a UTF-8 charset for text.
pub(crate) fn mime_for(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_owned()
    }
}

/// Insert the live reload script before the last `</body>`, or append it.
pub(crate) fn inject_script(html: &str) -> String {
    const CLOSE_BODY: &[u8] = b"</body>";

    let position = html
        .as_bytes()
        .windows(CLOSE_BODY.len())
        .rposition(|w| w.eq_ignore_ascii_case(CLOSE_BODY));
    let mut injected = String::with_capacity(html.len() + RELOAD_SCRIPT_TAG.len());
    match position {
        Some(pos) => {
            injected.push_str(&html[..pos]);
            injected.push_str(RELOAD_SCRIPT_TAG);
            injected.push_str(&html[pos..]);
        }
        None => {
            injected.push_str(html);
            injected.push_str(RELOAD_SCRIPT_TAG);
        }
    }
    injected
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_contained() {
        let root = Path::new("/out");
        assert!(is_contained(root, Path::new("/out")));
        assert!(is_contained(root, Path::new("/out/index.html")));
        assert!(is_contained(root, Path::new("/out/a/b/../c.css")));
        assert!(is_contained(root, Path::new("/out/./a")));
    }

    #[test]
    fn test_traversal_and_siblings_rejected() {
        let root = Path::new("/out");
        assert!(!is_contained(root, Path::new("/out/../secret")));
        assert!(!is_contained(root, Path::new("/out/a/../../secret")));
        assert!(!is_contained(root, Path::new("/out2")));
        assert!(!is_contained(root, Path::new("/out2/index.html")));
        assert!(!is_contained(root, Path::new("/")));
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("/a%20b/index.html").as_deref(), Some("a b/index.html"));
        assert_eq!(decode_path("/").as_deref(), Some(""));
        assert_eq!(decode_path("/%2e%2e/secret").as_deref(), Some("../secret"));
        assert_eq!(decode_path("/a%00b"), None);
    }

    #[test]
    fn test_directory_location_stays_on_origin() {
        assert_eq!(directory_location("docs", None), "/docs/");
        assert_eq!(directory_location("/docs", None), "/docs/");
        assert_eq!(directory_location("a//b", Some("q=1")), "/a/b/?q=1");
        assert_eq!(directory_location("my posts", None), "/my%20posts/");
        assert_eq!(directory_location("", None), "/");
    }

    #[test]
    fn test_inject_before_last_body() {
        let html = "<html><body><p>&lt;/body&gt;</p></BODY></html>";
        assert_eq!(
            inject_script(html),
            format!("<html><body><p>&lt;/body&gt;</p>{RELOAD_SCRIPT_TAG}</BODY></html>")
        );
    }

    #[test]
    fn test_inject_appends_without_body() {
        assert_eq!(inject_script("<p>hi</p>"), format!("<p>hi</p>{RELOAD_SCRIPT_TAG}"));
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(mime_for(Path::new("style.css")), "text/css; charset=utf-8");
        assert_eq!(mime_for(Path::new("logo.png")), "image/png");
        assert_eq!(mime_for(Path::new("search-index.json")), "application/json");
        assert_eq!(mime_for(Path::new("blob")), "application/octet-stream");
    }
}
