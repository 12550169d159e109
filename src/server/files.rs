//! Streaming file responder
//!
//! Serves files from below a root directory. Bodies are streamed in bounded
//! chunks straight from the open file; a single `bytes=` range is honored.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::error::{ServerError, ServerResult};

/// How a file route answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Static asset: ETag and `If-None-Match` support
    Static,
    /// Large file streaming
    Stream,
}

/// Requested part of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No (usable) range: send everything
    Full,
    /// Inclusive byte positions
    Partial { start: u64, end: u64 },
    /// The range starts beyond the end of the file
    Unsatisfiable,
}

impl ByteRange {
    /// Parse a `Range` header for a file of `size` bytes
    ///
    /// Malformed or multi-range headers are ignored and yield `Full`.
    pub fn parse(header: Option<&str>, size: u64) -> Self {
        let Some(spec) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
            return ByteRange::Full;
        };
        if spec.contains(',') {
            return ByteRange::Full;
        }
        let Some((first, last)) = spec.split_once('-') else {
            return ByteRange::Full;
        };
        let (first, last) = (first.trim(), last.trim());

        if first.is_empty() {
            // suffix range: the last N bytes
            return match last.parse::<u64>() {
                Ok(0) => ByteRange::Unsatisfiable,
                Ok(_) if size == 0 => ByteRange::Unsatisfiable,
                Ok(n) => ByteRange::Partial {
                    start: size.saturating_sub(n),
                    end: size - 1,
                },
                Err(_) => ByteRange::Full,
            };
        }

        let Ok(start) = first.parse::<u64>() else {
            return ByteRange::Full;
        };
        let end = if last.is_empty() {
            None
        } else {
            match last.parse::<u64>() {
                Ok(end) if end >= start => Some(end),
                _ => return ByteRange::Full,
            }
        };

        if start >= size {
            return ByteRange::Unsatisfiable;
        }
        ByteRange::Partial {
            start,
            end: end.map_or(size - 1, |e| e.min(size - 1)),
        }
    }
}

/// MIME type from the file extension
pub fn mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("css") => "text/css",
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("ico") => "image/x-icon",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Map a request path below a route onto a file inside `root`
///
/// Any `..` component is refused outright; the canonical result must also
/// stay inside the canonical root, which catches escapes through symlinks.
/// A directory resolves to its `index.html`.
pub async fn resolve_within_root(root: &Path, rest: &str) -> ServerResult<PathBuf> {
    let decoded = urlencoding::decode(rest)
        .map_err(|_| ServerError::BadRequest(format!("invalid path encoding: {}", rest)))?;

    if decoded.contains('\\') || decoded.contains('\0') {
        return Err(ServerError::Forbidden(rest.to_string()));
    }

    let relative = Path::new(decoded.as_ref());
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                tracing::warn!(path = %rest, "Path traversal attempt rejected");
                return Err(ServerError::Forbidden(rest.to_string()));
            }
        }
    }

    let root = tokio::fs::canonicalize(root).await.map_err(|e| {
        tracing::error!(root = ?root, error = %e, "Document root is not accessible");
        ServerError::NotFound(rest.to_string())
    })?;

    let mut target = tokio::fs::canonicalize(root.join(&clean))
        .await
        .map_err(|_| ServerError::NotFound(rest.to_string()))?;
    if !target.starts_with(&root) {
        tracing::warn!(path = %rest, "Resolved path escapes the document root");
        return Err(ServerError::Forbidden(rest.to_string()));
    }

    if tokio::fs::metadata(&target).await?.is_dir() {
        // index.html may itself be a link out of the root
        target = tokio::fs::canonicalize(target.join("index.html"))
            .await
            .map_err(|_| ServerError::NotFound(rest.to_string()))?;
        if !target.starts_with(&root) {
            tracing::warn!(path = %rest, "Directory index escapes the document root");
            return Err(ServerError::Forbidden(rest.to_string()));
        }
        if !tokio::fs::metadata(&target).await?.is_file() {
            return Err(ServerError::NotFound(rest.to_string()));
        }
    }
    Ok(target)
}

fn header_value(value: String) -> ServerResult<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|e| ServerError::Internal(e.to_string()))
}

/// Respond with a file
///
/// The open file moves into the body stream and is closed when the stream
/// finishes or the client goes away.
pub async fn serve_file(
    path: &Path,
    mode: FileMode,
    method: &Method,
    request_headers: &HeaderMap,
    chunk_size: usize,
) -> ServerResult<Response> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ServerError::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => ServerError::Forbidden(path.display().to_string()),
        _ => ServerError::Io(e),
    })?;
    let meta = file.metadata().await?;
    let size = meta.len();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_type(path)));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if mode == FileMode::Static {
        let modified = meta
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .unwrap_or_default()
            .as_secs();
        let etag = format!("\"{:x}-{:x}\"", size, modified);

        let matches = request_headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(|client| {
                client
                    .split(',')
                    .map(str::trim)
                    .any(|tag| tag == "*" || tag == etag || tag.strip_prefix("W/") == Some(etag.as_str()))
            })
            .unwrap_or(false);

        headers.insert(header::ETAG, header_value(etag)?);
        if matches {
            tracing::debug!(path = ?path, "ETag matched, not modified");
            return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
        }
    }

    let range = ByteRange::parse(
        request_headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok()),
        size,
    );

    let (status, start, len) = match range {
        ByteRange::Full => (StatusCode::OK, 0, size),
        ByteRange::Partial { start, end } => {
            headers.insert(
                header::CONTENT_RANGE,
                header_value(format!("bytes {}-{}/{}", start, end, size))?,
            );
            (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
        }
        ByteRange::Unsatisfiable => return Err(ServerError::RangeNotSatisfiable { size }),
    };
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));

    tracing::debug!(path = ?path, status = %status, start, len, "Serving file");

    if method == Method::HEAD {
        return Ok((status, headers).into_response());
    }

    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    let stream = ReaderStream::with_capacity(file.take(len), chunk_size);
    Ok((status, headers, Body::from_stream(stream)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_parse_range() {
        assert_eq!(
            ByteRange::parse(Some("bytes=100-199"), 1000),
            ByteRange::Partial { start: 100, end: 199 }
        );
        assert_eq!(
            ByteRange::parse(Some("bytes=900-"), 1000),
            ByteRange::Partial { start: 900, end: 999 }
        );
        assert_eq!(
            ByteRange::parse(Some("bytes=-100"), 1000),
            ByteRange::Partial { start: 900, end: 999 }
        );
        assert_eq!(
            ByteRange::parse(Some("bytes=990-2000"), 1000),
            ByteRange::Partial { start: 990, end: 999 }
        );
        assert_eq!(ByteRange::parse(Some("bytes=1000-"), 1000), ByteRange::Unsatisfiable);
        assert_eq!(ByteRange::parse(Some("bytes=-0"), 1000), ByteRange::Unsatisfiable);
    }

    #[test]
    fn test_parse_range_ignores_garbage() {
        assert_eq!(ByteRange::parse(None, 10), ByteRange::Full);
        assert_eq!(ByteRange::parse(Some("items=1-2"), 10), ByteRange::Full);
        assert_eq!(ByteRange::parse(Some("bytes=5-2"), 10), ByteRange::Full);
        assert_eq!(ByteRange::parse(Some("bytes=0-1,4-5"), 10), ByteRange::Full);
        assert_eq!(ByteRange::parse(Some("bytes=x-"), 10), ByteRange::Full);
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type(Path::new("a/site.CSS")), "text/css");
        assert_eq!(mime_type(Path::new("movie.mp4")), "video/mp4");
        assert_eq!(mime_type(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        assert!(matches!(
            resolve_within_root(dir.path(), "../../etc/passwd").await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            resolve_within_root(dir.path(), "%2e%2e/secret").await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            resolve_within_root(dir.path(), "missing.txt").await,
            Err(ServerError::NotFound(_))
        ));
        let found = resolve_within_root(dir.path(), "./a.txt").await.unwrap();
        assert!(found.ends_with("a.txt"));
    }

    #[tokio::test]
    async fn test_directory_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "<p>hi</p>").unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let found = resolve_within_root(dir.path(), "docs").await.unwrap();
        assert!(found.ends_with("docs/index.html"));
        assert!(matches!(
            resolve_within_root(dir.path(), "empty").await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_index_outside_root_is_forbidden() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("docs/index.html"),
        )
        .unwrap();

        assert!(matches!(
            resolve_within_root(dir.path(), "docs/index.html").await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            resolve_within_root(dir.path(), "docs").await,
            Err(ServerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_serve_partial_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=100-199"));
        let response = serve_file(&path, FileMode::Stream, &Method::GET, &headers, 16)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-199/1000");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.len(), 100);
        assert_eq!(&body[..], &content[100..200]);
    }

    #[tokio::test]
    async fn test_etag_not_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.css");
        std::fs::write(&path, "body {}").unwrap();

        let response = serve_file(&path, FileMode::Static, &Method::GET, &HeaderMap::new(), 1024)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        let etag = response.headers()[header::ETAG].clone();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, etag);
        let response = serve_file(&path, FileMode::Static, &Method::GET, &headers, 1024)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();

        let response = serve_file(&path, FileMode::Stream, &Method::HEAD, &HeaderMap::new(), 1024)
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }
}
