use crate::config::SiteConfig;
use crate::routing::route_matches;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use shared::http::{empty_body, full_body, make_boxed_error_response};
use std::path::{Path, PathBuf};

/// Fixed routes and the file each one serves from the pages directory.
pub const PAGES: &[(&str, &str)] = &[
    ("/", "index.html"),
    ("/about", "hom.html"),
    ("/nn.html", "nn.html"),
    ("/answers.html", "answers.html"),
    ("/contact.html", "contact.html"),
    ("/another_page.html", "another_page.html"),
];

pub struct PageRouter {
    pages_dir: PathBuf,
    assets_dir: PathBuf,
}

impl PageRouter {
    pub fn new(config: &SiteConfig) -> Self {
        PageRouter {
            pages_dir: PathBuf::from(&config.pages_dir),
            assets_dir: PathBuf::from(&config.assets_dir),
        }
    }

    /// Resolves `path` to a file: a fixed page first, then the assets directory.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        match PAGES.iter().find(|(route, _)| route_matches(route, path)) {
            Some((_, file)) => Some(self.pages_dir.join(file)),
            None => asset_path(&self.assets_dir, path),
        }
    }

    /// Serves the file for `path`. `head_only` keeps the headers and drops the body.
    pub async fn serve<E: 'static>(&self, path: &str, head_only: bool) -> Response<BoxBody<Bytes, E>> {
        let Some(file) = self.resolve(path) else {
            return make_boxed_error_response(StatusCode::NOT_FOUND);
        };

        match tokio::fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                tracing::debug!(path, file = %file.display(), "Static file not found");
                return make_boxed_error_response(StatusCode::NOT_FOUND);
            }
        }

        let contents = match tokio::fs::read(&file).await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!(file = %file.display(), error = %e, "Failed to read static file");
                return make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let length = contents.len();
        let mut response = match head_only {
            true => Response::new(empty_body()),
            false => Response::new(full_body(contents)),
        };
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(&file)));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        response
    }
}

// Maps a URL path below the assets directory. Segments are percent-decoded
// first. Anything that could leave the directory, and dotfiles, resolve to
// nothing.
fn asset_path(assets_dir: &Path, path: &str) -> Option<PathBuf> {
    let relative = path.strip_prefix('/')?;

    let mut resolved = assets_dir.to_path_buf();
    let mut pushed = false;
    for segment in relative.split('/') {
        if segment.is_empty() {
            continue;
        }
        let decoded = urlencoding::decode(segment).ok()?;
        if decoded.starts_with('.') || decoded.contains(['/', '\\', '\0']) {
            return None;
        }
        resolved.push(&*decoded);
        pushed = true;
    }

    pushed.then_some(resolved)
}

fn content_type(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
