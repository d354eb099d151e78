//! Cross-origin policy, applied before any handler runs.

use crate::config::CorsConfig;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    HOST, HeaderMap, HeaderValue, ORIGIN, VARY,
};
use hyper::Method;

const ALLOWED_METHODS: &str = "GET,POST";

#[derive(Debug)]
pub enum CorsDecision {
    /// Continue to the handler and add these headers to its response
    Allow(HeaderMap),
    /// Answer the preflight directly with these headers
    Preflight(HeaderMap),
    Reject(&'static str),
}

pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    allow_credentials: bool,
}

impl CorsPolicy {
    pub fn new(config: &CorsConfig) -> Self {
        CorsPolicy {
            allowed_origins: config.allowed_origins.clone(),
            allow_credentials: config.allow_credentials,
        }
    }

    pub fn evaluate(&self, method: &Method, headers: &HeaderMap) -> CorsDecision {
        let Some(origin_value) = headers.get(ORIGIN) else {
            return CorsDecision::Allow(HeaderMap::new());
        };
        let Ok(origin) = origin_value.to_str() else {
            return CorsDecision::Reject("unreadable origin");
        };

        if is_same_origin(origin, headers) {
            return CorsDecision::Allow(HeaderMap::new());
        }

        if !self.allowed_origins.iter().any(|allowed| allowed == origin) {
            return CorsDecision::Reject("origin not allowed");
        }

        let mut response_headers = HeaderMap::new();
        response_headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin_value.clone());
        if self.allow_credentials {
            response_headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        response_headers.append(VARY, HeaderValue::from_static("Origin"));

        if method == Method::OPTIONS
            && let Some(requested) = headers.get(ACCESS_CONTROL_REQUEST_METHOD)
        {
            if !matches!(requested.as_bytes(), b"GET" | b"POST") {
                return CorsDecision::Reject("method not allowed");
            }

            response_headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            if let Some(requested_headers) = headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
                response_headers
                    .insert(ACCESS_CONTROL_ALLOW_HEADERS, requested_headers.clone());
                response_headers.append(
                    VARY,
                    HeaderValue::from_static("Access-Control-Request-Headers"),
                );
            }
            return CorsDecision::Preflight(response_headers);
        }

        if !matches!(*method, Method::GET | Method::HEAD | Method::POST) {
            return CorsDecision::Reject("method not allowed");
        }

        CorsDecision::Allow(response_headers)
    }
}

// Forms posted from pages this server itself served carry its own origin.
fn is_same_origin(origin: &str, headers: &HeaderMap) -> bool {
    let Some(host) = headers.get(HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };

    origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .is_some_and(|origin_host| origin_host.eq_ignore_ascii_case(host))
}
