//! Cookie-backed sessions with a sliding expiry.
//!
//! The cookie carries the session id and its expiry, signed together, so the
//! server keeps no per-session state. Every request either renews the session
//! named by a valid unexpired cookie or starts a new one, and the response
//! always re-issues the cookie with a fresh expiry.

use crate::config::SessionConfig;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use hyper::header::{COOKIE, HeaderMap, HeaderValue};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

pub struct SessionStore {
    cookie_name: String,
    secret: Vec<u8>,
    max_age: Duration,
    secure: bool,
}

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub is_new: bool,
    /// Absent only if the cookie could not be encoded as a header value.
    pub set_cookie: Option<HeaderValue>,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        SessionStore {
            cookie_name: config.cookie_name.clone(),
            secret: config.secret.as_bytes().to_vec(),
            max_age: Duration::from_secs(config.max_age_secs),
            secure: config.secure,
        }
    }

    /// Renews the session presented in the request cookies, or starts a new one.
    pub fn resume_or_start(&self, headers: &HeaderMap) -> Session {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.resume_or_start_at(headers, now)
    }

    fn resume_or_start_at(&self, headers: &HeaderMap, now: u64) -> Session {
        let resumed = cookie_value(headers, &self.cookie_name)
            .and_then(|value| self.verify(value))
            .filter(|(_, expires)| *expires > now)
            .map(|(id, _)| id);

        let (id, is_new) = match resumed {
            Some(id) => (id, false),
            None => (uuid::Uuid::new_v4().to_string(), true),
        };

        let set_cookie = self.cookie_header(&id, now + self.max_age.as_secs());
        Session {
            id,
            is_new,
            set_cookie,
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(&self.secret).expect("HMAC key of any size")
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    // `<id>.<expires>.<signature>` -> (id, expires)
    fn verify(&self, value: &str) -> Option<(String, u64)> {
        let (payload, signature) = value.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let (id, expires) = payload.split_once('.')?;
        Some((id.to_string(), expires.parse().ok()?))
    }

    fn cookie_header(&self, id: &str, expires: u64) -> Option<HeaderValue> {
        let payload = format!("{id}.{expires}");
        let mut cookie = format!(
            "{}={}.{}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name,
            payload,
            self.sign(&payload),
            self.max_age.as_secs()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }

        match HeaderValue::from_str(&cookie) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(cookie_name = %self.cookie_name, error = %e, "Session cookie is not a valid header value");
                None
            }
        }
    }
}

/// Cookie names must be non-empty HTTP tokens.
pub fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
