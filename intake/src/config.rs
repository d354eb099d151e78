use crate::session::is_valid_cookie_name;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://13.200.229.146";
/// Placeholder secret. Deployments must override it.
pub const DEFAULT_SESSION_SECRET: &str = "your_secret_key";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("At least one allowed origin is required")]
    NoAllowedOrigins,

    #[error("Invalid allowed origin: {0}")]
    InvalidOrigin(String),

    #[error("Session secret cannot be empty")]
    EmptySessionSecret,

    #[error("Invalid session cookie name: {0:?}")]
    InvalidCookieName(String),

    #[error("Session max age cannot be 0")]
    InvalidSessionMaxAge,

    #[error("Body size limit cannot be 0")]
    InvalidBodyLimit,

    #[error("Store timeout cannot be 0")]
    InvalidStoreTimeout,
}

/// What the email form does when its record cannot be stored.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorPolicy {
    /// Respond with 500, like every other form.
    #[default]
    Surface,
    /// Log the failure and redirect as if the write succeeded.
    LogOnly,
}

/// HTTP server configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener for the public site and form submissions
    pub listener: Listener,
    /// Optional listener for `/health` and `/ready`
    pub admin_listener: Option<Listener>,
    pub cors: CorsConfig,
    pub session: SessionConfig,
    pub site: SiteConfig,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
    /// Upper bound on a single datastore write
    pub store_timeout_secs: u64,
    pub email_store_errors: StoreErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: None,
            cors: CorsConfig::default(),
            session: SessionConfig::default(),
            site: SiteConfig::default(),
            max_body_bytes: 100 * 1024,
            store_timeout_secs: 10,
            email_store_errors: StoreErrorPolicy::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if let Some(admin) = &self.admin_listener {
            admin.validate()?;
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(ValidationError::NoAllowedOrigins);
        }
        for origin in &self.cors.allowed_origins {
            // Browsers send origins as scheme://host[:port], never with a path
            let valid = (origin.starts_with("http://") || origin.starts_with("https://"))
                && !origin.ends_with('/');
            if !valid {
                return Err(ValidationError::InvalidOrigin(origin.clone()));
            }
        }

        if !is_valid_cookie_name(&self.session.cookie_name) {
            return Err(ValidationError::InvalidCookieName(
                self.session.cookie_name.clone(),
            ));
        }
        if self.session.secret.is_empty() {
            return Err(ValidationError::EmptySessionSecret);
        }
        if self.session.max_age_secs == 0 {
            return Err(ValidationError::InvalidSessionMaxAge);
        }
        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }
        if self.store_timeout_secs == 0 {
            return Err(ValidationError::InvalidStoreTimeout);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origins: vec![DEFAULT_ALLOWED_ORIGIN.into()],
            allow_credentials: true,
        }
    }
}

#[derive(Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub secret: String,
    pub max_age_secs: u64,
    /// Adds the `Secure` attribute; only enable behind HTTPS.
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            cookie_name: "sid".into(),
            secret: DEFAULT_SESSION_SECRET.into(),
            max_age_secs: 10 * 60,
            secure: false,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("secret", &"<redacted>")
            .field("max_age_secs", &self.max_age_secs)
            .field("secure", &self.secure)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    /// Directory holding the fixed pages (index.html, hom.html, ...)
    pub pages_dir: String,
    /// Directory served for every other GET path
    pub assets_dir: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            pages_dir: "site".into(),
            assets_dir: "site/public".into(),
        }
    }
}
