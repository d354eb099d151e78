//! AWS credential resolution for the DynamoDB store.
//!
//! Sources are tried in order: keys from configuration, the
//! `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY` environment variables, the shared
//! credentials file, the container credentials endpoint and finally the EC2
//! instance metadata service (IMDSv2). Temporary credentials are cached and
//! fetched again shortly before they expire.

use crate::StoreError;
use crate::config::DynamoDbConfig;
use crate::sigv4::Credentials;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";
const CONTAINER_HOST: &str = "http://169.254.170.2";
const IMDS_TOKEN_TTL_SECS: &str = "21600";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);
const REFRESH_BEFORE_EXPIRY_SECS: i64 = 300;

/// Response body of both the container endpoint and IMDS.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialsDocument {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: Option<DateTime<Utc>>,
}

impl From<CredentialsDocument> for Resolved {
    fn from(document: CredentialsDocument) -> Self {
        Resolved {
            credentials: Credentials {
                access_key_id: document.access_key_id,
                secret_access_key: document.secret_access_key,
                session_token: document.token.filter(|t| !t.is_empty()),
            },
            expires: document.expiration,
        }
    }
}

#[derive(Clone)]
struct Resolved {
    credentials: Credentials,
    expires: Option<DateTime<Utc>>,
}

impl Resolved {
    fn fixed(credentials: Credentials) -> Self {
        Resolved {
            credentials,
            expires: None,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires
            .is_none_or(|expires| expires - TimeDelta::seconds(REFRESH_BEFORE_EXPIRY_SECS) > now)
    }
}

struct ContainerSource {
    uri: String,
    authorization: Option<String>,
}

pub struct CredentialsProvider {
    fixed: Option<Credentials>,
    shared_file: Option<PathBuf>,
    profile: String,
    container: Option<ContainerSource>,
    imds_endpoint: Option<String>,
    client: reqwest::Client,
    cached: Mutex<Option<Resolved>>,
}

impl CredentialsProvider {
    /// Builds the chain from `config` and the process environment.
    pub fn new(config: &DynamoDbConfig) -> Result<Self, StoreError> {
        Self::with_env(config, |name| std::env::var(name).ok())
    }

    pub(crate) fn with_env(
        config: &DynamoDbConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StoreError> {
        let env = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let fixed = keys(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            config.session_token.clone(),
        )
        .or_else(|| {
            keys(
                env("AWS_ACCESS_KEY_ID"),
                env("AWS_SECRET_ACCESS_KEY"),
                env("AWS_SESSION_TOKEN"),
            )
        });

        let shared_file = env("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .or_else(|| env("HOME").map(|home| PathBuf::from(home).join(".aws/credentials")));

        let container = env("AWS_CONTAINER_CREDENTIALS_FULL_URI")
            .or_else(|| {
                env("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI").map(|uri| format!("{CONTAINER_HOST}{uri}"))
            })
            .map(|uri| ContainerSource {
                uri,
                authorization: env("AWS_CONTAINER_AUTHORIZATION_TOKEN"),
            });

        let imds_disabled = env("AWS_EC2_METADATA_DISABLED")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));
        let imds_endpoint = match imds_disabled {
            true => None,
            false => Some(
                env("AWS_EC2_METADATA_SERVICE_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_IMDS_ENDPOINT.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            ),
        };

        Ok(CredentialsProvider {
            fixed,
            shared_file,
            profile: env("AWS_PROFILE").unwrap_or_else(|| "default".to_string()),
            container,
            imds_endpoint,
            client: reqwest::Client::builder().timeout(METADATA_TIMEOUT).build()?,
            cached: Mutex::new(None),
        })
    }

    /// Current credentials. Concurrent callers wait on a single refresh.
    pub async fn credentials(&self) -> Result<Credentials, StoreError> {
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }

        let mut cached = self.cached.lock().await;
        if let Some(resolved) = cached.as_ref()
            && resolved.is_fresh(Utc::now())
        {
            return Ok(resolved.credentials.clone());
        }

        let resolved = self.resolve().await?;
        tracing::debug!(
            access_key_id = %resolved.credentials.access_key_id,
            expires = ?resolved.expires,
            "Resolved AWS credentials"
        );
        *cached = Some(resolved.clone());
        Ok(resolved.credentials)
    }

    async fn resolve(&self) -> Result<Resolved, StoreError> {
        if let Some(credentials) = self.from_shared_file().await? {
            return Ok(Resolved::fixed(credentials));
        }
        if let Some(container) = &self.container {
            return self.from_container(container).await;
        }
        if let Some(endpoint) = &self.imds_endpoint {
            return self.from_imds(endpoint).await;
        }
        Err(StoreError::MissingCredentials)
    }

    async fn from_shared_file(&self) -> Result<Option<Credentials>, StoreError> {
        let Some(path) = &self.shared_file else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(parse_profile(&contents, &self.profile)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn from_container(&self, container: &ContainerSource) -> Result<Resolved, StoreError> {
        let mut request = self.client.get(&container.uri);
        if let Some(token) = &container.authorization {
            request = request.header("authorization", token);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable("container endpoint", e))?;
        let document: CredentialsDocument = response
            .json()
            .await
            .map_err(|e| unavailable("container endpoint", e))?;
        Ok(document.into())
    }

    async fn from_imds(&self, endpoint: &str) -> Result<Resolved, StoreError> {
        let token = self
            .client
            .put(format!("{endpoint}/latest/api/token"))
            .header("x-aws-ec2-metadata-token-ttl-seconds", IMDS_TOKEN_TTL_SECS)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable("instance metadata", e))?
            .text()
            .await
            .map_err(|e| unavailable("instance metadata", e))?;

        let roles_url = format!("{endpoint}/latest/meta-data/iam/security-credentials/");
        let roles = self.imds_get(&roles_url, &token).await?.text().await;
        let roles = roles.map_err(|e| unavailable("instance metadata", e))?;
        let Some(role) = roles.lines().map(str::trim).find(|line| !line.is_empty()) else {
            return Err(StoreError::CredentialsUnavailable(
                "instance metadata: no IAM role attached".to_string(),
            ));
        };

        let document: CredentialsDocument = self
            .imds_get(&format!("{roles_url}{role}"), &token)
            .await?
            .json()
            .await
            .map_err(|e| unavailable("instance metadata", e))?;
        Ok(document.into())
    }

    async fn imds_get(&self, url: &str, token: &str) -> Result<reqwest::Response, StoreError> {
        self.client
            .get(url)
            .header("x-aws-ec2-metadata-token", token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable("instance metadata", e))
    }
}

fn unavailable(source: &str, error: reqwest::Error) -> StoreError {
    StoreError::CredentialsUnavailable(format!("{source}: {error}"))
}

fn keys(
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
) -> Option<Credentials> {
    let access_key_id = access_key_id.filter(|k| !k.is_empty())?;
    let secret_access_key = secret_access_key.filter(|k| !k.is_empty())?;
    Some(Credentials {
        access_key_id,
        secret_access_key,
        session_token: session_token.filter(|t| !t.is_empty()),
    })
}

/// Reads one `[profile]` section of an INI-style credentials file.
fn parse_profile(contents: &str, profile: &str) -> Option<Credentials> {
    let mut in_profile = false;
    let mut values = HashMap::new();

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            continue;
        }
        if in_profile && let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    keys(
        values.remove("aws_access_key_id"),
        values.remove("aws_secret_access_key"),
        values.remove("aws_session_token"),
    )
}
