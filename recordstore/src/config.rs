use serde::Deserialize;
use std::fmt;
use url::Url;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum RecordStoreType {
    Dynamodb(DynamoDbConfig),
    Filesystem { base_dir: String },
    Memory,
}

impl Default for RecordStoreType {
    fn default() -> Self {
        RecordStoreType::Dynamodb(DynamoDbConfig::default())
    }
}

#[derive(Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DynamoDbConfig {
    pub region: String,
    /// Overrides the regional endpoint, e.g. for DynamoDB Local.
    pub endpoint: Option<Url>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        DynamoDbConfig {
            region: DEFAULT_REGION.into(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for DynamoDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("DynamoDbConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("session_token", &redacted(&self.session_token))
            .finish()
    }
}
