use crate::config::DynamoDbConfig;
use crate::credentials::CredentialsProvider;
use crate::sigv4::Signer;
use crate::{Record, RecordStore, StoreError, validate_collection};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

const SERVICE: &str = "dynamodb";
const PUT_ITEM_TARGET: &str = "DynamoDB_20120810.PutItem";
const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";

#[derive(Serialize)]
struct PutItemRequest<'a> {
    #[serde(rename = "TableName")]
    table_name: &'a str,
    #[serde(rename = "Item")]
    item: IndexMap<&'a str, AttributeValue<'a>>,
}

#[derive(Serialize)]
struct AttributeValue<'a> {
    #[serde(rename = "S")]
    s: &'a str,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Writes records with DynamoDB `PutItem`, one string attribute per field.
pub struct DynamoDbRecordStore {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: CredentialsProvider,
}

impl DynamoDbRecordStore {
    /// Credentials are looked up on the first write, not here.
    pub fn new(config: &DynamoDbConfig) -> Result<Self, StoreError> {
        Self::with_credentials(config, CredentialsProvider::new(config)?)
    }

    fn with_credentials(
        config: &DynamoDbConfig,
        credentials: CredentialsProvider,
    ) -> Result<Self, StoreError> {
        let endpoint = match &config.endpoint {
            Some(url) => url.clone(),
            None => Url::parse(&format!("https://dynamodb.{}.amazonaws.com/", config.region))
                .map_err(|e| StoreError::InvalidEndpoint(e.to_string()))?,
        };

        // Requests are signed for `/` with no query string
        if endpoint.path() != "/" || endpoint.query().is_some() {
            return Err(StoreError::InvalidEndpoint(endpoint.to_string()));
        }

        // Must match the Host header reqwest sends: the port only when it is not the default
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(StoreError::InvalidEndpoint(endpoint.to_string())),
        };

        Ok(DynamoDbRecordStore {
            client: reqwest::Client::new(),
            endpoint,
            host,
            region: config.region.clone(),
            credentials,
        })
    }
}

#[async_trait]
impl RecordStore for DynamoDbRecordStore {
    fn name(&self) -> &'static str {
        "dynamodb"
    }

    async fn put(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        validate_collection(collection)?;

        let request = PutItemRequest {
            table_name: collection,
            item: record
                .iter()
                .map(|(name, value)| (name.as_str(), AttributeValue { s: value }))
                .collect(),
        };
        let payload = serde_json::to_vec(&request)?;

        let credentials = self.credentials.credentials().await?;
        let signer = Signer {
            credentials: &credentials,
            region: &self.region,
            service: SERVICE,
        };
        let headers = BTreeMap::from([
            ("content-type".to_string(), JSON_CONTENT_TYPE.to_string()),
            ("host".to_string(), self.host.clone()),
            ("x-amz-target".to_string(), PUT_ITEM_TARGET.to_string()),
        ]);
        let signed = signer.sign_post(headers, &payload, Utc::now());

        let mut builder = self.client.post(self.endpoint.clone());
        for (name, value) in &signed.headers {
            // reqwest derives Host from the URL
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        let response = builder.body(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.bytes().await?;
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap_or_default();
        let kind = error
            .kind
            .as_deref()
            .and_then(|k| k.rsplit('#').next())
            .unwrap_or("UnknownError")
            .to_string();

        Err(StoreError::Rejected {
            status: status.as_u16(),
            kind,
            message: error.message.unwrap_or_default(),
        })
    }
}
