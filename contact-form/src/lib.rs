//! Client side of the contact page: holds what the visitor typed, posts it to
//! the query endpoint and keeps the notice shown under the form.

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "http://15.206.147.55:8080/submitQuery";

pub const FAILURE_TEXT: &str = "An error occurred. Please try again later.";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FormData {
    pub name: String,
    pub email: String,
    pub query: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoticeClass {
    #[default]
    None,
    Success,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Notice {
    pub visible: bool,
    pub text: String,
    pub class: NoticeClass,
}

#[derive(Error, Debug)]
pub enum ContactError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with {0}")]
    Status(StatusCode),
}

pub struct ContactController {
    client: reqwest::Client,
    endpoint: String,
    form: FormData,
    notice: Notice,
}

impl ContactController {
    pub fn new(endpoint: impl Into<String>) -> Self {
        ContactController {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            form: FormData::default(),
            notice: Notice::default(),
        }
    }

    pub fn form(&self) -> &FormData {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut FormData {
        &mut self.form
    }

    pub fn notice(&self) -> &Notice {
        &self.notice
    }

    /// Posts the current form once and updates the notice with the outcome.
    pub async fn submit_form(&mut self) -> &Notice {
        self.notice = Notice::default();

        self.notice = match self.post().await {
            Ok(message) => Notice {
                visible: true,
                text: message,
                class: NoticeClass::Success,
            },
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "Error submitting contact form");
                Notice {
                    visible: true,
                    text: FAILURE_TEXT.to_string(),
                    class: NoticeClass::Error,
                }
            }
        };

        &self.notice
    }

    async fn post(&self) -> Result<String, ContactError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(&self.form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContactError::Status(status));
        }

        let bytes = response.bytes().await?;
        Ok(message_of(&bytes))
    }
}

impl Default for ContactController {
    fn default() -> Self {
        ContactController::new(DEFAULT_ENDPOINT)
    }
}

// The `message` field of a JSON reply. Anything else shows as empty text.
fn message_of(bytes: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return String::new();
    };

    match value.get("message") {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
