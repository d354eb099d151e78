use crate::errors::IntakeError;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use std::collections::HashMap;

/// Submitted form fields, decoded from either a JSON or a URL-encoded body.
#[derive(Debug, Default, PartialEq)]
pub struct FormBody {
    fields: HashMap<String, String>,
}

impl FormBody {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormBody {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FormBody {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Reads at most `limit` bytes of `body` and decodes it according to the
/// request's content type. Unknown content types decode to an empty form.
pub async fn read_form_body<B>(
    headers: &HeaderMap,
    body: B,
    limit: usize,
) -> Result<FormBody, IntakeError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| match e.downcast_ref::<LengthLimitError>() {
            Some(_) => IntakeError::PayloadTooLarge(limit),
            None => IntakeError::Body(e.to_string()),
        })?
        .to_bytes();

    match media_type(headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())).as_deref() {
        Some("application/json") => decode_json(&bytes),
        Some(mime) if mime.ends_with("+json") => decode_json(&bytes),
        Some("application/x-www-form-urlencoded") | None => decode_urlencoded(&bytes),
        Some(other) => {
            tracing::debug!(content_type = other, "Ignoring body with unsupported content type");
            Ok(FormBody::default())
        }
    }
}

/// True when the client lists JSON as its first preference, as XHR clients do.
pub fn prefers_json(headers: &HeaderMap) -> bool {
    let first = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .and_then(|accept| accept.split(',').next());

    media_type(first).as_deref() == Some("application/json")
}

fn media_type(value: Option<&str>) -> Option<String> {
    value
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

fn decode_json(bytes: &Bytes) -> Result<FormBody, IntakeError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(FormBody::default());
    }

    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| IntakeError::MalformedBody(e.to_string()))?;
    let serde_json::Value::Object(map) = value else {
        return Err(IntakeError::MalformedBody(
            "expected a JSON object".to_string(),
        ));
    };

    // Scalars keep their JSON text; null, arrays and objects count as absent
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some((key, s)),
            serde_json::Value::Number(n) => Some((key, n.to_string())),
            serde_json::Value::Bool(b) => Some((key, b.to_string())),
            _ => None,
        })
        .collect())
}

fn decode_urlencoded(bytes: &Bytes) -> Result<FormBody, IntakeError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|e| IntakeError::MalformedBody(e.to_string()))?;

    // Repeated keys: the last value wins
    Ok(pairs.into_iter().collect())
}
