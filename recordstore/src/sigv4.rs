//! AWS Signature Version 4 for JSON-protocol POST requests.
//!
//! Only what the DynamoDB adapter needs: requests to `/` with no query string,
//! a fixed set of signed headers, and the payload hash in the canonical request.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

pub struct Signer<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
}

/// Headers to attach to the outgoing request, including `authorization`.
#[derive(Debug)]
pub struct SignedHeaders {
    pub headers: BTreeMap<String, String>,
}

impl Signer<'_> {
    /// Signs a POST to `/`. `headers` must not contain `x-amz-date`,
    /// `x-amz-security-token` or `authorization`; they are added here.
    pub fn sign_post(
        &self,
        mut headers: BTreeMap<String, String>,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> SignedHeaders {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        headers.insert("x-amz-date".into(), amz_date.clone());
        if let Some(token) = &self.credentials.session_token {
            headers.insert("x-amz-security-token".into(), token.clone());
        }

        // BTreeMap keeps header names sorted, as the canonical form requires
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "POST\n/\n\n{canonical_headers}\n{signed_headers}\n{}",
            hex::encode(Sha256::digest(payload))
        );

        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.signing_key(&date);
        let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes()));

        headers.insert(
            "authorization".into(),
            format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.credentials.access_key_id
            ),
        );

        SignedHeaders { headers }
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac(secret.as_bytes(), date.as_bytes());
        let k_region = hmac(&k_date, self.region.as_bytes());
        let k_service = hmac(&k_region, self.service.as_bytes());
        hmac(&k_service, b"aws4_request")
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials(session_token: Option<&str>) -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            session_token: session_token.map(String::from),
        }
    }

    fn base_headers() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("content-type".into(), "application/x-amz-json-1.0".into()),
            ("host".into(), "dynamodb.us-east-1.amazonaws.com".into()),
            ("x-amz-target".into(), "DynamoDB_20120810.PutItem".into()),
        ])
    }

    const PAYLOAD: &[u8] =
        br#"{"TableName":"Emails","Item":{"emailid":{"S":"1"},"email":{"S":"a@example.com"}}}"#;

    #[test]
    fn test_known_signature() {
        let creds = credentials(None);
        let signer = Signer {
            credentials: &creds,
            region: "us-east-1",
            service: "dynamodb",
        };
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();

        let signed = signer.sign_post(base_headers(), PAYLOAD, now);

        assert_eq!(signed.headers["x-amz-date"], "20150830T123600Z");
        assert_eq!(
            signed.headers["authorization"],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/dynamodb/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date;x-amz-target, \
             Signature=32c635492d20ab653acdce09d8c54b5bd58bbabd381387fdb6cdf7f9551533b6"
        );
    }

    #[test]
    fn test_session_token_is_signed() {
        let creds = credentials(Some("token"));
        let signer = Signer {
            credentials: &creds,
            region: "us-east-1",
            service: "dynamodb",
        };
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();

        let signed = signer.sign_post(base_headers(), PAYLOAD, now);

        assert_eq!(signed.headers["x-amz-security-token"], "token");
        assert!(signed.headers["authorization"].contains(
            "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"
        ));
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let printed = format!("{:?}", credentials(Some("token")));
        assert!(printed.contains("AKIDEXAMPLE"));
        assert!(!printed.contains("EXAMPLEKEY"));
        assert!(!printed.contains("token"));
    }
}
