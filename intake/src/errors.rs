use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),
}

impl IntakeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            IntakeError::MalformedBody(_) | IntakeError::Body(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
