// API error kinds
// Every handler failure maps to one of these; only `Internal` hides its detail

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use thiserror::Error;

use super::response::json_response;
use super::types::ErrorBody;
use crate::logger;
use crate::storage::StoreError;

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Path exists but not for this method; carries the `Allow` header value
    #[error("Method Not Allowed")]
    MethodNotAllowed(&'static str),

    #[error("Payload Too Large")]
    PayloadTooLarge,

    /// Logged in full, reported to the caller as a generic message
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `error` field of the response body
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        if let Self::Internal(detail) = &self {
            logger::log_error(detail);
        }

        let mut response = json_response(
            self.status(),
            &ErrorBody {
                error: self.public_message(),
            },
        );
        if let Self::MethodNotAllowed(allow) = self {
            response
                .headers_mut()
                .insert("Allow", hyper::header::HeaderValue::from_static(allow));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidName(name) => Self::BadRequest(format!("Invalid name: {name}")),
            other => Self::Internal(other.to_string()),
        }
    }
}
