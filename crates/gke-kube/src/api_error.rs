use gke_waiter::HttpStatus;
use serde::Deserialize;

pub const BAD_REQUEST: u16 = 400;
pub const FORBIDDEN: u16 = 403;
pub const NOT_FOUND: u16 = 404;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

/// Error returned by a Google API over HTTP
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("ResponseError: code={code}, message={message}")]
pub struct ApiError {
    pub status: u16,
    pub code: i64,
    pub message: String,
}

impl ApiError {
    /// Build from a response body shaped like `{"error": {"code", "message"}}`.
    ///
    /// Bodies that are not in that shape are kept verbatim as the message.
    pub fn from_http_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => Self {
                status,
                code: parsed.error.code.unwrap_or(i64::from(status)),
                message: parsed.error.message,
            },
            Err(_) => Self {
                status,
                code: i64::from(status),
                message: body.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == NOT_FOUND
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == FORBIDDEN
    }
}

impl HttpStatus for ApiError {
    fn http_status(&self) -> Option<u16> {
        Some(self.status)
    }
}

/// Turn client side errors into a caller specific error, passing the rest through
pub fn reraise<E>(err: ApiError, convert: impl FnOnce(&ApiError) -> E) -> E
where
    E: From<ApiError>,
{
    match err.status {
        BAD_REQUEST | FORBIDDEN | NOT_FOUND => convert(&err),
        _ => E::from(err),
    }
}
