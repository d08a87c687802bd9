//! Fault metadata for failed HTTP calls.

use dossier_core::error::OracleError;
use dossier_core::fault::socket_error_code;

/// Map a reqwest transport failure to a request error carrying the socket
/// error name when one is known.
pub fn transport_error(err: reqwest::Error) -> OracleError {
    let code = socket_error_code(&err)
        .or_else(|| err.is_timeout().then_some("ETIMEDOUT"))
        .or_else(|| err.is_connect().then_some("ECONNREFUSED"))
        .map(str::to_string);
    OracleError::Request {
        message: err.to_string(),
        status: err.status().map(|s| s.as_u16()),
        code,
    }
}

/// Map a non-success HTTP status and its body to an oracle error.
pub fn status_error(status: u16, message: String, retry_after_secs: Option<u64>) -> OracleError {
    match status {
        401 | 403 => OracleError::Auth(message),
        429 => OracleError::RateLimited { retry_after_secs },
        _ => OracleError::Request {
            message: format!("HTTP {status}: {message}"),
            status: Some(status),
            code: None,
        },
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
