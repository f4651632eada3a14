use thiserror::Error;

/// How the gateway should react to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network trouble or a server-side hiccup. Worth retrying.
    Transient,
    /// The exchange asked us to slow down. Worth retrying after a pause.
    RateLimited,
    /// The request itself was refused. Retrying would give the same answer.
    Rejected,
    /// Credentials or permissions are wrong. Nothing will work until fixed.
    Fatal,
}

/// An error from a single exchange request, before any retry policy.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Exchange returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Exchange error {code} (HTTP {status}): {msg}")]
    Exchange { status: u16, code: i32, msg: String },

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("API key and secret are required for signed requests")]
    MissingCredentials,
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                FailureKind::Transient
            }
            ApiError::Http(_) => FailureKind::Rejected,
            ApiError::Status { status, .. } => classify_status(*status),
            ApiError::Exchange { status, code, .. } => match classify_status(*status) {
                FailureKind::Rejected => classify_code(*code),
                other => other,
            },
            ApiError::Deserialization(_) | ApiError::InvalidData(_) => FailureKind::Rejected,
            ApiError::MissingCredentials => FailureKind::Fatal,
        }
    }
}

fn classify_status(status: u16) -> FailureKind {
    match status {
        // 418 is the IP ban that follows ignoring 429s.
        429 | 418 => FailureKind::RateLimited,
        401 | 403 => FailureKind::Fatal,
        s if s >= 500 => FailureKind::Transient,
        _ => FailureKind::Rejected,
    }
}

fn classify_code(code: i32) -> FailureKind {
    match code {
        -1003 => FailureKind::RateLimited,
        -1000 | -1001 | -1006 | -1007 | -1021 => FailureKind::Transient,
        -1002 | -1022 | -2014 | -2015 => FailureKind::Fatal,
        _ => FailureKind::Rejected,
    }
}

/// A failure surfaced by the gateway after its retry policy ran out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Exchange unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("Exchange rate limit still exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Exchange did not answer within {timeout_ms}ms after {attempts} attempts")]
    Timeout { attempts: u32, timeout_ms: u64 },

    #[error("Exchange rejected the request: {0}")]
    Rejected(String),

    #[error("Fatal exchange error: {0}")]
    Fatal(String),
}

impl GatewayError {
    /// Transient failures pause one currency; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Unavailable { .. }
                | GatewayError::RateLimitExceeded { .. }
                | GatewayError::Timeout { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(status: u16, code: i32) -> ApiError {
        ApiError::Exchange {
            status,
            code,
            msg: String::new(),
        }
    }

    #[test]
    fn statuses_are_classified() {
        let status = |s| ApiError::Status { status: s, body: String::new() };
        assert_eq!(status(503).kind(), FailureKind::Transient);
        assert_eq!(status(429).kind(), FailureKind::RateLimited);
        assert_eq!(status(418).kind(), FailureKind::RateLimited);
        assert_eq!(status(401).kind(), FailureKind::Fatal);
        assert_eq!(status(404).kind(), FailureKind::Rejected);
    }

    #[test]
    fn exchange_codes_refine_client_errors() {
        assert_eq!(exchange(400, -2015).kind(), FailureKind::Fatal);
        assert_eq!(exchange(400, -1021).kind(), FailureKind::Transient);
        assert_eq!(exchange(400, -2010).kind(), FailureKind::Rejected);
        assert_eq!(exchange(429, -2010).kind(), FailureKind::RateLimited);
        assert!(ApiError::MissingCredentials.kind() == FailureKind::Fatal);
    }

    #[test]
    fn gateway_error_transience() {
        assert!(GatewayError::Timeout { attempts: 3, timeout_ms: 10 }.is_transient());
        assert!(GatewayError::RateLimitExceeded { attempts: 3 }.is_transient());
        assert!(!GatewayError::Rejected("no".into()).is_transient());
        assert!(GatewayError::Fatal("auth".into()).is_fatal());
    }
}
