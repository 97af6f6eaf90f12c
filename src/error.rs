use reqwest::StatusCode;
use thiserror::Error;

/// Failures that abort a scan. Everything scoped to a single candidate or
/// a single upstream source is absorbed before it gets here.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid domain `{input}`: {reason}")]
    InvalidDomain { input: String, reason: &'static str },

    #[error("concurrency limit must be greater than zero")]
    InvalidConcurrency,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Errors caused by the caller's input (4xx-class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScanError::InvalidDomain { .. } | ScanError::InvalidConcurrency)
    }
}

/// Why the certificate transparency source produced nothing.
#[derive(Debug, Error)]
pub enum CtError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Outcome of a single address-family lookup that produced no address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no records")]
    NoRecords,

    #[error("timed out")]
    Timeout,

    #[error("lookup failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum RangeError {
    #[error("`{0}` is not in address/prefix form")]
    Syntax(String),

    #[error("invalid address in `{0}`")]
    Address(String),

    #[error("prefix length out of range in `{0}`")]
    Prefix(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_flagged() {
        let e = ScanError::InvalidDomain { input: "-bad".into(), reason: "label starts with a hyphen" };
        assert!(e.is_client_error());
        assert!(ScanError::InvalidConcurrency.is_client_error());
        assert!(!ScanError::Internal("x".into()).is_client_error());
        assert_eq!(e.to_string(), "invalid domain `-bad`: label starts with a hyphen");
    }
}
