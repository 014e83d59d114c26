use miette::Diagnostic;
use thiserror::Error;

/// Failure modes of a remote metadata call.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Rate limited by upstream API")]
    #[diagnostic(
        code(hacs_github::rate_limited),
        help("Configure a GitHub token or wait for the rate limit window to reset")
    )]
    RateLimited { reset_at: Option<u64> },

    #[error("Not found: {0}")]
    #[diagnostic(code(hacs_github::not_found))]
    NotFound(String),

    #[error("Network error: {0}")]
    #[diagnostic(
        code(hacs_github::network),
        help("Check your internet connection or try again later")
    )]
    Network(String),
}

impl ClientError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimited { .. })
    }
}

impl From<ureq::Error> for ClientError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(which) => ClientError::Network(format!("timed out ({which})")),
            ureq::Error::StatusCode(404) => ClientError::NotFound("resource".into()),
            ureq::Error::StatusCode(429) => ClientError::RateLimited { reset_at: None },
            other => ClientError::Network(other.to_string()),
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ClientError::NotFound("owner/gone".into()).to_string(),
            "Not found: owner/gone"
        );
        assert_eq!(
            ClientError::Network("connection reset".into()).to_string(),
            "Network error: connection reset"
        );
        assert!(ClientError::RateLimited { reset_at: Some(1) }.is_rate_limited());
        assert!(!ClientError::Network(String::new()).is_rate_limited());
    }

    #[test]
    fn test_from_ureq_status() {
        assert!(matches!(
            ClientError::from(ureq::Error::StatusCode(404)),
            ClientError::NotFound(_)
        ));
        assert!(ClientError::from(ureq::Error::StatusCode(429)).is_rate_limited());
        assert!(matches!(
            ClientError::from(ureq::Error::StatusCode(502)),
            ClientError::Network(_)
        ));
    }
}
