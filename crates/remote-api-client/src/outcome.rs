use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Broad class of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    /// 4xx: validation, auth, conflict rejection.
    Client,
    /// 5xx.
    Server,
    /// No response: connect failure, timeout, reset.
    Network,
}

/// A replayed mutation the server accepted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplayOutcome {
    /// The persisted resource, when the server returned one.
    pub resource: Option<Value>,
}

/// A classified request failure.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    pub retryable: bool,
    pub category: StatusCategory,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteFailure {
    /// Classify an HTTP error status.
    ///
    /// 4xx is terminal except 408 and 429. 5xx is retryable.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let category = if (400..500).contains(&status) {
            StatusCategory::Client
        } else {
            StatusCategory::Server
        };
        let retryable = match category {
            StatusCategory::Client => matches!(status, 408 | 429),
            _ => true,
        };
        Self {
            retryable,
            category,
            status: Some(status),
            message: message.into(),
        }
    }

    /// A transport-level failure with no response.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            category: StatusCategory::Network,
            status: None,
            message: message.into(),
        }
    }

    /// The server rejected the change because the resource moved on.
    pub fn is_conflict_rejection(&self) -> bool {
        self.status == Some(409)
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "network: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_fail_fast() {
        for status in [400, 401, 403, 404, 409, 422] {
            let failure = RemoteFailure::from_status(status, "");
            assert!(!failure.retryable, "{status} should not retry");
            assert_eq!(failure.category, StatusCategory::Client);
        }
    }

    #[test]
    fn test_timeouts_and_throttling_retry() {
        assert!(RemoteFailure::from_status(408, "").retryable);
        assert!(RemoteFailure::from_status(429, "").retryable);
    }

    #[test]
    fn test_server_errors_retry() {
        let failure = RemoteFailure::from_status(503, "unavailable");
        assert!(failure.retryable);
        assert_eq!(failure.category, StatusCategory::Server);
        assert_eq!(failure.to_string(), "HTTP 503: unavailable");
    }

    #[test]
    fn test_conflict_rejection() {
        assert!(RemoteFailure::from_status(409, "stale").is_conflict_rejection());
        assert!(!RemoteFailure::network("reset").is_conflict_rejection());
    }
}
