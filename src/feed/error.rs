use std::fmt;
use thiserror::Error;

use super::document::DocumentError;

/// Why a single feed source failed.
///
/// These are recorded per source and only reach the caller inside
/// [`FeedError::AllSourcesExhausted`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP {0}")]
    HttpStatus(u16),
    /// Attempt exceeded the per-source timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// JSON envelope missing a usable `contents` field
    #[error("Malformed JSON envelope: {0}")]
    MalformedEnvelope(String),
    /// Body does not carry the `<rss` root marker
    #[error("Invalid RSS content")]
    InvalidFeedContent,
    /// Body is not well-formed XML
    #[error("XML parse error: {0}")]
    Parse(#[from] DocumentError),
    /// The source could not build a request URL
    #[error("Invalid source URL: {0}")]
    InvalidRequest(#[from] url::ParseError),
}

impl SourceError {
    /// True for transport-level failures (status, connection, timeout, size).
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_)
                | SourceError::HttpStatus(_)
                | SourceError::Timeout
                | SourceError::ResponseTooLarge
        )
    }
}

/// A failed attempt, tagged with the position and label of its source.
#[derive(Debug)]
pub struct SourceFailure {
    pub index: usize,
    pub label: &'static str,
    pub error: SourceError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}): {}", self.index, self.label, self.error)
    }
}

/// Failures surfaced to callers of a feed load.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid feed URL: {0}")]
    InvalidFeedUrl(#[from] url::ParseError),
    /// Every source failed; one entry per source, in order.
    #[error("All feed sources failed: {}", join_failures(.0))]
    AllSourcesExhausted(Vec<SourceFailure>),
    /// The feed parsed but contained no playable episodes
    #[error("No episodes found in feed")]
    EmptyFeed,
}

fn join_failures(failures: &[SourceFailure]) -> String {
    if failures.is_empty() {
        return "no sources configured".to_owned();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_names_each_source() {
        let err = FeedError::AllSourcesExhausted(vec![
            SourceFailure {
                index: 0,
                label: "AllOrigins",
                error: SourceError::HttpStatus(503),
            },
            SourceFailure {
                index: 1,
                label: "Direct",
                error: SourceError::InvalidFeedContent,
            },
        ]);
        assert_eq!(
            err.to_string(),
            "All feed sources failed: #0 (AllOrigins): HTTP 503, #1 (Direct): Invalid RSS content"
        );
    }

    #[test]
    fn test_exhausted_without_sources() {
        let err = FeedError::AllSourcesExhausted(Vec::new());
        assert!(err.to_string().contains("no sources configured"));
    }

    #[test]
    fn test_network_failure_classification() {
        assert!(SourceError::HttpStatus(500).is_network_failure());
        assert!(SourceError::Timeout.is_network_failure());
        assert!(!SourceError::InvalidFeedContent.is_network_failure());
        assert!(!SourceError::MalformedEnvelope("x".into()).is_network_failure());
    }
}
