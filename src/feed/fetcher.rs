use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::redirect::Policy;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::document::FeedDocument;
use super::episode::EpisodeRecord;
use super::error::{FeedError, SourceError, SourceFailure};
use super::parser::normalize_first;
use super::source::{FeedSource, ResponseShape};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default bound on a single source attempt, body included.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Text every accepted body must contain.
const FEED_ROOT_MARKER: &str = "<rss";

const MAX_REDIRECTS: usize = 5;

/// HTTP client for feed requests: bounded redirects, pooled connections.
pub fn build_client(user_agent: &str) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(redirect_policy())
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(30))
        .connect_timeout(DEFAULT_ATTEMPT_TIMEOUT)
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }
        if attempt.previous().iter().any(|prev| prev == attempt.url()) {
            return attempt.error("Redirect loop detected");
        }
        tracing::debug!(
            to = %attempt.url(),
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// A document obtained from one of the sources.
#[derive(Debug)]
pub struct ResolvedFeed {
    pub document: FeedDocument,
    /// Position of the winning source in the chain
    pub source_index: usize,
    pub source_label: &'static str,
}

/// Everything a caller needs from one successful load.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub episodes: Vec<EpisodeRecord>,
    pub source_index: usize,
    pub source_label: &'static str,
    pub last_build_date: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Fetches the feed through an ordered chain of sources.
///
/// Sources are tried one at a time, in order, and the first that returns a
/// valid feed document wins. Later sources are never contacted after a
/// success. Each attempt is bounded by its own timeout; there are no
/// retries within a source.
#[derive(Debug, Clone)]
pub struct FeedResolver {
    client: reqwest::Client,
    sources: Vec<FeedSource>,
    timeout: Duration,
}

impl FeedResolver {
    /// Resolver over [`FeedSource::default_chain`].
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            sources: FeedSource::default_chain(),
            timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_sources(mut self, sources: Vec<FeedSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    /// Resolves `feed_url` into a parsed document.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidFeedUrl`] if `feed_url` does not parse
    /// - [`FeedError::AllSourcesExhausted`] with one [`SourceFailure`] per
    ///   source, in chain order, if none succeeded
    pub async fn resolve(&self, feed_url: &str) -> Result<ResolvedFeed, FeedError> {
        let canonical = Url::parse(feed_url)?;
        let stamp = Utc::now().timestamp_millis();
        let mut failures = Vec::with_capacity(self.sources.len());

        for (index, source) in self.sources.iter().enumerate() {
            match self.attempt(source, &canonical, stamp).await {
                Ok(document) => {
                    tracing::info!(
                        source_index = index,
                        source = source.label(),
                        failed_before = failures.len(),
                        "Feed resolved"
                    );
                    return Ok(ResolvedFeed {
                        document,
                        source_index: index,
                        source_label: source.label(),
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        source_index = index,
                        source = source.label(),
                        error = %error,
                        "Feed source failed, trying next"
                    );
                    failures.push(SourceFailure {
                        index,
                        label: source.label(),
                        error,
                    });
                }
            }
        }

        Err(FeedError::AllSourcesExhausted(failures))
    }

    async fn attempt(
        &self,
        source: &FeedSource,
        canonical: &Url,
        stamp: i64,
    ) -> Result<FeedDocument, SourceError> {
        let request = source.request(canonical, stamp)?;
        tracing::debug!(source = source.label(), url = %request.url, "Fetching feed");

        let bytes = tokio::time::timeout(self.timeout, self.fetch_bytes(request.url))
            .await
            .map_err(|_| SourceError::Timeout)??;

        let text = match request.shape {
            ResponseShape::RawText => String::from_utf8_lossy(&bytes).into_owned(),
            ResponseShape::JsonWrapped => unwrap_envelope(&bytes)?,
        };

        if !text.contains(FEED_ROOT_MARKER) {
            return Err(SourceError::InvalidFeedContent);
        }

        Ok(FeedDocument::parse(&text)?)
    }

    async fn fetch_bytes(&self, url: Url) -> Result<Vec<u8>, SourceError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

/// Resolves and normalizes the feed in one step.
///
/// `limit` caps how many episodes are materialized; `None` takes all.
///
/// # Errors
///
/// Everything [`FeedResolver::resolve`] returns, plus
/// [`FeedError::EmptyFeed`] when the winning document has no episodes.
pub async fn load_feed(
    resolver: &FeedResolver,
    feed_url: &str,
    limit: Option<usize>,
) -> Result<FeedSnapshot, FeedError> {
    let resolved = resolver.resolve(feed_url).await?;
    let episodes = normalize_first(&resolved.document, limit.unwrap_or(usize::MAX))?;

    tracing::info!(
        source = resolved.source_label,
        episodes = episodes.len(),
        "Feed loaded"
    );

    Ok(FeedSnapshot {
        episodes,
        source_index: resolved.source_index,
        source_label: resolved.source_label,
        last_build_date: resolved.document.last_build_date(),
        fetched_at: Utc::now(),
    })
}

/// Pulls the feed markup out of a `{"contents": "..."}` envelope.
fn unwrap_envelope(bytes: &[u8]) -> Result<String, SourceError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| SourceError::MalformedEnvelope(e.to_string()))?;

    match value.get("contents").and_then(serde_json::Value::as_str) {
        Some(contents) if !contents.is_empty() => Ok(contents.to_owned()),
        _ => Err(SourceError::MalformedEnvelope(
            "no `contents` text in response".to_owned(),
        )),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, SourceError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(SourceError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SourceError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
