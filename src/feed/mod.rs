//! Feed retrieval and normalization.
//!
//! Loading a feed is a two-stage pipeline:
//!
//! - **Resolving**: the canonical feed URL is fetched through an ordered
//!   chain of [`FeedSource`]s (two public proxies, then the origin) until one
//!   returns a well-formed RSS document
//! - **Normalizing**: the document's `<item>`s become [`EpisodeRecord`]s,
//!   each with a thumbnail picked by the [`ThumbnailRule`] chain
//!
//! # Submodules
//!
//! - [`source`] - the fallback chain and request construction
//! - [`fetcher`] - HTTP transport, envelope unwrapping, and [`load_feed`]
//! - [`document`] - minimal owned XML tree built on `quick-xml`
//! - [`parser`] - item normalization and thumbnail extraction
//! - [`episode`] - the record type and its derived helpers
//!
//! # Example
//!
//! ```ignore
//! use reelfeed::feed::{load_feed, FeedResolver, DEFAULT_FEED_URL};
//!
//! let resolver = FeedResolver::new(reqwest::Client::new());
//! let snapshot = load_feed(&resolver, DEFAULT_FEED_URL, Some(6)).await?;
//! println!("{} episodes via {}", snapshot.episodes.len(), snapshot.source_label);
//! ```

pub mod document;
pub mod episode;
pub mod error;
pub mod fetcher;
pub mod parser;
pub mod source;

pub use document::{DocumentError, Element, FeedDocument};
pub use episode::{
    embed_url, newest_first, parse_pub_date, recap, slugify, sort_newest_first, title_order,
    EpisodeRecord, PLACEHOLDER_THUMBNAIL,
};
pub use error::{FeedError, SourceError, SourceFailure};
pub use fetcher::{
    build_client, load_feed, FeedResolver, FeedSnapshot, ResolvedFeed, DEFAULT_ATTEMPT_TIMEOUT,
};
pub use parser::{episodes, extract_thumbnail, normalize, normalize_first, ThumbnailRule};
pub use source::{FeedSource, ResponseShape, SourceRequest, DEFAULT_FEED_URL};
