//! Fetch, normalize, and browse a single RSS feed of video episodes.
//!
//! The feed is retrieved through an ordered fallback chain of public proxies
//! and a direct request ([`feed::FeedResolver`]), parsed into an owned XML
//! tree, and normalized into [`feed::EpisodeRecord`]s. [`catalog::Catalog`]
//! keeps the latest load for filtering and sorting.

pub mod catalog;
pub mod config;
pub mod feed;
pub mod util;
