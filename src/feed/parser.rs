use regex::Regex;
use std::sync::OnceLock;

use super::document::{Element, FeedDocument};
use super::episode::EpisodeRecord;
use super::error::FeedError;

fn img_src_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"<img[^>]+src="([^">]+)""#).expect("img pattern is valid"))
}

/// One step of the thumbnail extraction chain.
///
/// Rules are evaluated in [`ThumbnailRule::CHAIN`] order and the first one
/// that yields a non-empty URL wins. A rule whose element exists but has
/// no usable `url` attribute yields nothing, letting the chain continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailRule {
    /// `<media:content>` whose `medium` is `image` or whose `type` mentions image
    MediaContent,
    /// `<media:thumbnail url="...">`
    MediaThumbnail,
    /// `<enclosure>` whose `type` mentions image
    ImageEnclosure,
    /// First `<img src="...">` inside the raw description markup
    DescriptionImage,
}

impl ThumbnailRule {
    pub const CHAIN: [ThumbnailRule; 4] = [
        ThumbnailRule::MediaContent,
        ThumbnailRule::MediaThumbnail,
        ThumbnailRule::ImageEnclosure,
        ThumbnailRule::DescriptionImage,
    ];

    pub fn apply(self, item: &Element, description: &str) -> Option<String> {
        match self {
            ThumbnailRule::MediaContent => item
                .descendants()
                .find(|el| el.local_name() == "content" && is_image_media(el))
                .and_then(url_attr),
            ThumbnailRule::MediaThumbnail => item
                .descendants()
                .find(|el| el.local_name() == "thumbnail")
                .and_then(url_attr),
            ThumbnailRule::ImageEnclosure => item
                .descendants()
                .find(|el| el.local_name() == "enclosure" && type_mentions_image(el))
                .and_then(url_attr),
            ThumbnailRule::DescriptionImage => img_src_pattern()
                .captures(description)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_owned()),
        }
    }
}

fn is_image_media(el: &Element) -> bool {
    el.attr("medium") == Some("image") || type_mentions_image(el)
}

fn type_mentions_image(el: &Element) -> bool {
    el.attr("type").is_some_and(|t| t.contains("image"))
}

fn url_attr(el: &Element) -> Option<String> {
    el.attr("url")
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_owned)
}

/// Runs the thumbnail chain for one item.
pub fn extract_thumbnail(item: &Element, description: &str) -> Option<String> {
    ThumbnailRule::CHAIN
        .iter()
        .find_map(|rule| rule.apply(item, description))
}

/// Builds a record from one `<item>`. Missing fields become empty strings.
pub fn episode_from_item(item: &Element) -> EpisodeRecord {
    let description = item.child_text("description");
    let thumbnail = extract_thumbnail(item, &description);

    EpisodeRecord {
        title: item.child_text("title"),
        link: item.child_text("link"),
        pub_date: item.child_text("pubDate"),
        guid: item.child_text("guid"),
        description,
        thumbnail,
    }
}

/// Lazily yields records in document order.
///
/// Items with neither a title nor a link are not playable and are skipped.
/// Nothing past the last record pulled by the caller is normalized, so
/// `episodes(&doc).take(6)` only touches the first few items.
pub fn episodes(doc: &FeedDocument) -> impl Iterator<Item = EpisodeRecord> + '_ {
    doc.items().filter_map(|item| {
        let record = episode_from_item(item);
        if record.title.is_empty() && record.link.is_empty() {
            tracing::debug!(guid = %record.guid, "Skipping item without title or link");
            return None;
        }
        Some(record)
    })
}

/// Normalizes the whole document.
///
/// # Errors
///
/// [`FeedError::EmptyFeed`] when the document yields no records.
pub fn normalize(doc: &FeedDocument) -> Result<Vec<EpisodeRecord>, FeedError> {
    normalize_first(doc, usize::MAX)
}

/// Normalizes at most `limit` records.
///
/// Emptiness is judged on the feed itself, not on `limit`: a feed with
/// items and `limit == 0` is `Ok(vec![])`.
pub fn normalize_first(doc: &FeedDocument, limit: usize) -> Result<Vec<EpisodeRecord>, FeedError> {
    let mut records = episodes(doc).peekable();
    if records.peek().is_none() {
        return Err(FeedError::EmptyFeed);
    }
    Ok(records.take(limit).collect())
}
