use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Image shown when an episode has no thumbnail of its own.
pub const PLACEHOLDER_THUMBNAIL: &str = "data:image/svg+xml,%3Csvg xmlns='http://www.w3.org/2000/svg' width='400' height='300' viewBox='0 0 400 300'%3E%3Crect width='400' height='300' fill='%236366f1' opacity='0.1'/%3E%3C/svg%3E";

const EMBED_BASE: &str = "https://odysee.com/$/embed/";

/// One normalized feed item.
///
/// Records are built once per load by the normalizer and never modified;
/// a reload replaces the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeRecord {
    pub title: String,
    /// Raw markup from the feed. Use [`crate::util::clean_html`] for display.
    pub description: String,
    pub link: String,
    /// Publication date exactly as the feed wrote it.
    pub pub_date: String,
    pub guid: String,
    /// `None` when no thumbnail rule matched; see [`PLACEHOLDER_THUMBNAIL`].
    pub thumbnail: Option<String>,
}

impl EpisodeRecord {
    /// Best-effort parse of [`pub_date`](Self::pub_date).
    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        parse_pub_date(&self.pub_date)
    }

    pub fn thumbnail_or_placeholder(&self) -> &str {
        self.thumbnail.as_deref().unwrap_or(PLACEHOLDER_THUMBNAIL)
    }

    /// URL-safe slug of the title, used in deep links.
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }

    /// Embeddable player URL for [`link`](Self::link).
    pub fn embed_url(&self) -> String {
        embed_url(&self.link)
    }

    /// Case-insensitive match on title or description. `needle` must
    /// already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }

    /// Up to three topic tags spotted in the description, joined with `•`.
    pub fn recap(&self) -> String {
        recap(&self.description)
    }

    /// Human-friendly age of the episode relative to `now`.
    ///
    /// Unparsable dates are returned verbatim; an empty date reads
    /// "Unknown date".
    pub fn display_date(&self, now: DateTime<Utc>) -> String {
        if self.pub_date.trim().is_empty() {
            return "Unknown date".to_owned();
        }
        let Some(published) = self.published_at() else {
            return self.pub_date.trim().to_owned();
        };

        let diff = now.signed_duration_since(published).num_seconds().unsigned_abs();
        let days = diff.div_ceil(86_400);
        match days {
            1 => "Yesterday".to_owned(),
            0..=6 => format!("{days} days ago"),
            7..=29 => {
                let weeks = days / 7;
                format!("{weeks} week{} ago", if weeks > 1 { "s" } else { "" })
            }
            _ => published.format("%b %-d, %Y").to_string(),
        }
    }
}

/// Parses RFC 2822 (the RSS norm) or RFC 3339 timestamps.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// Ordering for newest-first display.
///
/// Parsable dates come first, newest to oldest. Unparsable ones follow,
/// ordered by their raw text descending, so the order is total and
/// deterministic whatever the feed contains.
pub fn newest_first(a: &EpisodeRecord, b: &EpisodeRecord) -> Ordering {
    let key = |r: &EpisodeRecord| (r.published_at(), r.pub_date.clone());
    key(b).cmp(&key(a))
}

/// Alphabetical by title, ignoring case.
pub fn title_order(a: &EpisodeRecord, b: &EpisodeRecord) -> Ordering {
    a.title
        .to_lowercase()
        .cmp(&b.title.to_lowercase())
        .then_with(|| a.title.cmp(&b.title))
}

/// Re-sorts records newest first. Stable for equal keys.
pub fn sort_newest_first(records: &mut [EpisodeRecord]) {
    records.sort_by(newest_first);
}

/// Lowercases, drops everything except ASCII letters, digits, whitespace
/// and `-`, then joins words with single dashes.
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("-");

    let mut slug = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug
}

/// Keywords recognized by [`recap`], each mapped to its tag.
const RECAP_TAGS: &[(&[&str], &str)] = &[
    (&["nomination"], "Nominations"),
    (&["elimination", "evict"], "Elimination"),
    (&["wildcard"], "Wildcard"),
    (&["task"], "Task"),
    (&["captain"], "Captaincy"),
];

const RECAP_FALLBACK: &str = "Episode highlights";

/// Summarizes `text` as a short list of topic tags.
pub fn recap(text: &str) -> String {
    let lower = text.to_lowercase();
    let tags: Vec<&str> = RECAP_TAGS
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, tag)| *tag)
        .take(3)
        .collect();

    if tags.is_empty() {
        RECAP_FALLBACK.to_owned()
    } else {
        tags.join(" • ")
    }
}

fn channel_video_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/(@[^/]+)/([^:]+):([a-zA-Z0-9]+)").expect("channel video pattern is valid")
    })
}

fn bare_video_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/([^:/]+):([a-zA-Z0-9]+)").expect("bare video pattern is valid")
    })
}

/// Maps a video page link to its embeddable player URL.
///
/// Recognizes `/@channel:id/name:id` and `/name:id` link shapes, then
/// falls back to a last path segment containing `:`. Anything else is
/// returned as is, upgraded from `http:` to `https:`.
pub fn embed_url(link: &str) -> String {
    let secure;
    let link = match link.strip_prefix("http:") {
        Some(rest) => {
            secure = format!("https:{rest}");
            secure.as_str()
        }
        None => link,
    };
    if let Some(caps) = channel_video_pattern().captures(link) {
        return format!("{EMBED_BASE}{}:{}", &caps[2], &caps[3]);
    }
    if let Some(caps) = bare_video_pattern().captures(link) {
        return format!("{EMBED_BASE}{}:{}", &caps[1], &caps[2]);
    }
    match link.rsplit('/').next() {
        Some(last) if last.contains(':') => format!("{EMBED_BASE}{last}"),
        _ => link.to_owned(),
    }
}
