//! In-memory view over the most recent feed load.
//!
//! A [`Catalog`] owns the current record set together with the caller's
//! search filter and sort order. Reloads run concurrently with whatever the
//! caller is doing, so every reload is tagged with a [`ReloadToken`] and only
//! the result of the newest reload is ever applied.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::feed::{newest_first, title_order, EpisodeRecord, FeedError, FeedSnapshot};

/// How [`Catalog::visible`] orders records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Document order, as published in the feed.
    #[default]
    Feed,
    Newest,
    Title,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" => Ok(SortOrder::Feed),
            "newest" => Ok(SortOrder::Newest),
            "title" => Ok(SortOrder::Title),
            other => Err(format!(
                "Unknown sort order '{other}' (expected feed, newest or title)"
            )),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortOrder::Feed => "feed",
            SortOrder::Newest => "newest",
            SortOrder::Title => "title",
        };
        f.write_str(name)
    }
}

/// Generation handed out by [`Catalog::begin_reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReloadToken(u64);

impl ReloadToken {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// What [`Catalog::apply`] did with a reload result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Records replaced; carries the new count.
    Applied(usize),
    /// The reload failed; previous records kept.
    Failed,
    /// A newer reload was started after this one; result dropped.
    Stale,
}

#[derive(Debug, Clone)]
struct LoadInfo {
    source_label: &'static str,
    last_build_date: Option<String>,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FailureInfo {
    message: String,
    failed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    episodes: Vec<EpisodeRecord>,
    loaded: Option<LoadInfo>,
    failure: Option<FailureInfo>,
    /// Lowercased search needle
    query: String,
    sort: SortOrder,
    generation: u64,
    in_flight: bool,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new reload generation, invalidating any reload still running.
    pub fn begin_reload(&mut self) -> ReloadToken {
        self.generation = self.generation.wrapping_add(1);
        self.in_flight = true;
        tracing::debug!(generation = self.generation, "Reload started");
        ReloadToken(self.generation)
    }

    /// Whether `token` belongs to the newest reload.
    pub fn is_current(&self, token: ReloadToken) -> bool {
        token.0 == self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Applies the outcome of the reload identified by `token`.
    ///
    /// A success replaces the record set wholesale. A failure keeps whatever
    /// was loaded before and records the error for [`status_line`].
    ///
    /// [`status_line`]: Catalog::status_line
    pub fn apply(
        &mut self,
        token: ReloadToken,
        result: Result<FeedSnapshot, FeedError>,
    ) -> ApplyOutcome {
        if !self.is_current(token) {
            tracing::debug!(
                generation = token.0,
                current = self.generation,
                "Dropping stale reload result"
            );
            return ApplyOutcome::Stale;
        }
        self.in_flight = false;

        match result {
            Ok(snapshot) => {
                let count = snapshot.episodes.len();
                self.episodes = snapshot.episodes;
                self.loaded = Some(LoadInfo {
                    source_label: snapshot.source_label,
                    last_build_date: snapshot.last_build_date,
                    fetched_at: snapshot.fetched_at,
                });
                self.failure = None;
                ApplyOutcome::Applied(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, kept = self.episodes.len(), "Reload failed");
                self.failure = Some(FailureInfo {
                    message: e.to_string(),
                    failed_at: Utc::now(),
                });
                ApplyOutcome::Failed
            }
        }
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.trim().to_lowercase();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    /// All records in feed order, ignoring the filter.
    pub fn episodes(&self) -> &[EpisodeRecord] {
        &self.episodes
    }

    /// Records matching the query, in the current sort order.
    pub fn visible(&self) -> Vec<&EpisodeRecord> {
        let mut visible: Vec<_> = self
            .episodes
            .iter()
            .filter(|e| e.matches(&self.query))
            .collect();
        match self.sort {
            SortOrder::Feed => {}
            SortOrder::Newest => visible.sort_by(|a, b| newest_first(a, b)),
            SortOrder::Title => visible.sort_by(|a, b| title_order(a, b)),
        }
        visible
    }

    pub fn find(&self, guid: &str) -> Option<&EpisodeRecord> {
        self.episodes.iter().find(|e| e.guid == guid)
    }

    /// Up to `limit` other episodes to suggest next to `guid`, in feed order.
    pub fn related(&self, guid: &str, limit: usize) -> Vec<&EpisodeRecord> {
        self.episodes
            .iter()
            .filter(|e| e.guid != guid)
            .take(limit)
            .collect()
    }

    /// Message of the last failed reload, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }

    /// One-line description of where the records came from.
    pub fn status_line(&self) -> String {
        if let Some(failure) = &self.failure {
            return format!(
                "Feed refresh failed ({})",
                failure.failed_at.format("%H:%M:%S")
            );
        }
        match &self.loaded {
            Some(LoadInfo {
                source_label,
                last_build_date: Some(built),
                ..
            }) => format!("Feed updated: {built} | via {source_label}"),
            Some(LoadInfo {
                source_label,
                fetched_at,
                ..
            }) => format!(
                "Fetched via {source_label} at {}",
                fetched_at.format("%H:%M:%S")
            ),
            None if self.in_flight => "Loading episodes...".to_owned(),
            None => "No feed loaded".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn record(guid: &str, title: &str, pub_date: &str) -> EpisodeRecord {
        EpisodeRecord {
            title: title.to_owned(),
            description: String::new(),
            link: format!("https://x/{guid}:1"),
            pub_date: pub_date.to_owned(),
            guid: guid.to_owned(),
            thumbnail: None,
        }
    }

    fn snapshot(episodes: Vec<EpisodeRecord>) -> FeedSnapshot {
        FeedSnapshot {
            episodes,
            source_index: 1,
            source_label: "Isomorphic CORS",
            last_build_date: None,
            fetched_at: Utc.with_ymd_and_hms(2025, 10, 7, 9, 30, 0).unwrap(),
        }
    }

    fn loaded(episodes: Vec<EpisodeRecord>) -> Catalog {
        let mut catalog = Catalog::new();
        let token = catalog.begin_reload();
        catalog.apply(token, Ok(snapshot(episodes)));
        catalog
    }

    fn guids<'a>(records: &[&'a EpisodeRecord]) -> Vec<&'a str> {
        records.iter().map(|r| r.guid.as_str()).collect()
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("newest".parse::<SortOrder>(), Ok(SortOrder::Newest));
        assert_eq!(" Title ".parse::<SortOrder>(), Ok(SortOrder::Title));
        assert_eq!("feed".parse::<SortOrder>(), Ok(SortOrder::Feed));
        assert!("random".parse::<SortOrder>().is_err());
        assert_eq!(SortOrder::default(), SortOrder::Feed);
    }

    #[test]
    fn test_apply_replaces_records() {
        let mut catalog = loaded(vec![record("a", "A", "")]);
        let token = catalog.begin_reload();
        let outcome = catalog.apply(token, Ok(snapshot(vec![record("b", "B", ""), record("c", "C", "")])));
        assert_eq!(outcome, ApplyOutcome::Applied(2));
        assert_eq!(guids(&catalog.visible()), vec!["b", "c"]);
        assert!(!catalog.is_loading());
    }

    #[test]
    fn test_stale_result_is_dropped() {
        let mut catalog = Catalog::new();
        let first = catalog.begin_reload();
        let second = catalog.begin_reload();

        assert_eq!(
            catalog.apply(second, Ok(snapshot(vec![record("new", "New", "")]))),
            ApplyOutcome::Applied(1)
        );
        assert_eq!(
            catalog.apply(first, Ok(snapshot(vec![record("old", "Old", "")]))),
            ApplyOutcome::Stale
        );
        assert_eq!(catalog.episodes()[0].guid, "new");
    }

    #[test]
    fn test_stale_result_does_not_finish_loading() {
        let mut catalog = Catalog::new();
        let first = catalog.begin_reload();
        let _second = catalog.begin_reload();
        catalog.apply(first, Err(FeedError::EmptyFeed));
        assert!(catalog.is_loading());
        assert!(catalog.last_error().is_none());
    }

    #[test]
    fn test_failure_keeps_previous_records() {
        let mut catalog = loaded(vec![record("a", "A", "")]);
        let token = catalog.begin_reload();
        assert_eq!(catalog.apply(token, Err(FeedError::EmptyFeed)), ApplyOutcome::Failed);
        assert_eq!(catalog.episodes().len(), 1);
        assert_eq!(catalog.last_error(), Some("No episodes found in feed"));
        assert!(catalog.status_line().starts_with("Feed refresh failed ("));

        let token = catalog.begin_reload();
        catalog.apply(token, Ok(snapshot(vec![record("b", "B", "")])));
        assert!(catalog.last_error().is_none());
    }

    #[test]
    fn test_query_filters_case_insensitively() {
        let mut catalog = loaded(vec![
            record("a", "Nomination Special", ""),
            record("b", "Weekend Ka Vaar", ""),
        ]);
        catalog.set_query("  NOMINATION ");
        assert_eq!(guids(&catalog.visible()), vec!["a"]);
        catalog.set_query("");
        assert_eq!(catalog.visible().len(), 2);
    }

    #[test]
    fn test_sort_orders() {
        let mut catalog = loaded(vec![
            record("old", "beta", "Mon, 01 Sep 2025 10:00:00 GMT"),
            record("junk", "Alpha", "not a date"),
            record("new", "gamma", "Tue, 07 Oct 2025 10:00:00 GMT"),
        ]);
        assert_eq!(guids(&catalog.visible()), vec!["old", "junk", "new"]);

        catalog.set_sort(SortOrder::Newest);
        assert_eq!(guids(&catalog.visible()), vec!["new", "old", "junk"]);

        catalog.set_sort(SortOrder::Title);
        assert_eq!(guids(&catalog.visible()), vec!["junk", "old", "new"]);
    }

    #[test]
    fn test_find_and_related() {
        let catalog = loaded((1..=8).map(|i| record(&format!("g{i}"), "t", "")).collect());
        assert_eq!(catalog.find("g3").map(|r| r.guid.as_str()), Some("g3"));
        assert!(catalog.find("missing").is_none());

        let related = catalog.related("g1", 6);
        assert_eq!(guids(&related), vec!["g2", "g3", "g4", "g5", "g6", "g7"]);
    }

    #[test]
    fn test_status_lines() {
        let mut catalog = Catalog::new();
        assert_eq!(catalog.status_line(), "No feed loaded");

        let token = catalog.begin_reload();
        assert_eq!(catalog.status_line(), "Loading episodes...");

        catalog.apply(token, Ok(snapshot(vec![record("a", "A", "")])));
        assert_eq!(catalog.status_line(), "Fetched via Isomorphic CORS at 09:30:00");

        let token = catalog.begin_reload();
        let mut built = snapshot(vec![record("a", "A", "")]);
        built.last_build_date = Some("Tue, 07 Oct 2025 10:00:00 GMT".to_owned());
        catalog.apply(token, Ok(built));
        assert_eq!(
            catalog.status_line(),
            "Feed updated: Tue, 07 Oct 2025 10:00:00 GMT | via Isomorphic CORS"
        );
    }
}
