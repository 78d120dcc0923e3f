use url::Url;

/// Feed loaded when no other URL is configured.
pub const DEFAULT_FEED_URL: &str = "https://odysee.com/$/rss/@Biggboss:4";

/// AllOrigins: answers `{"contents": "<xml>"}` for `?url=<target>`.
pub const ALLORIGINS_ENDPOINT: &str = "https://api.allorigins.win/get";

/// isomorphic-git CORS proxy: forwards `/<target>` and returns the raw body.
pub const ISOMORPHIC_CORS_ENDPOINT: &str = "https://cors.isomorphic-git.org";

/// Query parameter carrying the cache-busting timestamp.
const CACHE_BUSTER_PARAM: &str = "_";

/// What a source's response body looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// The body is the feed markup itself
    RawText,
    /// The body is a JSON object whose `contents` field holds the markup
    JsonWrapped,
}

/// A concrete request produced by a [`FeedSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub url: Url,
    pub shape: ResponseShape,
}

/// One retrieval path for the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// Proxy taking the target as an encoded `url` query parameter and
    /// wrapping the body in JSON.
    JsonProxy { endpoint: String },
    /// Proxy taking the target appended to its own path, returning it raw.
    PrefixProxy { endpoint: String },
    /// The feed URL itself.
    Direct,
}

impl FeedSource {
    /// AllOrigins, then isomorphic-git, then direct.
    pub fn default_chain() -> Vec<FeedSource> {
        vec![
            FeedSource::JsonProxy {
                endpoint: ALLORIGINS_ENDPOINT.to_owned(),
            },
            FeedSource::PrefixProxy {
                endpoint: ISOMORPHIC_CORS_ENDPOINT.to_owned(),
            },
            FeedSource::Direct,
        ]
    }

    /// Short name for status lines and logs.
    pub fn label(&self) -> &'static str {
        match self {
            FeedSource::JsonProxy { .. } => "AllOrigins",
            FeedSource::PrefixProxy { .. } => "Isomorphic CORS",
            FeedSource::Direct => "Direct",
        }
    }

    pub fn shape(&self) -> ResponseShape {
        match self {
            FeedSource::JsonProxy { .. } => ResponseShape::JsonWrapped,
            FeedSource::PrefixProxy { .. } | FeedSource::Direct => ResponseShape::RawText,
        }
    }

    /// Builds the request for `feed_url`, stamping it with `stamp` so no
    /// intermediate cache can answer it.
    pub fn request(&self, feed_url: &Url, stamp: i64) -> Result<SourceRequest, url::ParseError> {
        let target = with_cache_buster(feed_url, stamp);
        let url = match self {
            FeedSource::JsonProxy { endpoint } => {
                Url::parse_with_params(endpoint, &[("url", target.as_str())])?
            }
            FeedSource::PrefixProxy { endpoint } => {
                Url::parse(&format!("{}/{}", endpoint.trim_end_matches('/'), target))?
            }
            FeedSource::Direct => target,
        };
        Ok(SourceRequest {
            url,
            shape: self.shape(),
        })
    }
}

/// Appends `_=<stamp>` with `&` or `?` as the existing query requires.
pub fn with_cache_buster(url: &Url, stamp: i64) -> Url {
    let mut busted = url.clone();
    busted
        .query_pairs_mut()
        .append_pair(CACHE_BUSTER_PARAM, &stamp.to_string());
    busted
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed() -> Url {
        Url::parse(DEFAULT_FEED_URL).unwrap()
    }

    fn stamp_of(url: &Url) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == CACHE_BUSTER_PARAM)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_default_chain_order() {
        let labels: Vec<_> = FeedSource::default_chain().iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["AllOrigins", "Isomorphic CORS", "Direct"]);
    }

    #[test]
    fn test_cache_buster_uses_question_mark_without_query() {
        let busted = with_cache_buster(&feed(), 42);
        assert_eq!(busted.as_str(), "https://odysee.com/$/rss/@Biggboss:4?_=42");
    }

    #[test]
    fn test_cache_buster_appends_to_existing_query() {
        let url = Url::parse("https://example.com/rss?page=2").unwrap();
        let busted = with_cache_buster(&url, 7);
        assert_eq!(busted.as_str(), "https://example.com/rss?page=2&_=7");
    }

    #[test]
    fn test_json_proxy_encodes_busted_target() {
        let source = FeedSource::JsonProxy {
            endpoint: ALLORIGINS_ENDPOINT.to_owned(),
        };
        let request = source.request(&feed(), 1700).unwrap();
        assert_eq!(request.shape, ResponseShape::JsonWrapped);
        assert_eq!(request.url.host_str(), Some("api.allorigins.win"));
        assert_eq!(request.url.path(), "/get");

        let target = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(target, "https://odysee.com/$/rss/@Biggboss:4?_=1700");
    }

    #[test]
    fn test_prefix_proxy_embeds_target_in_path() {
        let source = FeedSource::PrefixProxy {
            endpoint: format!("{}/", ISOMORPHIC_CORS_ENDPOINT),
        };
        let request = source.request(&feed(), 99).unwrap();
        assert_eq!(request.shape, ResponseShape::RawText);
        assert_eq!(
            request.url.as_str(),
            "https://cors.isomorphic-git.org/https://odysee.com/$/rss/@Biggboss:4?_=99"
        );
        assert_eq!(stamp_of(&request.url).as_deref(), Some("99"));
    }

    #[test]
    fn test_every_source_carries_cache_buster() {
        for source in FeedSource::default_chain() {
            let request = source.request(&feed(), 123).unwrap();
            let carried = match source {
                FeedSource::JsonProxy { .. } => request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "url")
                    .map(|(_, v)| v.contains("_=123"))
                    .unwrap_or(false),
                _ => stamp_of(&request.url).as_deref() == Some("123"),
            };
            assert!(carried, "{} request lacks cache buster", source.label());
        }
    }

    #[test]
    fn test_bad_endpoint_is_error() {
        let source = FeedSource::JsonProxy {
            endpoint: "not a url".to_owned(),
        };
        assert!(source.request(&feed(), 1).is_err());
    }
}
