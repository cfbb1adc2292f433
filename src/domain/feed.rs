use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::ParsedEntry;

/// Per-feed state persisted under `sources/` in the cache.
///
/// The HTTP caching fields must round-trip exactly between runs, otherwise
/// conditional fetches stop working. A missing file is equivalent to
/// `FeedMetadata::new(uri)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedMetadata {
    pub uri: String,
    pub name: Option<String>,
    pub feed_id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub http_etag: Option<String>,
    pub http_last_modified: Option<String>,
    pub content_hash: Option<String>,
    pub http_status: Option<u16>,
    pub http_location: Option<String>,
    pub message: Option<String>,
    pub updated: Option<String>,
}

impl FeedMetadata {
    pub fn new(uri: String) -> Self {
        Self {
            uri,
            ..Default::default()
        }
    }

    /// Stable identity of the feed: its own id, then its link, then the
    /// subscription URI.
    pub fn identity(&self) -> &str {
        self.feed_id
            .as_deref()
            .or(self.link.as_deref())
            .unwrap_or(&self.uri)
    }

    pub fn conditional_headers(&self) -> ConditionalHeaders {
        ConditionalHeaders {
            etag: self.http_etag.clone(),
            last_modified: self.http_last_modified.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ConditionalHeaders {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Feed-level fields produced by the parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedInfo {
    pub id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

/// Structured result of parsing one feed document.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub feed: FeedInfo,
    pub entries: Vec<ParsedEntry>,
    /// Best-effort parse: the document was not entirely well formed.
    pub malformed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_feed_id_then_link() {
        let mut meta = FeedMetadata::new("https://example.com/feed".to_string());
        assert_eq!(meta.identity(), "https://example.com/feed");

        meta.link = Some("https://example.com/".to_string());
        assert_eq!(meta.identity(), "https://example.com/");

        meta.feed_id = Some("tag:example.com,2024:feed".to_string());
        assert_eq!(meta.identity(), "tag:example.com,2024:feed");
    }

    #[test]
    fn test_metadata_round_trips_caching_fields() {
        let meta = FeedMetadata {
            uri: "https://example.com/feed".to_string(),
            http_etag: Some("\"abc123\"".to_string()),
            http_last_modified: Some("Wed, 10 Jan 2024 00:00:00 GMT".to_string()),
            content_hash: Some("deadbeef".to_string()),
            http_status: Some(200),
            http_location: Some("https://example.org/feed".to_string()),
            message: Some("no activity in 30 days".to_string()),
            updated: Some("2024-01-10T00:00:00Z".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_string(&meta).unwrap();
        let back: FeedMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_metadata_tolerates_missing_fields() {
        let meta: FeedMetadata = serde_json::from_str(r#"{"uri":"https://a.example/"}"#).unwrap();
        assert_eq!(meta.uri, "https://a.example/");
        assert!(meta.conditional_headers().is_empty());
    }
}
