use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::feed::FeedMetadata;

/// One entry as produced by the feed parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEntry {
    pub id: String,
    pub updated: Option<DateTime<Utc>>,
    pub published: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub links: Vec<String>,
    /// Id of the originating feed when the entry was itself aggregated.
    pub source: Option<String>,
}

impl ParsedEntry {
    pub fn new(id: String) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_updated(mut self, updated: Option<DateTime<Utc>>) -> Self {
        self.updated = updated;
        self
    }

    pub fn with_published(mut self, published: Option<DateTime<Utc>>) -> Self {
        self.published = published;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_content(mut self, content: Option<String>) -> Self {
        self.content = content;
        self
    }

    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.links = links;
        self
    }

    /// The timestamp used for freshness comparisons.
    pub fn freshness(&self) -> Option<DateTime<Utc>> {
        self.updated.or(self.published)
    }

    /// Fill in a missing id from the first link, or from a digest of the
    /// entry's text when there is no link either.
    pub fn ensure_id(&mut self) {
        if !self.id.trim().is_empty() {
            self.id = self.id.trim().to_string();
            return;
        }

        if let Some(link) = self.links.iter().find(|l| !l.trim().is_empty()) {
            self.id = link.trim().to_string();
            return;
        }

        let mut hasher = Sha256::new();
        for part in [&self.title, &self.summary, &self.content] {
            hasher.update(part.as_deref().unwrap_or("").as_bytes());
            hasher.update(b"\x1f");
        }
        self.id = format!("urn:sha256:{:x}", hasher.finalize());
    }
}

/// Snapshot of the owning feed embedded in every cached entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSnapshot {
    /// Subscription URI the entry was fetched from.
    pub uri: String,
    /// Feed identity (feed id, else link, else URI).
    pub id: String,
    pub link: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub updated: Option<String>,
}

impl From<&FeedMetadata> for SourceSnapshot {
    fn from(meta: &FeedMetadata) -> Self {
        Self {
            uri: meta.uri.clone(),
            id: meta.identity().to_string(),
            link: meta.link.clone(),
            title: meta.title.clone(),
            name: meta.name.clone(),
            updated: meta.updated.clone(),
        }
    }
}

/// The self-contained document stored in one cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachedEntry {
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub links: Vec<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub updated: Option<String>,
    pub published: Option<String>,
    /// Plain-text excerpt, filled in by the excerpt filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub source: SourceSnapshot,
}

impl CachedEntry {
    pub fn from_parsed(entry: &ParsedEntry, source: SourceSnapshot, stamp: DateTime<Utc>) -> Self {
        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            link: entry.links.first().cloned(),
            links: entry.links.clone(),
            summary: entry.summary.clone(),
            content: entry.content.clone(),
            updated: Some(normalize_timestamp(stamp)),
            published: entry.published.map(normalize_timestamp),
            excerpt: None,
            source,
        }
    }

    /// Owner candidates in match order: embedded feed id, then the URI it was
    /// fetched from.
    pub fn owner_candidates(&self) -> impl Iterator<Item = &str> {
        [self.source.id.as_str(), self.source.uri.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
    }
}

/// RFC 3339 in UTC with second precision, so string order equals time order.
pub fn normalize_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
