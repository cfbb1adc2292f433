use std::collections::HashMap;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{normalize_timestamp, CachedEntry, FeedMetadata, ParsedEntry, SourceSnapshot};
use crate::errors::PlanetResult;
use crate::filters::FilterChain;
use crate::services::fetch_service::{FetchOutcome, FetchedFeed};
use crate::storage::{derive_key, CacheStore, IdIndex};

const MALFORMED_MESSAGE: &str = "feed is not well formed; entries may be incomplete";

/// Per-subscription settings the writer needs.
#[derive(Clone, Default)]
pub struct FeedSettings {
    pub name: Option<String>,
    pub filters: FilterChain,
    pub activity_threshold_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    pub rejected: usize,
    pub blacklisted: usize,
    pub failed: usize,
}

/// Turns one fetch outcome into cache files, index records and updated feed
/// metadata. Runs on the thread that consumes fetch results.
pub struct EntryWriter<'a> {
    store: &'a CacheStore,
    index: Option<&'a dyn IdIndex>,
}

enum EntryOutcome {
    Written,
    Rejected,
    Blacklisted,
}

impl<'a> EntryWriter<'a> {
    pub fn new(store: &'a CacheStore, index: Option<&'a dyn IdIndex>) -> Self {
        Self { store, index }
    }

    /// Apply `outcome` for one subscription and persist its metadata.
    ///
    /// Only failures to persist the metadata itself are returned; problems
    /// with individual entries are logged and counted.
    pub fn write(
        &self,
        settings: &FeedSettings,
        prior: FeedMetadata,
        outcome: FetchOutcome,
    ) -> PlanetResult<(FeedMetadata, WriteReport)> {
        let mut report = WriteReport::default();

        let meta = match outcome {
            FetchOutcome::Failed { status, message } => {
                tracing::warn!(feed = %prior.uri, status, message = %message, "Keeping previous feed state");
                FeedMetadata {
                    name: settings.name.clone().or(prior.name.clone()),
                    http_status: Some(status),
                    message: Some(message),
                    ..prior
                }
            }
            FetchOutcome::NotModified { status } => FeedMetadata {
                name: settings.name.clone().or(prior.name.clone()),
                http_status: Some(status),
                message: None,
                ..prior
            },
            FetchOutcome::Fetched(fetched) => self.write_fetched(settings, prior, fetched, &mut report),
        };

        self.store.write_metadata(&meta)?;
        Ok((meta, report))
    }

    fn write_fetched(
        &self,
        settings: &FeedSettings,
        prior: FeedMetadata,
        fetched: FetchedFeed,
        report: &mut WriteReport,
    ) -> FeedMetadata {
        let entries = dedup_entries(fetched.feed.entries);
        let info = fetched.feed.feed;
        let newest = entries.iter().filter_map(ParsedEntry::freshness).max();

        let mut meta = FeedMetadata {
            uri: prior.uri.clone(),
            name: settings.name.clone().or(prior.name),
            feed_id: info.id.or(prior.feed_id),
            link: info.link.or(prior.link),
            title: info.title.or(prior.title),
            http_etag: fetched.etag.or(prior.http_etag),
            http_last_modified: fetched.last_modified.or(prior.http_last_modified),
            content_hash: Some(fetched.content_hash),
            http_status: Some(fetched.status),
            http_location: fetched.permanent_location,
            message: None,
            updated: info
                .updated
                .or(newest)
                .map(normalize_timestamp)
                .or(prior.updated),
        };

        let snapshot = SourceSnapshot::from(&meta);
        for entry in &entries {
            match self.write_entry(settings, &snapshot, entry) {
                Ok(EntryOutcome::Written) => report.written += 1,
                Ok(EntryOutcome::Rejected) => report.rejected += 1,
                Ok(EntryOutcome::Blacklisted) => report.blacklisted += 1,
                Err(e) => {
                    tracing::warn!(feed = %meta.uri, entry = %entry.id, error = %e, "Failed to cache entry");
                    report.failed += 1;
                }
            }
        }

        if fetched.feed.malformed {
            meta.message = Some(MALFORMED_MESSAGE.to_string());
        }
        if let Some(days) = settings.activity_threshold_days {
            if let Some(newest) = newest {
                if Utc::now() - newest > Duration::days(i64::from(days)) {
                    meta.message = Some(format!("no activity in {} days", days));
                }
            }
        }

        tracing::info!(
            feed = %meta.uri,
            written = report.written,
            rejected = report.rejected,
            blacklisted = report.blacklisted,
            failed = report.failed,
            "Feed updated"
        );
        meta
    }

    fn write_entry(
        &self,
        settings: &FeedSettings,
        snapshot: &SourceSnapshot,
        entry: &ParsedEntry,
    ) -> PlanetResult<EntryOutcome> {
        let key = derive_key(&entry.id)?;

        if self.store.is_blacklisted(&key) {
            if self.store.remove_entry(&key)? {
                tracing::info!(key = %key, "Purged blacklisted entry");
            }
            self.forget(&key)?;
            return Ok(EntryOutcome::Blacklisted);
        }

        let stamp = match entry.freshness() {
            Some(stamp) => stamp,
            None => self
                .store
                .entry_mtime(&key)?
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now),
        };

        let cached = CachedEntry::from_parsed(entry, snapshot.clone(), stamp);
        let body = match settings.filters.apply(serde_json::to_string(&cached)?)? {
            Some(body) => body,
            None => {
                if self.store.remove_entry(&key)? {
                    tracing::debug!(key = %key, "Removed entry rejected by filters");
                }
                self.forget(&key)?;
                return Ok(EntryOutcome::Rejected);
            }
        };

        self.store.write_entry(&key, &body, SystemTime::from(stamp))?;
        if let Some(index) = self.index {
            index.record(&key, &snapshot.id)?;
        }

        Ok(EntryOutcome::Written)
    }

    fn forget(&self, key: &str) -> PlanetResult<()> {
        match self.index {
            Some(index) => index.forget(key),
            None => Ok(()),
        }
    }
}

/// Collapse entries sharing an id, keeping the one with the later
/// updated-or-published timestamp. First-seen order is preserved.
fn dedup_entries(entries: Vec<ParsedEntry>) -> Vec<ParsedEntry> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ParsedEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        match positions.get(&entry.id) {
            Some(&at) => {
                if entry.freshness() > kept[at].freshness() {
                    kept[at] = entry;
                }
            }
            None => {
                positions.insert(entry.id.clone(), kept.len());
                kept.push(entry);
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeedInfo, ParsedFeed};
    use crate::errors::PlanetError;
    use crate::filters::Filter;
    use crate::storage::traits::MockIdIndex;
    use chrono::TimeZone;
    use mockall::predicate::eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    const URI: &str = "https://example.com/feed";

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap()
    }

    fn fetched(entries: Vec<ParsedEntry>) -> FetchOutcome {
        FetchOutcome::Fetched(FetchedFeed {
            status: 200,
            etag: Some("\"v2\"".to_string()),
            last_modified: None,
            permanent_location: None,
            content_hash: "abc".to_string(),
            feed: ParsedFeed {
                feed: FeedInfo {
                    id: Some("tag:example.com,2020:feed".to_string()),
                    ..Default::default()
                },
                entries,
                malformed: false,
            },
        })
    }

    fn setup() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        (dir, store)
    }

    struct RejectAll;

    impl Filter for RejectAll {
        fn name(&self) -> &str {
            "reject-all"
        }

        fn apply(&self, _entry: &str) -> PlanetResult<String> {
            Ok(String::new())
        }
    }

    struct Broken;

    impl Filter for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn apply(&self, _entry: &str) -> PlanetResult<String> {
            Err(PlanetError::Filter {
                name: "broken".to_string(),
                reason: "boom".to_string(),
            })
        }
    }

    #[test]
    fn test_dedup_keeps_later_version() {
        let entries = vec![
            ParsedEntry::new("a".to_string()).with_updated(Some(at(1))),
            ParsedEntry::new("b".to_string()),
            ParsedEntry::new("a".to_string()).with_updated(Some(at(2))),
            ParsedEntry::new("a".to_string()).with_published(Some(at(1))),
        ];
        let kept = dedup_entries(entries);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "a");
        assert_eq!(kept[0].updated, Some(at(2)));
        assert_eq!(kept[1].id, "b");
    }

    #[test]
    fn test_writes_entry_with_forced_mtime_and_snapshot() {
        let (_dir, store) = setup();
        let writer = EntryWriter::new(&store, None);

        let (meta, report) = writer
            .write(
                &FeedSettings::default(),
                FeedMetadata::new(URI.to_string()),
                fetched(vec![ParsedEntry::new("tag:example.com,2020:1".to_string())
                    .with_updated(Some(at(2)))]),
            )
            .unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(meta.http_status, Some(200));
        assert_eq!(meta.http_etag.as_deref(), Some("\"v2\""));
        assert_eq!(meta.updated.as_deref(), Some("2020-01-02T00:00:00Z"));

        let key = "example.com,2020,1";
        assert_eq!(store.entry_mtime(key).unwrap(), Some(SystemTime::from(at(2))));
        let cached = store.read_entry(key).unwrap().unwrap();
        assert_eq!(cached.source.id, "tag:example.com,2020:feed");
        assert_eq!(cached.source.uri, URI);
        assert_eq!(store.read_metadata(URI).unwrap(), meta);
    }

    #[test]
    fn test_undated_entry_keeps_prior_mtime() {
        let (_dir, store) = setup();
        let writer = EntryWriter::new(&store, None);
        store.write_entry("undated", "{}", SystemTime::from(at(5))).unwrap();

        writer
            .write(
                &FeedSettings::default(),
                FeedMetadata::new(URI.to_string()),
                fetched(vec![ParsedEntry::new("undated".to_string())]),
            )
            .unwrap();

        assert_eq!(store.entry_mtime("undated").unwrap(), Some(SystemTime::from(at(5))));
        assert_eq!(
            store.read_entry("undated").unwrap().unwrap().updated.as_deref(),
            Some("2020-01-05T00:00:00Z")
        );
    }

    #[test]
    fn test_failure_keeps_prior_state() {
        let (_dir, store) = setup();
        let writer = EntryWriter::new(&store, None);
        let prior = FeedMetadata {
            uri: URI.to_string(),
            http_etag: Some("\"v1\"".to_string()),
            content_hash: Some("old".to_string()),
            title: Some("Example".to_string()),
            ..Default::default()
        };

        let (meta, report) = writer
            .write(
                &FeedSettings::default(),
                prior,
                FetchOutcome::Failed {
                    status: 408,
                    message: "Request timed out".to_string(),
                },
            )
            .unwrap();

        assert_eq!(report, WriteReport::default());
        assert_eq!(meta.http_status, Some(408));
        assert_eq!(meta.message.as_deref(), Some("Request timed out"));
        assert_eq!(meta.http_etag.as_deref(), Some("\"v1\""));
        assert_eq!(meta.content_hash.as_deref(), Some("old"));
        assert_eq!(meta.title.as_deref(), Some("Example"));
        assert!(store.has_metadata(URI).unwrap());
        assert!(store.list_entries().unwrap().is_empty());
    }

    #[test]
    fn test_not_modified_clears_message() {
        let (_dir, store) = setup();
        let writer = EntryWriter::new(&store, None);
        let mut prior = FeedMetadata::new(URI.to_string());
        prior.message = Some("Request timed out".to_string());
        prior.http_etag = Some("\"v1\"".to_string());

        let (meta, _) = writer
            .write(&FeedSettings::default(), prior, FetchOutcome::NotModified { status: 304 })
            .unwrap();

        assert_eq!(meta.http_status, Some(304));
        assert_eq!(meta.message, None);
        assert_eq!(meta.http_etag.as_deref(), Some("\"v1\""));
    }

    #[test]
    fn test_missing_feed_fields_fall_back_to_prior() {
        let (_dir, store) = setup();
        let writer = EntryWriter::new(&store, None);
        let prior = FeedMetadata {
            uri: URI.to_string(),
            link: Some("https://example.com/".to_string()),
            title: Some("Old title".to_string()),
            http_last_modified: Some("Wed, 01 Jan 2020 00:00:00 GMT".to_string()),
            ..Default::default()
        };

        let (meta, _) = writer
            .write(&FeedSettings::default(), prior, fetched(Vec::new()))
            .unwrap();

        assert_eq!(meta.link.as_deref(), Some("https://example.com/"));
        assert_eq!(meta.title.as_deref(), Some("Old title"));
        assert_eq!(meta.http_last_modified.as_deref(), Some("Wed, 01 Jan 2020 00:00:00 GMT"));
        assert_eq!(meta.feed_id.as_deref(), Some("tag:example.com,2020:feed"));
    }

    #[test]
    fn test_blacklisted_entry_is_purged() {
        let (_dir, store) = setup();
        let key = store.blacklist("tag:example.com,2020:bad").unwrap();
        store.write_entry(&key, "{}", SystemTime::now()).unwrap();

        let mut index = MockIdIndex::new();
        index.expect_forget().with(eq(key.clone())).times(1).returning(|_| Ok(()));
        index.expect_record().never();

        let writer = EntryWriter::new(&store, Some(&index));
        let (_, report) = writer
            .write(
                &FeedSettings::default(),
                FeedMetadata::new(URI.to_string()),
                fetched(vec![ParsedEntry::new("tag:example.com,2020:bad".to_string())]),
            )
            .unwrap();

        assert_eq!(report.blacklisted, 1);
        assert!(store.read_entry(&key).unwrap().is_none());
    }

    #[test]
    fn test_rejected_entry_deletes_existing_file() {
        let (_dir, store) = setup();
        store.write_entry("spam", "{}", SystemTime::now()).unwrap();
        let settings = FeedSettings {
            filters: FilterChain::new(vec![Arc::new(RejectAll)]),
            ..Default::default()
        };

        let (_, report) = EntryWriter::new(&store, None)
            .write(
                &settings,
                FeedMetadata::new(URI.to_string()),
                fetched(vec![ParsedEntry::new("spam".to_string())]),
            )
            .unwrap();

        assert_eq!(report.rejected, 1);
        assert!(store.read_entry("spam").unwrap().is_none());
    }

    #[test]
    fn test_filter_error_does_not_abort_feed() {
        let (_dir, store) = setup();
        let settings = FeedSettings {
            filters: FilterChain::new(vec![Arc::new(Broken)]),
            ..Default::default()
        };

        let (meta, report) = EntryWriter::new(&store, None)
            .write(
                &settings,
                FeedMetadata::new(URI.to_string()),
                fetched(vec![
                    ParsedEntry::new("one".to_string()),
                    ParsedEntry::new("two".to_string()),
                ]),
            )
            .unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(meta.http_status, Some(200));
        assert!(store.has_metadata(URI).unwrap());
    }

    #[test]
    fn test_records_owner_in_index() {
        let (_dir, store) = setup();
        let mut index = MockIdIndex::new();
        index
            .expect_record()
            .with(eq("one"), eq("tag:example.com,2020:feed"))
            .times(1)
            .returning(|_, _| Ok(()));

        EntryWriter::new(&store, Some(&index))
            .write(
                &FeedSettings::default(),
                FeedMetadata::new(URI.to_string()),
                fetched(vec![ParsedEntry::new("one".to_string())]),
            )
            .unwrap();
    }

    #[test]
    fn test_activity_threshold_message() {
        let (_dir, store) = setup();
        let settings = FeedSettings {
            activity_threshold_days: Some(30),
            ..Default::default()
        };

        let (meta, _) = EntryWriter::new(&store, None)
            .write(
                &settings,
                FeedMetadata::new(URI.to_string()),
                fetched(vec![ParsedEntry::new("old".to_string()).with_updated(Some(at(1)))]),
            )
            .unwrap();
        assert_eq!(meta.message.as_deref(), Some("no activity in 30 days"));

        let (meta, _) = EntryWriter::new(&store, None)
            .write(
                &settings,
                FeedMetadata::new(URI.to_string()),
                fetched(vec![ParsedEntry::new("new".to_string()).with_updated(Some(Utc::now()))]),
            )
            .unwrap();
        assert_eq!(meta.message, None);
    }

    #[test]
    fn test_malformed_feed_sets_message() {
        let (_dir, store) = setup();
        let outcome = match fetched(vec![ParsedEntry::new("one".to_string())]) {
            FetchOutcome::Fetched(mut f) => {
                f.feed.malformed = true;
                FetchOutcome::Fetched(f)
            }
            other => other,
        };

        let (meta, report) = EntryWriter::new(&store, None)
            .write(&FeedSettings::default(), FeedMetadata::new(URI.to_string()), outcome)
            .unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(meta.message.as_deref(), Some(MALFORMED_MESSAGE));
    }
}
