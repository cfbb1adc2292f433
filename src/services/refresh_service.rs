use std::collections::HashMap;

use crate::config::Config;
use crate::domain::FeedMetadata;
use crate::errors::PlanetResult;
use crate::filters::FilterRegistry;
use crate::services::entry_writer::{EntryWriter, FeedSettings, WriteReport};
use crate::services::fetch_service::{FetchOutcome, FetchRequest, FetchService};
use crate::sources::{FeedParser, FeedRsParser, HttpTransport, Transport};
use crate::storage::{CacheStore, IdIndex};

/// Totals for one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub feeds: usize,
    pub updated: usize,
    pub not_modified: usize,
    pub failed: usize,
    /// Feeds whose results could not be written to the cache.
    pub unsaved: usize,
    pub duplicates: usize,
    pub entries: WriteReport,
}

impl RefreshReport {
    fn add_entries(&mut self, report: &WriteReport) {
        self.entries.written += report.written;
        self.entries.rejected += report.rejected;
        self.entries.blacklisted += report.blacklisted;
        self.entries.failed += report.failed;
    }
}

/// Fetches every subscription and writes the results into the cache.
pub struct RefreshService<T: Transport, P: FeedParser> {
    fetcher: FetchService<T, P>,
    registry: FilterRegistry,
}

impl RefreshService<HttpTransport, FeedRsParser> {
    /// The production setup: HTTP transport and feed-rs parser.
    pub fn from_config(config: &Config, registry: FilterRegistry) -> PlanetResult<Self> {
        let transport = HttpTransport::new(config.feed_timeout(), &config.user_agent)?;
        let fetcher = FetchService::new(transport, FeedRsParser::new(), config.spider_threads);
        Ok(Self::new(fetcher, registry))
    }
}

impl<T: Transport, P: FeedParser> RefreshService<T, P> {
    pub fn new(fetcher: FetchService<T, P>, registry: FilterRegistry) -> Self {
        Self { fetcher, registry }
    }

    pub fn refresh(
        &self,
        config: &Config,
        store: &CacheStore,
        index: Option<&dyn IdIndex>,
    ) -> PlanetResult<RefreshReport> {
        // Build every chain up front so a bad filter spec fails before any fetch.
        let mut settings = HashMap::new();
        for sub in &config.subscriptions {
            let filters = self.registry.chain(&config.filters, &sub.filters)?;
            settings.insert(
                sub.uri.as_str(),
                FeedSettings {
                    name: sub.name.clone(),
                    filters,
                    activity_threshold_days: config.activity_threshold_for(sub),
                },
            );
        }

        let requests: Vec<FetchRequest> = config
            .subscriptions
            .iter()
            .map(|sub| FetchRequest::new(stored_metadata(store, &sub.uri)))
            .collect();

        tracing::info!(
            feeds = requests.len(),
            workers = config.spider_threads,
            "Refreshing subscriptions"
        );

        let writer = EntryWriter::new(store, index);
        let mut report = RefreshReport {
            feeds: requests.len(),
            ..Default::default()
        };

        self.fetcher.fetch_all(requests, |result| {
            match &result.outcome {
                FetchOutcome::Fetched(_) => report.updated += 1,
                FetchOutcome::NotModified { .. } => report.not_modified += 1,
                FetchOutcome::Failed { .. } => report.failed += 1,
            }

            let feed_settings = match settings.get(result.request.uri.as_str()) {
                Some(s) => s,
                None => return,
            };
            match writer.write(feed_settings, result.request.metadata, result.outcome) {
                Ok((_, written)) => report.add_entries(&written),
                Err(e) => {
                    tracing::error!(feed = %result.request.uri, error = %e, "Could not persist feed");
                    report.unsaved += 1;
                }
            }
        })?;

        report.duplicates = self.flag_duplicates(config, store);

        tracing::info!(
            updated = report.updated,
            not_modified = report.not_modified,
            failed = report.failed,
            unsaved = report.unsaved,
            duplicates = report.duplicates,
            written = report.entries.written,
            "Refresh complete"
        );
        Ok(report)
    }

    /// Mark later subscriptions whose feed identity matches an earlier one.
    fn flag_duplicates(&self, config: &Config, store: &CacheStore) -> usize {
        let mut first_seen: HashMap<String, &str> = HashMap::new();
        let mut duplicates = 0;

        for sub in &config.subscriptions {
            let mut meta = stored_metadata(store, &sub.uri);
            let identity = meta.identity().to_string();

            match first_seen.get(identity.as_str()) {
                Some(first) => {
                    tracing::warn!(feed = %sub.uri, first = %first, "Duplicate subscription");
                    meta.message = Some(format!("duplicate subscription: {}", first));
                    if let Err(e) = store.write_metadata(&meta) {
                        tracing::error!(feed = %sub.uri, error = %e, "Could not persist feed");
                    }
                    duplicates += 1;
                }
                None => {
                    first_seen.insert(identity, sub.uri.as_str());
                }
            }
        }

        duplicates
    }
}

/// One feed's unreadable metadata must not hold up the rest of the batch.
fn stored_metadata(store: &CacheStore, uri: &str) -> FeedMetadata {
    store.read_metadata(uri).unwrap_or_else(|e| {
        tracing::warn!(feed = %uri, error = %e, "Could not read feed metadata, starting fresh");
        FeedMetadata::new(uri.to_string())
    })
}
