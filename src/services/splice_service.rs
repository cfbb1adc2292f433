use std::collections::HashMap;
use std::time::SystemTime;

use crate::config::Config;
use crate::domain::{CachedEntry, FeedMetadata};
use crate::errors::PlanetResult;
use crate::storage::{CacheStore, IdIndex};

/// One entry of the merged output, paired with its feed's current metadata.
#[derive(Debug, Clone)]
pub struct SplicedEntry {
    pub key: String,
    pub mtime: SystemTime,
    pub entry: CachedEntry,
    pub source: FeedMetadata,
}

/// Merges the freshest cached entries across all subscribed feeds.
pub struct SpliceService<'a> {
    store: &'a CacheStore,
    index: Option<&'a dyn IdIndex>,
}

impl<'a> SpliceService<'a> {
    pub fn new(store: &'a CacheStore, index: Option<&'a dyn IdIndex>) -> Self {
        Self { store, index }
    }

    pub fn splice(&self, config: &Config) -> PlanetResult<Vec<SplicedEntry>> {
        let uris: Vec<&str> = config.subscriptions.iter().map(|s| s.uri.as_str()).collect();
        self.splice_with(&uris, config.max_items(), config.new_feed_items)
    }

    /// Newest entries first, at most `max_items` of them, and at most
    /// `new_feed_items` per feed (0 means no per-feed cap).
    pub fn splice_with(
        &self,
        subscriptions: &[&str],
        max_items: usize,
        new_feed_items: usize,
    ) -> PlanetResult<Vec<SplicedEntry>> {
        // Each feed is reachable by its identity and by its subscription URI.
        let mut feeds: HashMap<String, usize> = HashMap::new();
        let mut metadata = Vec::with_capacity(subscriptions.len());
        for uri in subscriptions {
            let meta = self.store.read_metadata(uri)?;
            feeds.entry(meta.identity().to_string()).or_insert(metadata.len());
            feeds.entry(meta.uri.clone()).or_insert(metadata.len());
            metadata.push(meta);
        }

        let mut counts = vec![0usize; metadata.len()];
        let mut spliced = Vec::new();

        for file in self.store.list_entries()? {
            if spliced.len() >= max_items {
                break;
            }
            if self.store.is_blacklisted(&file.key) {
                tracing::debug!(key = %file.key, "Skipping blacklisted entry");
                continue;
            }

            let entry = match self.store.read_entry_file(&file) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(key = %file.key, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let owner = match self.owner(&file.key, &entry, &feeds) {
                Some(owner) => owner,
                None => {
                    tracing::debug!(key = %file.key, "Skipping entry from unsubscribed feed");
                    continue;
                }
            };

            counts[owner] += 1;
            if new_feed_items > 0 && counts[owner] > new_feed_items {
                continue;
            }

            spliced.push(SplicedEntry {
                key: file.key,
                mtime: file.mtime,
                entry,
                source: metadata[owner].clone(),
            });
        }

        tracing::info!(entries = spliced.len(), "Splice complete");
        Ok(spliced)
    }

    fn owner(&self, key: &str, entry: &CachedEntry, feeds: &HashMap<String, usize>) -> Option<usize> {
        if let Some(index) = self.index {
            match index.lookup(key) {
                Ok(Some(feed_id)) => {
                    if let Some(&owner) = feeds.get(&feed_id) {
                        return Some(owner);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "Index lookup failed"),
            }
        }

        entry
            .owner_candidates()
            .find_map(|candidate| feeds.get(candidate).copied())
    }
}
