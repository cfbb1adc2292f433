use std::collections::HashMap;

use crate::config::Config;
use crate::errors::PlanetResult;
use crate::storage::{CacheStore, IdIndex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpungeReport {
    pub kept: usize,
    pub deleted: usize,
    /// Entries that could not be read and were left alone.
    pub skipped: usize,
}

/// Deletes cached entries beyond each feed's retention count, and entries
/// whose feed is no longer subscribed.
pub struct ExpungeService<'a> {
    store: &'a CacheStore,
    index: Option<&'a dyn IdIndex>,
}

impl<'a> ExpungeService<'a> {
    pub fn new(store: &'a CacheStore, index: Option<&'a dyn IdIndex>) -> Self {
        Self { store, index }
    }

    pub fn expunge(&self, config: &Config) -> PlanetResult<ExpungeReport> {
        // A feed's budget is reachable by its identity and by its URI.
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut budgets: Vec<i64> = Vec::with_capacity(config.subscriptions.len());
        for sub in &config.subscriptions {
            let meta = self.store.read_metadata(&sub.uri)?;
            owners.entry(meta.identity().to_string()).or_insert(budgets.len());
            owners.entry(sub.uri.clone()).or_insert(budgets.len());
            budgets.push(config.retention_for(sub) as i64);
        }

        let mut report = ExpungeReport::default();

        for file in self.store.list_entries()? {
            let entry = match self.store.read_entry_file(&file) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(key = %file.key, error = %e, "Leaving unreadable entry in place");
                    report.skipped += 1;
                    continue;
                }
            };

            let owner = entry.owner_candidates().find_map(|c| owners.get(c).copied());
            let keep = match owner {
                Some(owner) => {
                    budgets[owner] -= 1;
                    budgets[owner] >= 0
                }
                None => false,
            };

            if keep {
                report.kept += 1;
                continue;
            }

            if self.store.remove_entry(&file.key)? {
                tracing::debug!(key = %file.key, "Expunged entry");
                report.deleted += 1;
            }
            if let Some(index) = self.index {
                index.forget(&file.key)?;
            }
        }

        tracing::info!(kept = report.kept, deleted = report.deleted, skipped = report.skipped, "Expunge complete");
        Ok(report)
    }
}
