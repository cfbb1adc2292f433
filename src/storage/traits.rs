use crate::errors::PlanetResult;

/// Lookup from an entry's cache key to the identity of the feed that owns it.
///
/// Absence of an index is a legal degraded mode: callers fall back to the
/// source snapshot embedded in each entry.
#[cfg_attr(test, mockall::automock)]
pub trait IdIndex: Send + Sync {
    fn record(&self, entry_key: &str, feed_id: &str) -> PlanetResult<()>;
    fn lookup(&self, entry_key: &str) -> PlanetResult<Option<String>>;
    fn forget(&self, entry_key: &str) -> PlanetResult<()>;
    fn len(&self) -> PlanetResult<usize>;

    fn is_empty(&self) -> PlanetResult<bool> {
        Ok(self.len()? == 0)
    }
}
