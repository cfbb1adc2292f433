pub mod excerpt;
pub mod shell;
pub mod sift;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::FilterSpec;
use crate::errors::{PlanetError, PlanetResult};

pub use excerpt::ExcerptFilter;
pub use shell::ShellFilter;
pub use sift::SiftFilter;

/// One step in an entry filter chain.
///
/// Receives the serialized entry and returns its replacement. An empty
/// result rejects the entry.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, entry: &str) -> PlanetResult<String>;
}

/// An ordered list of filters applied to every entry of one feed.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.filters.len()
    }

    /// Run `entry` through every filter. `None` means some filter rejected it.
    pub fn apply(&self, entry: String) -> PlanetResult<Option<String>> {
        let mut current = entry;
        for filter in &self.filters {
            current = filter.apply(&current)?;
            if current.trim().is_empty() {
                tracing::debug!(filter = filter.name(), "Entry rejected by filter");
                return Ok(None);
            }
        }
        Ok(Some(current))
    }
}

/// In-process filters registered at startup, plus construction of the
/// built-in kinds from config.
pub struct FilterRegistry {
    named: HashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            named: HashMap::new(),
        };

        registry.register(Arc::new(ExcerptFilter::default()));

        registry
    }

    /// Make `filter` available to config as `{ kind = "named", name = ... }`.
    pub fn register(&mut self, filter: Arc<dyn Filter>) {
        self.named.insert(filter.name().to_string(), filter);
    }

    pub fn build(&self, spec: &FilterSpec) -> PlanetResult<Arc<dyn Filter>> {
        match spec {
            FilterSpec::Shell { command, args } => {
                Ok(Arc::new(ShellFilter::new(command.clone(), args.clone())))
            }
            FilterSpec::Sift { require, exclude } => Ok(Arc::new(SiftFilter::new(
                require.as_deref(),
                exclude.as_deref(),
            )?)),
            FilterSpec::Excerpt { words } => Ok(Arc::new(ExcerptFilter::new(*words))),
            FilterSpec::Named { name } => self
                .named
                .get(name)
                .cloned()
                .ok_or_else(|| PlanetError::Config(format!("unknown filter: {}", name))),
        }
    }

    /// Global filters first, then the feed's own.
    pub fn chain(&self, global: &[FilterSpec], feed: &[FilterSpec]) -> PlanetResult<FilterChain> {
        let filters = global
            .iter()
            .chain(feed)
            .map(|spec| self.build(spec))
            .collect::<PlanetResult<Vec<_>>>()?;
        Ok(FilterChain::new(filters))
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
