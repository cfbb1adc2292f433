use regex::Regex;

use crate::domain::CachedEntry;
use crate::errors::{PlanetError, PlanetResult};
use crate::filters::Filter;

/// Keeps entries whose text matches `require` and drops those matching
/// `exclude`. Matching runs over title, summary and content.
pub struct SiftFilter {
    require: Option<Regex>,
    exclude: Option<Regex>,
}

impl SiftFilter {
    pub fn new(require: Option<&str>, exclude: Option<&str>) -> PlanetResult<Self> {
        Ok(Self {
            require: require.map(compile).transpose()?,
            exclude: exclude.map(compile).transpose()?,
        })
    }
}

fn compile(pattern: &str) -> PlanetResult<Regex> {
    Regex::new(pattern).map_err(|e| PlanetError::Config(format!("invalid sift pattern: {}", e)))
}

fn searchable_text(entry: &str) -> String {
    match serde_json::from_str::<CachedEntry>(entry) {
        Ok(parsed) => [parsed.title, parsed.summary, parsed.content]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n"),
        Err(_) => entry.to_string(),
    }
}

impl Filter for SiftFilter {
    fn name(&self) -> &str {
        "sift"
    }

    fn apply(&self, entry: &str) -> PlanetResult<String> {
        let text = searchable_text(entry);

        if let Some(require) = &self.require {
            if !require.is_match(&text) {
                return Ok(String::new());
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&text) {
                return Ok(String::new());
            }
        }

        Ok(entry.to_string())
    }
}
