use scraper::Html;

use crate::domain::CachedEntry;
use crate::errors::{PlanetError, PlanetResult};
use crate::filters::Filter;

const DEFAULT_WORDS: usize = 50;

/// Attaches a plain-text excerpt built from the entry's content (or summary).
pub struct ExcerptFilter {
    words: usize,
}

impl ExcerptFilter {
    pub fn new(words: usize) -> Self {
        Self { words }
    }
}

impl Default for ExcerptFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS)
    }
}

/// Visible text of an HTML fragment, whitespace collapsed, cut to `words`.
fn excerpt(html: &str, words: usize) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect::<Vec<_>>().join(" ");

    let mut all = text.split_whitespace();
    let taken: Vec<&str> = all.by_ref().take(words).collect();
    let mut out = taken.join(" ");
    if all.next().is_some() {
        out.push('…');
    }
    out
}

impl Filter for ExcerptFilter {
    fn name(&self) -> &str {
        "excerpt"
    }

    fn apply(&self, entry: &str) -> PlanetResult<String> {
        let mut parsed: CachedEntry = serde_json::from_str(entry).map_err(|e| PlanetError::Filter {
            name: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let source = parsed.content.as_deref().or(parsed.summary.as_deref());
        if let Some(html) = source {
            let text = excerpt(html, self.words);
            if !text.is_empty() {
                parsed.excerpt = Some(text);
            }
        }

        Ok(serde_json::to_string(&parsed)?)
    }
}
