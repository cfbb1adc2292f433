use feed_rs::parser;

use crate::domain::{FeedInfo, ParsedEntry, ParsedFeed};
use crate::errors::{PlanetError, PlanetResult};
use crate::sources::traits::FeedParser;

/// RSS, Atom and JSON Feed parsing backed by `feed-rs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedRsParser;

impl FeedRsParser {
    pub fn new() -> Self {
        Self
    }

    fn convert(parsed: feed_rs::model::Feed) -> ParsedFeed {
        let feed = FeedInfo {
            id: non_empty(parsed.id),
            link: parsed.links.into_iter().map(|l| l.href).find(|h| !h.is_empty()),
            title: parsed.title.map(|t| t.content),
            updated: parsed.updated,
        };

        let entries = parsed
            .entries
            .into_iter()
            .map(|entry| {
                let links: Vec<String> = entry
                    .links
                    .into_iter()
                    .map(|l| l.href)
                    .filter(|h| !h.is_empty())
                    .collect();

                let mut parsed = ParsedEntry {
                    id: entry.id,
                    updated: entry.updated,
                    published: entry.published,
                    title: entry.title.map(|t| t.content),
                    summary: entry.summary.map(|s| s.content),
                    content: entry.content.and_then(|c| c.body),
                    links,
                    source: None,
                };
                parsed.ensure_id();
                parsed
            })
            .collect();

        // feed-rs rejects documents it cannot make sense of, so anything that
        // gets here parsed cleanly.
        ParsedFeed {
            feed,
            entries,
            malformed: false,
        }
    }
}

impl FeedParser for FeedRsParser {
    fn parse(&self, bytes: &[u8]) -> PlanetResult<ParsedFeed> {
        let parsed = parser::parse(bytes).map_err(|e| PlanetError::FeedParse(e.to_string()))?;
        Ok(Self::convert(parsed))
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    // Sample RSS feed (based on Rust Blog format)
    const SAMPLE_RSS: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Rust Blog</title>
    <link>https://blog.rust-lang.org/</link>
    <description>Empowering everyone to build reliable and efficient software.</description>
    <item>
      <title>Announcing Rust 1.75.0</title>
      <link>https://blog.rust-lang.org/2023/12/28/Rust-1.75.0.html</link>
      <description><![CDATA[<p>The Rust team is happy to announce a new version of Rust, 1.75.0.</p>]]></description>
      <pubDate>Thu, 28 Dec 2023 00:00:00 +0000</pubDate>
      <guid>https://blog.rust-lang.org/2023/12/28/Rust-1.75.0.html</guid>
    </item>
    <item>
      <title>Rust 2024 Call for Testing</title>
      <link>https://blog.rust-lang.org/2024/01/10/Rust-2024-CFT.html</link>
      <description><![CDATA[<p>We're testing the next edition of Rust!</p>]]></description>
      <pubDate>Wed, 10 Jan 2024 00:00:00 +0000</pubDate>
      <guid>https://blog.rust-lang.org/2024/01/10/Rust-2024-CFT.html</guid>
    </item>
  </channel>
</rss>"#;

    // Sample Atom feed
    const SAMPLE_ATOM: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Tech Blog</title>
  <link href="https://example.com/"/>
  <id>https://example.com/feed.atom</id>
  <updated>2024-01-15T12:00:00Z</updated>
  <entry>
    <title>Understanding WebAssembly</title>
    <link href="https://example.com/posts/wasm-intro"/>
    <id>https://example.com/posts/wasm-intro</id>
    <updated>2024-01-15T12:00:00Z</updated>
    <summary type="html"><![CDATA[<p>WebAssembly (Wasm) is a binary instruction format...</p>]]></summary>
    <content type="html"><![CDATA[<article><h1>Understanding WebAssembly</h1><p>More content here.</p></article>]]></content>
  </entry>
</feed>"#;

    #[test]
    fn test_rss_entries() {
        let parsed = FeedRsParser::new().parse(SAMPLE_RSS).unwrap();

        assert_eq!(parsed.feed.title.as_deref(), Some("Rust Blog"));
        assert!(parsed.feed.link.as_deref().unwrap().starts_with("https://blog.rust-lang.org"));
        assert_eq!(parsed.entries.len(), 2);

        let first = &parsed.entries[0];
        assert_eq!(first.id, "https://blog.rust-lang.org/2023/12/28/Rust-1.75.0.html");
        assert_eq!(first.title.as_deref(), Some("Announcing Rust 1.75.0"));
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2023, 12, 28, 0, 0, 0).unwrap())
        );
        assert!(first.summary.as_deref().unwrap().contains("1.75.0"));
        assert!(first
            .links
            .iter()
            .any(|l| l == "https://blog.rust-lang.org/2023/12/28/Rust-1.75.0.html"));
        assert!(!parsed.malformed);
    }

    #[test]
    fn test_atom_entries() {
        let parsed = FeedRsParser::new().parse(SAMPLE_ATOM).unwrap();

        assert_eq!(parsed.feed.id.as_deref(), Some("https://example.com/feed.atom"));
        assert_eq!(
            parsed.feed.updated,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
        );
        assert_eq!(parsed.entries.len(), 1);

        let entry = &parsed.entries[0];
        assert_eq!(entry.id, "https://example.com/posts/wasm-intro");
        assert_eq!(
            entry.updated,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
        );
        assert!(entry.content.as_deref().unwrap().contains("<article>"));
        assert!(entry.summary.as_deref().unwrap().contains("WebAssembly"));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let result = FeedRsParser::new().parse(b"this is not a feed");
        assert!(matches!(result, Err(PlanetError::FeedParse(_))));
    }
}
