use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::errors::{PlanetError, PlanetResult};

/// Keys longer than this are shortened.
const MAX_KEY_LEN: usize = 250;
/// Shortened keys keep a prefix strictly below this length.
const PREFIX_LEN: usize = 220;
/// Hex digits of the SHA-256 digest appended to a shortened key. Together
/// with the prefix this keeps every key within the 255-byte name limit.
const DIGEST_LEN: usize = 32;

static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+:/*)?(\w+:|www\.)?").expect("valid scheme regex"));
static SCHEME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+://").expect("valid prefix regex"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?/:|]+").expect("valid separator regex"));

/// Map a feed URI or entry id to a filesystem-safe cache file name.
///
/// Deterministic; long identifiers keep a readable prefix plus a digest of
/// the remainder so near-duplicates stay distinct.
pub fn derive_key(raw: &str) -> PlanetResult<String> {
    let transcoded = if SCHEME_PREFIX.is_match(raw) || raw.starts_with("www.") {
        transcode_host(raw)
    } else {
        None
    };
    let name = transcoded.as_deref().unwrap_or(raw);

    let name = URL_SCHEME.replace(name, "");
    let name = SEPARATORS.replace_all(&name, ",");
    let name = name.trim_matches(|c| c == ',' || c == '.');

    if name.is_empty() {
        return Err(PlanetError::EmptyCacheKey(raw.to_string()));
    }

    if name.len() > MAX_KEY_LEN {
        return Ok(shorten(name));
    }

    Ok(name.to_string())
}

fn shorten(name: &str) -> String {
    let parts: Vec<&str> = name.split(',').collect();

    for i in (1..=parts.len()).rev() {
        let head = parts[..i].join(",");
        if head.len() < PREFIX_LEN {
            let tail = parts[i..].join(",");
            return format!("{},{}", head, digest(&tail));
        }
    }

    // A single segment is already too long: cut it on a char boundary.
    let mut cut = PREFIX_LEN - 1;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{},{}", &name[..cut], digest(&name[cut..]))
}

fn digest(s: &str) -> String {
    let mut hex = format!("{:x}", Sha256::digest(s.as_bytes()));
    hex.truncate(DIGEST_LEN);
    hex
}

/// Rewrite only the host of `raw` in its ASCII-compatible (punycode) form.
/// Returns `None` when nothing changes or the host cannot be converted.
fn transcode_host(raw: &str) -> Option<String> {
    let (scheme, rest) = match raw.find("://") {
        Some(i) => raw.split_at(i + 3),
        None => ("", raw),
    };

    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(end);

    let (userinfo, hostport) = match authority.rfind('@') {
        Some(i) => authority.split_at(i + 1),
        None => ("", authority),
    };

    let (host, port) = match hostport.rfind(':') {
        Some(i) if hostport[i + 1..].bytes().all(|b| b.is_ascii_digit()) => hostport.split_at(i),
        _ => (hostport, ""),
    };

    if host.is_ascii() {
        return None;
    }

    match url::Host::parse(host) {
        Ok(url::Host::Domain(ascii)) => Some(format!("{scheme}{userinfo}{ascii}{port}{tail}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scheme_and_www() {
        assert_eq!(
            derive_key("http://www.example.com/feed/atom.xml").unwrap(),
            "example.com,feed,atom.xml"
        );
        assert_eq!(
            derive_key("https://example.com/a?b=c").unwrap(),
            "example.com,a,b=c"
        );
        assert_eq!(derive_key("www.example.com/").unwrap(), "example.com");
    }

    #[test]
    fn test_tag_uri_ids() {
        assert_eq!(
            derive_key("tag:example.com,2024:entry/42").unwrap(),
            "example.com,2024,entry,42"
        );
    }

    #[test]
    fn test_collapses_separator_runs_and_trims() {
        assert_eq!(derive_key("a//b::c||d").unwrap(), "a,b,c,d");
        assert_eq!(derive_key("..,abc,..").unwrap(), "abc");
        assert_eq!(derive_key("1").unwrap(), "1");
    }

    #[test]
    fn test_deterministic() {
        let raw = "https://example.com/2024/01/15/some-post.html";
        assert_eq!(derive_key(raw).unwrap(), derive_key(raw).unwrap());
    }

    #[test]
    fn test_empty_is_error() {
        assert!(matches!(derive_key(""), Err(PlanetError::EmptyCacheKey(_))));
        assert!(matches!(derive_key("http://"), Err(PlanetError::EmptyCacheKey(_))));
        assert!(matches!(derive_key("//..//"), Err(PlanetError::EmptyCacheKey(_))));
    }

    #[test]
    fn test_idn_host_is_punycoded() {
        let key = derive_key("http://bücher.example/feed").unwrap();
        assert_eq!(key, "xn--bcher-kva.example,feed");
    }

    #[test]
    fn test_idn_path_left_alone() {
        let key = derive_key("http://example.com/bücher").unwrap();
        assert_eq!(key, "example.com,bücher");
    }

    #[test]
    fn test_long_keys_differing_after_prefix_are_distinct() {
        let base: String = (0..40).map(|i| format!("seg{:02}/", i)).collect();
        let a = format!("http://example.com/{}alpha", base);
        let b = format!("http://example.com/{}omega", base);
        assert!(a.len() > 250);

        let ka = derive_key(&a).unwrap();
        let kb = derive_key(&b).unwrap();

        assert_ne!(ka, kb);
        assert!(ka.len() < PREFIX_LEN + 1 + DIGEST_LEN);
        assert_eq!(ka.split(',').next(), Some("example.com"));
    }

    #[test]
    fn test_long_single_segment_is_shortened() {
        let a = format!("x{}", "a".repeat(300));
        let b = format!("x{}b", "a".repeat(300));
        let ka = derive_key(&a).unwrap();
        let kb = derive_key(&b).unwrap();
        assert_ne!(ka, kb);
        assert!(ka.len() < PREFIX_LEN + 1 + DIGEST_LEN);
    }

    #[test]
    fn test_every_key_fits_a_file_name() {
        let raws = [
            format!("https://example.com/{}", "c".repeat(230)),
            format!("https://example.com/{}", "c".repeat(400)),
            format!("https://example.com/{}/{}", "d".repeat(218), "e".repeat(100)),
            format!("tag:example.com,{}", "é".repeat(200)),
            "x/".repeat(300),
        ];
        for raw in &raws {
            let key = derive_key(raw).unwrap();
            assert!(key.len() <= 255, "{} bytes: {}", key.len(), key);
        }
    }

    #[test]
    fn test_short_keys_unchanged_length() {
        let raw = format!("http://example.com/{}", "a".repeat(200));
        let key = derive_key(&raw).unwrap();
        assert_eq!(key, format!("example.com,{}", "a".repeat(200)));
    }
}
