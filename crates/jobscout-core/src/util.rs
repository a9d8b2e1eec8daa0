use sha2::{Digest, Sha256};
use url::Url;

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical form of a URL used for de-duplication.
///
/// Scheme and host are lower-cased by the parser, the fragment is dropped,
/// and a trailing slash on a non-root path is removed. Unparseable input is
/// returned trimmed.
///
/// Example: `"HTTPS://Jobs.Example.com/role/1/#apply"` → `"https://jobs.example.com/role/1"`
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}

/// Resolve a possibly relative `href` against the page it was found on.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    match Url::parse(base) {
        Ok(base) => base.join(href).ok().map(String::from),
        Err(_) => Url::parse(href).ok().map(String::from),
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Serialize a [`std::time::Duration`] as fractional seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64((d.as_secs_f64() * 1000.0).round() / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_consistency() {
        let h1 = compute_hash("hello world");
        let h2 = compute_hash("hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_hash("hello"));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://Jobs.Example.com/role/1/#apply"),
            "https://jobs.example.com/role/1"
        );
        assert_eq!(
            normalize_url("https://example.com/jobs?page=2"),
            "https://example.com/jobs?page=2"
        );
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
        assert_eq!(normalize_url("  not a url "), "not a url");
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://boards.greenhouse.io/acme", "/acme/jobs/1").as_deref(),
            Some("https://boards.greenhouse.io/acme/jobs/1")
        );
        assert_eq!(
            resolve_url("https://example.com/a/b", "https://other.com/x").as_deref(),
            Some("https://other.com/x")
        );
        assert_eq!(resolve_url("https://example.com", "#top"), None);
        assert_eq!(resolve_url("https://example.com", "javascript:void(0)"), None);
        assert_eq!(resolve_url("https://example.com", "  "), None);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
