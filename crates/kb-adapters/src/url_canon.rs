//! URL canonicalization for web-adapter crawl deduplication.
//!
//! Two URLs that resolve to the same page after canonicalization are treated as the
//! same crawl frontier entry: scheme and host lowercased, fragment stripped, default
//! ports removed, trailing slash normalized for directory-shaped paths.

use url::Url;

pub fn canonicalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;

    url.set_fragment(None);

    let scheme = url.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }

    if let Some(host) = url.host_str() {
        let host = host.to_ascii_lowercase();
        url.set_host(Some(&host)).ok()?;
    }

    let default_port = match scheme.as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if url.port() == default_port {
        url.set_port(None).ok()?;
    }

    let path = url.path();
    if path.is_empty() {
        url.set_path("/");
    } else if !path.ends_with('/') && !path.rsplit('/').next().unwrap_or("").contains('.') {
        // directory-shaped path (no file extension on the last segment): normalize trailing slash
        let normalized = format!("{path}/");
        url.set_path(&normalized);
    }

    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_lowercases_host() {
        assert_eq!(
            canonicalize("https://Example.COM/foo").unwrap(),
            "https://example.com/foo"
        );
    }

    #[test]
    fn test_canonicalize_strips_fragment() {
        assert_eq!(
            canonicalize("https://example.com/foo#section").unwrap(),
            "https://example.com/foo"
        );
    }

    #[test]
    fn test_canonicalize_strips_default_port() {
        assert_eq!(
            canonicalize("https://example.com:443/foo").unwrap(),
            "https://example.com/foo"
        );
        assert_eq!(
            canonicalize("http://example.com:80/foo").unwrap(),
            "http://example.com/foo"
        );
    }

    #[test]
    fn test_canonicalize_normalizes_directory_trailing_slash() {
        assert_eq!(
            canonicalize("https://example.com/docs").unwrap(),
            "https://example.com/docs/"
        );
        assert_eq!(
            canonicalize("https://example.com/report.pdf").unwrap(),
            "https://example.com/report.pdf"
        );
    }

    #[test]
    fn test_canonicalize_rejects_non_http_scheme() {
        assert!(canonicalize("ftp://example.com/foo").is_none());
    }

    #[test]
    fn test_canonicalize_dedup_equivalence() {
        let a = canonicalize("HTTPS://Example.com:443/docs#top").unwrap();
        let b = canonicalize("https://example.com/docs/").unwrap();
        assert_eq!(a, b);
    }
}
