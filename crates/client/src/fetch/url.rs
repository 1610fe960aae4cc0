//! URL resolution against the hosted application's origin.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a possibly-relative URL against `origin` and canonicalize it.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Resolve relative references (`/storage/a.pdf`) against the origin
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(input: &str, origin: &Url) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// True when `url` shares scheme, host and port with `origin`.
pub fn is_same_origin(url: &Url, origin: &Url) -> bool {
    url.origin() == origin.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://app.example.com").unwrap()
    }

    #[test]
    fn test_resolve_relative_path() {
        let url = resolve("/storage/file1.pdf", &origin()).unwrap();
        assert_eq!(url.as_str(), "https://app.example.com/storage/file1.pdf");
    }

    #[test]
    fn test_resolve_absolute_url_kept() {
        let url = resolve("https://fonts.gstatic.com/s/inter.woff2", &origin()).unwrap();
        assert_eq!(url.host_str(), Some("fonts.gstatic.com"));
    }

    #[test]
    fn test_resolve_lowercase_host() {
        let url = resolve("https://EXAMPLE.COM/a", &origin()).unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_resolve_remove_fragment() {
        let url = resolve("/docs#section", &origin()).unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/docs");
    }

    #[test]
    fn test_resolve_preserve_query() {
        let url = resolve("/search?b=2&a=1", &origin()).unwrap();
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_resolve_unsupported_scheme() {
        let result = resolve("file:///etc/passwd", &origin());
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_resolve_whitespace_only() {
        assert!(matches!(resolve("   ", &origin()), Err(UrlError::Empty)));
    }

    #[test]
    fn test_same_origin() {
        let o = origin();
        assert!(is_same_origin(&Url::parse("https://app.example.com/x").unwrap(), &o));
        assert!(!is_same_origin(&Url::parse("http://app.example.com/x").unwrap(), &o));
        assert!(!is_same_origin(&Url::parse("https://cdn.example.com/x").unwrap(), &o));
    }
}
