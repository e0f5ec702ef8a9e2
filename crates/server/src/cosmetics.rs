//! Response cosmetics: standard headers and list pagination.

use axum::http::HeaderValue;
use axum::http::header::HeaderMap;

/// Default page size for tags/catalog listings.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Maximum accepted page size.
const MAX_PAGE_SIZE: usize = 1000;

/// Standard headers every response carries.
pub fn standard_headers(headers: &mut HeaderMap) {
    headers.insert(
        "Docker-Distribution-API-Version",
        HeaderValue::from_static("registry/2.0"),
    );
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
}

/// Parse `n` and `last` pagination parameters from a raw query string.
pub fn parse_pagination(query: &str) -> (usize, Option<String>) {
    let n = query_param(query, "n")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .map(|n| n.min(MAX_PAGE_SIZE))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let last = query_param(query, "last").filter(|s| !s.is_empty());
    (n, last)
}

/// Slice a sorted listing after `last`, returning the page and whether
/// more entries follow.
pub fn paginate(items: &[String], n: usize, last: Option<&str>) -> (Vec<String>, bool) {
    let start = match last {
        Some(last) => items
            .iter()
            .position(|item| item.as_str() == last)
            .map(|i| i + 1)
            .unwrap_or(0),
        None => 0,
    };

    let end = (start + n).min(items.len());
    let page = items[start..end].to_vec();
    (page, end < items.len())
}

/// RFC 5988 `Link` header pointing at the next page.
pub fn link_header(path: &str, n: usize, last: &str) -> String {
    format!("<{path}?n={n}&last={last}>; rel=\"next\"")
}

/// Extract a query parameter with minimal percent-decoding (`%3A`, `%2F`).
pub fn query_param(query: &str, key: &str) -> Option<String> {
    for pair in query.split('&') {
        if let Some((name, value)) = pair.split_once('=')
            && name == key
        {
            return Some(value.replace("%3A", ":").replace("%2F", "/"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        assert_eq!(query_param("a=1&b=2", "b").as_deref(), Some("2"));
        assert_eq!(query_param("digest=sha256%3Aabc", "digest").as_deref(), Some("sha256:abc"));
        assert_eq!(query_param("from=library%2Fubuntu", "from").as_deref(), Some("library/ubuntu"));
        assert!(query_param("a=1", "b").is_none());
        assert!(query_param("", "a").is_none());
    }

    #[test]
    fn test_parse_pagination_defaults() {
        assert_eq!(parse_pagination(""), (DEFAULT_PAGE_SIZE, None));
        assert_eq!(parse_pagination("n=0"), (DEFAULT_PAGE_SIZE, None));
        assert_eq!(parse_pagination("n=5000").0, MAX_PAGE_SIZE);
        assert_eq!(
            parse_pagination("n=10&last=v1"),
            (10, Some("v1".to_string()))
        );
    }

    #[test]
    fn test_paginate() {
        let items: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

        let (page, more) = paginate(&items, 2, None);
        assert_eq!(page, vec!["a", "b"]);
        assert!(more);

        let (page, more) = paginate(&items, 2, Some("b"));
        assert_eq!(page, vec!["c", "d"]);
        assert!(!more);

        // Unknown `last` restarts from the beginning.
        let (page, _) = paginate(&items, 2, Some("zzz"));
        assert_eq!(page, vec!["a", "b"]);

        let (page, more) = paginate(&items, 10, None);
        assert_eq!(page.len(), 4);
        assert!(!more);
    }

    #[test]
    fn test_link_header() {
        assert_eq!(
            link_header("/v2/r/tags/list", 2, "b"),
            "</v2/r/tags/list?n=2&last=b>; rel=\"next\""
        );
    }
}
