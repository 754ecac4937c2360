//! Public Suffix List checks for cookie `Domain` attributes.
//!
//! A response from `shop.example.co.uk` may scope a cookie to
//! `example.co.uk` but never to `co.uk`.

use psl::{List, Psl};
use std::net::IpAddr;

/// True when `domain` is itself a public suffix ("com", "co.uk", "github.io").
/// Single-label names with no listed rule (e.g. "localhost") count as suffixes
/// too.
pub fn is_public_suffix(domain: &str) -> bool {
    let lower = domain.trim_start_matches('.').to_ascii_lowercase();
    List.suffix(lower.as_bytes())
        .is_some_and(|suffix| suffix.as_bytes() == lower.as_bytes())
}

/// Whether a response from `url_host` may set a cookie scoped to
/// `cookie_domain`.
///
/// IP literals only accept an exact match, since a numeric address has no
/// parent domain.
pub fn is_valid_cookie_domain(cookie_domain: &str, url_host: &str) -> bool {
    let cookie_domain = cookie_domain.trim_start_matches('.').to_ascii_lowercase();
    let host = url_host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();

    if host.parse::<IpAddr>().is_ok() {
        return cookie_domain == host;
    }

    if is_public_suffix(&cookie_domain) {
        return false;
    }

    host == cookie_domain
        || host
            .strip_suffix(cookie_domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}
