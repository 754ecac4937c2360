use crate::cookies::canonicalcookie::CanonicalCookie;
use dashmap::DashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, trace};
use url::Url;

/// Maximum cookies per domain (Chromium `kDomainMaxCookies`).
const MAX_COOKIES_PER_DOMAIN: usize = 180;

/// Maximum total cookies (Chromium `kMaxCookies`).
const MAX_COOKIES_TOTAL: usize = 3300;

/// The cookie jar shared by every request of one client.
/// Modeled after Chromium's `net::CookieMonster`.
///
/// Cookies are bucketed by domain; each bucket lives in a `DashMap` shard, so
/// the replace-then-insert performed by [`set_canonical_cookie`] is atomic
/// with respect to concurrent writers and readers of the same host.
///
/// [`set_canonical_cookie`]: CookieMonster::set_canonical_cookie
#[derive(Debug, Clone)]
pub struct CookieMonster {
    store: Arc<DashMap<String, Vec<CanonicalCookie>>>,
}

impl Default for CookieMonster {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieMonster {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace a cookie. Uniqueness is (name, domain, path); the last
    /// write wins. An already-expired cookie only deletes its predecessor.
    pub fn set_canonical_cookie(&self, cookie: CanonicalCookie) {
        let mut entry = self.store.entry(cookie.domain.clone()).or_default();

        entry.retain(|c| c.name != cookie.name || c.path != cookie.path);

        if cookie.is_expired(OffsetDateTime::now_utc()) {
            trace!(name = %cookie.name, domain = %cookie.domain, "cookie deleted by expiry");
            return;
        }

        // Per-domain limit with LRU eviction
        while entry.len() >= MAX_COOKIES_PER_DOMAIN {
            if let Some(oldest_idx) = entry
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.last_access_time)
                .map(|(i, _)| i)
            {
                entry.remove(oldest_idx);
            } else {
                break;
            }
        }

        entry.push(cookie);
        drop(entry); // Release the shard lock before scanning all shards

        self.enforce_global_limit();
    }

    fn enforce_global_limit(&self) {
        while self.total_cookie_count() > MAX_COOKIES_TOTAL {
            let mut oldest: Option<(String, usize, OffsetDateTime)> = None;

            for entry in self.store.iter() {
                for (idx, cookie) in entry.value().iter().enumerate() {
                    let older = oldest
                        .as_ref()
                        .map_or(true, |(_, _, t)| cookie.last_access_time < *t);
                    if older {
                        oldest = Some((entry.key().clone(), idx, cookie.last_access_time));
                    }
                }
            }

            match oldest {
                Some((domain, idx, _)) => {
                    if let Some(mut entry) = self.store.get_mut(&domain) {
                        if idx < entry.len() {
                            entry.remove(idx);
                        }
                    }
                }
                None => break,
            }
        }
    }

    /// Get cookies matching the URL with proper domain suffix matching.
    pub fn get_cookies_for_url(&self, url: &Url) -> Vec<CanonicalCookie> {
        let mut result = Vec::new();
        let host = url.host_str().unwrap_or("");
        let now = OffsetDateTime::now_utc();

        for domain in Self::get_matching_domains(host) {
            if let Some(mut entry) = self.store.get_mut(&domain) {
                for cookie in entry.iter_mut() {
                    if !Self::domain_matches(&cookie.domain, host, cookie.host_only) {
                        continue;
                    }
                    if !Self::path_matches(&cookie.path, url.path()) {
                        continue;
                    }
                    if cookie.secure && url.scheme() != "https" {
                        continue;
                    }
                    if cookie.is_expired(now) {
                        continue;
                    }
                    cookie.last_access_time = now;
                    result.push(cookie.clone());
                }
            }
        }

        // Longest path first, then oldest first (RFC 6265 section 5.4)
        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });

        result
    }

    /// Render the `Cookie` request header for `url`, or `None` when the jar has
    /// nothing for it.
    pub fn cookie_header_for_url(&self, url: &Url) -> Option<String> {
        let cookies = self.get_cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(CanonicalCookie::pair)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// RFC 6265 domain matching.
    fn domain_matches(cookie_domain: &str, request_host: &str, host_only: bool) -> bool {
        if host_only {
            return cookie_domain.eq_ignore_ascii_case(request_host);
        }

        let cookie_domain = cookie_domain.trim_start_matches('.');

        if request_host.eq_ignore_ascii_case(cookie_domain) {
            return true;
        }

        if request_host.len() > cookie_domain.len() {
            let split = request_host.len() - cookie_domain.len();
            let suffix = &request_host[split..];
            if suffix.eq_ignore_ascii_case(cookie_domain) {
                return request_host.as_bytes()[split - 1] == b'.';
            }
        }

        false
    }

    /// RFC 6265 path matching.
    fn path_matches(cookie_path: &str, request_path: &str) -> bool {
        if request_path == cookie_path {
            return true;
        }

        if request_path.starts_with(cookie_path) {
            if cookie_path.ends_with('/') {
                return true;
            }
            return request_path.as_bytes().get(cookie_path.len()) == Some(&b'/');
        }

        false
    }

    /// The host itself and all parent domains.
    fn get_matching_domains(host: &str) -> Vec<String> {
        let mut domains = vec![host.to_lowercase()];

        // "foo.bar.example.com" -> "bar.example.com", "example.com"
        let parts: Vec<&str> = host.split('.').collect();
        for i in 1..parts.len().saturating_sub(1) {
            domains.push(parts[i..].join(".").to_lowercase());
        }

        domains
    }

    /// Parse one `Set-Cookie` line and store it. Invalid lines are dropped the
    /// way browsers drop them.
    pub fn parse_and_save_cookie(&self, url: &Url, cookie_line: &str) {
        match CanonicalCookie::from_set_cookie(url, cookie_line) {
            Ok(c) => self.set_canonical_cookie(c),
            Err(e) => debug!(url = %url, error = %e, "rejected Set-Cookie"),
        }
    }

    /// Store every `Set-Cookie` header of a response received from `url`.
    pub fn save_response_cookies<'a, I>(&self, url: &Url, lines: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let before = self.total_cookie_count();
        for line in lines {
            self.parse_and_save_cookie(url, line);
        }
        let after = self.total_cookie_count();
        after.saturating_sub(before)
    }

    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    /// Drop every cookie. This is the only way cookies leave the jar other
    /// than expiry and eviction.
    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn iter_all_cookies(&self) -> impl Iterator<Item = CanonicalCookie> + '_ {
        self.store.iter().flat_map(|entry| entry.value().clone())
    }
}
