use crate::base::neterror::NetError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

/// Attribute names understood by the parser. Anything else lands in
/// [`CanonicalCookie::unparsed`].
const KNOWN_ATTRIBUTES: &[&str] = &[
    "expires",
    "max-age",
    "domain",
    "path",
    "secure",
    "httponly",
    "samesite",
    "partitioned",
];

/// Represents a cookie.
/// Modeled after Chromium's `net::CanonicalCookie`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expiration_time: Option<OffsetDateTime>,
    /// `Expires` attribute exactly as the server sent it.
    pub raw_expires: Option<String>,
    /// `Max-Age` in seconds. Zero or negative means "delete now".
    pub max_age: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_access_time: OffsetDateTime,
    pub secure: bool,
    pub http_only: bool,
    pub host_only: bool,
    pub same_site: SameSite,
    pub priority: CookiePriority,
    /// Full `Set-Cookie` line this cookie was parsed from.
    pub raw: String,
    /// Attributes the parser did not recognise, verbatim.
    pub unparsed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Unspecified,
    NoRestriction,
    Lax,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CookiePriority {
    Low,
    Medium,
    High,
}

impl CanonicalCookie {
    pub fn new(
        name: String,
        value: String,
        domain: String,
        path: String,
        creation_time: OffsetDateTime,
        expiration_time: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            name,
            value,
            domain,
            path,
            creation_time,
            expiration_time,
            raw_expires: None,
            max_age: None,
            last_access_time: creation_time,
            secure: false,
            http_only: false,
            host_only: true,
            same_site: SameSite::Unspecified,
            priority: CookiePriority::Medium,
            raw: String::new(),
            unparsed: Vec::new(),
        }
    }

    /// Parse a `Set-Cookie` line received from `url`.
    ///
    /// The domain is validated against the public suffix list; a `Domain`
    /// attribute equal to the request host is accepted as host-only even when
    /// that host is itself a public suffix (e.g. `localhost`).
    pub fn from_set_cookie(url: &Url, line: &str) -> Result<Self, NetError> {
        let parsed =
            cookie::Cookie::parse(line).map_err(|e| NetError::InvalidCookie(e.to_string()))?;
        let request_host = url.host_str().unwrap_or("").to_lowercase();
        let now = OffsetDateTime::now_utc();

        let (domain, host_only) = match parsed.domain() {
            Some(d) => {
                let d = d.trim_start_matches('.').to_lowercase();
                if d == request_host && crate::cookies::psl::is_public_suffix(&d) {
                    (d, true)
                } else if crate::cookies::psl::is_valid_cookie_domain(&d, &request_host) {
                    (d, false)
                } else {
                    return Err(NetError::CookiePublicSuffix);
                }
            }
            None => (request_host, true),
        };

        let path = match parsed.path() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => default_path(url),
        };

        let max_age = parsed.max_age().map(|d| d.whole_seconds());
        let expiration_time = match max_age {
            Some(secs) if secs <= 0 => Some(OffsetDateTime::UNIX_EPOCH),
            Some(secs) => Some(now + time::Duration::seconds(secs)),
            None => parsed.expires().and_then(|e| e.datetime()),
        };

        let same_site = match parsed.same_site() {
            Some(cookie::SameSite::Lax) => SameSite::Lax,
            Some(cookie::SameSite::Strict) => SameSite::Strict,
            Some(cookie::SameSite::None) => SameSite::NoRestriction,
            None => SameSite::Unspecified,
        };

        let (raw_expires, unparsed) = scan_attributes(line);

        let c = CanonicalCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            creation_time: now,
            expiration_time,
            raw_expires,
            max_age,
            last_access_time: now,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            host_only,
            same_site,
            priority: CookiePriority::Medium,
            raw: line.to_string(),
            unparsed,
        };
        c.validate_prefix(url.scheme() == "https")?;
        Ok(c)
    }

    pub fn is_expired(&self, current_time: OffsetDateTime) -> bool {
        match self.expiration_time {
            Some(expiry) => expiry <= current_time,
            None => false,
        }
    }

    /// `name=value` as sent in a `Cookie` request header.
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// Validate __Secure- and __Host- cookie prefixes per RFC 6265bis.
    /// - __Secure- cookies MUST have the Secure attribute
    /// - __Host- cookies MUST have Secure, Path="/", and no Domain attribute
    pub fn validate_prefix(&self, secure_origin: bool) -> Result<(), NetError> {
        if self.name.starts_with("__Secure-") && (!self.secure || !secure_origin) {
            return Err(NetError::CookieInvalidPrefix);
        }

        if self.name.starts_with("__Host-")
            && (!self.secure || self.path != "/" || !self.host_only || !secure_origin)
        {
            return Err(NetError::CookieInvalidPrefix);
        }

        Ok(())
    }
}

/// RFC 6265 section 5.1.4 default-path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn scan_attributes(line: &str) -> (Option<String>, Vec<String>) {
    let mut raw_expires = None;
    let mut unparsed = Vec::new();
    for attr in line.split(';').skip(1) {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let (name, value) = match attr.split_once('=') {
            Some((n, v)) => (n.trim(), Some(v.trim())),
            None => (attr, None),
        };
        let lower = name.to_ascii_lowercase();
        if lower == "expires" {
            raw_expires = value.map(str::to_owned);
        } else if !KNOWN_ATTRIBUTES.contains(&lower.as_str()) {
            unparsed.push(attr.to_string());
        }
    }
    (raw_expires, unparsed)
}
