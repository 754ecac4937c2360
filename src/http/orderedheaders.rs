//! Wire ordering of request headers.
//!
//! Browsers emit headers in a fixed order and servers fingerprint on it. A
//! [`HeaderOrderPolicy`] takes the caller's headers in whatever order they
//! were set and produces the sequence a real browser would send.

use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Chrome's header order. Anything not listed goes after these.
pub const DEFAULT_HEADER_ORDER: [&str; 26] = [
    "host",
    "connection",
    "cache-control",
    "device-memory",
    "viewport-width",
    "rtt",
    "downlink",
    "ect",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-full-version",
    "sec-ch-ua-arch",
    "sec-ch-ua-platform",
    "sec-ch-ua-platform-version",
    "sec-ch-ua-model",
    "upgrade-insecure-requests",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-user",
    "sec-fetch-dest",
    "referer",
    "accept-encoding",
    "accept-language",
    "cookie",
];

/// HTTP/2 pseudo-headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoHeader {
    Method,
    Authority,
    Scheme,
    Path,
}

impl PseudoHeader {
    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoHeader::Method => ":method",
            PseudoHeader::Authority => ":authority",
            PseudoHeader::Scheme => ":scheme",
            PseudoHeader::Path => ":path",
        }
    }
}

/// Chrome's pseudo-header order. Fixed, never taken from the caller.
pub const PSEUDO_HEADER_ORDER: [PseudoHeader; 4] = [
    PseudoHeader::Method,
    PseudoHeader::Authority,
    PseudoHeader::Scheme,
    PseudoHeader::Path,
];

/// Lower-cased, deduplicated list of header names. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct HeaderOrderList(Arc<[String]>);

impl HeaderOrderList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: Vec<String> = Vec::new();
        for name in names {
            let lower = name.as_ref().trim().to_ascii_lowercase();
            if !lower.is_empty() && !seen.contains(&lower) {
                seen.push(lower);
            }
        }
        Self(seen.into())
    }

    pub fn chrome() -> Self {
        Self::new(DEFAULT_HEADER_ORDER)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for HeaderOrderList {
    fn default() -> Self {
        Self::chrome()
    }
}

impl From<Vec<String>> for HeaderOrderList {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

/// Output of [`HeaderOrderPolicy::order`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaders {
    /// Lower-cased names in wire order.
    pub keys: Vec<String>,
    /// The matching headers with their original casing.
    pub map: CaseSensitiveHeaders,
}

#[derive(Debug, Clone, Default)]
pub struct HeaderOrderPolicy {
    order: HeaderOrderList,
}

impl HeaderOrderPolicy {
    pub fn new(order: HeaderOrderList) -> Self {
        Self { order }
    }

    pub fn order_list(&self) -> &HeaderOrderList {
        &self.order
    }

    /// Pick out the headers named in the order list, in list order.
    /// Headers the list does not mention are left out here; see
    /// [`wire_headers`](Self::wire_headers) for the full emission list.
    pub fn order(&self, headers: &CaseSensitiveHeaders) -> OrderedHeaders {
        let mut out = OrderedHeaders::default();
        for key in self.order.iter() {
            for (name, value) in headers.iter() {
                if name.eq_ignore_ascii_case(key) {
                    out.keys.push(key.to_string());
                    out.map.insert(name, value);
                }
            }
        }
        out
    }

    /// Everything that goes on the wire, in emission order.
    ///
    /// `Content-Length` is dropped (the transport computes it), `Host` and
    /// `User-Agent` are forced to the given values, listed headers come first
    /// in list order and the rest follow in insertion order.
    pub fn wire_headers(
        &self,
        headers: &CaseSensitiveHeaders,
        host: &str,
        user_agent: &str,
    ) -> CaseSensitiveHeaders {
        let mut out = CaseSensitiveHeaders::new();
        for (name, value) in headers.iter() {
            if name.eq_ignore_ascii_case("content-length")
                || name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("user-agent")
            {
                continue;
            }
            out.insert(name, value);
        }
        out.insert("Host", host);
        out.insert("User-Agent", user_agent);
        out.sort_by_order(&self.order);
        out
    }
}

/// Canonical MIME-style casing: "content-type" -> "Content-Type".
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// Case-preserving header list for HTTP/1.1.
///
/// Lookups are case-insensitive; the first casing a caller used is the one
/// kept. Iteration order is insertion order until
/// [`sort_by_order`](Self::sort_by_order) is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseSensitiveHeaders {
    headers: Vec<(String, String)>,
}

impl CaseSensitiveHeaders {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Insert header with preserved casing, replacing the value of an
    /// existing header with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        if let Some((_, v)) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            *v = value;
        } else {
            self.headers.push((name, value));
        }
    }

    /// Insert only if no header with this name exists yet.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if self.get(&name).is_none() {
            self.headers.push((name, value.into()));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.headers.remove(idx).1)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Overlay `other` on top of `self`; later values win.
    pub fn extend_from(&mut self, other: &CaseSensitiveHeaders) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Stable sort: names in `order` first, by position, then the rest in
    /// their current relative order.
    pub fn sort_by_order(&mut self, order: &HeaderOrderList) {
        self.headers
            .sort_by_key(|(n, _)| order.position(n).unwrap_or(usize::MAX));
    }

    /// Lower-cased names in current order.
    pub fn keys_lower(&self) -> Vec<String> {
        self.headers
            .iter()
            .map(|(n, _)| n.to_ascii_lowercase())
            .collect()
    }

    pub fn as_title_case(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.headers
            .iter()
            .map(|(n, v)| (title_case(n), v.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Convert to an `http::HeaderMap`, keeping the current order.
    pub fn to_header_map(&self) -> Result<HeaderMap, NetError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name =
                HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| NetError::InvalidHeader(name.to_string()))?;
            map.append(name, value);
        }
        Ok(map)
    }
}

impl<K, V> FromIterator<(K, V)> for CaseSensitiveHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

// Deserialized from a map; entries keep document order.
impl<'de> Deserialize<'de> for CaseSensitiveHeaders {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = CaseSensitiveHeaders;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of header names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut headers = CaseSensitiveHeaders::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    headers.insert(name, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}
