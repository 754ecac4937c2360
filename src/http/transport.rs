//! The seam between the dispatch engine and whatever puts bytes on the wire.
//!
//! A [`TransportFactory`] turns a fingerprint id plus a dialer into a
//! [`Transport`]; the transport performs exactly one request/response hop.
//! Redirects and cookies are handled above this layer.

use crate::base::neterror::NetError;
use crate::http::orderedheaders::{CaseSensitiveHeaders, HeaderOrderList, PseudoHeader};
use crate::http::responsebody::ResponseBody;
use crate::socket::dialer::Dialer;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use url::{Position, Url};

/// Redirect handling for one prepared request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Follow `Location` up to this many hops.
    Follow(usize),
    /// Hand back the 3xx response as-is.
    UseLastResponse,
}

impl RedirectPolicy {
    /// Hops followed when redirects are enabled.
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn from_disabled(disable_redirect: bool) -> Self {
        if disable_redirect {
            RedirectPolicy::UseLastResponse
        } else {
            RedirectPolicy::Follow(Self::DEFAULT_LIMIT)
        }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        RedirectPolicy::Follow(Self::DEFAULT_LIMIT)
    }
}

/// A request ready for the wire: headers already in emission order.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: CaseSensitiveHeaders,
    pub header_order: HeaderOrderList,
    pub pseudo_order: [PseudoHeader; 4],
    pub body: Bytes,
}

impl WireRequest {
    /// Set a header and restore wire order.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name, value);
        self.headers.sort_by_order(&self.header_order);
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(name)
    }

    /// `host[:port]` as it belongs in the `Host` header.
    pub fn authority(&self) -> String {
        authority_of(&self.url)
    }

    /// The pseudo-header values, in `pseudo_order`.
    pub fn pseudo_headers(&self) -> Vec<(PseudoHeader, String)> {
        self.pseudo_order
            .iter()
            .map(|p| {
                let value = match p {
                    PseudoHeader::Method => self.method.to_string(),
                    PseudoHeader::Authority => self.authority(),
                    PseudoHeader::Scheme => self.url.scheme().to_string(),
                    PseudoHeader::Path => {
                        let target = &self.url[Position::BeforePath..Position::AfterQuery];
                        if target.is_empty() {
                            "/".to_string()
                        } else {
                            target.to_string()
                        }
                    }
                };
                (*p, value)
            })
            .collect()
    }

    /// Build an HTTP/1.1 `http::Request` from the pseudo-headers: `:method`
    /// and `:path` form the request line, `:authority` fills a missing
    /// `Host`. Headers keep emission order.
    pub fn to_http<B>(&self, body: B) -> Result<http::Request<B>, NetError> {
        let mut builder = http::Request::builder();
        let mut authority = None;
        for (pseudo, value) in self.pseudo_headers() {
            match pseudo {
                PseudoHeader::Method => builder = builder.method(value.as_str()),
                PseudoHeader::Path => builder = builder.uri(value),
                PseudoHeader::Authority => authority = Some(value),
                PseudoHeader::Scheme => {}
            }
        }
        let mut request = builder.body(body).map_err(|_| NetError::InvalidUrl)?;
        let mut headers = self.headers.clone();
        if let Some(authority) = authority {
            headers.insert_if_absent("Host", authority);
            headers.sort_by_order(&self.header_order);
        }
        *request.headers_mut() = headers.to_header_map()?;
        Ok(request)
    }
}

pub fn authority_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// Everything a transport is bound to.
#[derive(Clone)]
pub struct TransportSpec {
    /// Opaque fingerprint id (for the default factory, a JA3 string).
    pub fingerprint: String,
    pub user_agent: String,
    pub dialer: Arc<dyn Dialer>,
    /// Deadline for connecting and for the response head of one hop.
    pub timeout: Duration,
}

impl std::fmt::Debug for TransportSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSpec")
            .field("fingerprint", &self.fingerprint)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// One request/response hop.
pub trait Transport: Send + Sync {
    fn round_trip(
        &self,
        request: WireRequest,
    ) -> BoxFuture<'_, Result<http::Response<ResponseBody>, NetError>>;
}

pub trait TransportFactory: Send + Sync {
    fn build(&self, spec: &TransportSpec) -> Result<Arc<dyn Transport>, NetError>;
}
