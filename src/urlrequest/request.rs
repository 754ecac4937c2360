use crate::http::orderedheaders::{CaseSensitiveHeaders, HeaderOrderList};
use crate::socket::proxy::ProxySettings;
use bytes::Bytes;
use http::Method;
use std::time::Duration;

/// Everything needed to perform one logical request. Built by
/// [`RequestBuilder`](crate::client::RequestBuilder) or by hand, and not
/// modified once handed to the engine.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Absolute URL, query already merged in.
    pub url: String,
    /// Headers in the order the caller supplied them.
    pub headers: CaseSensitiveHeaders,
    pub body: Bytes,
    /// Fingerprint id handed to the transport factory.
    pub fingerprint: String,
    pub user_agent: String,
    pub proxy: Option<ProxySettings>,
    /// `Duration::ZERO` means the transport default.
    pub timeout: Duration,
    pub disable_redirect: bool,
    /// Overrides the engine's header order when set.
    pub header_order: Option<HeaderOrderList>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: CaseSensitiveHeaders::new(),
            body: Bytes::new(),
            fingerprint: String::new(),
            user_agent: String::new(),
            proxy: None,
            timeout: Duration::ZERO,
            disable_redirect: false,
            header_order: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn disable_redirect(mut self, disable: bool) -> Self {
        self.disable_redirect = disable;
        self
    }

    pub fn header_order(mut self, order: HeaderOrderList) -> Self {
        self.header_order = Some(order);
        self
    }
}
