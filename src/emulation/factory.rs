//! Emulation factory and core types.

use crate::http::orderedheaders::{CaseSensitiveHeaders, HeaderOrderList};

/// Factory trait for creating emulation configurations.
///
/// Implemented by predefined browser profiles and by [`Emulation`] itself,
/// so a client can be configured from either.
pub trait EmulationFactory {
    fn emulation(self) -> Emulation;
}

/// What a client pretends to be: TLS fingerprint, user agent, default
/// headers and the order headers go on the wire.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct Emulation {
    /// JA3 string handed to the transport factory.
    pub fingerprint: String,
    pub user_agent: String,
    /// Headers sent with every request unless overridden.
    pub headers: CaseSensitiveHeaders,
    pub header_order: HeaderOrderList,
}

impl Emulation {
    #[inline]
    pub fn builder() -> EmulationBuilder {
        EmulationBuilder::default()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn headers(&self) -> &CaseSensitiveHeaders {
        &self.headers
    }

    pub fn header_order(&self) -> &HeaderOrderList {
        &self.header_order
    }
}

#[derive(Debug, Clone, Default)]
#[must_use]
pub struct EmulationBuilder {
    emulation: Emulation,
}

impl EmulationBuilder {
    pub fn fingerprint(mut self, ja3: impl Into<String>) -> Self {
        self.emulation.fingerprint = ja3.into();
        self
    }

    /// Also sets the `User-Agent` default header.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        let ua = ua.into();
        self.emulation.headers.insert("User-Agent", ua.clone());
        self.emulation.user_agent = ua;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.emulation.headers.insert(name, value);
        self
    }

    pub fn header_order(mut self, order: HeaderOrderList) -> Self {
        self.emulation.header_order = order;
        self
    }

    pub fn build(self) -> Emulation {
        self.emulation
    }
}

impl EmulationFactory for Emulation {
    #[inline]
    fn emulation(self) -> Emulation {
        self
    }
}
