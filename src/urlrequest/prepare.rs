//! Turning a [`RequestDescriptor`] into something a transport can send.

use crate::base::neterror::NetError;
use crate::cookies::monster::CookieMonster;
use crate::emulation::CHROME_105_USER_AGENT;
use crate::http::orderedheaders::{HeaderOrderList, HeaderOrderPolicy, PSEUDO_HEADER_ORDER};
use crate::http::streamfactory::HyperTransportFactory;
use crate::http::transport::{
    authority_of, RedirectPolicy, Transport, TransportFactory, TransportSpec, WireRequest,
};
use crate::socket::dialer::{DialerFactory, TunnelDialerFactory};
use crate::urlrequest::request::RequestDescriptor;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Used when a descriptor carries a zero timeout.
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(15);

/// A request bound to exactly one transport, ready to dispatch.
pub struct PreparedRequest {
    pub descriptor: RequestDescriptor,
    pub wire: WireRequest,
    pub transport: Arc<dyn Transport>,
    pub jar: Arc<CookieMonster>,
    pub timeout: Duration,
    pub redirect: RedirectPolicy,
}

impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("method", &self.wire.method)
            .field("url", &self.wire.url.as_str())
            .field("timeout", &self.timeout)
            .field("redirect", &self.redirect)
            .finish_non_exhaustive()
    }
}

impl PreparedRequest {
    pub fn url(&self) -> &Url {
        &self.wire.url
    }
}

/// Resolves URLs, orders headers and picks a dialer and transport.
#[derive(Clone)]
pub struct RequestPreparer {
    transports: Arc<dyn TransportFactory>,
    dialers: Arc<dyn DialerFactory>,
    header_order: HeaderOrderList,
}

impl Default for RequestPreparer {
    fn default() -> Self {
        Self::new(
            Arc::new(HyperTransportFactory),
            Arc::new(TunnelDialerFactory),
            HeaderOrderList::chrome(),
        )
    }
}

impl fmt::Debug for RequestPreparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPreparer")
            .field("header_order", &self.header_order)
            .finish_non_exhaustive()
    }
}

impl RequestPreparer {
    pub fn new(
        transports: Arc<dyn TransportFactory>,
        dialers: Arc<dyn DialerFactory>,
        header_order: HeaderOrderList,
    ) -> Self {
        Self {
            transports,
            dialers,
            header_order,
        }
    }

    pub fn header_order(&self) -> &HeaderOrderList {
        &self.header_order
    }

    pub fn prepare(
        &self,
        descriptor: RequestDescriptor,
        jar: Arc<CookieMonster>,
    ) -> Result<PreparedRequest, NetError> {
        let url = parse_target(&descriptor.url)?;
        let timeout = if descriptor.timeout.is_zero() {
            DEFAULT_TRANSPORT_TIMEOUT
        } else {
            descriptor.timeout
        };

        let user_agent = if !descriptor.user_agent.is_empty() {
            descriptor.user_agent.clone()
        } else {
            descriptor
                .headers
                .get("user-agent")
                .unwrap_or(CHROME_105_USER_AGENT)
                .to_string()
        };

        let order = descriptor
            .header_order
            .clone()
            .unwrap_or_else(|| self.header_order.clone());
        let policy = HeaderOrderPolicy::new(order.clone());
        let headers = policy.wire_headers(&descriptor.headers, &authority_of(&url), &user_agent);

        let redirect = RedirectPolicy::from_disabled(descriptor.disable_redirect);
        let dialer = self.dialers.build(descriptor.proxy.as_ref(), &user_agent)?;
        let transport = self.transports.build(&TransportSpec {
            fingerprint: descriptor.fingerprint.clone(),
            user_agent,
            dialer,
            timeout,
        })?;

        debug!(
            method = %descriptor.method,
            url = %url,
            proxied = descriptor.proxy.is_some(),
            ?timeout,
            "request prepared"
        );

        let wire = WireRequest {
            method: descriptor.method.clone(),
            url,
            headers,
            header_order: order,
            pseudo_order: PSEUDO_HEADER_ORDER,
            body: descriptor.body.clone(),
        };

        Ok(PreparedRequest {
            descriptor,
            wire,
            transport,
            jar,
            timeout,
            redirect,
        })
    }
}

fn parse_target(raw: &str) -> Result<Url, NetError> {
    let url = Url::parse(raw.trim()).map_err(|_| NetError::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(NetError::UnknownUrlScheme);
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(NetError::InvalidUrl);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::responsebody::ResponseBody;
    use crate::socket::proxy::ProxySettings;
    use futures::future::BoxFuture;
    use http::Method;
    use std::sync::Mutex;

    struct NullTransport;

    impl Transport for NullTransport {
        fn round_trip(
            &self,
            _request: WireRequest,
        ) -> BoxFuture<'_, Result<http::Response<ResponseBody>, NetError>> {
            Box::pin(async { Err(NetError::ConnectionClosed) })
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        specs: Mutex<Vec<(String, String, Duration)>>,
    }

    impl TransportFactory for RecordingFactory {
        fn build(&self, spec: &TransportSpec) -> Result<Arc<dyn Transport>, NetError> {
            self.specs.lock().unwrap().push((
                spec.fingerprint.clone(),
                spec.user_agent.clone(),
                spec.timeout,
            ));
            Ok(Arc::new(NullTransport))
        }
    }

    struct FailingFactory;

    impl TransportFactory for FailingFactory {
        fn build(&self, _spec: &TransportSpec) -> Result<Arc<dyn Transport>, NetError> {
            Err(NetError::InvalidFingerprint("nope".into()))
        }
    }

    fn preparer(factory: Arc<dyn TransportFactory>) -> RequestPreparer {
        RequestPreparer::new(factory, Arc::new(TunnelDialerFactory), HeaderOrderList::chrome())
    }

    #[test]
    fn test_prepare_orders_and_forces_headers() {
        let factory = Arc::new(RecordingFactory::default());
        let descriptor = RequestDescriptor::new(Method::GET, "http://example.com:8080/p")
            .header("X-Extra", "1")
            .header("Accept", "*/*")
            .header("Content-Length", "999")
            .header("Host", "evil.example")
            .header("user-agent", "Caller/1.0")
            .fingerprint("ja3")
            .user_agent("Engine/2.0");

        let prepared = preparer(factory.clone())
            .prepare(descriptor, Arc::new(CookieMonster::new()))
            .unwrap();

        assert_eq!(
            prepared.wire.headers.keys_lower(),
            vec!["host", "user-agent", "accept", "x-extra"]
        );
        assert_eq!(prepared.wire.headers.get("host"), Some("example.com:8080"));
        assert_eq!(prepared.wire.headers.get("user-agent"), Some("Engine/2.0"));
        assert_eq!(prepared.wire.pseudo_order, PSEUDO_HEADER_ORDER);
        assert_eq!(prepared.timeout, DEFAULT_TRANSPORT_TIMEOUT);

        let specs = factory.specs.lock().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].0, "ja3");
        assert_eq!(specs[0].1, "Engine/2.0");
    }

    #[test]
    fn test_user_agent_falls_back_to_header_then_chrome() {
        let factory = Arc::new(RecordingFactory::default());
        let p = preparer(factory.clone());
        let jar = Arc::new(CookieMonster::new());

        let from_header = RequestDescriptor::new(Method::GET, "https://a.example/")
            .header("User-Agent", "Header/1.0");
        let prepared = p.prepare(from_header, jar.clone()).unwrap();
        assert_eq!(prepared.wire.headers.get("user-agent"), Some("Header/1.0"));

        let bare = RequestDescriptor::new(Method::GET, "https://a.example/");
        let prepared = p.prepare(bare, jar).unwrap();
        assert_eq!(
            prepared.wire.headers.get("user-agent"),
            Some(CHROME_105_USER_AGENT)
        );
    }

    #[test]
    fn test_explicit_header_order() {
        let factory = Arc::new(RecordingFactory::default());
        let descriptor = RequestDescriptor::new(Method::GET, "https://a.example/")
            .header("Accept", "*/*")
            .header("X-First", "1")
            .header_order(HeaderOrderList::new(["x-first", "user-agent", "host"]));
        let prepared = preparer(factory)
            .prepare(descriptor, Arc::new(CookieMonster::new()))
            .unwrap();
        assert_eq!(
            prepared.wire.headers.keys_lower(),
            vec!["x-first", "user-agent", "host", "accept"]
        );
    }

    #[test]
    fn test_prepare_errors() {
        let jar = Arc::new(CookieMonster::new());
        let p = preparer(Arc::new(RecordingFactory::default()));
        assert!(matches!(
            p.prepare(RequestDescriptor::new(Method::GET, "not a url"), jar.clone()),
            Err(NetError::InvalidUrl)
        ));
        assert!(matches!(
            p.prepare(RequestDescriptor::new(Method::GET, "ftp://a.example/"), jar.clone()),
            Err(NetError::UnknownUrlScheme)
        ));

        let failing = preparer(Arc::new(FailingFactory));
        assert!(matches!(
            failing.prepare(RequestDescriptor::new(Method::GET, "https://a.example/"), jar),
            Err(NetError::InvalidFingerprint(_))
        ));
    }

    #[test]
    fn test_prepare_with_proxy_and_timeout() {
        let factory = Arc::new(RecordingFactory::default());
        let descriptor = RequestDescriptor::new(Method::POST, "https://a.example/")
            .proxy(ProxySettings::parse("127.0.0.1:3128", "").unwrap())
            .timeout(Duration::from_secs(3))
            .disable_redirect(true)
            .body("x");
        let prepared = preparer(factory.clone())
            .prepare(descriptor, Arc::new(CookieMonster::new()))
            .unwrap();
        assert_eq!(prepared.timeout, Duration::from_secs(3));
        assert_eq!(factory.specs.lock().unwrap()[0].2, Duration::from_secs(3));
        assert_eq!(prepared.redirect, RedirectPolicy::UseLastResponse);
        assert_eq!(&prepared.wire.body[..], b"x");
    }
}
