//! Default [`TransportFactory`]: BoringSSL shaped by a JA3 string, HTTP/1.1
//! via hyper.
//!
//! Each round trip dials a fresh stream through the bound [`Dialer`], runs
//! the TLS handshake for `https`, and hands the socket to a hyper client
//! connection whose driver is spawned onto the runtime. Connecting and
//! waiting for the response head are each bounded by the spec's timeout.

use crate::base::neterror::{NetError, NetOpError};
use crate::http::responsebody::ResponseBody;
use crate::http::transport::{Transport, TransportFactory, TransportSpec, WireRequest};
use crate::socket::dialer::Dialer;
use crate::socket::tls::TlsConfig;
use futures::future::BoxFuture;
use futures::FutureExt;
use http_body_util::Full;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Builds a [`HyperTransport`] per prepared request.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperTransportFactory;

impl TransportFactory for HyperTransportFactory {
    fn build(&self, spec: &TransportSpec) -> Result<Arc<dyn Transport>, NetError> {
        let tls = if spec.fingerprint.trim().is_empty() {
            TlsConfig::default_chrome()
        } else {
            TlsConfig::from_ja3(&spec.fingerprint)?
        };
        Ok(Arc::new(HyperTransport {
            tls,
            dialer: spec.dialer.clone(),
            user_agent: spec.user_agent.clone(),
            timeout: spec.timeout,
        }))
    }
}

pub struct HyperTransport {
    tls: TlsConfig,
    dialer: Arc<dyn Dialer>,
    /// Sent when the request carries no `User-Agent` of its own.
    user_agent: String,
    timeout: Duration,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("tls", &self.tls)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn tls_config(&self) -> &TlsConfig {
        &self.tls
    }

    async fn exchange(
        &self,
        mut request: WireRequest,
    ) -> Result<http::Response<ResponseBody>, NetError> {
        let host = request.url.host_str().ok_or(NetError::InvalidUrl)?.to_string();
        let port = request
            .url
            .port_or_known_default()
            .ok_or(NetError::UnknownUrlScheme)?;
        let target = format!("{}:{}", host, port);

        let mut sender = self
            .deadline(&target, "connect", self.connect(&request, &host, port, &target))
            .await?;

        if request.headers.get("user-agent").is_none() && !self.user_agent.is_empty() {
            request.set_header("User-Agent", self.user_agent.clone());
        }
        let http_request = request.to_http(Full::new(request.body.clone()))?;
        let response = self
            .deadline(&target, "response", async {
                sender
                    .send_request(http_request)
                    .await
                    .map_err(|e| map_hyper_error(e, &target))
            })
            .await?;
        Ok(response.map(ResponseBody::from_incoming))
    }

    /// Dial, TLS for `https`, then the HTTP/1.1 handshake.
    async fn connect(
        &self,
        request: &WireRequest,
        host: &str,
        port: u16,
        target: &str,
    ) -> Result<http1::SendRequest<Full<bytes::Bytes>>, NetError> {
        let socket = self.dialer.dial(host, port).await?;
        let socket = match request.url.scheme() {
            "https" => self.tls.connect_boxed(host, socket).await?,
            "http" => socket,
            _ => return Err(NetError::UnknownUrlScheme),
        };
        trace!(%target, via = socket.label(), "connected");

        let (sender, conn) = http1::Builder::new()
            .title_case_headers(true)
            .handshake(TokioIo::new(socket))
            .await
            .map_err(|e| map_hyper_error(e, target))?;

        let driver_target = target.to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(target = %driver_target, error = %e, "connection driver ended with error");
            }
        });
        Ok(sender)
    }

    async fn deadline<T>(
        &self,
        target: &str,
        stage: &'static str,
        fut: impl Future<Output = Result<T, NetError>>,
    ) -> Result<T, NetError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%target, stage, timeout = ?self.timeout, "transport deadline elapsed");
                Err(NetError::ConnectionTimedOut)
            }
        }
    }
}

impl Transport for HyperTransport {
    fn round_trip(
        &self,
        request: WireRequest,
    ) -> BoxFuture<'_, Result<http::Response<ResponseBody>, NetError>> {
        self.exchange(request).boxed()
    }
}

/// Socket failures become network-operation errors so the classifier sees
/// them; framing problems become [`NetError::InvalidResponse`].
fn map_hyper_error(err: hyper::Error, target: &str) -> NetError {
    if let Some(io) = io_source(&err) {
        let op = if err.is_closed() || err.is_incomplete_message() {
            "read"
        } else {
            "write"
        };
        return NetOpError::syscall(op, target, std::io::Error::new(io.kind(), io.to_string()))
            .into();
    }
    if err.is_timeout() {
        return NetError::ConnectionTimedOut;
    }
    if err.is_parse() || err.is_parse_status() {
        return NetError::InvalidResponse;
    }
    debug!(%target, error = %err, "request failed");
    NetError::ConnectionClosed
}

fn io_source<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a std::io::Error> {
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return Some(io);
        }
        source = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::orderedheaders::{CaseSensitiveHeaders, HeaderOrderList, PSEUDO_HEADER_ORDER};
    use crate::socket::dialer::DirectDialer;
    use bytes::Bytes;
    use http::Method;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    fn spec(fingerprint: &str) -> TransportSpec {
        TransportSpec {
            fingerprint: fingerprint.to_string(),
            user_agent: "ua".into(),
            dialer: Arc::new(DirectDialer),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_rejects_bad_fingerprint() {
        assert!(matches!(
            HyperTransportFactory.build(&spec("not-ja3")),
            Err(NetError::InvalidFingerprint(_))
        ));
        assert!(HyperTransportFactory.build(&spec("")).is_ok());
    }

    #[tokio::test]
    async fn test_round_trip_plain_http() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut seen = Vec::new();
            while !seen.ends_with(b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                seen.extend_from_slice(&buf[..n]);
            }
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nX-Test: yes\r\n\r\nok")
                .await
                .unwrap();
            String::from_utf8(seen).unwrap()
        });

        let mut headers = CaseSensitiveHeaders::new();
        headers.insert("Host", format!("127.0.0.1:{port}"));
        headers.insert("user-agent", "ua");
        headers.insert("accept", "*/*");
        let request = WireRequest {
            method: Method::GET,
            url: Url::parse(&format!("http://127.0.0.1:{port}/path?x=1")).unwrap(),
            headers,
            header_order: HeaderOrderList::chrome(),
            pseudo_order: PSEUDO_HEADER_ORDER,
            body: Bytes::new(),
        };

        let transport = HyperTransportFactory.build(&spec("")).unwrap();
        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-test"], "yes");
        assert_eq!(&response.into_body().bytes().await.unwrap()[..], b"ok");

        let seen = server.await.unwrap();
        assert!(seen.starts_with("GET /path?x=1 HTTP/1.1\r\nHost: "));
        let ua = seen.find("User-Agent: ua").unwrap();
        let accept = seen.find("Accept: */*").unwrap();
        assert!(ua < accept);
    }

    fn bare_request(port: u16) -> WireRequest {
        WireRequest {
            method: Method::GET,
            url: Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap(),
            headers: CaseSensitiveHeaders::new(),
            header_order: HeaderOrderList::chrome(),
            pseudo_order: PSEUDO_HEADER_ORDER,
            body: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn test_user_agent_and_host_filled_from_spec() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut seen = Vec::new();
            while !seen.ends_with(b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                seen.extend_from_slice(&buf[..n]);
            }
            sock.write_all(b"HTTP/1.1 204 No Content\r\n\r\n").await.unwrap();
            String::from_utf8(seen).unwrap()
        });

        let transport = HyperTransportFactory.build(&spec("")).unwrap();
        let response = transport.round_trip(bare_request(port)).await.unwrap();
        assert_eq!(response.status(), 204);

        let seen = server.await.unwrap();
        assert!(seen.starts_with(&format!("GET / HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n")));
        assert!(seen.contains("User-Agent: ua\r\n"));
    }

    #[tokio::test]
    async fn test_silent_server_hits_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(sock);
        });

        let mut spec = spec("");
        spec.timeout = Duration::from_millis(200);
        let transport = HyperTransportFactory.build(&spec).unwrap();
        let started = std::time::Instant::now();
        let result = transport.round_trip(bare_request(port)).await;
        assert!(matches!(result, Err(NetError::ConnectionTimedOut)));
        assert!(started.elapsed() < Duration::from_secs(2));
        server.abort();
    }
}
