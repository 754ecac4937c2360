//! Opening the byte stream a transport speaks HTTP over.
//!
//! [`DirectDialer`] connects straight to the origin. [`ConnectDialer`]
//! reaches the proxy (over TLS for `https` proxies), asks it to `CONNECT` to
//! the origin, and hands back the tunnel. TLS to the origin is layered on
//! top by the transport, never here.

use crate::base::context::IoResultExt;
use crate::base::neterror::{NetError, NetOpError};
use crate::socket::proxy::{ProxySettings, ProxyType};
use crate::socket::stream::BoxedSocket;
use crate::socket::tls::TlsConfig;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Upper bound on the proxy's CONNECT response head.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Opens a stream to `host:port`.
pub trait Dialer: Send + Sync {
    fn dial<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, Result<BoxedSocket, NetError>>;
}

/// Chooses a dialer for a request's proxy setting.
pub trait DialerFactory: Send + Sync {
    fn build(
        &self,
        proxy: Option<&ProxySettings>,
        user_agent: &str,
    ) -> Result<Arc<dyn Dialer>, NetError>;
}

/// Plain TCP. Every resolved address is tried in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

impl DirectDialer {
    pub async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, NetError> {
        let lookup = host.trim_matches(|c| c == '[' || c == ']');
        let addrs: Vec<_> = tokio::net::lookup_host((lookup, port))
            .await
            .dns_context(host)?
            .collect();
        if addrs.is_empty() {
            return Err(NetOpError::dns(host, "no addresses found").into());
        }

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await.connection_context(host, port) {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%addr, error = %e, "failed to set TCP_NODELAY");
                    }
                    trace!(%addr, "tcp connected");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "tcp connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(NetError::ConnectionFailed))
    }
}

impl Dialer for DirectDialer {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> BoxFuture<'a, Result<BoxedSocket, NetError>> {
        async move {
            let stream = Self::connect_tcp(host, port).await?;
            Ok(BoxedSocket::labelled(stream, "tcp"))
        }
        .boxed()
    }
}

/// Tunnels through an HTTP or HTTPS proxy with `CONNECT`.
#[derive(Debug, Clone)]
pub struct ConnectDialer {
    proxy: ProxySettings,
    user_agent: String,
    proxy_tls: TlsConfig,
}

impl ConnectDialer {
    pub fn new(proxy: ProxySettings, user_agent: impl Into<String>) -> Self {
        Self {
            proxy,
            user_agent: user_agent.into(),
            proxy_tls: TlsConfig::default_chrome(),
        }
    }

    pub fn proxy(&self) -> &ProxySettings {
        &self.proxy
    }

    async fn open_proxy(&self) -> Result<BoxedSocket, NetError> {
        let (host, port) = self.proxy.host_port();
        let tcp = DirectDialer::connect_tcp(host, port)
            .await
            .map_err(|e| {
                debug!(proxy = %host, error = %e, "proxy unreachable");
                e
            })?;
        match self.proxy.proxy_type {
            ProxyType::Http => Ok(BoxedSocket::labelled(tcp, "tcp")),
            ProxyType::Https => {
                let tls = self.proxy_tls.connect(host, tcp).await?;
                Ok(BoxedSocket::labelled(tls, "tls"))
            }
        }
    }

    /// Build the CONNECT request head.
    pub fn connect_request(&self, host: &str, port: u16) -> String {
        let target = format!("{}:{}", host, port);
        let mut req = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
        if !self.user_agent.is_empty() {
            req.push_str(&format!("User-Agent: {}\r\n", self.user_agent));
        }
        if let Some(auth) = self.proxy.get_auth_header() {
            req.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
        }
        req.push_str("\r\n");
        req
    }
}

impl Dialer for ConnectDialer {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> BoxFuture<'a, Result<BoxedSocket, NetError>> {
        async move {
            let mut stream = self.open_proxy().await?;
            let target = format!("{}:{}", host, port);

            stream
                .write_all(self.connect_request(host, port).as_bytes())
                .await
                .io_context("write", &target)?;
            stream.flush().await.io_context("write", &target)?;

            let head = read_response_head(&mut stream, &target).await?;
            let status = parse_status(&head)?;
            if !(200..300).contains(&status) {
                debug!(proxy = %self.proxy.host, %target, status, "CONNECT refused");
                return Err(NetError::Status {
                    status,
                    message: format!("proxy refused CONNECT to {target}"),
                });
            }
            trace!(%target, "tunnel established");
            Ok(BoxedSocket::labelled(stream, "tunnel"))
        }
        .boxed()
    }
}

/// Reads up to and including the blank line, one byte at a time so nothing
/// past the head is consumed from the tunnel.
async fn read_response_head<S>(stream: &mut S, target: &str) -> Result<String, NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.io_context("read", target)?;
        if n == 0 {
            return Err(NetError::TunnelConnectionFailed {
                reason: "proxy closed the connection during CONNECT".into(),
            });
        }
        head.push(byte[0]);
        if head.len() > MAX_CONNECT_RESPONSE {
            return Err(NetError::TunnelConnectionFailed {
                reason: "CONNECT response head too large".into(),
            });
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn parse_status(head: &str) -> Result<u16, NetError> {
    let line = head.lines().next().unwrap_or_default();
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => {
            code.parse().map_err(|_| NetError::TunnelConnectionFailed {
                reason: format!("malformed status line {line:?}"),
            })
        }
        _ => Err(NetError::TunnelConnectionFailed {
            reason: format!("malformed status line {line:?}"),
        }),
    }
}

/// Direct when no proxy is set, CONNECT tunnel otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TunnelDialerFactory;

impl DialerFactory for TunnelDialerFactory {
    fn build(
        &self,
        proxy: Option<&ProxySettings>,
        user_agent: &str,
    ) -> Result<Arc<dyn Dialer>, NetError> {
        Ok(match proxy {
            Some(p) => Arc::new(ConnectDialer::new(p.clone(), user_agent)),
            None => Arc::new(DirectDialer),
        })
    }
}
