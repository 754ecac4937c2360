//! Sockets below the HTTP layer.
//!
//! - [`dialer`]: direct TCP and `CONNECT` tunnels through a proxy
//! - [`proxy`]: proxy descriptors (`host:port[:user:pass]`)
//! - [`stream`]: type-erased async sockets
//! - [`tls`]: BoringSSL handshakes shaped by a JA3 fingerprint

pub mod dialer;
pub mod proxy;
pub mod stream;
pub mod tls;

pub use dialer::{ConnectDialer, Dialer, DialerFactory, DirectDialer, TunnelDialerFactory};
pub use proxy::{ProxySettings, ProxyType};
pub use stream::BoxedSocket;
pub use tls::TlsConfig;
