use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single socket-level operation (`dial`, `lookup`, `read`...).
///
/// The classifier walks the error chain and downcasts to this type.
#[derive(Debug, Error)]
#[error("{op} {target}: {kind}")]
pub struct NetOpError {
    pub op: &'static str,
    pub target: String,
    #[source]
    pub kind: NetOpKind,
}

#[derive(Debug, Error)]
pub enum NetOpKind {
    /// An OS-level socket call failed.
    #[error("{source}")]
    Syscall {
        #[source]
        source: io::Error,
        timed_out: bool,
    },
    /// The address could not be used (malformed, missing port, ...).
    #[error("address {addr}: {reason}")]
    Address { addr: String, reason: String },
    /// Name resolution failed.
    #[error("lookup {host}: {reason}")]
    Dns { host: String, reason: String },
    #[error("{0}")]
    Other(String),
}

impl NetOpError {
    pub fn syscall(op: &'static str, target: impl Into<String>, source: io::Error) -> Self {
        let timed_out = source.kind() == io::ErrorKind::TimedOut;
        Self {
            op,
            target: target.into(),
            kind: NetOpKind::Syscall { source, timed_out },
        }
    }

    pub fn address(op: &'static str, addr: impl Into<String>, reason: impl Into<String>) -> Self {
        let addr = addr.into();
        Self {
            op,
            target: addr.clone(),
            kind: NetOpKind::Address {
                addr,
                reason: reason.into(),
            },
        }
    }

    pub fn dns(host: impl Into<String>, reason: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            op: "lookup",
            target: host.clone(),
            kind: NetOpKind::Dns {
                host,
                reason: reason.into(),
            },
        }
    }

    pub fn other(op: &'static str, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            op,
            target: target.into(),
            kind: NetOpKind::Other(reason.into()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, NetOpKind::Syscall { timed_out: true, .. })
    }
}

#[derive(Debug, Error)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Tunnel connection failed: {reason}")]
    TunnelConnectionFailed { reason: String },
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Proxy connection failed")]
    ProxyConnectionFailed,
    #[error("SSL version or cipher mismatch")]
    SslVersionOrCipherMismatch,

    /// Socket-level failure with operation context.
    #[error(transparent)]
    Network(#[from] NetOpError),

    /// A lower layer reported an explicit HTTP-like status code
    /// (for example a proxy refusing CONNECT).
    #[error("status {status}: {message}")]
    Status { status: u16, message: String },

    /// The whole exchange exceeded its deadline.
    #[error("Request timed out after {0:?}")]
    TimedOut(Duration),

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid redirect")]
    InvalidRedirect,
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),
    #[error("Error reading response body: {0}")]
    HttpBodyError(String),
    #[error("{method} requests cannot carry a multipart body")]
    BodyNotAllowed { method: String },
    #[error("Invalid multipart boundary")]
    InvalidBoundary,

    // Cookie Errors
    #[error("Cookie prefix validation failed")]
    CookieInvalidPrefix,
    #[error("Cookie domain is a public suffix")]
    CookiePublicSuffix,
    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    // JSON Errors
    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),
    #[error("JSON value at {path:?} is not {expected}")]
    JsonShape { path: String, expected: &'static str },

    // Worker pool
    #[error("Worker pool is closed")]
    PoolClosed,
    #[error("Worker pool is not running")]
    PoolNotStarted,
    #[error("Worker pool is already running")]
    PoolAlreadyRunning,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    /// Chromium `net_error_list.h` code for this error. Variants without a
    /// Chromium counterpart use the -10000 range.
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::SslProtocolError => -107,
            NetError::TunnelConnectionFailed { .. } => -111,
            NetError::SslVersionOrCipherMismatch => -113,
            NetError::ConnectionTimedOut => -118,
            NetError::ProxyConnectionFailed => -130,
            NetError::Network(e) => match &e.kind {
                NetOpKind::Syscall { timed_out: true, .. } => -118,
                NetOpKind::Syscall { source, .. } => match source.kind() {
                    io::ErrorKind::ConnectionRefused => -102,
                    io::ErrorKind::ConnectionReset => -101,
                    _ => -104,
                },
                NetOpKind::Address { .. } => -108,
                NetOpKind::Dns { .. } => -105,
                NetOpKind::Other(_) => -2,
            },
            NetError::TimedOut(_) => -7,

            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            NetError::InvalidRedirect => -303,
            NetError::TooManyRedirects => -310,
            NetError::InvalidResponse => -320,
            NetError::HttpBodyError(_) => -330,

            NetError::Status { .. } => -10001,
            NetError::InvalidHeader(_) => -10002,
            NetError::InvalidProxy(_) => -10003,
            NetError::InvalidFingerprint(_) => -10004,
            NetError::BodyNotAllowed { .. } => -10005,
            NetError::InvalidBoundary => -10006,
            NetError::CookieInvalidPrefix => -10011,
            NetError::CookiePublicSuffix => -10012,
            NetError::InvalidCookie(_) => -10013,
            NetError::JsonParseError(_) => -10007,
            NetError::JsonShape { .. } => -10008,
            NetError::PoolClosed => -10009,
            NetError::PoolNotStarted => -10010,
            NetError::PoolAlreadyRunning => -10014,
            NetError::Unknown(c) => *c,
        }
    }

    /// True when the failure was caused by a deadline expiring, either the
    /// exchange timeout or a socket-level timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            NetError::TimedOut(_) | NetError::ConnectionTimedOut => true,
            NetError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -113 => NetError::SslVersionOrCipherMismatch,
            -118 => NetError::ConnectionTimedOut,
            -130 => NetError::ProxyConnectionFailed,
            -300 => NetError::InvalidUrl,
            -302 => NetError::UnknownUrlScheme,
            -303 => NetError::InvalidRedirect,
            -310 => NetError::TooManyRedirects,
            -320 => NetError::InvalidResponse,
            -10006 => NetError::InvalidBoundary,
            -10011 => NetError::CookieInvalidPrefix,
            -10012 => NetError::CookiePublicSuffix,
            -10009 => NetError::PoolClosed,
            -10010 => NetError::PoolNotStarted,
            -10014 => NetError::PoolAlreadyRunning,
            c => NetError::Unknown(c),
        }
    }
}
