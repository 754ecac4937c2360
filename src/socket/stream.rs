//! Socket abstraction for TLS-in-TLS and polymorphic socket handling.
//!
//! A dialer may hand back a plain TCP stream, a TLS stream to an HTTPS
//! proxy, or a CONNECT tunnel running through either. [`BoxedSocket`] erases
//! the difference so the transport can layer TLS and HTTP on any of them.
//!
//! Chromium equivalent: `net::StreamSocket`.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Any socket that supports async read/write.
pub trait StreamSocket: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> StreamSocket for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased [`StreamSocket`]. Wrap in `hyper_util::rt::TokioIo` to hand it
/// to hyper.
pub struct BoxedSocket {
    inner: Pin<Box<dyn StreamSocket>>,
    label: &'static str,
}

impl BoxedSocket {
    pub fn new<S: StreamSocket>(socket: S) -> Self {
        Self::labelled(socket, "stream")
    }

    /// Attach a short description used in logs ("tcp", "tls", "tunnel").
    pub fn labelled<S: StreamSocket>(socket: S, label: &'static str) -> Self {
        Self {
            inner: Box::pin(socket),
            label,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for BoxedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedSocket")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for BoxedSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxedSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}
