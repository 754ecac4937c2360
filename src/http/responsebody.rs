//! Response body reading and content decoding.
//! Mirrors Chromium's HttpStream::ReadResponseBody plus the
//! `FilterSourceStream` chain built from `Content-Encoding`.

use crate::base::neterror::NetError;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use std::io::Read;
use tracing::debug;

/// Response body handed back by a [`Transport`](crate::http::transport::Transport).
///
/// Hyper's `Incoming` is wrapped in a boxed body so transports that do not
/// speak to a real socket (test doubles, replay layers) can produce one too.
pub struct ResponseBody {
    inner: BoxBody<Bytes, NetError>,
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

impl ResponseBody {
    pub fn from_incoming(inner: Incoming) -> Self {
        Self {
            inner: inner
                .map_err(|e| NetError::HttpBodyError(e.to_string()))
                .boxed(),
        }
    }

    pub fn full(data: impl Into<Bytes>) -> Self {
        Self {
            inner: Full::new(data.into())
                .map_err(|never| match never {})
                .boxed(),
        }
    }

    pub fn empty() -> Self {
        Self {
            inner: Empty::new().map_err(|never| match never {}).boxed(),
        }
    }

    /// Read entire body as bytes. The body is consumed on every path.
    pub async fn bytes(self) -> Result<Bytes, NetError> {
        Ok(self.inner.collect().await?.to_bytes())
    }
}

/// Split `Content-Encoding` header values into individual codings, in the
/// order they were applied by the server.
pub fn content_codings<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Undo the codings listed in `encodings` and return `(text, bytes)`.
///
/// Codings are removed last-applied first. `identity` and unknown codings pass
/// through untouched. If any step fails the original bytes are returned, so a
/// mislabelled body is still readable.
pub fn decode_body(body: &[u8], encodings: &[String]) -> (String, Bytes) {
    let decoded = match decode_chain(body, encodings) {
        Ok(data) => data,
        Err(e) => {
            debug!(error = %e, ?encodings, "content decoding failed, keeping raw body");
            Bytes::copy_from_slice(body)
        }
    };
    let text = String::from_utf8_lossy(&decoded).into_owned();
    (text, decoded)
}

fn decode_chain(body: &[u8], encodings: &[String]) -> std::io::Result<Bytes> {
    let mut data = Bytes::copy_from_slice(body);
    for coding in encodings.iter().rev() {
        data = match coding.as_str() {
            "gzip" | "x-gzip" => decode_gzip(&data)?,
            "deflate" => decode_deflate(&data)?,
            "br" => decode_brotli(&data)?,
            _ => data,
        };
    }
    Ok(data)
}

fn decode_gzip(data: &[u8]) -> std::io::Result<Bytes> {
    let mut decoded = Vec::new();
    flate2::read::GzDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}

/// `deflate` is supposed to be zlib-wrapped, but plenty of servers send raw
/// DEFLATE.
fn decode_deflate(data: &[u8]) -> std::io::Result<Bytes> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> std::io::Result<Bytes> {
    let mut decoded = Vec::new();
    brotli::Decompressor::new(data, 4096).read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}
