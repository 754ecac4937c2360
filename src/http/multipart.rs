//! `multipart/form-data` bodies (RFC 7578).
//!
//! # Example
//! ```
//! use mimicnet::http::multipart::{Form, Part};
//!
//! let form = Form::new()
//!     .text("username", "user123")
//!     .part("file", Part::bytes(&b"file content"[..]).file_name("doc.txt"));
//! assert!(form.content_type().starts_with("multipart/form-data; boundary="));
//! ```

use crate::base::neterror::NetError;
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;

/// RFC 2046 limit on boundary length.
const MAX_BOUNDARY_LEN: usize = 70;

#[derive(Debug, Clone)]
pub struct Form {
    boundary: String,
    fields: Vec<(Cow<'static, str>, Part)>,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    pub fn new() -> Self {
        Self {
            boundary: generate_boundary(),
            fields: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Replace the generated boundary. Rejects boundaries RFC 2046 does not
    /// allow: empty, longer than 70 bytes, ending in a space, or containing
    /// characters outside `bchars`.
    pub fn set_boundary(&mut self, boundary: impl Into<String>) -> Result<(), NetError> {
        let boundary = boundary.into();
        if !is_valid_boundary(&boundary) {
            return Err(NetError::InvalidBoundary);
        }
        self.boundary = boundary;
        Ok(())
    }

    /// Add a text field. Text fields carry no `Content-Type`, like a browser
    /// form submission.
    pub fn text<N, V>(self, name: N, value: V) -> Self
    where
        N: Into<Cow<'static, str>>,
        V: Into<Cow<'static, str>>,
    {
        self.part(name, Part::text(value))
    }

    pub fn part<N>(mut self, name: N, part: Part) -> Self
    where
        N: Into<Cow<'static, str>>,
    {
        self.fields.push((name.into(), part));
        self
    }

    pub(crate) fn push(&mut self, name: impl Into<Cow<'static, str>>, part: Part) {
        self.fields.push((name.into(), part));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Render the body. A form without fields still emits the closing
    /// delimiter so the server sees a well-formed, empty multipart body.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();

        for (idx, (name, part)) in self.fields.iter().enumerate() {
            if idx > 0 {
                out.put_slice(b"\r\n");
            }
            out.put_slice(b"--");
            out.put_slice(self.boundary.as_bytes());
            out.put_slice(b"\r\n");
            out.put_slice(part.format_headers(name).as_bytes());
            out.put_slice(b"\r\n\r\n");
            out.put_slice(&part.data);
        }

        out.put_slice(b"\r\n--");
        out.put_slice(self.boundary.as_bytes());
        out.put_slice(b"--\r\n");

        out.freeze()
    }
}

/// A part of a multipart form.
#[derive(Debug, Clone)]
pub struct Part {
    data: Bytes,
    content_type: Option<String>,
    file_name: Option<Cow<'static, str>>,
}

impl Part {
    pub fn text<V>(value: V) -> Self
    where
        V: Into<Cow<'static, str>>,
    {
        Self {
            data: Bytes::from(value.into().into_owned()),
            content_type: None,
            file_name: None,
        }
    }

    pub fn bytes<B>(data: B) -> Self
    where
        B: Into<Bytes>,
    {
        Self {
            data: data.into(),
            content_type: None,
            file_name: None,
        }
    }

    pub fn content_type<S: Into<String>>(mut self, mime: S) -> Self {
        self.content_type = Some(mime.into());
        self
    }

    pub fn file_name<S>(mut self, name: S) -> Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.file_name = Some(name.into());
        self
    }

    fn format_headers(&self, name: &str) -> String {
        let mut header = format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quotes(name)
        );

        if let Some(filename) = self.file_name.as_deref().filter(|f| !f.is_empty()) {
            header.push_str(&format!("; filename=\"{}\"", escape_quotes(filename)));
        }

        if let Some(mime) = self.content_type.as_deref().filter(|m| !m.is_empty()) {
            header.push_str("\r\nContent-Type: ");
            header.push_str(mime);
        }

        header
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn escape_quotes(s: &str) -> Cow<'_, str> {
    if s.contains(['"', '\\']) {
        Cow::Owned(s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        Cow::Borrowed(s)
    }
}

fn is_valid_boundary(b: &str) -> bool {
    if b.is_empty() || b.len() > MAX_BOUNDARY_LEN || b.ends_with(' ') {
        return false;
    }
    b.bytes().all(|c| {
        c.is_ascii_alphanumeric()
            || matches!(
                c,
                b'\''
                    | b'('
                    | b')'
                    | b'+'
                    | b'_'
                    | b','
                    | b'-'
                    | b'.'
                    | b'/'
                    | b':'
                    | b'='
                    | b'?'
                    | b' '
            )
    })
}

fn generate_boundary() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    format!("mimicnet{:024x}{:08x}", nanos, std::process::id())
}
