//! The response handed to callers, successful or not.

use crate::base::classify::ClassifiedError;
use crate::base::neterror::NetError;
use crate::cookies::canonicalcookie::CanonicalCookie;
use crate::http::orderedheaders::title_case;
use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Separator placed between multiple `Set-Cookie` values in
/// [`Response::headers`].
pub const SET_COOKIE_SEPARATOR: &str = "/,/";

#[derive(Debug, Clone, Default)]
pub struct Response {
    /// HTTP status, or a synthetic code when the exchange failed (0 when the
    /// failure could not be classified).
    pub status: u16,
    /// Canonically-cased header names. `Set-Cookie` values are joined with
    /// [`SET_COOKIE_SEPARATOR`]; for other headers the last value wins.
    pub headers: HashMap<String, String>,
    /// Raw `Set-Cookie` lines as received.
    pub set_cookie_lines: Vec<String>,
    /// Decoded body.
    pub bytes: Bytes,
    /// Decoded body as lossy UTF-8.
    pub text: String,
    /// Jar cookies for the request URL after the exchange.
    pub cookies: Vec<CanonicalCookie>,
}

impl Response {
    /// Best-effort response for a failed exchange. The body is
    /// `"<message>-> \n<error>"`.
    pub fn from_failure(classified: Option<&ClassifiedError>, error: &NetError) -> Self {
        let (status, message) = classified
            .map(|c| (c.status, c.message.as_str()))
            .unwrap_or((0, ""));
        let text = format!("{}-> \n{}", message, error);
        Self {
            status,
            headers: HashMap::new(),
            set_cookie_lines: Vec::new(),
            bytes: Bytes::from(text.clone()),
            text,
            cookies: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Individual `Set-Cookie` lines. Unlike the joined header, these survive
    /// values that contain the separator.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.set_cookie_lines.iter().map(String::as_str).collect()
    }

    pub fn cookie(&self, name: &str) -> Option<&CanonicalCookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn json(&self) -> Result<Value, NetError> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    pub fn to_struct<T: DeserializeOwned>(&self) -> Result<T, NetError> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Flatten an `http::HeaderMap` into the single-valued map exposed on
/// [`Response`].
pub fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        let key = title_case(name.as_str());
        let value = if *name == http::header::SET_COOKIE {
            values.collect::<Vec<_>>().join(SET_COOKIE_SEPARATOR)
        } else {
            match values.last() {
                Some(v) => v,
                None => continue,
            }
        };
        out.insert(key, value);
    }
    out
}

pub fn set_cookie_lines(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(http::header::SET_COOKIE)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect()
}

/// Typed access into a JSON tree. Paths are `/`-separated object keys or
/// array indices, as in JSON Pointer without the leading slash.
pub trait JsonExt {
    fn at(&self, path: &str) -> Result<&Value, NetError>;

    fn str_at(&self, path: &str) -> Result<&str, NetError> {
        self.at(path)?.as_str().ok_or_else(|| shape(path, "a string"))
    }

    fn bool_at(&self, path: &str) -> Result<bool, NetError> {
        self.at(path)?.as_bool().ok_or_else(|| shape(path, "a boolean"))
    }

    fn i64_at(&self, path: &str) -> Result<i64, NetError> {
        self.at(path)?.as_i64().ok_or_else(|| shape(path, "an integer"))
    }

    fn object_at(&self, path: &str) -> Result<&Map<String, Value>, NetError> {
        self.at(path)?.as_object().ok_or_else(|| shape(path, "an object"))
    }

    fn array_at(&self, path: &str) -> Result<&Vec<Value>, NetError> {
        self.at(path)?.as_array().ok_or_else(|| shape(path, "an array"))
    }
}

impl JsonExt for Value {
    fn at(&self, path: &str) -> Result<&Value, NetError> {
        if path.is_empty() {
            return Ok(self);
        }
        let pointer = format!("/{}", path.trim_start_matches('/'));
        self.pointer(&pointer).ok_or_else(|| shape(path, "present"))
    }
}

fn shape(path: &str, expected: &'static str) -> NetError {
    NetError::JsonShape {
        path: path.to_string(),
        expected,
    }
}
