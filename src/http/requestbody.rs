//! Request body variants and their wire encoding.

use crate::base::neterror::NetError;
use crate::http::multipart::Form;
use bytes::Bytes;
use http::Method;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Raw bytes, sent without an automatic content type.
    Bytes(Bytes),
    /// `text/plain`.
    Text(String),
    /// `application/x-www-form-urlencoded`, keys in sorted order.
    Form(BTreeMap<String, String>),
    /// `application/json`.
    Json(serde_json::Value),
    /// `multipart/form-data`. Only valid for POST, PUT and PATCH.
    Multipart(Form),
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Text(s)
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl From<Form> for RequestBody {
    fn from(f: Form) -> Self {
        RequestBody::Multipart(f)
    }
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Fails with [`NetError::BodyNotAllowed`] unless `method` is POST, PUT
    /// or PATCH, the methods a multipart body may ride on.
    pub fn check_multipart_method(method: &Method) -> Result<(), NetError> {
        if !matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
            return Err(NetError::BodyNotAllowed {
                method: method.to_string(),
            });
        }
        Ok(())
    }

    /// Encoded bytes and the content type to send with them, if any.
    pub fn encode(&self) -> Result<(Bytes, Option<String>), NetError> {
        Ok(match self {
            RequestBody::Empty => (Bytes::new(), None),
            RequestBody::Bytes(b) => (b.clone(), None),
            RequestBody::Text(s) => (Bytes::from(s.clone()), Some("text/plain".into())),
            RequestBody::Form(fields) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                (
                    Bytes::from(encoded),
                    Some("application/x-www-form-urlencoded".into()),
                )
            }
            RequestBody::Json(value) => (
                Bytes::from(serde_json::to_vec(value)?),
                Some("application/json".into()),
            ),
            RequestBody::Multipart(form) => (form.to_bytes(), Some(form.content_type())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_body() {
        let (bytes, ct) = RequestBody::default().encode().unwrap();
        assert!(bytes.is_empty());
        assert!(ct.is_none());
    }

    #[test]
    fn test_text_body() {
        let (bytes, ct) = RequestBody::from("hello").encode().unwrap();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(ct.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_form_sorted_and_escaped() {
        let mut fields = BTreeMap::new();
        fields.insert("zeta".to_string(), "a b".to_string());
        fields.insert("alpha".to_string(), "x&y".to_string());
        let (bytes, ct) = RequestBody::Form(fields).encode().unwrap();
        assert_eq!(&bytes[..], b"alpha=x%26y&zeta=a+b");
        assert_eq!(ct.as_deref(), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn test_json_body() {
        let (bytes, ct) = RequestBody::Json(json!({"k": 1})).encode().unwrap();
        assert_eq!(&bytes[..], br#"{"k":1}"#);
        assert_eq!(ct.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_multipart_method_rule() {
        assert!(RequestBody::check_multipart_method(&Method::POST).is_ok());
        assert!(RequestBody::check_multipart_method(&Method::PUT).is_ok());
        assert!(RequestBody::check_multipart_method(&Method::PATCH).is_ok());
        assert!(matches!(
            RequestBody::check_multipart_method(&Method::GET),
            Err(NetError::BodyNotAllowed { method }) if method == "GET"
        ));
    }
}
