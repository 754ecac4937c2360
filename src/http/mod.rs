//! HTTP request/response handling.
//!
//! - [`orderedheaders`]: header emission order and case-preserving headers
//! - [`requestbody`] / [`multipart`]: body encoding
//! - [`transport`]: the one-hop transport seam
//! - [`streamfactory`]: the default hyper + BoringSSL transport
//! - [`transaction`]: a single hop and the dispatcher
//! - [`responsebody`] / [`response`]: decoding and the caller-facing response

pub mod multipart;
pub mod orderedheaders;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod retry;
pub mod streamfactory;
pub mod transaction;
pub mod transport;

pub use orderedheaders::{CaseSensitiveHeaders, HeaderOrderList, HeaderOrderPolicy};
pub use requestbody::RequestBody;
pub use response::{JsonExt, Response};
pub use responsebody::ResponseBody;
pub use transaction::{dispatch, DispatchFailure};
pub use transport::{Transport, TransportFactory, TransportSpec, WireRequest};
