//! From request description to finished exchange.
//!
//! - [`request`]: the immutable [`RequestDescriptor`]
//! - [`prepare`]: URL resolution, header ordering, dialer and transport choice
//! - [`job`]: redirect following and the per-request deadline

pub mod job;
pub mod prepare;
pub mod request;

pub use job::URLRequestHttpJob;
pub use prepare::{PreparedRequest, RequestPreparer};
pub use request::RequestDescriptor;
