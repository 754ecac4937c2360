//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): error codes mirroring Chromium's `net_error_list.h`
//! - [`classify`](classify::classify): maps failures onto HTTP-like statuses

pub mod classify;
pub mod context;
pub mod neterror;
