//! Mapping of transport failures onto HTTP-like status codes.
//!
//! Callers of the dispatch engine never see a bare error: every failure is
//! turned into a response whose status tells timeouts, socket failures,
//! bad addresses and name-resolution problems apart.
//!
//! | Failure                               | Status |
//! |---------------------------------------|--------|
//! | explicit status from a lower layer    | as-is  |
//! | socket call that timed out            | 408    |
//! | other socket call failure             | 401    |
//! | malformed address                     | 405    |
//! | DNS failure / other network failure   | 421    |
//! | exchange deadline exceeded            | 408    |
//!
//! The 401 for socket failures is kept for compatibility with existing
//! callers even though it is not an authentication failure.

use crate::base::neterror::{NetError, NetOpError, NetOpKind};
use std::error::Error as StdError;

pub const STATUS_REQUEST_TIMEOUT: u16 = 408;
pub const STATUS_SYSCALL_FAILURE: u16 = 401;
pub const STATUS_ADDRESS_ERROR: u16 = 405;
pub const STATUS_MISDIRECTED: u16 = 421;

/// Result of classifying a dispatch failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub status: u16,
    /// Human-readable message, `"Request returned a Syscall Error: ..."`.
    pub message: String,
    /// Debug rendering of the underlying error.
    pub debug: String,
    /// Network operation name (`dial`, `lookup`, `read`...) when known.
    pub op: Option<String>,
}

impl ClassifiedError {
    fn new(status: u16, err: &dyn StdError, debug: String, op: Option<&str>) -> Self {
        Self {
            status,
            message: format!("Request returned a Syscall Error: {}", err),
            debug,
            op: op.map(str::to_owned),
        }
    }
}

/// Classify a failure. Rules are tried in order; the first match wins.
/// Returns `None` when no rule applies, which callers report as status 0.
pub fn classify(err: &NetError) -> Option<ClassifiedError> {
    if let Some(status) = explicit_status(err) {
        return Some(ClassifiedError::new(status, err, format!("{:#?}", err), None));
    }

    if let Some(op_err) = find_op_error(err) {
        return Some(classify_op(op_err));
    }

    if err.is_timeout() {
        return Some(ClassifiedError::new(
            STATUS_REQUEST_TIMEOUT,
            err,
            format!("{:#?}", err),
            None,
        ));
    }

    None
}

fn classify_op(op_err: &NetOpError) -> ClassifiedError {
    let op = Some(op_err.op);
    match &op_err.kind {
        NetOpKind::Syscall { source, timed_out } => {
            let status = if *timed_out {
                STATUS_REQUEST_TIMEOUT
            } else {
                STATUS_SYSCALL_FAILURE
            };
            ClassifiedError::new(status, source, format!("{:#?}", source), op)
        }
        kind @ NetOpKind::Address { .. } => {
            ClassifiedError::new(STATUS_ADDRESS_ERROR, kind, format!("{:#?}", kind), op)
        }
        kind @ NetOpKind::Dns { .. } => {
            ClassifiedError::new(STATUS_MISDIRECTED, kind, format!("{:#?}", kind), op)
        }
        NetOpKind::Other(_) => {
            ClassifiedError::new(STATUS_MISDIRECTED, op_err, format!("{:#?}", op_err), op)
        }
    }
}

fn explicit_status(err: &NetError) -> Option<u16> {
    if let NetError::Status { status, .. } = err {
        return (*status != 0).then_some(*status);
    }
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(NetError::Status { status, .. }) = e.downcast_ref::<NetError>() {
            if *status != 0 {
                return Some(*status);
            }
        }
        source = e.source();
    }
    None
}

fn find_op_error(err: &NetError) -> Option<&NetOpError> {
    // `Network` is transparent, so `source()` skips straight past it.
    if let NetError::Network(op_err) = err {
        return Some(op_err);
    }
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(op_err) = e.downcast_ref::<NetOpError>() {
            return Some(op_err);
        }
        if let Some(NetError::Network(op_err)) = e.downcast_ref::<NetError>() {
            return Some(op_err);
        }
        source = e.source();
    }
    None
}
