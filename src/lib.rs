//! # mimicnet
//!
//! An HTTP dispatch engine that looks like a browser on the wire.
//!
//! Requests go out with a chosen JA3 TLS fingerprint, a fixed header order
//! and browser default headers, optionally through an HTTP(S) proxy tunnel.
//! Cookies are kept in a shared jar, failures are classified into HTTP-like
//! status codes, and a worker pool dispatches many requests concurrently.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mimicnet::Client;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new();
//!     match client.get("https://example.com").send().await {
//!         Ok(resp) => println!("Status: {}", resp.status),
//!         Err(failure) => println!("{} ({})", failure, failure.status()),
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and failure classification
//! - [`cookies`] - Thread-safe cookie jar with PSL validation
//! - [`emulation`] - Browser profiles: fingerprint, user agent, header order
//! - [`http`] - Header ordering, bodies, decoding and the dispatcher
//! - [`socket`] - TCP dialing, proxy tunnels and JA3-shaped TLS
//! - [`urlrequest`] - Request descriptors, preparation and redirects
//! - [`workerpool`] - Bounded queue drained by a fixed set of tasks

pub mod base;
pub mod client;
pub mod cookies;
pub mod emulation;
pub mod http;
pub mod socket;
pub mod urlrequest;
pub mod workerpool;

pub use base::neterror::NetError;
pub use client::{Client, ClientBuilder, ClientConfig, RequestBuilder};
pub use cookies::monster::CookieMonster;
pub use emulation::{Emulation, EmulationFactory};
pub use http::{DispatchFailure, Response};
pub use socket::proxy::ProxySettings;
