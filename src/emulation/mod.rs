//! Browser emulation.
//!
//! An [`Emulation`] bundles the pieces that make traffic look like one
//! browser: the TLS fingerprint, the user agent, the default headers and
//! the header emission order.

mod factory;
pub mod profiles;

pub use factory::{Emulation, EmulationBuilder, EmulationFactory};
pub use profiles::chrome::{CHROME_105_USER_AGENT, CHROME_JA3};
