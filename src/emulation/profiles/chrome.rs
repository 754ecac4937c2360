//! Chrome browser profiles.

use crate::emulation::{Emulation, EmulationFactory};
use crate::http::orderedheaders::HeaderOrderList;

/// JA3 of Chrome's ClientHello.
pub const CHROME_JA3: &str = "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0";

pub const CHROME_105_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum Chrome {
    #[default]
    V105,
}

impl EmulationFactory for Chrome {
    fn emulation(self) -> Emulation {
        match self {
            Chrome::V105 => chrome_v105(),
        }
    }
}

pub fn chrome_v105() -> Emulation {
    Emulation::builder()
        .fingerprint(CHROME_JA3)
        .user_agent(CHROME_105_USER_AGENT)
        .header("Accept-Encoding", "gzip, deflate, br")
        .header("Accept", "*/*")
        .header("Connection", "keep-alive")
        .header_order(HeaderOrderList::chrome())
        .build()
}
