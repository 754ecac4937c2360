//! Cookie storage shared across requests.
//!
//! | Chromium (C++) | mimicnet (Rust) | Responsibility |
//! |----------------|-----------------|----------------|
//! | `net::CookieMonster` | [`CookieMonster`](monster::CookieMonster) | Host-bucketed jar with LRU eviction |
//! | `net::CanonicalCookie` | [`CanonicalCookie`](canonicalcookie::CanonicalCookie) | Single parsed cookie |
//! | `net::registry_controlled_domains` | [`psl`] | Public suffix checks |
//!
//! ```rust
//! use mimicnet::cookies::monster::CookieMonster;
//! use url::Url;
//!
//! let jar = CookieMonster::new();
//! let url = Url::parse("https://www.example.com/").unwrap();
//! jar.parse_and_save_cookie(&url, "Foo=Bar; Domain=example.com");
//! assert_eq!(jar.cookie_header_for_url(&url).as_deref(), Some("Foo=Bar"));
//! ```

pub mod canonicalcookie;
pub mod monster;
pub mod psl;
