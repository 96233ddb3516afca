//! Cookie values derived from response `Set-Cookie` headers.
//!
//! Only the name and value of each cookie are exposed. Attributes such as
//! `Path`, `Domain` or `HttpOnly` are parsed away and dropped; there is no
//! cookie jar in the bridge.

pub mod setcookie;

pub use setcookie::{parse_set_cookie, CookieMap};
