//! Cookies: the token cookie format, the [`CookieJar`] trait and an in-memory jar.
//!
//! Agents only ever see cookies the way page scripts do, through `document.cookie`: writing
//! one `name=value; attr; attr` string at a time and reading back a `name=value; name=value`
//! list. The jar enforces the browser rules that matter for the token cookie (Secure needs
//! https, SameSite=None needs Secure, expiry in the past deletes).

mod cookie;
mod cookie_jar;

pub use cookie::Cookie;
pub use cookie::CookieAttributes;
pub use cookie::CookieJarHandle;
pub use cookie::{format_cookie_date, parse_cookie_date};

pub use cookie_jar::CookieJar;
pub use cookie_jar::DefaultCookieJar;
pub use cookie_jar::DisabledCookieJar;
