//! Cookie core types.
//!
//! [`Cookie`] is the parsed record kept by a jar; [`CookieAttributes`] is the attribute set the
//! agents use to serialize the token cookie into a `document.cookie` assignment:
//!
//! ```text
//! name=value; path=/; [domain=D;] [secure;] samesite=<Strict|Lax|None>[; expires=<RFC date>]
//! ```

use crate::config::SameSite;
use crate::cookies::CookieJar;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// A handle to a cookie jar trait.
///
/// Take a **read lock** to read `document.cookie` and a **write lock** to assign it.
pub type CookieJarHandle = Arc<RwLock<dyn CookieJar + Send + Sync>>;

const COOKIE_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Formats a timestamp the way `Date.prototype.toUTCString` does.
pub fn format_cookie_date(at: OffsetDateTime) -> String {
    at.format(COOKIE_DATE)
        .unwrap_or_else(|_| "Thu, 01 Jan 1970 00:00:00 GMT".to_string())
}

/// Parses an `expires=` value produced by [`format_cookie_date`].
pub fn parse_cookie_date(s: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(s.trim(), COOKIE_DATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// A cookie as stored by a jar.
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,
    /// Raw cookie value.
    pub value: String,
    /// Path scoping. Always set once stored.
    pub path: Option<String>,
    /// Domain scoping (host-only if `None`).
    pub domain: Option<String>,
    /// Cookie is visible only to https documents.
    pub secure: bool,
    /// Expiration, `None` for session cookies.
    pub expires: Option<OffsetDateTime>,
    /// SameSite policy; `None` when the attribute was absent.
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires.is_some_and(|exp| exp <= now)
    }
}

/// Attributes applied to the token cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieAttributes {
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSite,
    /// Lifetime from the moment of writing; `None` writes a session cookie.
    pub max_age: Option<Duration>,
}

impl Default for CookieAttributes {
    fn default() -> Self {
        Self {
            domain: None,
            secure: true,
            same_site: SameSite::None,
            max_age: None,
        }
    }
}

impl CookieAttributes {
    /// Applies the SameSite=None ⇒ Secure rule.
    pub fn normalized(mut self) -> Self {
        if self.same_site == SameSite::None && !self.secure {
            log::warn!("samesite=None cookie without secure; forcing secure");
            self.secure = true;
        }
        self
    }

    /// `document.cookie` assignment storing `name=value`.
    pub fn assignment(&self, name: &str, value: &str) -> String {
        let expires = self
            .max_age
            .map(|age| OffsetDateTime::now_utc() + age);
        self.render(name, value, expires)
    }

    /// `document.cookie` assignment deleting `name`.
    pub fn deletion(&self, name: &str) -> String {
        self.render(name, "", Some(OffsetDateTime::UNIX_EPOCH))
    }

    fn render(&self, name: &str, value: &str, expires: Option<OffsetDateTime>) -> String {
        let attrs = self.clone().normalized();

        let mut parts = vec![format!("{name}={value}"), "path=/".to_string()];
        if let Some(domain) = &attrs.domain {
            parts.push(format!("domain={domain}"));
        }
        if attrs.secure {
            parts.push("secure".to_string());
        }
        parts.push(format!("samesite={}", attrs.same_site));
        if let Some(at) = expires {
            parts.push(format!("expires={}", format_cookie_date(at)));
        }
        parts.join("; ")
    }
}
