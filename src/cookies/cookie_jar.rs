//! Cookie jar abstraction and a simple in-memory implementation.
//!
//! A **cookie jar** holds the cookies of every origin known to one user agent. Agents talk to
//! it through the two halves of `document.cookie`: [`CookieJar::set_document_cookie`] receives a
//! single `name=value; attr; ...` assignment, [`CookieJar::document_cookie`] returns the visible
//! `name=value; name=value` list for a document URL.
//!
//! ## Notes & limitations
//! - Cookies are bucketed by **origin** (`url.origin().ascii_serialization()`). Within a bucket,
//!   simple host/subdomain and path prefix checks are applied.
//! - Attributes handled: `path`, `domain` (leading dot stripped), `expires`, `max-age`,
//!   `samesite`, `secure`. Unknown attributes are ignored.
//! - Assignments a browser would refuse are refused with an error: `secure` from a non-https
//!   document, `samesite=None` without `secure`, and a `domain` the document host does not
//!   belong to.
//! - The jar is not internally synchronized; share it as a [`CookieJarHandle`](super::CookieJarHandle).

use crate::config::SameSite;
use crate::cookies::cookie::parse_cookie_date;
use crate::cookies::{Cookie, CookieJarHandle};
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use url::Url;

/// Script-visible cookie access for a set of origins.
pub trait CookieJar: Send + Sync {
    /// Applies one `document.cookie = "..."` assignment made by a document at `url`.
    fn set_document_cookie(&mut self, url: &Url, assignment: &str) -> Result<()>;

    /// Returns what `document.cookie` reads for a document at `url`.
    fn document_cookie(&self, url: &Url) -> Result<String>;
}

/// Default cookie jar: in memory, bucketed by origin.
#[derive(Debug, Clone, Default)]
pub struct DefaultCookieJar {
    /// Key: origin string from `Url::origin().ascii_serialization()`.
    pub entries: HashMap<String, Vec<Cookie>>,
}

impl DefaultCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the jar into a shareable handle.
    pub fn into_handle(self) -> CookieJarHandle {
        Arc::new(RwLock::new(self))
    }

    fn parse_assignment(url: &Url, assignment: &str, now: OffsetDateTime) -> Result<Cookie> {
        let mut parts = assignment.split(';');
        let pair = parts.next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            bail!("cookie assignment without '=': {pair:?}");
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("cookie assignment without a name");
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            path: None,
            domain: None,
            secure: false,
            expires: None,
            same_site: None,
        };

        for part in parts {
            let part = part.trim();
            if let Some((k, v)) = part.split_once('=') {
                match k.trim().to_ascii_lowercase().as_str() {
                    "path" => cookie.path = Some(v.trim().to_string()),
                    "domain" => cookie.domain = Some(v.trim().trim_start_matches('.').to_ascii_lowercase()),
                    "expires" => {
                        // max-age wins over expires
                        if cookie.expires.is_none() {
                            cookie.expires = parse_cookie_date(v);
                        }
                    }
                    "max-age" => {
                        if let Ok(secs) = v.trim().parse::<i64>() {
                            cookie.expires = Some(now + time::Duration::seconds(secs));
                        }
                    }
                    "samesite" => cookie.same_site = SameSite::parse(v),
                    _ => {}
                }
            } else if part.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            }
        }

        if cookie.secure && url.scheme() != "https" {
            bail!("secure cookie {:?} set from insecure document {url}", cookie.name);
        }
        if cookie.same_site == Some(SameSite::None) && !cookie.secure {
            bail!("samesite=None cookie {:?} rejected without secure", cookie.name);
        }
        if let Some(domain) = &cookie.domain {
            let host = url.host_str().unwrap_or_default();
            if host != domain && !host.ends_with(&format!(".{domain}")) {
                bail!("cookie domain {domain:?} does not match host {host:?}");
            }
        }
        if cookie.path.is_none() {
            let default_path = url.path().rsplit_once('/').map_or("/", |(a, _)| if a.is_empty() { "/" } else { a });
            cookie.path = Some(default_path.to_string());
        }

        Ok(cookie)
    }
}

impl CookieJar for DefaultCookieJar {
    fn set_document_cookie(&mut self, url: &Url, assignment: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let cookie = Self::parse_assignment(url, assignment, now)?;

        let origin = url.origin().ascii_serialization();
        let bucket = self.entries.entry(origin).or_default();
        bucket.retain(|c| !(c.name == cookie.name && c.path == cookie.path));

        // An expiry in the past is a deletion.
        if !cookie.is_expired(now) {
            bucket.push(cookie);
        }
        Ok(())
    }

    fn document_cookie(&self, url: &Url) -> Result<String> {
        let origin = url.origin().ascii_serialization();
        let host = url.host_str().unwrap_or_default();
        let path = url.path();
        let is_https = url.scheme() == "https";
        let now = OffsetDateTime::now_utc();

        let Some(cookies) = self.entries.get(&origin) else {
            return Ok(String::new());
        };

        Ok(cookies
            .iter()
            .filter(|cookie| !cookie.is_expired(now))
            .filter(|cookie| match &cookie.domain {
                Some(domain) => host == domain || host.ends_with(&format!(".{domain}")),
                None => true,
            })
            .filter(|cookie| match &cookie.path {
                Some(cookie_path) => path.starts_with(cookie_path.as_str()),
                None => true,
            })
            .filter(|cookie| !cookie.secure || is_https)
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }
}

/// Jar of a user agent with cookies blocked: every script access fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCookieJar;

impl DisabledCookieJar {
    pub fn into_handle(self) -> CookieJarHandle {
        Arc::new(RwLock::new(self))
    }
}

impl CookieJar for DisabledCookieJar {
    fn set_document_cookie(&mut self, _url: &Url, _assignment: &str) -> Result<()> {
        Err(anyhow!("cookies are disabled"))
    }

    fn document_cookie(&self, _url: &Url) -> Result<String> {
        Err(anyhow!("cookies are disabled"))
    }
}
