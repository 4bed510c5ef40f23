//! Bridge configuration.
//!
//! A [`BridgeConfig`] is shared by one Token Store / Bridge Client pair. It names the
//! persistence slots (storage key, cookie name), the cookie attributes, the reconciliation
//! interval, the redirect parameters and the Token Store location used both as iframe `src`
//! and as the trusted origin for inbound messages.
//!
//! Only the Token Store URL is required; everything else has a default.
//!
//! # Examples
//!
//! ```rust
//! use visitor_bridge::config::{BridgeConfig, SameSite};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = url::Url::parse("https://id.example.net/frame")?;
//! let cfg = BridgeConfig::builder(store)
//!     .cookie_name("vt")
//!     .same_site(SameSite::Lax)
//!     .parent_sync(true)
//!     .build()?;
//! assert_eq!(cfg.cookie_name, "vt");
//! # Ok(()) }
//! ```
//!
//! # SameSite / Secure coupling
//!
//! Browsers drop `SameSite=None` cookies that are not `Secure`. Building a config with
//! `same_site(SameSite::None)` and `secure(false)` therefore yields `cookie_secure == true`
//! and logs a warning.

use crate::cookies::CookieAttributes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::{Origin, Url};

pub const DEFAULT_STORAGE_KEY: &str = "visitor_token";
pub const DEFAULT_COOKIE_NAME: &str = "visitor_token";
pub const DEFAULT_REDIRECT_PARAM: &str = "redirect";
pub const DEFAULT_REDIRECT_KEY: &str = "visitor_id";
pub const DEFAULT_GLOBAL_NAME: &str = "visitorToken";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// SameSite policy of the token cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SameSite {
    /// Cookie only sent to same-site requests
    Strict,
    /// Cookie sent to same-site requests and top-level navigations
    Lax,
    /// Cookie sent in every context (requires Secure)
    #[default]
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

impl SameSite {
    /// Case-insensitive parse of a `samesite=` attribute value.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("strict") {
            Some(SameSite::Strict)
        } else if s.eq_ignore_ascii_case("lax") {
            Some(SameSite::Lax)
        } else if s.eq_ignore_ascii_case("none") {
            Some(SameSite::None)
        } else {
            None
        }
    }
}

/// Configuration for a Token Store / Bridge Client pair.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Location of the Token Store document (the iframe `src`)
    pub store_url: Url,
    /// Origin accepted for `TOKEN_READY` messages. Defaults to the origin of `store_url`.
    pub store_origin: Option<Origin>,
    /// Local storage key holding the token
    pub storage_key: String,
    /// Cookie holding the token
    pub cookie_name: String,
    /// Optional `domain=` cookie attribute
    pub cookie_domain: Option<String>,
    /// `secure` cookie attribute
    pub cookie_secure: bool,
    /// `samesite=` cookie attribute
    pub same_site: SameSite,
    /// Lifetime of the token cookie, rendered as `expires=`
    pub cookie_max_age: Duration,
    /// Interval of the storage reconciliation timer inside the Token Store
    pub check_interval: Duration,
    /// Page query parameter that triggers the post-token redirect
    pub redirect_param: String,
    /// Query key under which the token is appended to the redirect target
    pub redirect_key: String,
    /// Mirror the token into the parent page's own storage and cookie
    pub parent_sync: bool,
    /// Page global under which the resolved token is exposed
    pub global_name: String,
    /// Origins allowed to frame the Token Store (`frame-ancestors`). Empty means any.
    pub frame_ancestors: Vec<String>,
}

impl BridgeConfig {
    /// Default configuration for the given Token Store location (not validated).
    pub fn new(store_url: Url) -> Self {
        Self {
            store_url,
            store_origin: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_domain: None,
            cookie_secure: true,
            same_site: SameSite::None,
            cookie_max_age: DEFAULT_COOKIE_MAX_AGE,
            check_interval: DEFAULT_CHECK_INTERVAL,
            redirect_param: DEFAULT_REDIRECT_PARAM.to_string(),
            redirect_key: DEFAULT_REDIRECT_KEY.to_string(),
            parent_sync: false,
            global_name: DEFAULT_GLOBAL_NAME.to_string(),
            frame_ancestors: Vec::new(),
        }
    }

    pub fn builder(store_url: Url) -> BridgeConfigBuilder {
        BridgeConfigBuilder {
            inner: BridgeConfig::new(store_url),
        }
    }

    /// The origin whose messages the Bridge Client trusts.
    pub fn store_origin(&self) -> Origin {
        self.store_origin
            .clone()
            .unwrap_or_else(|| self.store_url.origin())
    }

    /// Cookie attributes used for every token cookie written with this config.
    pub fn cookie_attributes(&self) -> CookieAttributes {
        CookieAttributes {
            domain: self.cookie_domain.clone(),
            secure: self.cookie_secure,
            same_site: self.same_site,
            max_age: Some(self.cookie_max_age),
        }
        .normalized()
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct BridgeConfigBuilder {
    inner: BridgeConfig,
}

impl BridgeConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut BridgeConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn store_origin(self, origin: Origin) -> Self { self.map(|c| c.store_origin = Some(origin)) }
    pub fn storage_key<S: Into<String>>(self, key: S) -> Self { self.map(|c| c.storage_key = key.into()) }
    pub fn cookie_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.cookie_name = name.into()) }
    pub fn cookie_domain<S: Into<String>>(self, domain: S) -> Self { self.map(|c| c.cookie_domain = Some(domain.into())) }
    pub fn secure(self, on: bool) -> Self { self.map(|c| c.cookie_secure = on) }
    pub fn same_site(self, policy: SameSite) -> Self { self.map(|c| c.same_site = policy) }
    pub fn cookie_max_age(self, age: Duration) -> Self { self.map(|c| c.cookie_max_age = age) }
    pub fn check_interval(self, every: Duration) -> Self { self.map(|c| c.check_interval = every) }
    pub fn redirect_param<S: Into<String>>(self, param: S) -> Self { self.map(|c| c.redirect_param = param.into()) }
    pub fn redirect_key<S: Into<String>>(self, key: S) -> Self { self.map(|c| c.redirect_key = key.into()) }
    pub fn parent_sync(self, on: bool) -> Self { self.map(|c| c.parent_sync = on) }
    pub fn global_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.global_name = name.into()) }
    pub fn frame_ancestor<S: Into<String>>(self, origin: S) -> Self { self.map(|c| c.frame_ancestors.push(origin.into())) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut BridgeConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(mut self) -> Result<BridgeConfig, BridgeConfigError> {
        validate(&self.inner)?;

        if self.inner.same_site == SameSite::None && !self.inner.cookie_secure {
            log::warn!("samesite=None requires a secure cookie; forcing secure=true");
            self.inner.cookie_secure = true;
        }

        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeConfigError {
    UnsupportedScheme(String),
    EmptyName(&'static str),
    ZeroInterval,
}

impl fmt::Display for BridgeConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeConfigError::UnsupportedScheme(s) =>
                write!(f, "token store url must be http or https (got {s})"),
            BridgeConfigError::EmptyName(field) =>
                write!(f, "{field} must not be empty"),
            BridgeConfigError::ZeroInterval =>
                write!(f, "check_interval must be greater than zero"),
        }
    }
}
impl std::error::Error for BridgeConfigError {}

fn validate(c: &BridgeConfig) -> Result<(), BridgeConfigError> {
    if !matches!(c.store_url.scheme(), "http" | "https") {
        return Err(BridgeConfigError::UnsupportedScheme(c.store_url.scheme().to_string()));
    }

    let names = [
        ("storage_key", &c.storage_key),
        ("cookie_name", &c.cookie_name),
        ("redirect_param", &c.redirect_param),
        ("redirect_key", &c.redirect_key),
        ("global_name", &c.global_name),
    ];
    for (field, value) in names {
        if value.trim().is_empty() {
            return Err(BridgeConfigError::EmptyName(field));
        }
    }

    if c.check_interval.is_zero() {
        return Err(BridgeConfigError::ZeroInterval);
    }
    Ok(())
}
