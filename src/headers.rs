//! Response headers for the Token Store document.
//!
//! The store page runs inline script only, loads nothing, must never be cached and must not
//! leak the embedding page through `Referer`. Serving it is left to whatever HTTP stack the
//! deployment uses; this module only builds the header set.

use crate::config::BridgeConfig;
use http::header::{CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderMap, HeaderName, HeaderValue};

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");
const DISABLED_FEATURES: &str = "camera=(), microphone=(), geolocation=(), payment=(), usb=()";

/// Builds the security headers the Token Store document is served with.
pub fn token_store_headers(config: &BridgeConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_SECURITY_POLICY, content_security_policy(config));
    headers.insert(PERMISSIONS_POLICY, HeaderValue::from_static(DISABLED_FEATURES));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    headers
}

fn content_security_policy(config: &BridgeConfig) -> HeaderValue {
    let ancestors = if config.frame_ancestors.is_empty() {
        "*".to_string()
    } else {
        config.frame_ancestors.join(" ")
    };

    let policy = format!("default-src 'none'; script-src 'unsafe-inline'; frame-ancestors {ancestors}");
    match HeaderValue::from_str(&policy) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("invalid frame-ancestors list, denying all framing: {e}");
            HeaderValue::from_static("default-src 'none'; script-src 'unsafe-inline'; frame-ancestors 'none'")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn builder() -> crate::config::BridgeConfigBuilder {
        BridgeConfig::builder(Url::parse("https://id.example.net/store.html").unwrap())
    }

    #[test]
    fn default_header_set() {
        let headers = token_store_headers(&builder().build().unwrap());

        assert_eq!(
            headers[CONTENT_SECURITY_POLICY],
            "default-src 'none'; script-src 'unsafe-inline'; frame-ancestors *"
        );
        assert_eq!(headers[REFERRER_POLICY], "no-referrer");
        assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[CACHE_CONTROL], "no-store");
        assert!(headers["permissions-policy"].to_str().unwrap().contains("camera=()"));
        assert_eq!(headers.len(), 5);
    }

    #[test]
    fn frame_ancestors_are_listed() {
        let config = builder()
            .frame_ancestor("https://shop.example")
            .frame_ancestor("https://*.shop.example")
            .build()
            .unwrap();
        let headers = token_store_headers(&config);
        assert_eq!(
            headers[CONTENT_SECURITY_POLICY],
            "default-src 'none'; script-src 'unsafe-inline'; frame-ancestors https://shop.example https://*.shop.example"
        );
    }

    #[test]
    fn unusable_ancestor_denies_framing() {
        let config = builder().frame_ancestor("https://shop.example\n").build().unwrap();
        let headers = token_store_headers(&config);
        assert!(headers[CONTENT_SECURITY_POLICY].to_str().unwrap().ends_with("frame-ancestors 'none'"));
    }
}
