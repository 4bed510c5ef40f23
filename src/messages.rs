//! Cross-frame message envelopes.
//!
//! Messages travel as JSON values tagged by a `type` field:
//!
//! | direction | payload |
//! |---|---|
//! | page → store | `{"type":"GET_TOKEN"}` |
//! | page → store | `{"type":"RESET_TOKEN"}` |
//! | page → store | `{"type":"SET_TOKEN","token":"…"}` |
//! | store → page | `{"type":"TOKEN_READY","token":"…","timestamp":1700000000000,"source":"session-tracker"}` |
//!
//! Decoding never fails loudly: anything that is not a recognized envelope yields `None` and is
//! ignored by the receiving agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `source` field carried by every `TOKEN_READY` response.
pub const TOKEN_SOURCE: &str = "session-tracker";
/// Name of the page-level notification fired when a token is accepted.
pub const TOKEN_READY_EVENT: &str = "visitor:token-ready";

const MAX_TOKEN_LEN: usize = 128;

/// All envelopes understood by the two agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Ask the Token Store for the current token
    GetToken,
    /// Ask the Token Store to forget its token
    ResetToken,
    /// Ask the Token Store to adopt the given token
    SetToken { token: String },
    /// Token Store response
    TokenReady(TokenReady),
}

impl Message {
    /// Decodes an inbound payload; unknown or malformed envelopes yield `None`.
    pub fn decode(data: &Value) -> Option<Message> {
        serde_json::from_value(data.clone()).ok()
    }

    pub fn encode(&self) -> Value {
        // Serializing a plain enum of strings and integers cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Payload of a `TOKEN_READY` response, also the detail of the `visitor:token-ready` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReady {
    pub token: String,
    /// Milliseconds since the Unix epoch at which the response was produced
    pub timestamp: i64,
    pub source: String,
}

impl TokenReady {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            timestamp: now_millis(),
            source: TOKEN_SOURCE.to_string(),
        }
    }

    /// Payload half of the trust-boundary check.
    ///
    /// Every field must equal its expected value: `type` is `TOKEN_READY`, `source` is
    /// [`TOKEN_SOURCE`] and `token` is a non-empty string. Origin and source-window checks are
    /// done by the receiver, which knows the managed iframe.
    pub fn from_payload(data: &Value) -> Option<TokenReady> {
        let obj = data.as_object()?;
        if obj.get("type")?.as_str()? != "TOKEN_READY" {
            return None;
        }
        if obj.get("source")?.as_str()? != TOKEN_SOURCE {
            return None;
        }
        let token = obj.get("token")?.as_str()?;
        if token.is_empty() {
            return None;
        }
        let timestamp = obj.get("timestamp").and_then(Value::as_i64).unwrap_or_default();

        Some(TokenReady {
            token: token.to_string(),
            timestamp,
            source: TOKEN_SOURCE.to_string(),
        })
    }
}

/// Returns true when `token` can be stored verbatim in storage and in a cookie value.
pub fn is_well_formed_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Shortened token for log lines.
pub(crate) fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}…")
}

pub(crate) fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_use_screaming_type_tags() {
        assert_eq!(Message::GetToken.encode(), json!({"type": "GET_TOKEN"}));
        assert_eq!(Message::ResetToken.encode(), json!({"type": "RESET_TOKEN"}));
        assert_eq!(
            Message::SetToken { token: "abc".into() }.encode(),
            json!({"type": "SET_TOKEN", "token": "abc"})
        );
    }

    #[test]
    fn token_ready_is_flat() {
        let ready = TokenReady { token: "t-1".into(), timestamp: 42, source: TOKEN_SOURCE.into() };
        assert_eq!(
            Message::TokenReady(ready).encode(),
            json!({"type": "TOKEN_READY", "token": "t-1", "timestamp": 42, "source": "session-tracker"})
        );
    }

    #[test]
    fn unknown_and_malformed_envelopes_decode_to_none() {
        assert_eq!(Message::decode(&json!({"type": "PING"})), None);
        assert_eq!(Message::decode(&json!({"token": "x"})), None);
        assert_eq!(Message::decode(&json!("GET_TOKEN")), None);
        assert_eq!(Message::decode(&json!({"type": "SET_TOKEN"})), None);
        assert_eq!(Message::decode(&json!({"type": "GET_TOKEN"})), Some(Message::GetToken));
    }

    #[test]
    fn payload_check_requires_every_field() {
        let good = json!({"type": "TOKEN_READY", "token": "abc", "timestamp": 1, "source": "session-tracker"});
        assert_eq!(TokenReady::from_payload(&good).unwrap().token, "abc");

        let wrong_type = json!({"type": "GET_TOKEN", "token": "abc", "source": "session-tracker"});
        let wrong_source = json!({"type": "TOKEN_READY", "token": "abc", "source": "other"});
        let empty_token = json!({"type": "TOKEN_READY", "token": "", "source": "session-tracker"});
        let missing_type = json!({"token": "abc", "source": "session-tracker"});
        let numeric_token = json!({"type": "TOKEN_READY", "token": 7, "source": "session-tracker"});

        for bad in [wrong_type, wrong_source, empty_token, missing_type, numeric_token] {
            assert!(TokenReady::from_payload(&bad).is_none(), "accepted {bad}");
        }
    }

    #[test]
    fn new_token_ready_is_stamped() {
        let ready = TokenReady::new("abc");
        assert_eq!(ready.source, TOKEN_SOURCE);
        assert!(ready.timestamp > 1_600_000_000_000);
    }

    #[test]
    fn well_formed_tokens() {
        assert!(is_well_formed_token("4b0c1f8e-1d2a-4c3b-9e8f-0a1b2c3d4e5f"));
        assert!(!is_well_formed_token(""));
        assert!(!is_well_formed_token("a; secure"));
        assert!(!is_well_formed_token("a=b"));
        assert!(!is_well_formed_token(&"x".repeat(129)));
    }
}
