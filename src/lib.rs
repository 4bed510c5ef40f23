//! Cross-origin visitor token bridge.
//!
//! Two cooperating agents keep one opaque visitor token per user agent:
//!
//! - the [`TokenStore`](token_store::TokenStore) runs inside a hidden iframe served from a
//!   dedicated origin and persists the token in local storage, a cookie and memory;
//! - the [`BridgeClient`](bridge::BridgeClient) runs in the embedding page, creates that iframe
//!   and obtains the token over cross-document messaging.
//!
//! Browser facilities (storage, cookies, windows, `postMessage`) are modeled by the
//! [`window`], [`storage`] and [`cookies`] modules; [`browser`] wires them into a user agent
//! that hosts both agents.

pub mod bridge;
pub mod browser;
pub mod config;
pub mod cookies;
pub mod errors;
pub mod headers;
pub mod messages;
pub mod storage;
pub mod token_store;
pub mod window;

pub use bridge::{BridgeClient, BridgeState, TokenControls};
pub use browser::{Browser, Page};
pub use config::{BridgeConfig, BridgeConfigError, SameSite};
pub use errors::BridgeError;
pub use messages::{Message, TokenReady};
pub use token_store::{generate_token, TokenStore};
