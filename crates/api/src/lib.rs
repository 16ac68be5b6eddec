//! Credential lifecycle and signing for the WeChat official-account HTTP API.
//!
//! [`WechatClient`] caches the application access token, per-code user tokens
//! and the JS-API ticket for their 7200 second lifetime, verifies inbound
//! webhook signatures, and signs JS-SDK page URLs.

pub mod canonical;
pub mod client;
pub mod proxy;
pub mod signature;
pub mod store;
pub mod template;
pub mod types;
pub mod url_builder;

pub use {
    client::WechatClient,
    proxy::{BodyFormat, Method, ProxyRequest, RequestProxy},
    signature::{SignedPayload, WebhookQuery},
    store::CredentialStore,
    template::TemplateMessage,
    types::{CachedCredential, OAuthScope, UserToken, VALIDITY_WINDOW_SECS},
    url_builder::UrlSpec,
};
