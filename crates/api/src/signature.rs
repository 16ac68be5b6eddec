use {
    rand::Rng,
    serde::{Deserialize, Serialize},
    sha1::{Digest, Sha1},
    subtle::ConstantTimeEq,
};

use wxgate_common::Result;

use crate::canonical::canonical_string;

const NONCE_LEN: usize = 15;
const NONCE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Query string the platform attaches to every webhook call.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookQuery {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    /// Present only on the initial URL verification handshake.
    #[serde(default)]
    pub echostr: Option<String>,
}

/// Everything a JS-SDK page needs to call `wx.config`. The ticket and the
/// signed URL are deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload {
    pub signature: String,
    pub nonce_str: String,
    pub timestamp: u64,
    pub app_id: String,
}

pub fn sha1_hex(input: &str) -> String {
    hex::encode(Sha1::digest(input.as_bytes()))
}

/// SHA-1 over the lexicographically sorted `[token, timestamp, nonce]`.
pub fn webhook_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();
    sha1_hex(&parts.concat())
}

/// True iff `query.signature` was produced with `token`. An empty token
/// never verifies.
pub fn verify_webhook_signature(token: &str, query: &WebhookQuery) -> bool {
    if token.is_empty() {
        return false;
    }
    let expected = webhook_signature(token, &query.timestamp, &query.nonce);
    expected.as_bytes().ct_eq(query.signature.as_bytes()).into()
}

/// Signature for the JS-SDK `wx.config` call.
pub fn js_signature(ticket: &str, nonce_str: &str, timestamp: u64, url: &str) -> Result<String> {
    let timestamp = timestamp.to_string();
    let canonical = canonical_string([
        ("jsapi_ticket", ticket),
        ("nonceStr", nonce_str),
        ("timestamp", timestamp.as_str()),
        ("url", url),
    ])?;
    Ok(sha1_hex(&canonical))
}

/// Random 15-character base-36 string from the thread-local CSPRNG.
pub fn nonce_str() -> String {
    let mut rng = rand::rng();
    (0..NONCE_LEN)
        .map(|_| NONCE_ALPHABET[rng.random_range(0..NONCE_ALPHABET.len())] as char)
        .collect()
}
