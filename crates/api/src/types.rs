use serde::{Deserialize, Serialize};

/// Lifetime the platform gives app tokens, JS-API tickets and user tokens.
pub const VALIDITY_WINDOW_SECS: u64 = 7200;

/// A credential together with the time it was acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential<T> {
    pub value: T,
    /// Unix seconds.
    pub acquired_at: u64,
}

impl<T> CachedCredential<T> {
    pub fn new(value: T, acquired_at: u64) -> Self {
        Self { value, acquired_at }
    }

    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.acquired_at)
    }

    /// Fresh iff strictly less than `window` seconds have elapsed since
    /// acquisition.
    pub fn is_fresh(&self, now: u64, window: u64) -> bool {
        self.age(now) < window
    }
}

/// Per-user OAuth credential returned for an authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: String,
    pub openid: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unionid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AppTokenReply {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TicketReply {
    pub ticket: String,
}

/// OAuth authorization scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OAuthScope {
    /// Silent authorization; yields only the openid.
    #[default]
    Base,
    /// Prompts the user; allows reading the profile.
    UserInfo,
}

impl OAuthScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "snsapi_base",
            Self::UserInfo => "snsapi_userinfo",
        }
    }
}

impl std::str::FromStr for OAuthScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snsapi_base" | "base" => Ok(Self::Base),
            "snsapi_userinfo" | "userinfo" => Ok(Self::UserInfo),
            other => Err(format!("unknown oauth scope: {other}")),
        }
    }
}
