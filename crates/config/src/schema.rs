use {
    secrecy::{ExposeSecret, Secret, SecretString},
    serde::Deserialize,
};

pub const DEFAULT_STATE: &str = "a-zA-Z0-9";

/// Top-level configuration file.
#[derive(Debug, Deserialize)]
pub struct WxgateConfig {
    pub client: ClientConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// Identity of one integration client. Never mutated after construction.
#[derive(Deserialize)]
pub struct ClientConfig {
    pub app_id: String,
    pub app_secret: SecretString,
    /// Shared token the platform uses to sign webhook calls.
    pub webhook_token: SecretString,
    /// Opaque value echoed back on OAuth redirects.
    #[serde(default = "default_state")]
    pub state: String,
}

fn default_state() -> String {
    DEFAULT_STATE.to_string()
}

impl ClientConfig {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        webhook_token: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: Secret::new(app_secret.into()),
            webhook_token: Secret::new(webhook_token.into()),
            state: default_state(),
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_id.trim().is_empty() {
            anyhow::bail!("client.app_id must not be empty");
        }
        if self.app_secret.expose_secret().is_empty() {
            anyhow::bail!("client.app_secret must not be empty");
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("webhook_token", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_secs: u64,
    /// Skip TLS certificate validation. Only for hosts that still serve the
    /// platform's legacy certificate chain.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            accept_invalid_certs: false,
        }
    }
}

/// Where the platform lives. Overridable so tests can point at a local server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub scheme: String,
    pub api_host: String,
    pub open_host: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            scheme: "https".into(),
            api_host: "api.weixin.qq.com".into(),
            open_host: "open.weixin.qq.com".into(),
        }
    }
}

impl Endpoints {
    /// Plain-HTTP endpoints with both hosts on one address.
    pub fn local(host_with_port: &str) -> Self {
        Self {
            scheme: "http".into(),
            api_host: host_with_port.into(),
            open_host: host_with_port.into(),
        }
    }
}
