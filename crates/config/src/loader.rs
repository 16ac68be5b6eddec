use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::schema::{ClientConfig, Endpoints, TransportConfig, WxgateConfig};

const CONFIG_FILE: &str = "wxgate.toml";

/// `<config_dir>/wxgate/wxgate.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "wxgate").map(|d| d.config_dir().join(CONFIG_FILE))
}

impl WxgateConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(content).context("invalid wxgate config")?;
        Ok(cfg)
    }
}

/// Load a config file, apply `WXGATE_*` environment overrides and validate.
pub fn load(path: &Path) -> anyhow::Result<WxgateConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut cfg = WxgateConfig::from_toml_str(&content)?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.client.validate()?;
    info!(path = %path.display(), app_id = %cfg.client.app_id, "loaded config");
    Ok(cfg)
}

/// Load from the default path, or from `WXGATE_*` variables alone when no
/// config file exists there.
pub fn load_default() -> anyhow::Result<WxgateConfig> {
    match default_config_path() {
        Some(path) if path.is_file() => load(&path),
        _ => {
            let cfg = from_env(|key| std::env::var(key).ok())?;
            info!(app_id = %cfg.client.app_id, "loaded config from environment");
            Ok(cfg)
        },
    }
}

/// Build a config from environment variables only. `WXGATE_APP_ID` and
/// `WXGATE_APP_SECRET` are required.
fn from_env(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<WxgateConfig> {
    let app_id = var("WXGATE_APP_ID")
        .context("no config file found and WXGATE_APP_ID is not set")?;
    let app_secret = var("WXGATE_APP_SECRET")
        .context("no config file found and WXGATE_APP_SECRET is not set")?;
    let mut cfg = WxgateConfig {
        client: ClientConfig::new(app_id, app_secret, ""),
        transport: TransportConfig::default(),
        endpoints: Endpoints::default(),
    };
    apply_env_overrides(&mut cfg, var)?;
    cfg.client.validate()?;
    Ok(cfg)
}

fn parse_flag(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{key} is not a boolean: {value}"),
    }
}

fn apply_env_overrides(
    cfg: &mut WxgateConfig,
    var: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = var("WXGATE_APP_ID") {
        debug!("app_id overridden from environment");
        cfg.client.app_id = v;
    }
    if let Some(v) = var("WXGATE_APP_SECRET") {
        cfg.client.app_secret = Secret::new(v);
    }
    if let Some(v) = var("WXGATE_WEBHOOK_TOKEN") {
        cfg.client.webhook_token = Secret::new(v);
    }
    if let Some(v) = var("WXGATE_STATE") {
        cfg.client.state = v;
    }
    if let Some(v) = var("WXGATE_ACCEPT_INVALID_CERTS") {
        cfg.transport.accept_invalid_certs = parse_flag("WXGATE_ACCEPT_INVALID_CERTS", &v)?;
    }
    if let Some(v) = var("WXGATE_TIMEOUT_SECS") {
        cfg.transport.timeout_secs = v
            .parse()
            .with_context(|| format!("WXGATE_TIMEOUT_SECS is not a number: {v}"))?;
    }
    Ok(())
}
