//! # config
//!
//! Two layers:
//! - [`Config`] — process environment, read once at startup. Missing
//!   credentials are the only condition that stops the process.
//! - [`BotConfig`] — the editable `bot_config.json` blob, re-read through
//!   [`ConfigStore`] at the top of every cycle so edits land on the next
//!   cadence tick.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::models::Timeframe;
use crate::store;

pub const DEFAULT_LEVERAGE: u32 = 10;
pub const DEFAULT_INSTRUMENT: &str = "BTC-USDT-SWAP";

// ─── AiProvider ───────────────────────────────────────────────────────────────

/// Inference providers the brain can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    DeepSeek, // OpenAI-compatible chat completions
    OpenAi,
    Claude,
}

impl AiProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            AiProvider::DeepSeek => "deepseek-chat",
            AiProvider::OpenAi   => "gpt-4o",
            AiProvider::Claude   => "claude-3-5-sonnet-20241022",
        }
    }
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::DeepSeek => write!(f, "DeepSeek"),
            AiProvider::OpenAi   => write!(f, "OpenAI"),
            AiProvider::Claude   => write!(f, "Claude"),
        }
    }
}

// ─── Credentials ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct OkxCredentials {
    pub api_key:    String,
    pub secret:     String,
    pub passphrase: String,
}

impl std::fmt::Debug for OkxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkxCredentials")
            .field("api_key", &mask(&self.api_key))
            .field("secret", &"***")
            .field("passphrase", &"***")
            .finish()
    }
}

/// First 8 characters, for logs.
pub fn mask(key: &str) -> String {
    match key.get(..8) {
        Some(prefix) if key.len() > 8 => format!("{prefix}..."),
        _ => "***".to_string(),
    }
}

// ─── Config (environment) ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub okx:           OkxCredentials,
    pub okx_base_url:  String,
    /// Route orders to OKX demo trading.
    pub okx_simulated: bool,
    pub ai_provider:   AiProvider,
    pub ai_api_key:    String,
    pub ai_model:      String,
    /// Overrides the provider's API root (self-hosted gateways, tests).
    pub ai_base_url:   Option<String>,
    /// The single instrument this process trades, e.g. `BTC-USDT-SWAP`.
    pub instrument:    String,
    pub data_dir:      PathBuf,
    pub bind_addr:     String,
    /// `X-API-Key` expected by the HTTP surface; `None` = open (dev mode).
    pub api_key:       Option<String>,
    /// Fixed pause after a failed cycle, independent of the cadence.
    pub retry_backoff: Duration,
    /// Wait after a fill before the post-trade position read.
    pub settle_delay:  Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let okx_key    = get("OKX_API_KEY");
        let okx_secret = get("OKX_SECRET");
        let okx_pass   = get("OKX_PASSWORD");
        let ai_key     = get("AI_API_KEY").or_else(|| get("DEEPSEEK_API_KEY"));

        let mut missing = Vec::new();
        if okx_key.is_none()    { missing.push("OKX_API_KEY"); }
        if okx_secret.is_none() { missing.push("OKX_SECRET"); }
        if okx_pass.is_none()   { missing.push("OKX_PASSWORD"); }
        if ai_key.is_none()     { missing.push("AI_API_KEY (or DEEPSEEK_API_KEY)"); }

        let (Some(api_key), Some(secret), Some(passphrase), Some(ai_api_key)) =
            (okx_key, okx_secret, okx_pass, ai_key)
        else {
            bail!(
                "required credentials are not configured: {}. \
                 Set them in the environment or in .env before starting.",
                missing.join(", ")
            );
        };

        let ai_provider = match get("AI_PROVIDER").unwrap_or_else(|| "deepseek".into()).to_lowercase().as_str() {
            "deepseek" => AiProvider::DeepSeek,
            "openai"   => AiProvider::OpenAi,
            "claude"   => AiProvider::Claude,
            other => bail!("Unknown AI_PROVIDER: '{other}'. Use 'deepseek', 'openai' or 'claude'"),
        };

        let secs = |key: &str, default: u64| -> anyhow::Result<Duration> {
            match get(key) {
                Some(v) => v
                    .parse()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{key} must be a whole number of seconds")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        Ok(Self {
            okx: OkxCredentials { api_key, secret, passphrase },
            okx_base_url:  get("OKX_BASE_URL").unwrap_or_else(|| crate::exchange::okx::OKX_BASE_URL.to_string()),
            okx_simulated: get("OKX_SIMULATED").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false),
            ai_model:      get("AI_MODEL").unwrap_or_else(|| ai_provider.default_model().to_string()),
            ai_provider,
            ai_api_key,
            ai_base_url:   get("AI_BASE_URL"),
            instrument:    get("INSTRUMENT").unwrap_or_else(|| DEFAULT_INSTRUMENT.to_string()),
            data_dir:      get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            bind_addr:     get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            api_key:       get("API_KEY"),
            retry_backoff: secs("RETRY_BACKOFF_SECS", 10)?,
            settle_delay:  secs("SETTLE_DELAY_SECS", 2)?,
        })
    }
}

// ─── BotConfig (editable blob) ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// 1–125; range is enforced by whoever edits the file.
    pub leverage:         u32,
    pub timeframe:        Timeframe,
    /// Dry-run: decide and log, never submit.
    pub test_mode:        bool,
    /// Starting capital; the inception baseline when > 0.
    pub base_usdt_amount: f64,
    /// Minutes between cycles.
    pub refresh_interval: u64,
    /// Contracts per opening order.
    pub order_size:       f64,
    pub last_updated:     Option<DateTime<Utc>>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            leverage:         DEFAULT_LEVERAGE,
            timeframe:        Timeframe::M15,
            test_mode:        true,
            base_usdt_amount: 100.0,
            refresh_interval: 2,
            order_size:       0.01,
            last_updated:     None,
        }
    }
}

impl BotConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.saturating_mul(60))
    }

    /// Resolves every recognised key independently. A value of the wrong
    /// shape falls back to its default with a warning instead of failing
    /// the whole document.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let field = |key: &str| value.get(key).filter(|v| !v.is_null());

        let leverage = match field("leverage") {
            None => defaults.leverage,
            Some(v) => match as_f64(v) {
                Some(n) if n >= 1.0 && n.fract() == 0.0 => n as u32,
                _ => {
                    warn!(value = %v, default = DEFAULT_LEVERAGE, "⚠️ leverage is not a usable number — using default");
                    defaults.leverage
                }
            },
        };

        let timeframe = match field("timeframe") {
            None => defaults.timeframe,
            Some(v) => match v.as_str().map(str::parse::<Timeframe>) {
                Some(Ok(tf)) => tf,
                _ => {
                    warn!(value = %v, default = %defaults.timeframe, "⚠️ unknown timeframe — using default");
                    defaults.timeframe
                }
            },
        };

        let test_mode = match field("test_mode") {
            None => defaults.test_mode,
            Some(Value::Bool(b)) => *b,
            Some(v) => {
                warn!(value = %v, "⚠️ test_mode is not a boolean — staying in test mode");
                defaults.test_mode
            }
        };

        let positive = |key: &str, default: f64| -> f64 {
            match field(key) {
                None => default,
                Some(v) => match as_f64(v) {
                    Some(n) if n > 0.0 => n,
                    _ => {
                        warn!(key, value = %v, default, "⚠️ expected a positive number — using default");
                        default
                    }
                },
            }
        };

        let base_usdt_amount = positive("base_usdt_amount", defaults.base_usdt_amount);
        let order_size = positive("order_size", defaults.order_size);
        let refresh_interval = positive("refresh_interval", defaults.refresh_interval as f64).ceil() as u64;

        let last_updated = field("last_updated")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        Self {
            leverage,
            timeframe,
            test_mode,
            base_usdt_amount,
            refresh_interval,
            order_size,
            last_updated,
        }
    }
}

/// Accepts JSON numbers and numeric strings.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ─── ConfigStore ──────────────────────────────────────────────────────────────

/// Load/save access to `bot_config.json`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub const FILE_NAME: &'static str = "bot_config.json";

    pub fn new(data_dir: &Path) -> Self {
        Self { path: data_dir.join(Self::FILE_NAME) }
    }

    /// Never fails: a missing file is created with defaults, an unreadable
    /// one yields defaults and is left untouched for the operator.
    pub async fn load(&self) -> BotConfig {
        match store::load_json::<Value>(&self.path).await {
            Ok(Some(value)) => BotConfig::from_value(&value),
            Ok(None) => {
                warn!(path = %self.path.display(), "⚠️ bot config not found — creating defaults");
                let mut config = BotConfig::default();
                if let Err(e) = self.save(&mut config).await {
                    error!(error = %e, "failed to write default bot config");
                }
                config
            }
            Err(e) => {
                error!(error = %e, "❌ bot config unreadable — running with defaults");
                BotConfig::default()
            }
        }
    }

    pub async fn save(&self, config: &mut BotConfig) -> anyhow::Result<()> {
        config.last_updated = Some(Utc::now());
        store::save_json(&self.path, config).await?;
        info!(path = %self.path.display(), "bot config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OKX_API_KEY", "abcdefgh12345"),
            ("OKX_SECRET", "s3cret"),
            ("OKX_PASSWORD", "pw"),
            ("DEEPSEEK_API_KEY", "sk-deep"),
        ])
    }

    #[test]
    fn test_env_defaults() {
        let env = full_env();
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.ai_provider, AiProvider::DeepSeek);
        assert_eq!(config.ai_model, "deepseek-chat");
        assert_eq!(config.ai_api_key, "sk-deep");
        assert_eq!(config.instrument, DEFAULT_INSTRUMENT);
        assert_eq!(config.retry_backoff, Duration::from_secs(10));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_missing_credentials_are_fatal_and_named() {
        let mut env = full_env();
        env.remove("OKX_SECRET");
        env.insert("OKX_PASSWORD", "   ");
        let err = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("OKX_SECRET"));
        assert!(msg.contains("OKX_PASSWORD"));
        assert!(!msg.contains("OKX_API_KEY"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut env = full_env();
        env.insert("AI_PROVIDER", "llama");
        assert!(Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).is_err());
    }

    #[test]
    fn test_non_numeric_leverage_falls_back() {
        let config = BotConfig::from_value(&json!({ "leverage": "ten", "timeframe": "1h" }));
        assert_eq!(config.leverage, DEFAULT_LEVERAGE);
        assert_eq!(config.timeframe, Timeframe::H1);
    }

    #[test]
    fn test_numeric_string_leverage_accepted() {
        let config = BotConfig::from_value(&json!({ "leverage": "20" }));
        assert_eq!(config.leverage, 20);
    }

    #[test]
    fn test_null_values_use_defaults() {
        let config = BotConfig::from_value(&json!({
            "leverage": null, "test_mode": null, "base_usdt_amount": null
        }));
        assert_eq!(config, BotConfig::default());
    }

    #[test]
    fn test_full_document() {
        let config = BotConfig::from_value(&json!({
            "leverage": 25,
            "timeframe": "4h",
            "test_mode": false,
            "base_usdt_amount": 250.5,
            "refresh_interval": 5,
            "order_size": 0.05
        }));
        assert_eq!(config.leverage, 25);
        assert_eq!(config.timeframe, Timeframe::H4);
        assert!(!config.test_mode);
        assert_eq!(config.base_usdt_amount, 250.5);
        assert_eq!(config.interval(), Duration::from_secs(300));
        assert_eq!(config.order_size, 0.05);
    }

    #[test]
    fn test_huge_refresh_interval_saturates() {
        let config = BotConfig::from_value(&json!({ "refresh_interval": 1e300 }));
        assert_eq!(config.refresh_interval, u64::MAX);
        assert_eq!(config.interval(), Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_missing_file_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());

        let config = store.load().await;
        assert_eq!(config.leverage, DEFAULT_LEVERAGE);
        assert!(config.test_mode);
        assert!(dir.path().join(ConfigStore::FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_edit_is_picked_up_on_next_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let _ = store.load().await;

        tokio::fs::write(
            dir.path().join(ConfigStore::FILE_NAME),
            br#"{ "leverage": 3, "test_mode": false }"#,
        )
        .await
        .unwrap();

        let config = store.load().await;
        assert_eq!(config.leverage, 3);
        assert!(!config.test_mode);
    }
}
