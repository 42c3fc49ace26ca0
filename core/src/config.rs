//! Bridge configuration.
//!
//! Hosts either deserialize a `BridgeConfig` (the C ABI accepts JSON) or read
//! it from the environment with [`BridgeConfig::from_env`]. Missing fields fall
//! back to the defaults: the full host upload limit and an unbounded drain.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::http::MAX_UPLOAD_LEN;

pub const ENV_MAX_UPLOAD_LEN: &str = "ASSET_BRIDGE_MAX_UPLOAD_LEN";
pub const ENV_MAX_TASKS_PER_DRAIN: &str = "ASSET_BRIDGE_MAX_TASKS_PER_DRAIN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Largest payload `AssetAccessor::request` will upload. Never above
    /// `MAX_UPLOAD_LEN`.
    pub max_upload_len: usize,

    /// How many queued tasks one `dispatch_main_thread_tasks` call runs.
    /// `None` drains everything queued.
    pub max_tasks_per_drain: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_upload_len: MAX_UPLOAD_LEN,
            max_tasks_per_drain: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from any variable source. Unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_MAX_UPLOAD_LEN) {
            config.max_upload_len = parse_usize(ENV_MAX_UPLOAD_LEN, raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_TASKS_PER_DRAIN) {
            let budget = parse_usize(ENV_MAX_TASKS_PER_DRAIN, raw.clone())?;
            if budget == 0 {
                return Err(ConfigError::InvalidEnv {
                    var: ENV_MAX_TASKS_PER_DRAIN,
                    value: raw,
                });
            }
            config.max_tasks_per_drain = Some(budget);
        }
        Ok(config.clamped())
    }

    /// Cap `max_upload_len` at what the host can address, and raise a zero
    /// drain budget to 1 so queued work always makes progress.
    pub fn clamped(mut self) -> Self {
        self.max_upload_len = self.max_upload_len.min(MAX_UPLOAD_LEN);
        self.max_tasks_per_drain = self.max_tasks_per_drain.map(|budget| budget.max(1));
        self
    }
}

fn parse_usize(var: &'static str, raw: String) -> Result<usize, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value: raw })
}
