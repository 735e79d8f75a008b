//! Development server settings.

use serde::{Deserialize, Serialize};

use crate::defaults::*;
use crate::effective::EffectiveConfig;

/// The `[dev]` table of `kiln.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Open a browser once the server is listening.
    #[serde(default = "default_true")]
    pub open: bool,

    #[serde(default = "default_true")]
    pub hot: bool,

    #[serde(default = "default_true")]
    pub history_fallback: bool,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for DevSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: true,
            hot: true,
            history_fallback: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Runtime view of the dev server, built once at server start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevServerConfig {
    pub host: String,
    pub port: u16,
    pub open: bool,
    pub hot_reload: bool,
    pub history_fallback: bool,
    pub debounce_ms: u64,
}

impl DevServerConfig {
    pub fn from_effective(effective: &EffectiveConfig) -> Self {
        let dev = &effective.dev;
        Self {
            host: dev.host.clone(),
            port: dev.port,
            open: dev.open,
            hot_reload: dev.hot,
            history_fallback: dev.history_fallback,
            debounce_ms: dev.debounce_ms,
        }
    }

    /// `host:port` as passed to the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{resolve, BuildMode, KilnConfig};

    #[test]
    fn server_config_follows_dev_settings() {
        let mut config = KilnConfig::default();
        config.dev.port = 4000;
        config.dev.hot = false;

        let effective = resolve(BuildMode::Development, &config);
        let server = DevServerConfig::from_effective(&effective);

        assert_eq!(server.address(), "localhost:4000");
        assert_eq!(server.url(), "http://localhost:4000");
        assert!(!server.hot_reload);
        assert!(server.history_fallback);
    }
}
