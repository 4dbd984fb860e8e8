//! Shell configuration and config file discovery

use std::path::{Path, PathBuf};

use courier_delivery::{DispatcherConfig, SimulatedProviderConfig};
use serde::Deserialize;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "COURIER_CONFIG";

/// Config files tried, in order, when neither `--config` nor
/// [`CONFIG_ENV`] is given
pub const DEFAULT_CONFIG_PATHS: [&str; 2] =
    ["./courier.config.ron", "/etc/courier/courier.config.ron"];

/// Everything the `courier` binary needs to build a dispatcher
#[derive(Debug, Clone, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Providers in registration order
    ///
    /// Default: `user1@example.com` and `user2@example.com`, each succeeding
    /// half of the time
    #[serde(alias = "provider", default = "default_providers")]
    pub providers: Vec<SimulatedProviderConfig>,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            providers: default_providers(),
        }
    }
}

fn default_providers() -> Vec<SimulatedProviderConfig> {
    ["user1@example.com", "user2@example.com"]
        .into_iter()
        .map(|name| SimulatedProviderConfig {
            name: name.to_string(),
            success_rate: 0.5,
            latency_ms: 0,
        })
        .collect()
}

impl CourierConfig {
    /// Parse a RON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid configuration.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Read and parse a RON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;

        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit` (the `--config` argument)
/// 2. `COURIER_CONFIG` environment variable
/// 3. The first of [`DEFAULT_CONFIG_PATHS`] that exists
///
/// Returns `Ok(None)` when nothing was requested and no default exists, in
/// which case built-in defaults apply.
///
/// # Errors
///
/// Returns an error if an explicitly requested file does not exist.
pub fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<Option<PathBuf>> {
    let requested = explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    if let Some(path) = requested {
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    Ok(DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists()))
}
