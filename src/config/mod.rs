mod basic;
mod controller;

pub use basic::BasicConfig;
pub use controller::{ControllerConfig, GatewayConfig};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Reconciliation driver settings (see `controller` table in config.toml).
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Target MySQL connection settings (see `gateway` table in config.toml).
    #[serde(default)]
    pub gateway: GatewayConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "DBPROV_";

impl Config {
    /// Builds a Figment that merges defaults, a config TOML file and `DBPROV_*` env vars.
    ///
    /// Nested keys use `__` as separator, e.g. `DBPROV_CONTROLLER__RECONCILE_TIMEOUT_SECS=30`.
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads configuration by merging defaults, `config.toml` if present, and the environment.
    pub fn load() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml + env): {err}")
        })
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::load);
