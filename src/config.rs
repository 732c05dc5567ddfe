//! Runtime configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file,
//! then the `API_*` environment variables.

use std::env;
use std::path::Path;

use config::{Config, ConfigError, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;
use crate::pipeline::completion::MarkerConfig;
use crate::polling::PollingConfig;

/// File read when no explicit config path is given. Optional.
pub const DEFAULT_CONFIG_FILE: &str = "verification.toml";

/// Environment variable overriding the backend host.
pub const HOST_ENV_VAR: &str = "API_HOST";

/// Environment variable overriding the backend port.
pub const PORT_ENV_VAR: &str = "API_PORT";

/// Environment variable overriding the backend scheme.
pub const SCHEME_ENV_VAR: &str = "API_SCHEME";

/// Environment variable enabling production mode.
pub const PRODUCTION_ENV_VAR: &str = "API_PRODUCTION";

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3000;

/// Where the verification backend lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// `http` or `https`. A trailing `://` is tolerated.
    pub scheme: String,
    pub host: String,
    /// Appended to the host only when set.
    pub port: Option<u16>,
    /// Production mode always talks https.
    pub production: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: Some(DEFAULT_PORT),
            production: false,
        }
    }
}

impl ApiConfig {
    pub fn scheme(&self) -> &str {
        if self.production {
            return "https";
        }
        self.scheme.trim_end_matches("://")
    }

    /// Base URL every route is resolved against, without a trailing slash.
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme(), self.host, port),
            None => format!("{}://{}", self.scheme(), self.host),
        }
    }
}

/// Everything the runtime reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub markers: MarkerConfig,
}

impl RuntimeConfig {
    /// Load from defaults, the config file and the process environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        Self::load_with_env(path, |key| env::var(key).ok())
    }

    /// Like [`RuntimeConfig::load`], reading overrides through `lookup`.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => File::from(path.to_path_buf())
                .format(FileFormat::Toml)
                .required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = lookup(PORT_ENV_VAR)
            .map(|value| {
                value.trim().parse::<u16>().map(i64::from).map_err(|_| {
                    ConfigError::Message(format!("{}: invalid port {:?}", PORT_ENV_VAR, value))
                })
            })
            .transpose()?;
        let production = lookup(PRODUCTION_ENV_VAR).map(|value| parse_flag(&value));

        let config = Config::builder()
            .add_source(Config::try_from(&RuntimeConfig::default())?)
            .add_source(file)
            .set_override_option("api.host", lookup(HOST_ENV_VAR))?
            .set_override_option("api.port", port)?
            .set_override_option("api.scheme", lookup(SCHEME_ENV_VAR))?
            .set_override_option("api.production", production)?
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
