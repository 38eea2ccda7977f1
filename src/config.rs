use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "pagoda.toml";
pub const ENV_PREFIX: &str = "PAGODA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding one sub-directory per database.
    pub data_dir: PathBuf,
    /// Require `LOGIN` before any other command.
    pub auth: bool,
    /// Password given to the `admin` account when the accounts file is
    /// first created.
    pub admin_password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            data_dir: PathBuf::from("Database"),
            auth: true,
            admin_password: "admin".to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then the config file, then `PAGODA_*` variables. Command
    /// line flags are applied by the caller.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        load_layered(file)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    /// Database to `USE` right after connecting.
    pub database: Option<String>,
    /// Credentials sent with `LOGIN` right after connecting.
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            connect_timeout_secs: 30,
            database: None,
            username: None,
            password: None,
        }
    }
}

impl ClientConfig {
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        load_layered(file)
    }
}

fn load_layered<T: for<'de> Deserialize<'de>>(file: Option<&Path>) -> Result<T, ConfigError> {
    let mut builder = Config::builder();
    builder = match file {
        Some(path) => builder.add_source(File::from(path).required(true)),
        None => builder.add_source(File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false)),
    };
    builder
        .add_source(Environment::with_prefix(ENV_PREFIX))
        .build()?
        .try_deserialize()
}
