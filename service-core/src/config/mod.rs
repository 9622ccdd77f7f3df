//! Layered configuration: optional `configuration.{toml,yaml,json}` file
//! overridden by `APP__`-prefixed environment variables.

use crate::error::AppError;
use config::builder::DefaultState;
use config::{Config as Cfg, ConfigBuilder, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Base name of the optional configuration file, looked up in the working directory.
pub const CONFIG_FILE: &str = "configuration";

/// Environment prefix; `APP__MATCHING__TIE_MARGIN` maps to `matching.tie_margin`.
pub const ENV_PREFIX: &str = "APP";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

fn layered(file: &str) -> ConfigBuilder<DefaultState> {
    Cfg::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(file: &str) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = layered(file).build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Deserialize a single table (e.g. `matching`) from the layered sources.
///
/// A missing table yields `T::default()`; a present but malformed one is an error.
pub fn load_section<T>(file: &str, section: &str) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    dotenvy::dotenv().ok();

    let config = layered(file).build()?;

    match config.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}
