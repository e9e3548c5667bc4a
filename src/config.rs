use std::collections::HashMap;
use std::env;

use thiserror::Error;

const DEFAULT_DATABASE: &str = "ExpHive";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreConfig {
    Mongo { uri: String, database: String },
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub store: StoreConfig,
    pub host: String,
    pub port: u16,
    pub auth_secret: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You need to add {0} to the env")]
    Missing(&'static str),
    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).filter(|value| !value.is_empty());
        let require = |name: &'static str| get(name).cloned().ok_or(ConfigError::Missing(name));

        let store = match get("EXPHIVE_STORE").map(String::as_str) {
            None | Some("mongo") => StoreConfig::Mongo {
                uri: require("MONGODB_URI")?,
                database: get("DATABASE_NAME")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            },
            Some("memory") => StoreConfig::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "EXPHIVE_STORE",
                    value: other.to_string(),
                })
            }
        };

        let port = match get("PORT") {
            Some(port) => port.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: port.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Config {
            store,
            host: get("HOST")
                .cloned()
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            auth_secret: require("AUTH_SECRET")?,
        })
    }
}
