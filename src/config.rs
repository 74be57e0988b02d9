use clap::Parser;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Simple CLI args - just for specifying the config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SMOOTHLLM_CONFIG", default_value = "config.yaml")]
    pub config: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    /// Externally visible base URL, used to build the OAuth callback
    /// redirect URI. Falls back to the request's Host header when unset.
    pub public_url: Option<Url>,
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database: DatabaseConfig::default(),
            public_url: None,
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/smoothllm".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Layered load: yaml file first, `SMOOTHLLM_`-prefixed environment
    /// variables on top (nested keys split on `__`).
    pub fn load(args: &Args) -> Result<Config, figment::Error> {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("SMOOTHLLM_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert!(config.database.url.starts_with("postgres://"));
        assert_eq!(config.cors.allowed_origins, vec!["*"]);
    }
}
