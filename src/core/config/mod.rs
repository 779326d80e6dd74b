use std::time::Duration;

use anyhow::Context;

use crate::learn::codes::DEFAULT_MAX_ATTEMPTS;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub access_codes: AccessCodeConfig,
    pub question_source: Option<QuestionSourceConfig>,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct AccessCodeConfig {
    pub max_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct QuestionSourceConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

fn get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let question_source = get_opt("QUESTION_SOURCE_URL").map(|url| QuestionSourceConfig {
            url,
            api_key: get_opt("QUESTION_SOURCE_API_KEY"),
            timeout: Duration::from_secs(get_parsed("QUESTION_SOURCE_TIMEOUT_SECS", 30)),
        });

        Ok(AppConfig {
            database: DatabaseConfig {
                url,
                pool_size: get_parsed("DATABASE_POOL_SIZE", 10),
            },
            server: ServerConfig {
                host: get_str("SERVER_HOST", "0.0.0.0"),
                port: get_parsed("SERVER_PORT", 8080),
            },
            access_codes: AccessCodeConfig {
                max_attempts: get_parsed("ACCESS_CODE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            },
            question_source,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
