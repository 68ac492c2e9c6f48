use base64::{engine::general_purpose::STANDARD, Engine};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::{TokenScheme, MIN_SECRET_KEY_LEN, SEALED_KEY_LEN};
use crate::utils::HashCost;

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    pub password: PasswordConfig,
    pub rate_limit: RateLimitConfig,
    pub request_timeout_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub scheme: TokenScheme,
    /// Base64-encoded symmetric key.
    pub secret_key: Secret<String>,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
}

impl TokenConfig {
    pub fn key_bytes(&self) -> Result<Vec<u8>, AppError> {
        STANDARD
            .decode(self.secret_key.expose_secret().trim())
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("TOKEN_SECRET_KEY is not valid base64: {}", e))
            })
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_ttl_seconds)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_ttl_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<&PasswordConfig> for HashCost {
    fn from(config: &PasswordConfig) -> Self {
        HashCost {
            memory_kib: config.memory_kib,
            iterations: config.iterations,
            parallelism: config.parallelism,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Calls allowed per operation per window. Zero disables limiting.
    pub requests: u32,
    pub window_seconds: u64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let defaults = HashCost::default();

        let config = IdentityConfig {
            common: core_config::Config {
                grpc_port: parse_env(
                    "GRPC_HEALTH_PORT",
                    Some(&common_config.grpc_port.to_string()),
                    false,
                )?,
                shutdown_grace_seconds: parse_env(
                    "SHUTDOWN_GRACE_SECONDS",
                    Some(&common_config.shutdown_grace_seconds.to_string()),
                    false,
                )?,
                ..common_config
            },
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            token: TokenConfig {
                scheme: get_env("TOKEN_SCHEME", Some("jwt"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                secret_key: Secret::new(get_env("TOKEN_SECRET_KEY", None, is_prod)?),
                access_token_ttl_seconds: parse_env(
                    "ACCESS_TOKEN_TTL_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                refresh_token_ttl_seconds: parse_env(
                    "REFRESH_TOKEN_TTL_SECONDS",
                    Some("604800"),
                    is_prod,
                )?,
            },
            password: PasswordConfig {
                memory_kib: parse_env(
                    "PASSWORD_MEMORY_KIB",
                    Some(&defaults.memory_kib.to_string()),
                    is_prod,
                )?,
                iterations: parse_env(
                    "PASSWORD_ITERATIONS",
                    Some(&defaults.iterations.to_string()),
                    is_prod,
                )?,
                parallelism: parse_env(
                    "PASSWORD_PARALLELISM",
                    Some(&defaults.parallelism.to_string()),
                    is_prod,
                )?,
            },
            rate_limit: RateLimitConfig {
                requests: parse_env("RATE_LIMIT_REQUESTS", Some("100"), is_prod)?,
                window_seconds: parse_env("RATE_LIMIT_WINDOW_SECONDS", Some("60"), is_prod)?,
            },
            request_timeout_seconds: parse_env("REQUEST_TIMEOUT_SECONDS", Some("10"), is_prod)?,
            cleanup_interval_seconds: parse_env("CLEANUP_INTERVAL_SECONDS", Some("3600"), is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.common.grpc_port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GRPC_HEALTH_PORT must be greater than 0"
            )));
        }

        if self.token.access_token_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_TTL_SECONDS must be positive"
            )));
        }

        if self.token.refresh_token_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_TTL_SECONDS must be positive"
            )));
        }

        let key_len = self.token.key_bytes()?.len();
        match self.token.scheme {
            TokenScheme::Jwt if key_len < MIN_SECRET_KEY_LEN => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "TOKEN_SECRET_KEY must decode to at least {} bytes for jwt",
                    MIN_SECRET_KEY_LEN
                )));
            }
            TokenScheme::Sealed if key_len != SEALED_KEY_LEN => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "TOKEN_SECRET_KEY must decode to exactly {} bytes for sealed",
                    SEALED_KEY_LEN
                )));
            }
            _ => {}
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS exceeds DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CLEANUP_INTERVAL_SECONDS must be positive"
            )));
        }

        if self.environment == Environment::Prod && self.rate_limit.requests == 0 {
            tracing::warn!("Rate limiting is disabled in production");
        }

        Ok(())
    }

    /// `None` when no deadline should be applied.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_seconds > 0).then(|| Duration::from_secs(self.request_timeout_seconds))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
