use std::env;

use crate::error::AppError;

const DEV_JWT_SECRET: &str = "delivery-relay-development-secret-change-me";
const MIN_JWT_SECRET_LEN: usize = 32;
const MAX_TOKEN_TTL_HOURS: i64 = 30 * 24;
const MAX_ESTIMATED_DELIVERY_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// Outbound frames buffered per websocket before events are dropped.
    pub connection_buffer_size: usize,
    /// Flat offset stamped as the estimated delivery time on assignment.
    pub estimated_delivery_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            jwt_secret: jwt_secret()?,
            token_ttl_hours: parse_or_default("TOKEN_TTL_HOURS", 24)?,
            connection_buffer_size: parse_or_default("CONNECTION_BUFFER_SIZE", 256)?,
            estimated_delivery_minutes: parse_or_default("ESTIMATED_DELIVERY_MINUTES", 30)?,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.connection_buffer_size == 0 {
            return Err(AppError::Internal(
                "CONNECTION_BUFFER_SIZE must be > 0".to_string(),
            ));
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            return Err(AppError::Internal(format!(
                "TOKEN_TTL_HOURS must be within 1..={MAX_TOKEN_TTL_HOURS}"
            )));
        }
        if !(0..=MAX_ESTIMATED_DELIVERY_MINUTES).contains(&self.estimated_delivery_minutes) {
            return Err(AppError::Internal(format!(
                "ESTIMATED_DELIVERY_MINUTES must be within 0..={MAX_ESTIMATED_DELIVERY_MINUTES}"
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
            connection_buffer_size: 256,
            estimated_delivery_minutes: 30,
        }
    }
}

fn jwt_secret() -> Result<String, AppError> {
    match env::var("JWT_SECRET") {
        Ok(secret) if secret.len() >= MIN_JWT_SECRET_LEN => Ok(secret),
        Ok(secret) => Err(AppError::Internal(format!(
            "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes, got {}",
            secret.len()
        ))),
        Err(_) if cfg!(debug_assertions) => {
            tracing::warn!("JWT_SECRET not set; using development secret");
            Ok(DEV_JWT_SECRET.to_string())
        }
        Err(_) => Err(AppError::Internal("JWT_SECRET is required".to_string())),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_connection_buffer_is_rejected() {
        let config = Config {
            connection_buffer_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_delivery_estimate_is_rejected() {
        let config = Config {
            estimated_delivery_minutes: 200_000_000_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let week = Config {
            estimated_delivery_minutes: 7 * 24 * 60,
            ..Config::default()
        };
        assert!(week.validate().is_ok());
    }

    #[test]
    fn token_ttl_must_be_bounded() {
        for token_ttl_hours in [0, -1, 10_000_000_000_000] {
            let config = Config {
                token_ttl_hours,
                ..Config::default()
            };
            assert!(config.validate().is_err(), "{token_ttl_hours}");
        }
    }
}
