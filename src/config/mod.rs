use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{venue, LayoutError, VenueLayout};

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub redis: RedisConfig,
    pub reservation: ReservationConfig,
    pub venue: VenueLayout,
}

// Настройки приложения
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

// Где лежат записи о местах
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Postgres { url: String, pool_size: u32 },
    Memory,
}

// Настройки Redis (кеш снимка мест), без URL кеш выключен
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub seats_ttl_seconds: u64,
}

// Окно жизни брони и период фоновой очистки
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    pub hold_expiry: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("invalid venue layout: {0}")]
    Layout(#[from] LayoutError),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфиг из произвольного источника переменных.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &'static str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let log_format = match var("LOG_FORMAT", "pretty").as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => return Err(invalid("LOG_FORMAT", other)),
        };

        let store = match var("SEAT_STORE", "postgres").as_str() {
            "postgres" => StoreConfig::Postgres {
                url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                pool_size: parse(&lookup, "DB_POOL_SIZE", "20")?,
            },
            "memory" => StoreConfig::Memory,
            other => return Err(invalid("SEAT_STORE", other)),
        };

        let hold_expiry_secs: u64 = parse(&lookup, "HOLD_EXPIRY_SECONDS", "600")?;
        if hold_expiry_secs == 0 {
            return Err(invalid("HOLD_EXPIRY_SECONDS", "0"));
        }
        let sweep_interval_secs: u64 = parse(&lookup, "SWEEP_INTERVAL_SECONDS", "30")?;
        if sweep_interval_secs == 0 {
            return Err(invalid("SWEEP_INTERVAL_SECONDS", "0"));
        }

        let venue = VenueLayout::new(
            var("VENUE_ROW_LABELS", venue::DEFAULT_ROW_LABELS).chars(),
            parse(&lookup, "VENUE_COLUMNS", &venue::DEFAULT_COLUMNS.to_string())?,
        )?;

        Ok(Config {
            app: AppConfig {
                host: var("HOST", "0.0.0.0"),
                port: parse(&lookup, "PORT", "5000")?,
                rust_log: var("RUST_LOG", "seat_booking=debug,tower_http=debug"),
                log_format,
            },
            store,
            redis: RedisConfig {
                url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
                seats_ttl_seconds: parse(&lookup, "SEATS_CACHE_TTL_SECONDS", "5")?,
            },
            reservation: ReservationConfig {
                hold_expiry: Duration::from_secs(hold_expiry_secs),
                sweep_interval: Duration::from_secs(sweep_interval_secs),
            },
            venue,
        })
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim().parse().map_err(|_| invalid(key, &raw))
}
