//! Runtime settings for the garage API.
//!
//! Sources are layered, later ones winning: built-in defaults,
//! `config/default.toml`, `config/<RUN_ENV>.toml`, then `APP__*` environment
//! variables (`APP__TAX_RATE=0.07`, `APP__DATABASE_URL=postgres://...`).

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const ENVIRONMENTS: [&str; 4] = ["development", "test", "staging", "production"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

mod defaults {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub const ENVIRONMENT: &str = "development";
    pub const DATABASE_URL: &str = "sqlite://garage.db?mode=rwc";
    pub const HOST: &str = "0.0.0.0";

    pub fn port() -> u16 {
        8080
    }
    pub fn log_level() -> String {
        "info".to_string()
    }
    pub fn max_connections() -> u32 {
        16
    }
    pub fn min_connections() -> u32 {
        2
    }
    pub fn connect_timeout_secs() -> u64 {
        30
    }
    pub fn idle_timeout_secs() -> u64 {
        600
    }
    pub fn acquire_timeout_secs() -> u64 {
        8
    }
    pub fn tax_rate() -> Decimal {
        dec!(0.0875)
    }
    pub fn payment_terms_days() -> i64 {
        30
    }
    pub fn event_channel_capacity() -> usize {
        1024
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// One of development, test, staging, production
    #[validate(custom = "check_environment")]
    pub environment: String,

    #[serde(default = "defaults::log_level")]
    #[validate(custom = "check_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma separated origins; required outside development unless
    /// `cors_allow_any_origin` is set
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default = "defaults::max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "defaults::min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "defaults::connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "defaults::idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "defaults::acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Sales tax on work-order subtotals, as a fraction (0.0875 = 8.75%)
    #[serde(default = "defaults::tax_rate")]
    #[validate(custom = "check_tax_rate")]
    pub tax_rate: Decimal,

    /// Invoice due date = invoice date + this many days
    #[serde(default = "defaults::payment_terms_days")]
    #[validate(range(min = 0, max = 365))]
    pub invoice_payment_terms_days: i64,

    #[serde(default)]
    pub inventory_allow_negative_stock: bool,

    #[serde(default = "defaults::event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Shop defaults with the given connection and listener settings.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: defaults::log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: defaults::max_connections(),
            db_min_connections: defaults::min_connections(),
            db_connect_timeout_secs: defaults::connect_timeout_secs(),
            db_idle_timeout_secs: defaults::idle_timeout_secs(),
            db_acquire_timeout_secs: defaults::acquire_timeout_secs(),
            tax_rate: defaults::tax_rate(),
            invoice_payment_terms_days: defaults::payment_terms_days(),
            inventory_allow_negative_stock: false,
            event_channel_capacity: defaults::event_channel_capacity(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Trimmed, non-empty entries of `cors_allowed_origins`.
    pub fn cors_origins(&self) -> Vec<&str> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Any-origin CORS is only used in development or when opted into.
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Rules spanning several fields, checked after the per-field ones.
    fn check_cross_field(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.cors_origins().is_empty() && !self.should_allow_permissive_cors() {
            errors.add(
                "cors_allowed_origins",
                invalid(
                    "cors_allowed_origins_required",
                    "set APP__CORS_ALLOWED_ORIGINS, or APP__CORS_ALLOW_ANY_ORIGIN=true to accept any origin",
                ),
            );
        }
        if self.db_min_connections > self.db_max_connections {
            errors.add(
                "db_min_connections",
                invalid(
                    "db_min_connections",
                    "db_min_connections must not exceed db_max_connections",
                ),
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn check_environment(value: &str) -> Result<(), ValidationError> {
    if ENVIRONMENTS.contains(&value.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(invalid(
            "environment",
            "environment must be development, test, staging or production",
        ))
    }
}

fn check_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(invalid(
            "log_level",
            "log_level must be trace, debug, info, warn or error",
        ))
    }
}

fn check_tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE {
        return Err(invalid("tax_rate", "tax_rate must be between 0 and 1"));
    }
    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(format!("garage_api={},tower_http=debug", level)));

    let builder = fmt().with_env_filter(filter);
    // try_init: tests and the migration binary may call this more than once
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Reads and validates the layered configuration for `RUN_ENV` (or
/// `APP_ENV`, defaulting to development).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| defaults::ENVIRONMENT.to_string());
    info!(environment = %run_env, "loading configuration");

    if !Path::new(CONFIG_DIR).is_dir() {
        warn!(dir = CONFIG_DIR, "no config directory, using defaults and APP__ variables");
    }

    let app_config: AppConfig = Config::builder()
        .set_default("database_url", defaults::DATABASE_URL)?
        .set_default("host", defaults::HOST)?
        .set_default("environment", run_env.as_str())?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    app_config
        .validate()
        .and_then(|_| app_config.check_cross_field())
        .map_err(|e| {
            error!(error = %e, "configuration rejected");
            AppConfigError::Validation(e)
        })?;

    info!(
        port = app_config.port,
        tax_rate = %app_config.tax_rate,
        "configuration loaded"
    );
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn shop(environment: &str) -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            environment.into(),
        )
    }

    #[test]
    fn defaults_match_shop_policy() {
        let cfg = shop("production");
        assert_eq!(cfg.tax_rate, dec!(0.0875));
        assert_eq!(cfg.invoice_payment_terms_days, 30);
        assert!(!cfg.inventory_allow_negative_stock);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn tax_rate_must_be_a_fraction() {
        let mut cfg = shop("test");
        cfg.tax_rate = dec!(1.5);
        assert!(cfg.validate().is_err());

        cfg.tax_rate = dec!(-0.01);
        assert!(cfg.validate().is_err());

        cfg.tax_rate = Decimal::ZERO;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_environment_and_level_are_rejected() {
        let mut cfg = shop("moon");
        assert!(cfg.validate().is_err());

        cfg.environment = "staging".into();
        cfg.log_level = "chatty".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cors_origins_are_trimmed() {
        let mut cfg = shop("production");
        cfg.cors_allowed_origins = Some(" https://front.garage.test , ,https://admin.garage.test".into());
        assert_eq!(
            cfg.cors_origins(),
            vec!["https://front.garage.test", "https://admin.garage.test"]
        );
        assert!(cfg.check_cross_field().is_ok());
    }

    #[test]
    fn production_needs_origins_or_opt_in() {
        let mut cfg = shop("production");
        assert!(cfg.check_cross_field().is_err());

        cfg.cors_allow_any_origin = true;
        assert!(cfg.check_cross_field().is_ok());

        assert!(shop("development").check_cross_field().is_ok());
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut cfg = shop("development");
        cfg.db_min_connections = 20;
        cfg.db_max_connections = 4;
        assert!(cfg.check_cross_field().is_err());
    }
}
