use crate::app_config::{AppConfig, Environment, StockxCredentialConfig};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_owned(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real process environment so it can be tested with a
/// plain `HashMap` lookup.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_owned()))
    };

    let or_default =
        |var: &str, default: &str| -> String { lookup(var).unwrap_or_else(|_| default.to_owned()) };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e))
    };

    let positive_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let value = parse_u32(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero"));
        }
        Ok(value)
    };

    let positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = parse_usize(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero"));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SOLEFLIP_ENV", "development"))?;
    let log_level = or_default("SOLEFLIP_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("SOLEFLIP_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SOLEFLIP_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SOLEFLIP_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let stockx_api_base_url = or_default("STOCKX_API_BASE_URL", "https://api.stockx.com/v2");
    let stockx_auth_url = or_default("STOCKX_AUTH_URL", "https://accounts.stockx.com/oauth/token");
    let stockx_credentials = StockxCredentialConfig {
        client_id: optional("STOCKX_CLIENT_ID"),
        client_secret: optional("STOCKX_CLIENT_SECRET"),
        refresh_token: optional("STOCKX_REFRESH_TOKEN"),
        api_key: optional("STOCKX_API_KEY"),
    };
    let field_encryption_key = optional("FIELD_ENCRYPTION_KEY");

    let http_timeout_secs = parse_u64("SOLEFLIP_HTTP_TIMEOUT_SECS", "30")?;
    let http_connect_timeout_secs = parse_u64("SOLEFLIP_HTTP_CONNECT_TIMEOUT_SECS", "10")?;
    let http_max_connections = positive_usize("SOLEFLIP_HTTP_MAX_CONNECTIONS", "16")?;
    let http_max_idle_per_host = parse_usize("SOLEFLIP_HTTP_MAX_IDLE_PER_HOST", "8")?;
    let http_idle_timeout_secs = parse_u64("SOLEFLIP_HTTP_IDLE_TIMEOUT_SECS", "90")?;
    let http_user_agent = or_default("SOLEFLIP_HTTP_USER_AGENT", "soleflip/0.1 (reseller-sync)");
    let http_max_retries = parse_u32("SOLEFLIP_HTTP_MAX_RETRIES", "3")?;
    let http_backoff_base_ms = parse_u64("SOLEFLIP_HTTP_BACKOFF_BASE_MS", "500")?;

    let rate_limit_capacity = positive_u32("SOLEFLIP_RATE_LIMIT_CAPACITY", "10")?;
    let rate_limit_period_ms = parse_u64("SOLEFLIP_RATE_LIMIT_PERIOD_MS", "1000")?;
    if rate_limit_period_ms == 0 {
        return Err(invalid(
            "SOLEFLIP_RATE_LIMIT_PERIOD_MS",
            "must be greater than zero",
        ));
    }

    let throttle_fallback_wait_secs = parse_u64("SOLEFLIP_THROTTLE_FALLBACK_WAIT_SECS", "60")?;
    let throttle_max_waits = parse_u32("SOLEFLIP_THROTTLE_MAX_WAITS", "10")?;
    let token_refresh_margin_secs = parse_u64("SOLEFLIP_TOKEN_REFRESH_MARGIN_SECS", "60")?;

    let page_size = positive_u32("SOLEFLIP_PAGE_SIZE", "100")?;
    let max_pages = positive_usize("SOLEFLIP_MAX_PAGES", "500")?;

    let import_max_concurrent_batches =
        positive_usize("SOLEFLIP_IMPORT_MAX_CONCURRENT_BATCHES", "2")?;
    let import_abort_error_rate = parse_error_rate(&or_default(
        "SOLEFLIP_IMPORT_ABORT_ERROR_RATE",
        "0.5",
    ))?;
    let import_abort_min_records = parse_u32("SOLEFLIP_IMPORT_ABORT_MIN_RECORDS", "20")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        stockx_api_base_url,
        stockx_auth_url,
        stockx_credentials,
        field_encryption_key,
        http_timeout_secs,
        http_connect_timeout_secs,
        http_max_connections,
        http_max_idle_per_host,
        http_idle_timeout_secs,
        http_user_agent,
        http_max_retries,
        http_backoff_base_ms,
        rate_limit_capacity,
        rate_limit_period_ms,
        throttle_fallback_wait_secs,
        throttle_max_waits,
        token_refresh_margin_secs,
        page_size,
        max_pages,
        import_max_concurrent_batches,
        import_abort_error_rate,
        import_abort_min_records,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "SOLEFLIP_ENV",
            format!("expected development, test, or production; got \"{other}\""),
        )),
    }
}

fn parse_error_rate(raw: &str) -> Result<f64, ConfigError> {
    const VAR: &str = "SOLEFLIP_IMPORT_ABORT_ERROR_RATE";
    let rate = raw.parse::<f64>().map_err(|e| invalid(VAR, e))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(invalid(VAR, "must be between 0.0 and 1.0"));
    }
    Ok(rate)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
