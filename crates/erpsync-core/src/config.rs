use crate::app_config::{AppConfig, Environment};
use crate::credentials::ClientCredentials;
use crate::ConfigError;

/// Largest page size the ERP accepts on list endpoints.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Largest accepted token refresh margin: one day.
pub const MAX_TOKEN_REFRESH_MARGIN_SECS: u64 = 86_400;

/// Reads `.env` (if any) into the process environment, then builds the
/// config from it.
///
/// # Errors
///
/// Returns `ConfigError` when a required variable is unset or a value does
/// not parse.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Same as [`load_app_config`] without touching `.env`.
///
/// # Errors
///
/// See [`load_app_config`].
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Builds the config from `lookup`, so tests can pass a map instead of the
/// process environment.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let store_url = require("ERPSYNC_STORE_URL")?
        .trim_end_matches('/')
        .to_string();
    let store_key = require("ERPSYNC_STORE_KEY")?;

    let env = parse_environment(&or_default("ERPSYNC_ENV", "development"))?;
    let log_level = or_default("ERPSYNC_LOG_LEVEL", "info");
    let policy_path = PathBuf::from(or_default("ERPSYNC_POLICY_PATH", "./config/policy.yaml"));
    let erp_base_url = or_default("ERPSYNC_ERP_BASE_URL", "https://www.bling.com.br/Api/v3")
        .trim_end_matches('/')
        .to_string();

    let request_timeout_secs = parse_u64("ERPSYNC_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("ERPSYNC_USER_AGENT", "erpsync/0.1 (erp-sync)");

    let page_size = parse_u32("ERPSYNC_PAGE_SIZE", "100")?;
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::InvalidEnvVar {
            var: "ERPSYNC_PAGE_SIZE".to_string(),
            reason: format!("must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"),
        });
    }

    let inter_page_delay_ms = parse_u64("ERPSYNC_INTER_PAGE_DELAY_MS", "400")?;
    let detail_delay_ms = parse_u64("ERPSYNC_DETAIL_DELAY_MS", "50")?;
    let rate_limit_backoff_ms = parse_u64("ERPSYNC_RATE_LIMIT_BACKOFF_MS", "2000")?;
    let max_rate_limit_retries = parse_u32("ERPSYNC_MAX_RATE_LIMIT_RETRIES", "10")?;
    let network_retry_delay_ms = parse_u64("ERPSYNC_NETWORK_RETRY_DELAY_MS", "5000")?;
    let max_network_retries = parse_u32("ERPSYNC_MAX_NETWORK_RETRIES", "3")?;
    let token_refresh_margin_secs = parse_u64("ERPSYNC_TOKEN_REFRESH_MARGIN_SECS", "600")?;
    if token_refresh_margin_secs > MAX_TOKEN_REFRESH_MARGIN_SECS {
        return Err(ConfigError::InvalidEnvVar {
            var: "ERPSYNC_TOKEN_REFRESH_MARGIN_SECS".to_string(),
            reason: format!(
                "must be at most {MAX_TOKEN_REFRESH_MARGIN_SECS}, got {token_refresh_margin_secs}"
            ),
        });
    }

    Ok(AppConfig {
        store_url,
        store_key,
        env,
        log_level,
        policy_path,
        erp_base_url,
        request_timeout_secs,
        user_agent,
        page_size,
        inter_page_delay_ms,
        detail_delay_ms,
        rate_limit_backoff_ms,
        max_rate_limit_retries,
        network_retry_delay_ms,
        max_network_retries,
        token_refresh_margin_secs,
    })
}

/// OAuth client credentials for `tenant` from
/// `ERPSYNC_CLIENT_ID_<TENANT>` and `ERPSYNC_CLIENT_SECRET_<TENANT>`.
///
/// Returns `None` unless both are set. Used when the credential row in the
/// store does not carry them.
#[must_use]
pub fn client_credentials_from_env(tenant: &str) -> Option<ClientCredentials> {
    client_credentials_with(tenant, |key| std::env::var(key))
}

fn client_credentials_with<F>(tenant: &str, lookup: F) -> Option<ClientCredentials>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let suffix = env_suffix(tenant);
    let read = |prefix: &str| {
        lookup(&format!("{prefix}_{suffix}"))
            .ok()
            .filter(|v| !v.trim().is_empty())
    };
    Some(ClientCredentials {
        client_id: read("ERPSYNC_CLIENT_ID")?,
        client_secret: read("ERPSYNC_CLIENT_SECRET")?,
    })
}

/// `"Casa Modelo"` becomes `CASA_MODELO`.
fn env_suffix(tenant: &str) -> String {
    tenant
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ERPSYNC_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
