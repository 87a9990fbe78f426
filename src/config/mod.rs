use serde::Deserialize;
use std::collections::HashMap;
use std::env;

use crate::services::ServiceError;

/// Engine configuration, loaded from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    pub service_name: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub provider_keys: ProviderKeyConfig,
}

/// Signing key and credential lifetime settings. Key paths are optional
/// on purpose: their absence is a valid, checked state that surfaces as a
/// fatal configuration error when a signer is constructed.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub issuer: String,
    pub private_key_path: Option<String>,
    pub public_key_path: Option<String>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub api_key_expiry_days: i64,
}

/// Federated provider key-set settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderKeyConfig {
    /// Provider name → JWKS document URL.
    pub jwks_urls: HashMap<String, String>,
    pub fetch_timeout_seconds: u64,
    pub cache_eviction_minutes: u64,
}

impl AuthzConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        let config = AuthzConfig {
            service_name: get_env("SERVICE_NAME", Some("authz-core"))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            jwt: JwtConfig {
                issuer: get_env("JWT_ISSUER", Some("authz-core"))?,
                private_key_path: env::var("JWT_PRIVATE_KEY_PATH").ok(),
                public_key_path: env::var("JWT_PUBLIC_KEY_PATH").ok(),
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                )?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", Some("7"))?,
                api_key_expiry_days: parse_env("API_KEY_EXPIRY_DAYS", Some("90"))?,
            },
            provider_keys: ProviderKeyConfig {
                jwks_urls: parse_providers(&get_env("PASSPORT_PROVIDERS", Some(""))?)?,
                fetch_timeout_seconds: parse_env("PROVIDER_KEY_FETCH_TIMEOUT_SECONDS", Some("10"))?,
                cache_eviction_minutes: parse_env(
                    "PROVIDER_KEY_CACHE_EVICTION_MINUTES",
                    Some("60"),
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(ServiceError::Configuration(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive".to_string(),
            ));
        }
        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(ServiceError::Configuration(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive".to_string(),
            ));
        }
        if self.jwt.api_key_expiry_days <= 0 {
            return Err(ServiceError::Configuration(
                "API_KEY_EXPIRY_DAYS must be positive".to_string(),
            ));
        }
        if self.provider_keys.fetch_timeout_seconds == 0 {
            return Err(ServiceError::Configuration(
                "PROVIDER_KEY_FETCH_TIMEOUT_SECONDS must be positive".to_string(),
            ));
        }
        if self.provider_keys.cache_eviction_minutes == 0 {
            return Err(ServiceError::Configuration(
                "PROVIDER_KEY_CACHE_EVICTION_MINUTES must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>) -> Result<String, ServiceError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => default.map(|d| d.to_string()).ok_or_else(|| {
            ServiceError::Configuration(format!("{key} is required but not set"))
        }),
    }
}

fn parse_env<T>(key: &str, default: Option<&str>) -> Result<T, ServiceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default)?
        .parse()
        .map_err(|e| ServiceError::Configuration(format!("{key}: {e}")))
}

/// Parse `name=url,name=url` provider declarations.
fn parse_providers(raw: &str) -> Result<HashMap<String, String>, ServiceError> {
    let mut providers = HashMap::new();
    for entry in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let (name, url) = entry.split_once('=').ok_or_else(|| {
            ServiceError::Configuration(format!(
                "PASSPORT_PROVIDERS entry '{entry}' is not name=url"
            ))
        })?;
        providers.insert(name.trim().to_string(), url.trim().to_string());
    }
    Ok(providers)
}
