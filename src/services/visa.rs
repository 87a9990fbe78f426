//! Federated visa resolution.
//!
//! Passports are externally-signed JWTs carrying embedded visa JWTs. The
//! passport and every visa are verified against the issuing provider's
//! published key set; matched visas map to locally-configured
//! [`VisaPermission`] records and feed the same scope algebra as local
//! grants.

use dashmap::DashMap;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::ProviderKeyConfig;
use crate::models::{Visa, VisaPermission};
use crate::scopes::ScopeSet;
use crate::services::permissions::scope_set_for;
use crate::services::ServiceError;
use crate::store::AuthStore;

/// JWK-set-shaped document published by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderKeySet {
    pub keys: Vec<ProviderKey>,
}

/// A single published key. Only RSA keys are usable here; other key types
/// are carried but never matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderKey {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

impl ProviderKey {
    fn decoding_key(&self) -> Option<DecodingKey> {
        if self.kty != "RSA" {
            return None;
        }
        let (n, e) = (self.n.as_deref()?, self.e.as_deref()?);
        DecodingKey::from_rsa_components(n, e).ok()
    }
}

/// Injected cache of provider key sets.
///
/// Keys are fetched over HTTP with a client-level timeout and trusted only
/// until the next scheduled eviction, so a rotated or compromised provider
/// key cannot be honored indefinitely from stale state.
pub struct ProviderKeyCache {
    client: reqwest::Client,
    jwks_urls: HashMap<String, String>,
    cache: DashMap<String, ProviderKeySet>,
}

impl ProviderKeyCache {
    pub fn new(config: &ProviderKeyConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_seconds))
            .build()
            .map_err(|e| {
                ServiceError::Configuration(format!("failed to build key fetch client: {e}"))
            })?;

        Ok(Self {
            client,
            jwks_urls: config.jwks_urls.clone(),
            cache: DashMap::new(),
        })
    }

    /// Get the key set for a provider, fetching on a cache miss.
    pub async fn key_set(&self, provider: &str) -> Result<ProviderKeySet, ServiceError> {
        if let Some(cached) = self.cache.get(provider) {
            return Ok(cached.clone());
        }

        let url = self
            .jwks_urls
            .get(provider)
            .ok_or_else(|| ServiceError::NotFound(format!("key provider {provider}")))?;

        let set: ProviderKeySet = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::error!(provider, error = %e, "provider key fetch failed");
                ServiceError::Internal(anyhow::anyhow!("provider key fetch failed: {e}"))
            })?
            .json()
            .await
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("provider key set malformed: {e}"))
            })?;

        tracing::info!(provider, keys = set.keys.len(), "provider key set cached");
        self.cache.insert(provider.to_string(), set.clone());
        Ok(set)
    }

    /// Seed a provider's key set directly, bypassing the fetch. Used for
    /// startup warm-up and by tests.
    pub fn prime(&self, provider: &str, set: ProviderKeySet) {
        self.cache.insert(provider.to_string(), set);
    }

    /// Drop every cached key set; the next lookup re-fetches.
    pub fn evict_all(&self) {
        self.cache.clear();
    }

    /// Evict the whole cache on a fixed interval. Failed re-fetches are
    /// retried on the next lookup, never inline.
    pub fn spawn_eviction_task(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                cache.evict_all();
                tracing::debug!("provider key cache evicted");
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct PassportClaims {
    #[serde(default, rename = "ga4gh_passport_v1")]
    visas: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VisaClaims {
    #[serde(rename = "ga4gh_visa_v1")]
    visa: Visa,
}

/// Federated visa resolver.
#[derive(Clone)]
pub struct VisaService {
    store: Arc<dyn AuthStore>,
    keys: Arc<ProviderKeyCache>,
}

impl VisaService {
    pub fn new(store: Arc<dyn AuthStore>, keys: Arc<ProviderKeyCache>) -> Self {
        Self { store, keys }
    }

    /// Resolve the visa permissions a passport carries.
    ///
    /// Key lookup and passport signature failures are fatal (fail closed).
    /// A decode or verification failure of one embedded visa is logged and
    /// swallowed so it cannot deny an otherwise-valid passport; matched
    /// permissions are de-duplicated by id.
    pub async fn resolve_passport_permissions(
        &self,
        passport_token: &str,
        provider: &str,
    ) -> Result<Vec<VisaPermission>, ServiceError> {
        let key_set = self.keys.key_set(provider).await?;

        let passport: PassportClaims =
            verify_against_set(passport_token, &key_set).map_err(|e| {
                tracing::warn!(provider, error = %e, "passport failed verification");
                ServiceError::InvalidToken
            })?;

        let mut matched: HashMap<Uuid, VisaPermission> = HashMap::new();
        for visa_token in &passport.visas {
            let claims: VisaClaims = match verify_against_set(visa_token, &key_set) {
                Ok(claims) => claims,
                Err(e) => {
                    // One bad visa never aborts the rest of the passport.
                    tracing::warn!(provider, error = %e, "skipping unverifiable visa");
                    continue;
                }
            };

            let permissions = self
                .store
                .visa_permissions_for(&claims.visa.visa_type, &claims.visa.value)
                .await?;
            for permission in permissions {
                matched.entry(permission.id).or_insert(permission);
            }
        }

        let mut permissions: Vec<VisaPermission> = matched.into_values().collect();
        permissions.sort_by_key(|p| p.id);
        Ok(permissions)
    }

    /// Resolve a passport straight to a scope set, substituting the
    /// sentinel no-access scope when nothing matched.
    pub async fn resolve_passport_scopes(
        &self,
        passport_token: &str,
        provider: &str,
    ) -> Result<ScopeSet, ServiceError> {
        let permissions = self
            .resolve_passport_permissions(passport_token, provider)
            .await?;
        let scopes = scope_set_for(
            self.store.as_ref(),
            permissions.iter().map(|p| (p.policy_id, p.level)),
        )
        .await?;

        if scopes.is_empty() {
            tracing::debug!(provider, "passport resolved to zero permissions");
            return Ok(ScopeSet::default_scope());
        }
        Ok(scopes)
    }
}

/// Verify a token against a provider key set and deserialize its claims.
///
/// Key selection follows the token's `kid` header; a set with a single
/// key is accepted for tokens that carry no `kid`.
fn verify_against_set<T: serde::de::DeserializeOwned>(
    token: &str,
    key_set: &ProviderKeySet,
) -> Result<T, jsonwebtoken::errors::Error> {
    let header = decode_header(token)?;

    let candidates: Vec<&ProviderKey> = match header.kid.as_deref() {
        Some(kid) => key_set
            .keys
            .iter()
            .filter(|k| k.kid.as_deref() == Some(kid))
            .collect(),
        None if key_set.keys.len() == 1 => key_set.keys.iter().collect(),
        None => Vec::new(),
    };

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;

    let mut last_err =
        jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature);
    for key in candidates {
        let Some(decoding_key) = key.decoding_key() else {
            continue;
        };
        match decode::<serde_json::Value>(token, &decoding_key, &validation) {
            Ok(data) => {
                return serde_json::from_value(data.claims).map_err(|e| {
                    jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::Json(
                        Arc::new(e),
                    ))
                })
            }
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}
