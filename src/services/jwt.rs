use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Application, User};
use crate::services::ServiceError;

/// Credential signer/verifier. Tokens are signed with an asymmetric
/// private key; verification uses only the public half.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry_minutes: i64,
}

/// Access token claims. The context block is disjoint between user and
/// application subjects; only issuer/subject/validity are shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user or application ID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Claims ID; refresh sessions are bound to this value
    pub jti: String,
    #[serde(flatten)]
    pub context: TokenContext,
}

/// Subject-specific claim schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "token_use", rename_all = "lowercase")]
pub enum TokenContext {
    User {
        /// Resolved effective scopes in `policy:level` form.
        scopes: Vec<String>,
    },
    Application {
        client_id: String,
        grant_types: Vec<String>,
    },
}

/// A signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: AccessTokenClaims,
}

impl TokenSigner {
    /// Create a signer by loading the RSA key pair from the configured
    /// paths. An absent key configuration is a checked, fatal state.
    pub fn new(config: &JwtConfig) -> Result<Self, ServiceError> {
        let private_key_path = config.private_key_path.as_deref().ok_or_else(|| {
            ServiceError::Configuration("signing private key path is not configured".to_string())
        })?;
        let public_key_path = config.public_key_path.as_deref().ok_or_else(|| {
            ServiceError::Configuration("signing public key path is not configured".to_string())
        })?;

        let private_key_pem = fs::read_to_string(private_key_path).map_err(|e| {
            ServiceError::Configuration(format!(
                "failed to read private key from {private_key_path}: {e}"
            ))
        })?;
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| ServiceError::Configuration(format!("failed to parse private key: {e}")))?;

        let public_key_pem = fs::read_to_string(public_key_path).map_err(|e| {
            ServiceError::Configuration(format!(
                "failed to read public key from {public_key_path}: {e}"
            ))
        })?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| ServiceError::Configuration(format!("failed to parse public key: {e}")))?;

        tracing::info!(issuer = %config.issuer, "token signer initialized with RS256 keys");

        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: config.issuer.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        })
    }

    /// Sign a user-context claims payload over the given scope strings.
    pub fn sign_user_token(
        &self,
        user: &User,
        scopes: Vec<String>,
    ) -> Result<SignedToken, ServiceError> {
        self.sign(user.id.to_string(), TokenContext::User { scopes })
    }

    /// Sign an application-context claims payload.
    pub fn sign_application_token(
        &self,
        application: &Application,
    ) -> Result<SignedToken, ServiceError> {
        self.sign(
            application.id.to_string(),
            TokenContext::Application {
                client_id: application.client_id.clone(),
                grant_types: application.grant_types.clone(),
            },
        )
    }

    fn sign(&self, subject: String, context: TokenContext) -> Result<SignedToken, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
            context,
        };

        let header = Header::new(Algorithm::RS256);
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("failed to encode token: {e}")))?;

        Ok(SignedToken { token, claims })
    }

    /// Validate signature and expiry, returning the claims.
    ///
    /// Malformed, forged, and expired tokens all collapse to
    /// `InvalidToken`; the distinction exists only in logs.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let data =
            decode::<AccessTokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                tracing::debug!(error = %e, "access token failed verification");
                ServiceError::InvalidToken
            })?;
        Ok(data.claims)
    }

    /// Signature-only decode used by refresh rotation: the paired access
    /// token has typically expired by the time it is presented again, so
    /// expiry is skipped while the signature check stands.
    pub fn claims_for_rotation(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;

        let data =
            decode::<AccessTokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                tracing::debug!(error = %e, "access token failed signature check during rotation");
                ServiceError::InvalidToken
            })?;
        Ok(data.claims)
    }

    /// Access token validity in seconds, for token responses.
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}
