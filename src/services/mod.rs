//! Services layer: the access-control resolution and credential
//! lifecycle engine proper.

pub mod error;
pub mod events;
mod jwt;
mod permissions;
mod refresh;
mod tokens;
mod visa;

pub use error::ServiceError;
pub use events::{ApiKeyCleanupRequest, CleanupEventSink, RecordingSink};
pub use jwt::{AccessTokenClaims, SignedToken, TokenContext, TokenSigner};
pub use permissions::PermissionService;
pub use refresh::{RefreshContext, RefreshSessionService};
pub use tokens::{AccessTokenService, IssuedApiKey};
pub use visa::{ProviderKey, ProviderKeyCache, ProviderKeySet, VisaService};
