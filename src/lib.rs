//! Access control resolution and credential lifecycle engine.
//!
//! The crate computes a principal's effective set of policy-scoped
//! permissions from multiple grant sources (direct grants, group-inherited
//! grants, federated visa grants) and owns the lifecycle of the
//! credentials those permissions are attached to: short-lived signed
//! access tokens, single-use refresh tokens, and long-lived API keys.
//!
//! Transport, SSO choreography, and persistence are collaborators:
//! controllers hand the engine already-identified principals, and storage
//! arrives through the [`store::AuthStore`] seam.

pub mod config;
pub mod models;
pub mod observability;
pub mod scopes;
pub mod services;
pub mod store;

pub use scopes::{AccessLevel, Scope, ScopeSet};
pub use services::ServiceError;
