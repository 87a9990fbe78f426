pub mod api_key;
pub mod application;
pub mod grant;
pub mod group;
pub mod policy;
pub mod refresh_token;
pub mod user;
pub mod visa;

pub use api_key::ApiKey;
pub use application::Application;
pub use grant::{Grant, GrantOwner, Principal};
pub use group::Group;
pub use policy::Policy;
pub use refresh_token::RefreshToken;
pub use user::{User, UserStatus};
pub use visa::{Visa, VisaPermission};
