//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, AuthManager, DeviceCodeSession, ManagerState, PrimaryCredential, Principal,
    ServiceToken,
};
pub use crate::config::AuthConfig;
