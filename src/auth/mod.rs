//! Device-flow credential acquisition, storage, exchange, and refresh.

pub mod device_code;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod manager;
pub mod scheduler;
pub mod store;
pub mod token;

pub use device_code::{
    DeviceCodeBackend, DeviceCodePoll, DeviceCodeSession, DeviceFlowAuthorizer,
    GitHubDeviceCodeBackend,
};
pub use error::AuthError;
pub use exchange::{CopilotTokenExchanger, ServiceTokenExchanger};
pub use identity::{GitHubIdentityVerifier, IdentityVerifier, Principal};
pub use manager::{
    stderr_presenter, AuthComponents, AuthManager, DeviceCodePresenter, ManagerState,
};
pub use scheduler::{RefreshErrorCallback, RefreshHandle, RefreshScheduler, RefreshedCallback};
pub use store::{CredentialStore, FileCredentialStore};
pub use token::{PrimaryCredential, ServiceToken};
