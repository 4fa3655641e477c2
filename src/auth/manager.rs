//! Credential lifecycle orchestration.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use strum::Display;
use tokio_util::sync::CancellationToken;

use super::device_code::{
    DeviceCodeBackend, DeviceCodeSession, DeviceFlowAuthorizer, GitHubDeviceCodeBackend,
};
use super::error::AuthError;
use super::exchange::{CopilotTokenExchanger, ServiceTokenExchanger};
use super::identity::{GitHubIdentityVerifier, IdentityVerifier, Principal};
use super::scheduler::{RefreshErrorCallback, RefreshHandle, RefreshScheduler, RefreshedCallback};
use super::store::{CredentialStore, FileCredentialStore};
use super::token::{PrimaryCredential, ServiceToken};
use crate::config::AuthConfig;

/// Shows the verification URL and user code to whoever must approve the
/// device. Called once per device authorization, before polling starts.
pub type DeviceCodePresenter = Arc<dyn Fn(&DeviceCodeSession) + Send + Sync>;

/// Writes the verification URL and user code to stderr.
pub fn stderr_presenter() -> DeviceCodePresenter {
    Arc::new(|session: &DeviceCodeSession| {
        eprintln!(
            "To authorize, visit {} and enter code {}",
            session.verification_uri, session.user_code
        );
    })
}

/// Collaborators the manager drives. Swap any of them for tests or for a
/// different secret store.
#[derive(Clone)]
pub struct AuthComponents {
    pub store: Arc<dyn CredentialStore>,
    pub device: Arc<dyn DeviceCodeBackend>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub exchanger: Arc<dyn ServiceTokenExchanger>,
    pub presenter: DeviceCodePresenter,
}

impl AuthComponents {
    /// GitHub-backed components sharing one HTTP client, with a file store at
    /// `config.token_path`.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = config.http_client()?;
        Ok(Self {
            store: Arc::new(FileCredentialStore::new(config.token_path.clone())),
            device: Arc::new(GitHubDeviceCodeBackend::with_client(client.clone(), config)),
            verifier: Arc::new(GitHubIdentityVerifier::with_client(client.clone(), config)),
            exchanger: Arc::new(CopilotTokenExchanger::with_client(client, config)),
            presenter: stderr_presenter(),
        })
    }

    pub fn with_presenter(mut self, presenter: DeviceCodePresenter) -> Self {
        self.presenter = presenter;
        self
    }
}

/// Lifecycle phase of an [`AuthManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
}

type InitFuture = Shared<BoxFuture<'static, Result<(), AuthError>>>;

enum Lifecycle {
    Uninitialized,
    Initializing(InitFuture),
    Ready,
}

struct Session {
    credential: PrimaryCredential,
    principal: Principal,
    token: ServiceToken,
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    authorizer: DeviceFlowAuthorizer,
    verifier: Arc<dyn IdentityVerifier>,
    exchanger: Arc<dyn ServiceTokenExchanger>,
    scheduler: RefreshScheduler,
    presenter: DeviceCodePresenter,
    supplied: Option<PrimaryCredential>,
    refresh_buffer: Duration,
    lifecycle: Mutex<Lifecycle>,
    session: RwLock<Option<Session>>,
    refresh: Mutex<Option<RefreshHandle>>,
    cancel: CancellationToken,
}

/// Keeps a Copilot service token valid for the life of the process.
///
/// Construct one per credential file at the composition root and clone the
/// handle to consumers; clones share all state.
///
/// # Example
/// ```no_run
/// use copilot_auth::auth::AuthManager;
/// use copilot_auth::config::AuthConfig;
///
/// # async fn example() -> Result<(), copilot_auth::auth::AuthError> {
/// let manager = AuthManager::new(&AuthConfig::from_env())?;
/// let token = manager.get_token().await?;
/// println!("Copilot API at {}", token.api_base_url());
/// manager.destroy();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<Inner>,
}

impl AuthManager {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self::with_components(config, AuthComponents::from_config(config)?))
    }

    pub fn with_components(config: &AuthConfig, components: AuthComponents) -> Self {
        let supplied = config.github_token.as_deref().and_then(PrimaryCredential::new);
        Self {
            inner: Arc::new(Inner {
                store: components.store,
                authorizer: DeviceFlowAuthorizer::new(components.device),
                verifier: components.verifier,
                scheduler: RefreshScheduler::new(
                    components.exchanger.clone(),
                    config.refresh_lead(),
                ),
                exchanger: components.exchanger,
                presenter: components.presenter,
                supplied,
                refresh_buffer: config.refresh_buffer(),
                lifecycle: Mutex::new(Lifecycle::Uninitialized),
                session: RwLock::new(None),
                refresh: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> ManagerState {
        match &*lock(&self.inner.lifecycle) {
            Lifecycle::Uninitialized => ManagerState::Uninitialized,
            Lifecycle::Initializing(_) => ManagerState::Initializing,
            Lifecycle::Ready => ManagerState::Ready,
        }
    }

    /// Obtain a verified credential and a service token, then arm background
    /// refresh.
    ///
    /// Concurrent callers share a single run and all observe its outcome. On
    /// failure the manager returns to `Uninitialized`, so a later call starts
    /// over.
    pub async fn initialize(&self) -> Result<(), AuthError> {
        let pending = {
            let mut lifecycle = lock(&self.inner.lifecycle);
            match &*lifecycle {
                Lifecycle::Ready => return Ok(()),
                Lifecycle::Initializing(pending) => pending.clone(),
                Lifecycle::Uninitialized => {
                    let inner = Arc::clone(&self.inner);
                    let pending = inner.initialize_once().boxed().shared();
                    *lifecycle = Lifecycle::Initializing(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// A service token with at least the refresh buffer left, refreshing
    /// synchronously when the cached one is too close to expiry.
    pub async fn get_token(&self) -> Result<ServiceToken, AuthError> {
        self.initialize().await?;
        let (credential, cached) = {
            let session = read(&self.inner.session);
            let session = session.as_ref().ok_or(AuthError::TokenUnavailable)?;
            (session.credential.clone(), session.token.clone())
        };
        if !cached.expires_within(self.inner.refresh_buffer) {
            return Ok(cached);
        }

        tracing::debug!(
            remaining_secs = cached.remaining().as_secs(),
            "service token inside refresh buffer, refreshing"
        );
        let fresh = self.inner.exchanger.exchange(&credential).await?;
        self.inner.replace_token(fresh.clone());
        self.inner.arm_refresh(&credential, &fresh);
        Ok(fresh)
    }

    /// The principal verified during initialization.
    pub fn principal(&self) -> Option<Principal> {
        read(&self.inner.session)
            .as_ref()
            .map(|session| session.principal.clone())
    }

    /// The cached service token, without any freshness check.
    pub fn current_token(&self) -> Option<ServiceToken> {
        read(&self.inner.session)
            .as_ref()
            .map(|session| session.token.clone())
    }

    /// Stop background activity: any in-flight device poll ends with
    /// [`AuthError::Cancelled`] and scheduled refresh is cancelled. Stored
    /// and cached credentials are left alone.
    pub fn destroy(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = lock(&self.inner.refresh).take() {
            handle.cancel();
        }
        tracing::debug!("auth manager destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl Inner {
    async fn initialize_once(self: Arc<Self>) -> Result<(), AuthError> {
        let outcome = self.authorize().await;
        let mut lifecycle = lock(&self.lifecycle);
        match &outcome {
            Ok(()) => *lifecycle = Lifecycle::Ready,
            Err(err) => {
                tracing::warn!(error = %err, "initialization failed");
                *lifecycle = Lifecycle::Uninitialized;
            }
        }
        outcome
    }

    async fn authorize(self: &Arc<Self>) -> Result<(), AuthError> {
        let (credential, principal) = self.acquire_credential().await?;
        let token = self.exchanger.exchange(&credential).await?;
        tracing::info!(
            login = %principal.login,
            expires_at = %token.expires_at,
            "authenticated"
        );
        *write(&self.session) = Some(Session {
            credential: credential.clone(),
            principal,
            token: token.clone(),
        });
        self.arm_refresh(&credential, &token);
        Ok(())
    }

    async fn acquire_credential(&self) -> Result<(PrimaryCredential, Principal), AuthError> {
        if let Some(credential) = &self.supplied {
            let principal = self.verifier.verify(credential).await?;
            tracing::debug!(login = %principal.login, "using supplied credential");
            return Ok((credential.clone(), principal));
        }

        if let Some(credential) = self.store.load() {
            match self.verifier.verify(&credential).await {
                Ok(principal) => {
                    tracing::debug!(login = %principal.login, "stored credential verified");
                    return Ok((credential, principal));
                }
                Err(AuthError::InvalidCredential(reason)) => {
                    tracing::warn!(%reason, "stored credential rejected, starting device authorization");
                    self.store.clear()?;
                }
                Err(err) => return Err(err),
            }
        }

        self.authorize_device().await
    }

    async fn authorize_device(&self) -> Result<(PrimaryCredential, Principal), AuthError> {
        if self.cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        let session = self.authorizer.request_device_code().await?;
        (self.presenter)(&session);
        let credential = self
            .authorizer
            .poll_for_token(&session, &self.cancel)
            .await?;
        let principal = self.verifier.verify(&credential).await?;
        self.store.save(&credential)?;
        tracing::info!(login = %principal.login, "device authorization complete");
        Ok((credential, principal))
    }

    fn replace_token(&self, token: ServiceToken) {
        if let Some(session) = write(&self.session).as_mut() {
            session.token = token;
        }
    }

    fn arm_refresh(self: &Arc<Self>, credential: &PrimaryCredential, token: &ServiceToken) {
        let mut slot = lock(&self.refresh);
        if self.cancel.is_cancelled() {
            return;
        }
        let weak = Arc::downgrade(self);
        let on_refreshed: RefreshedCallback = Arc::new(move |token| {
            if let Some(inner) = weak.upgrade() {
                inner.replace_token(token);
            }
        });
        let on_error: RefreshErrorCallback = Arc::new(|err| {
            tracing::warn!(error = %err, "deferring service token refresh to next use");
        });
        let handle = self
            .scheduler
            .arm(credential.clone(), token, on_refreshed, on_error);
        if let Some(previous) = slot.replace(handle) {
            previous.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
