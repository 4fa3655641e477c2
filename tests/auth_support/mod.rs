#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use copilot_auth::auth::{
    AuthComponents, AuthError, AuthManager, CredentialStore, DeviceCodeBackend, DeviceCodePoll,
    DeviceCodeSession, IdentityVerifier, PrimaryCredential, Principal, ServiceToken,
    ServiceTokenExchanger,
};
use copilot_auth::config::AuthConfig;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub fn credential(raw: &str) -> PrimaryCredential {
    PrimaryCredential::new(raw).expect("non-blank credential")
}

pub fn session(interval: u64, expires_in: u64) -> DeviceCodeSession {
    DeviceCodeSession {
        device_code: "device-code-1".to_string(),
        user_code: "ABCD-EFGH".to_string(),
        verification_uri: "https://github.com/login/device".to_string(),
        expires_in,
        interval,
    }
}

/// A service token expiring `expires_in` seconds from now.
pub fn service_token(name: &str, expires_in: i64, refresh_in: u64) -> ServiceToken {
    ServiceToken {
        token: name.to_string(),
        expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        refresh_in,
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    value: Mutex<Option<PrimaryCredential>>,
    saves: AtomicUsize,
    clears: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(raw: &str) -> Self {
        let store = Self::default();
        *store.value.lock().expect("store lock poisoned") = Some(credential(raw));
        store
    }

    pub fn current(&self) -> Option<String> {
        self.value
            .lock()
            .expect("store lock poisoned")
            .as_ref()
            .map(|c| c.expose().to_string())
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Option<PrimaryCredential> {
        self.value.lock().expect("store lock poisoned").clone()
    }

    fn save(&self, credential: &PrimaryCredential) -> Result<(), AuthError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.value.lock().expect("store lock poisoned") = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        *self.value.lock().expect("store lock poisoned") = None;
        Ok(())
    }
}

/// Device backend replaying scripted poll outcomes; `Pending` once the script
/// runs out.
pub struct ScriptedDeviceBackend {
    session: DeviceCodeSession,
    polls: Mutex<VecDeque<Result<DeviceCodePoll, AuthError>>>,
    request_delay: Duration,
    requests: AtomicUsize,
    poll_times: Mutex<Vec<Instant>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedDeviceBackend {
    pub fn new(session: DeviceCodeSession) -> Self {
        Self {
            session,
            polls: Mutex::new(VecDeque::new()),
            request_delay: Duration::ZERO,
            requests: AtomicUsize::new(0),
            poll_times: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
        }
    }

    /// Authorizes `raw` on the first poll.
    pub fn authorizing(raw: &str) -> Self {
        Self::new(session(5, 900)).with_polls(vec![Ok(DeviceCodePoll::Authorized {
            credential: credential(raw),
        })])
    }

    pub fn with_polls(self, polls: Vec<Result<DeviceCodePoll, AuthError>>) -> Self {
        *self.polls.lock().expect("script lock poisoned") = polls.into();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Fire `token` right after the `poll`-th poll returns.
    pub fn cancel_after_poll(&self, poll: usize, token: CancellationToken) {
        *self.cancel_after.lock().expect("cancel lock poisoned") = Some((poll, token));
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.poll_times.lock().expect("poll lock poisoned").len()
    }

    /// Elapsed (paused-clock) time between consecutive polls.
    pub fn poll_gaps(&self) -> Vec<Duration> {
        let times = self.poll_times.lock().expect("poll lock poisoned");
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

#[async_trait]
impl DeviceCodeBackend for ScriptedDeviceBackend {
    async fn request_device_code(&self) -> Result<DeviceCodeSession, AuthError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
        Ok(self.session.clone())
    }

    async fn poll_device_code(
        &self,
        _session: &DeviceCodeSession,
    ) -> Result<DeviceCodePoll, AuthError> {
        let count = {
            let mut times = self.poll_times.lock().expect("poll lock poisoned");
            times.push(Instant::now());
            times.len()
        };
        let outcome = self
            .polls
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(Ok(DeviceCodePoll::Pending));
        if let Some((after, token)) = self.cancel_after.lock().expect("cancel lock poisoned").as_ref() {
            if *after == count {
                token.cancel();
            }
        }
        outcome
    }
}

/// Accepts a fixed set of credentials as `octocat`.
pub struct FakeVerifier {
    valid: Mutex<HashSet<String>>,
    failure: Option<AuthError>,
    calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn accepting(valid: &[&str]) -> Self {
        Self {
            valid: Mutex::new(valid.iter().map(|v| v.to_string()).collect()),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_with(error: AuthError) -> Self {
        Self {
            valid: Mutex::new(HashSet::new()),
            failure: Some(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, credential: &PrimaryCredential) -> Result<Principal, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if self
            .valid
            .lock()
            .expect("verifier lock poisoned")
            .contains(credential.expose())
        {
            Ok(Principal {
                login: "octocat".to_string(),
                id: Some(1),
                name: None,
            })
        } else {
            Err(AuthError::InvalidCredential("status 401".to_string()))
        }
    }
}

/// Exchanger replaying scripted results, then minting long-lived tokens.
#[derive(Default)]
pub struct ScriptedExchanger {
    responses: Mutex<VecDeque<Result<ServiceToken, AuthError>>>,
    calls: AtomicUsize,
}

impl ScriptedExchanger {
    pub fn new(responses: Vec<Result<ServiceToken, AuthError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceTokenExchanger for ScriptedExchanger {
    async fn exchange(&self, _credential: &PrimaryCredential) -> Result<ServiceToken, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.responses
            .lock()
            .expect("exchanger lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(service_token(&format!("minted-{call}"), 3600, 10_000)))
    }
}

/// Fakes wired into an [`AuthManager`], kept reachable for assertions.
pub struct Harness {
    pub store: Arc<InMemoryCredentialStore>,
    pub device: Arc<ScriptedDeviceBackend>,
    pub verifier: Arc<FakeVerifier>,
    pub exchanger: Arc<ScriptedExchanger>,
    pub presented: Arc<Mutex<Vec<(String, usize)>>>,
}

impl Harness {
    pub fn new(
        store: InMemoryCredentialStore,
        device: ScriptedDeviceBackend,
        verifier: FakeVerifier,
        exchanger: ScriptedExchanger,
    ) -> Self {
        Self {
            store: Arc::new(store),
            device: Arc::new(device),
            verifier: Arc::new(verifier),
            exchanger: Arc::new(exchanger),
            presented: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn manager(&self) -> AuthManager {
        self.manager_with(&AuthConfig::builder().token_path("unused").build())
    }

    pub fn manager_with(&self, config: &AuthConfig) -> AuthManager {
        let presented = self.presented.clone();
        let device = self.device.clone();
        let components = AuthComponents {
            store: self.store.clone(),
            device: self.device.clone(),
            verifier: self.verifier.clone(),
            exchanger: self.exchanger.clone(),
            presenter: Arc::new(move |session: &DeviceCodeSession| {
                presented
                    .lock()
                    .expect("presenter lock poisoned")
                    .push((session.user_code.clone(), device.polls()));
            }),
        };
        AuthManager::with_components(config, components)
    }

    /// User codes shown so far, with the number of polls made before each.
    pub fn presented(&self) -> Vec<(String, usize)> {
        self.presented.lock().expect("presenter lock poisoned").clone()
    }
}
