//! Background service-token refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::AuthError;
use super::exchange::ServiceTokenExchanger;
use super::token::{PrimaryCredential, ServiceToken};

/// Called with every token minted by a background refresh.
pub type RefreshedCallback = Arc<dyn Fn(ServiceToken) + Send + Sync>;
/// Called once when a background refresh fails; the task then stops.
pub type RefreshErrorCallback = Arc<dyn Fn(AuthError) + Send + Sync>;

/// Arms one-shot refresh tasks that re-arm themselves after each success.
#[derive(Clone)]
pub struct RefreshScheduler {
    exchanger: Arc<dyn ServiceTokenExchanger>,
    lead: Duration,
}

impl RefreshScheduler {
    /// `lead` is how long before the server's suggested refresh point to fire.
    pub fn new(exchanger: Arc<dyn ServiceTokenExchanger>, lead: Duration) -> Self {
        Self { exchanger, lead }
    }

    /// `max(0, refresh_in - lead)`.
    pub fn delay_for(&self, token: &ServiceToken) -> Duration {
        Duration::from_secs(token.refresh_in).saturating_sub(self.lead)
    }

    /// Spawn the refresh task for `token`. Must be called inside a tokio
    /// runtime.
    ///
    /// A failed refresh is reported through `on_error` and is not retried.
    pub fn arm(
        &self,
        credential: PrimaryCredential,
        token: &ServiceToken,
        on_refreshed: RefreshedCallback,
        on_error: RefreshErrorCallback,
    ) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let delay = self.delay_for(token);
        tracing::debug!(delay_secs = delay.as_secs(), "service token refresh armed");
        let task = tokio::spawn(refresh_loop(
            self.clone(),
            credential,
            delay,
            cancel.clone(),
            on_refreshed,
            on_error,
        ));
        RefreshHandle { cancel, task }
    }
}

async fn refresh_loop(
    scheduler: RefreshScheduler,
    credential: PrimaryCredential,
    mut delay: Duration,
    cancel: CancellationToken,
    on_refreshed: RefreshedCallback,
    on_error: RefreshErrorCallback,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        // Timer and cancel can land in the same tick.
        if cancel.is_cancelled() {
            return;
        }

        match scheduler.exchanger.exchange(&credential).await {
            Ok(token) => {
                if cancel.is_cancelled() {
                    return;
                }
                delay = scheduler.delay_for(&token);
                tracing::info!(
                    expires_at = %token.expires_at,
                    next_refresh_secs = delay.as_secs(),
                    "service token refreshed"
                );
                on_refreshed(token);
            }
            Err(err) => {
                tracing::warn!(error = %err, "background token refresh failed");
                on_error(AuthError::RefreshFailure(err.to_string()));
                return;
            }
        }
    }
}

/// Handle to an armed refresh task. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the task has stopped, whether cancelled or after a failure.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
