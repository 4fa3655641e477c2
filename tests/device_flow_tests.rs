mod auth_support;

use std::sync::Arc;
use std::time::Duration;

use copilot_auth::auth::{AuthError, DeviceCodePoll, DeviceFlowAuthorizer};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use auth_support::{credential, session, ScriptedDeviceBackend};

fn authorizer(backend: &Arc<ScriptedDeviceBackend>) -> DeviceFlowAuthorizer {
    DeviceFlowAuthorizer::new(backend.clone())
}

#[tokio::test(start_paused = true)]
async fn first_poll_runs_immediately_and_returns_credential() {
    let backend = Arc::new(ScriptedDeviceBackend::authorizing("ghu_now"));
    let started = tokio::time::Instant::now();

    let result = authorizer(&backend)
        .poll_for_token(&session(5, 900), &CancellationToken::new())
        .await
        .expect("authorized");

    assert_eq!(result, credential("ghu_now"));
    assert_eq!(backend.polls(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn pending_polls_wait_interval_plus_one() {
    let backend = Arc::new(ScriptedDeviceBackend::new(session(5, 900)).with_polls(vec![
        Ok(DeviceCodePoll::Pending),
        Ok(DeviceCodePoll::Pending),
        Ok(DeviceCodePoll::Authorized {
            credential: credential("ghu_third"),
        }),
    ]));

    let result = authorizer(&backend)
        .poll_for_token(&session(5, 900), &CancellationToken::new())
        .await
        .expect("authorized");

    assert_eq!(result.expose(), "ghu_third");
    assert_eq!(
        backend.poll_gaps(),
        vec![Duration::from_secs(6), Duration::from_secs(6)]
    );
}

#[tokio::test(start_paused = true)]
async fn exhausting_attempts_times_out() {
    let backend = Arc::new(ScriptedDeviceBackend::new(session(5, 30)));

    let err = authorizer(&backend)
        .poll_for_token(&session(5, 30), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Timeout), "got {err:?}");
    assert_eq!(backend.polls(), 5);
}

#[tokio::test(start_paused = true)]
async fn slow_down_doubles_every_later_wait() {
    let backend = Arc::new(ScriptedDeviceBackend::new(session(5, 900)).with_polls(vec![
        Ok(DeviceCodePoll::Pending),
        Ok(DeviceCodePoll::SlowDown),
        Ok(DeviceCodePoll::Pending),
        Ok(DeviceCodePoll::Pending),
        Ok(DeviceCodePoll::Authorized {
            credential: credential("ghu_slow"),
        }),
    ]));

    authorizer(&backend)
        .poll_for_token(&session(5, 900), &CancellationToken::new())
        .await
        .expect("authorized");

    let gaps = backend.poll_gaps();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(6),
            Duration::from_secs(12),
            Duration::from_secs(12),
            Duration::from_secs(12),
        ]
    );
    assert!(gaps[1] >= gaps[0] * 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_slow_down_keeps_doubling() {
    let backend = Arc::new(ScriptedDeviceBackend::new(session(1, 900)).with_polls(vec![
        Ok(DeviceCodePoll::SlowDown),
        Ok(DeviceCodePoll::SlowDown),
        Ok(DeviceCodePoll::Authorized {
            credential: credential("ghu_slower"),
        }),
    ]));

    authorizer(&backend)
        .poll_for_token(&session(1, 900), &CancellationToken::new())
        .await
        .expect("authorized");

    assert_eq!(
        backend.poll_gaps(),
        vec![Duration::from_secs(4), Duration::from_secs(8)]
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_between_polls_skips_next_request() {
    let backend = Arc::new(ScriptedDeviceBackend::new(session(5, 900)));
    let cancel = CancellationToken::new();
    backend.cancel_after_poll(2, cancel.clone());

    let err = authorizer(&backend)
        .poll_for_token(&session(5, 900), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Cancelled), "got {err:?}");
    assert_eq!(backend.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_wait() {
    let backend = Arc::new(ScriptedDeviceBackend::new(session(600, 3600)));
    let cancel = CancellationToken::new();
    let started = tokio::time::Instant::now();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        trigger.cancel();
    });

    let err = authorizer(&backend)
        .poll_for_token(&session(600, 3600), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Cancelled));
    assert_eq!(backend.polls(), 1);
    assert!(started.elapsed() < Duration::from_secs(601));
}

#[tokio::test(start_paused = true)]
async fn already_cancelled_makes_no_request() {
    let backend = Arc::new(ScriptedDeviceBackend::authorizing("ghu_never"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = authorizer(&backend)
        .poll_for_token(&session(5, 900), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Cancelled));
    assert_eq!(backend.polls(), 0);
}

async fn poll_until_terminal(outcome: DeviceCodePoll) -> (AuthError, usize) {
    let backend = Arc::new(
        ScriptedDeviceBackend::new(session(5, 900))
            .with_polls(vec![Ok(DeviceCodePoll::Pending), Ok(outcome)]),
    );
    let err = authorizer(&backend)
        .poll_for_token(&session(5, 900), &CancellationToken::new())
        .await
        .unwrap_err();
    (err, backend.polls())
}

#[tokio::test(start_paused = true)]
async fn expired_token_stops_polling() {
    let (err, polls) = poll_until_terminal(DeviceCodePoll::Expired).await;
    assert!(matches!(err, AuthError::Expired), "got {err:?}");
    assert_eq!(polls, 2);
}

#[tokio::test(start_paused = true)]
async fn access_denied_stops_polling() {
    let (err, polls) = poll_until_terminal(DeviceCodePoll::AccessDenied).await;
    assert!(matches!(err, AuthError::Denied), "got {err:?}");
    assert_eq!(polls, 2);
}

#[tokio::test(start_paused = true)]
async fn protocol_errors_propagate_without_retry() {
    let backend = Arc::new(
        ScriptedDeviceBackend::new(session(5, 900))
            .with_polls(vec![Err(AuthError::Protocol("unsupported_grant_type".into()))]),
    );

    let err = authorizer(&backend)
        .poll_for_token(&session(5, 900), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Protocol(msg) if msg == "unsupported_grant_type"));
    assert_eq!(backend.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn request_device_code_delegates_to_backend() {
    let backend = Arc::new(ScriptedDeviceBackend::new(session(7, 120)));

    let issued = authorizer(&backend)
        .request_device_code()
        .await
        .expect("device code");

    assert_eq!(issued, session(7, 120));
    assert_eq!(backend.requests(), 1);
}
