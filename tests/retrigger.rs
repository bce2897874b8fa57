mod common;

use std::time::Duration;

use common::{config, RecordingSession};
use powerbuddy::power::{retrigger, OnDuration, PowerDispatcher, PowerError};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn cancel_after_first_pass_runs_exactly_once() {
    let cancel = CancellationToken::new();
    // one device = two publishes per pass
    let session = RecordingSession::new().cancel_after(2, cancel.clone());
    let mut dispatcher = PowerDispatcher::new(config(&["cmnd/tent1/POWER"]), session).unwrap();
    dispatcher.start().await.unwrap();

    let passes = retrigger::run(
        &mut dispatcher,
        Duration::from_secs(1),
        OnDuration::new(5.0).unwrap(),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(passes, 1);
    assert_eq!(dispatcher.session().published.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn repeats_until_cancelled() {
    let cancel = CancellationToken::new();
    let session = RecordingSession::new().cancel_after(6, cancel.clone());
    let mut dispatcher = PowerDispatcher::new(config(&["cmnd/tent1/POWER"]), session).unwrap();
    dispatcher.start().await.unwrap();

    let passes = retrigger::run(
        &mut dispatcher,
        Duration::from_secs(60),
        OnDuration::new(30.0).unwrap(),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(passes, 3);
    assert_eq!(dispatcher.session().payload_for("cmnd/tent1/PulseTime"), Some("130"));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_interval_sleep_stops_before_next_pass() {
    let cancel = CancellationToken::new();
    let mut dispatcher =
        PowerDispatcher::new(config(&["cmnd/tent1/POWER"]), RecordingSession::new()).unwrap();
    dispatcher.start().await.unwrap();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let passes = retrigger::run(
        &mut dispatcher,
        Duration::from_secs(1),
        OnDuration::new(5.0).unwrap(),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(passes, 1);
    assert_eq!(dispatcher.session().published.len(), 2);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn already_cancelled_token_runs_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut dispatcher =
        PowerDispatcher::new(config(&["cmnd/tent1/POWER"]), RecordingSession::new()).unwrap();
    dispatcher.start().await.unwrap();

    let passes = retrigger::run(
        &mut dispatcher,
        Duration::from_secs(1),
        OnDuration::new(5.0).unwrap(),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(passes, 0);
    assert_eq!(dispatcher.session().attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn device_failures_do_not_stop_the_loop() {
    let cancel = CancellationToken::new();
    // the failing POWER publish skips its PulseTime, so each pass is one attempt
    let session = RecordingSession::new()
        .failing_on("cmnd/tent1/POWER")
        .cancel_after(2, cancel.clone());
    let mut dispatcher = PowerDispatcher::new(config(&["cmnd/tent1/POWER"]), session).unwrap();
    dispatcher.start().await.unwrap();

    let passes = retrigger::run(
        &mut dispatcher,
        Duration::from_secs(1),
        OnDuration::new(5.0).unwrap(),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(passes, 2);
    assert!(dispatcher.session().published.is_empty());
}

#[tokio::test]
async fn not_connected_ends_the_loop() {
    let mut dispatcher =
        PowerDispatcher::new(config(&["cmnd/tent1/POWER"]), RecordingSession::new()).unwrap();

    let result = retrigger::run(
        &mut dispatcher,
        Duration::from_secs(1),
        OnDuration::new(5.0).unwrap(),
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(PowerError::NotConnected { .. })));
}
