//! Periodic retrigger
//!
//! Keeps devices pulsing: calls `power_on` at a fixed interval until the
//! cancellation token fires. Iterations never overlap and an in-flight pass is
//! never interrupted; cancellation is only observed between passes.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::mqtt::mqtt_handler::MessagingSession;

use super::dispatcher::PowerDispatcher;
use super::duration::OnDuration;
use super::error::PowerError;

/// Runs `power_on(duration)` every `interval` until `cancel` is triggered
///
/// Per-device publish failures are logged and the loop keeps going. Errors
/// that would repeat on every pass (not connected) end the loop.
///
/// Returns the number of completed `power_on` passes.
pub async fn run<S: MessagingSession>(
    dispatcher: &mut PowerDispatcher<S>,
    interval: Duration,
    duration: OnDuration,
    cancel: CancellationToken,
) -> Result<u64, PowerError> {
    info!(
        "Retriggering power on for {} every {:?}",
        duration, interval
    );

    let mut passes = 0;
    while !cancel.is_cancelled() {
        match dispatcher.power_on_for(duration).await {
            Ok(()) => debug!("Power on pass {} complete", passes + 1),
            Err(PowerError::Dispatch(failures)) => warn!("Power on pass incomplete: {}", failures),
            Err(e) => return Err(e),
        }
        passes += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Retrigger stopped after {} pass(es)", passes);
    Ok(passes)
}
