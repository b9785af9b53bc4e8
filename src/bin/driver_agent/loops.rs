use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::watch;

use taxi_dispatch::client::DispatchClient;
use taxi_dispatch::location::{FailureOutcome, LocationTracker, PositionSource};
use taxi_dispatch::watcher::{NotificationAction, handle_action};

/// Forwards positions while on duty. The first failed update switches the
/// tracker to offline mode with a single warning; later failures stay quiet
/// until an update goes through again.
pub async fn location_loop(
    client: DispatchClient,
    mut source: Box<dyn PositionSource>,
    mut tracker: LocationTracker,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(fix) = tracker.next_to_send(source.next_fix()) else {
                    continue;
                };
                match client.update_location(fix.lat, fix.lng).await {
                    Ok(()) => {
                        if tracker.is_offline() {
                            tracing::info!("location updates restored, leaving offline mode");
                        }
                        tracker.record_success(fix);
                        tracing::debug!(lat = fix.lat, lng = fix.lng, "location sent");
                    }
                    Err(e) => match tracker.record_failure(fix) {
                        FailureOutcome::EnteredOffline => {
                            tracing::warn!(error = %e, "location update failed, offline mode enabled");
                        }
                        FailureOutcome::StillOffline => {
                            tracing::debug!(error = %e, "location update failed while offline");
                        }
                    },
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Polls the driver's pending requests. With `auto_accept` the oldest open
/// request is accepted; losing the race to another driver is logged and the
/// next poll continues normally.
pub async fn request_poller(
    client: DispatchClient,
    interval: Duration,
    auto_accept: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let requests = match client.pending_requests().await {
                    Ok(requests) => requests,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to fetch pending requests");
                        continue;
                    }
                };
                tracing::debug!(count = requests.len(), "pending requests");

                if !auto_accept {
                    continue;
                }
                let Some(request) = requests.first() else {
                    continue;
                };
                let decision = handle_action(&client, NotificationAction::Accept, &request.id).await;
                match decision {
                    Ok(decision) => tracing::info!(
                        trip_id = %decision.trip.id,
                        origin = %decision.trip.origin,
                        destination = %decision.trip.destination,
                        "trip accepted"
                    ),
                    Err(e) if e.status() == Some(StatusCode::CONFLICT) => {
                        tracing::info!(request_id = %request.id, "request taken by another driver");
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept request"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
