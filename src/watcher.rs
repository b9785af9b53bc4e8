//! Background notification watcher for drivers.
//!
//! Polls the driver's pending requests at a fixed interval, diffs the ids
//! against the previous poll and raises one notification per new request.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::watch;

use crate::client::{ClientResult, DispatchClient};
use crate::models::{PendingRequest, RequestDecisionResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripNotification {
    pub request_id: String,
    pub trip_id: String,
    pub title: String,
    pub body: String,
    pub actions: [NotificationAction; 2],
}

impl TripNotification {
    pub fn for_request(request: &PendingRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            trip_id: request.trip_id.clone(),
            title: "Nueva solicitud de viaje".to_string(),
            body: format!(
                "{} -> {} ({:.2})",
                request.origin, request.destination, request.price
            ),
            actions: [NotificationAction::Accept, NotificationAction::Reject],
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &TripNotification);
}

/// Writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &TripNotification) {
        tracing::info!(
            request_id = %notification.request_id,
            trip_id = %notification.trip_id,
            title = %notification.title,
            "{}",
            notification.body
        );
    }
}

/// Remembers the request ids seen on the previous poll.
#[derive(Debug, Default)]
pub struct RequestWatcher {
    previous: HashSet<String>,
}

impl RequestWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the requests that were not present on the previous poll and
    /// replaces the remembered set with the current ids.
    pub fn diff<'a>(&mut self, current: &'a [PendingRequest]) -> Vec<&'a PendingRequest> {
        let fresh = current
            .iter()
            .filter(|request| !self.previous.contains(&request.id))
            .collect();
        self.previous = current.iter().map(|request| request.id.clone()).collect();
        fresh
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }

    pub fn known(&self) -> usize {
        self.previous.len()
    }
}

/// Runs a notification action against the dispatch API. Interactive
/// notifiers call this when the driver taps an action; the agent's
/// auto-accept mode goes through it as well.
pub async fn handle_action(
    client: &DispatchClient,
    action: NotificationAction,
    request_id: &str,
) -> ClientResult<RequestDecisionResponse> {
    match action {
        NotificationAction::Accept => client.accept_request(request_id).await,
        NotificationAction::Reject => client.reject_request(request_id).await,
    }
}

/// Polls until `shutdown` flips to true. The remembered ids are dropped when
/// the watcher stops, so a restarted watcher notifies every open request again.
pub async fn run_watcher<N: Notifier>(
    client: DispatchClient,
    notifier: N,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut watcher = RequestWatcher::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match client.pending_requests().await {
                    Ok(current) => {
                        for request in watcher.diff(&current) {
                            notifier.notify(&TripNotification::for_request(request));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "watcher poll failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    watcher.reset();
    tracing::info!("notification watcher stopped");
}
