//! **Status Reporter** - surfaces each request's lifecycle phase to its originator.
//!
//! Only the newest phase matters: every request gets a `watch` channel and one
//! forwarder task that pushes the latest value. `report()` never awaits, so a slow
//! chat layer cannot stall the playback worker.

use crate::originator::Originator;
use crate::request::{PlaybackRequest, RequestId};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle phase of a playback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Queued,
    Generating,
    Downloading,
    Playing,
    Done,
    Failed(String),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed(_))
    }

    /// Text shown to the originator.
    pub fn status_text(&self) -> String {
        match self {
            Phase::Queued => "Queued.".to_string(),
            Phase::Generating => "Generating speech...".to_string(),
            Phase::Downloading => "Downloading audio...".to_string(),
            Phase::Playing => "Speaking...".to_string(),
            Phase::Done => "Done playing.".to_string(),
            Phase::Failed(reason) => reason.clone(),
        }
    }
}

struct Tracker {
    tx: watch::Sender<Phase>,
}

/// Latest-wins, fire-and-forget status publisher.
#[derive(Clone)]
pub struct StatusReporter {
    trackers: Arc<DashMap<RequestId, Tracker>>,
    update_timeout: Duration,
}

impl StatusReporter {
    pub fn new(update_timeout: Duration) -> Self {
        Self {
            trackers: Arc::new(DashMap::new()),
            update_timeout,
        }
    }

    /// Report a phase for a queued request. Quiet requests are skipped.
    pub fn report_request(&self, request: &PlaybackRequest, phase: Phase) {
        if request.announce {
            self.report(request.id, &request.originator, phase);
        }
    }

    /// Report a phase. Overwrites any phase not yet delivered; a terminal phase
    /// closes the request's tracker.
    pub fn report(&self, id: RequestId, originator: &Arc<dyn Originator>, phase: Phase) {
        let terminal = phase.is_terminal();
        let entry = self.trackers.entry(id);
        match entry {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                occupied.get().tx.send_replace(phase);
                if terminal {
                    // The forwarder still holds a receiver and sees the final value.
                    occupied.remove();
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(phase);
                if !terminal {
                    vacant.insert(Tracker { tx: tx.clone() });
                }
                tokio::spawn(forward(
                    id,
                    Arc::clone(originator),
                    rx,
                    tx,
                    self.update_timeout,
                ));
            }
        }
    }

    /// Latest phase of an in-flight request (None once terminal or unknown).
    pub fn phase(&self, id: &RequestId) -> Option<Phase> {
        self.trackers.get(id).map(|t| t.tx.borrow().clone())
    }

    /// Number of requests with a non-terminal phase.
    pub fn in_flight(&self) -> usize {
        self.trackers.len()
    }
}

async fn forward(
    id: RequestId,
    originator: Arc<dyn Originator>,
    mut rx: watch::Receiver<Phase>,
    // Keeps the channel open after the tracker entry is removed on a terminal phase.
    _keepalive: watch::Sender<Phase>,
    update_timeout: Duration,
) {
    loop {
        let phase = rx.borrow_and_update().clone();
        let text = phase.status_text();
        match tokio::time::timeout(update_timeout, originator.update_status(&text)).await {
            Ok(Ok(())) => debug!(request_id = %id, status = %text, "status delivered"),
            Ok(Err(e)) => warn!(request_id = %id, error = %e, "status update failed"),
            Err(_) => warn!(request_id = %id, "status update timed out"),
        }
        if phase.is_terminal() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}
