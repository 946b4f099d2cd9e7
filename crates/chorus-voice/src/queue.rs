//! **Playback Queue & Worker** - per-group FIFO of ready assets and its single consumer.
//!
//! `enqueue` appends and returns at once; the first enqueue into an idle group
//! spawns that group's worker. The worker drains the queue strictly in order, one
//! playback at a time, and exits (marking the group idle) once the queue is empty.
//! No single request can stop the loop: connection errors, playback errors and
//! even panics in a collaborator end that request as `Failed` and the loop moves on.

use crate::asset::AssetStore;
use crate::error::{VoiceError, VoiceResult};
use crate::request::{GroupId, PlaybackRequest};
use crate::session::VoiceSessionManager;
use crate::status::{Phase, StatusReporter};
use dashmap::DashMap;
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct GroupQueue {
    queue: VecDeque<PlaybackRequest>,
    worker_running: bool,
}

/// Queue and worker flag of one group.
#[derive(Default)]
struct GroupPlaybackState {
    inner: Mutex<GroupQueue>,
}

impl GroupPlaybackState {
    fn lock(&self) -> MutexGuard<'_, GroupQueue> {
        // Nothing panics while holding this lock; recover the data if something did.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct QueueInner {
    groups: DashMap<GroupId, Arc<GroupPlaybackState>>,
    sessions: Arc<VoiceSessionManager>,
    status: StatusReporter,
    assets: AssetStore,
}

/// Registry of per-group playback queues.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<QueueInner>,
}

impl PlaybackQueue {
    pub fn new(sessions: Arc<VoiceSessionManager>, status: StatusReporter, assets: AssetStore) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                groups: DashMap::new(),
                sessions,
                status,
                assets,
            }),
        }
    }

    pub fn sessions(&self) -> &Arc<VoiceSessionManager> {
        &self.inner.sessions
    }

    pub fn status(&self) -> &StatusReporter {
        &self.inner.status
    }

    /// Append one request to its group's queue.
    pub fn enqueue(&self, request: PlaybackRequest) {
        let group = request.group_id;
        self.push(group, vec![request]);
    }

    /// Append several requests to one group with nothing interleaved between them.
    pub fn enqueue_batch(&self, requests: Vec<PlaybackRequest>) -> VoiceResult<()> {
        let Some(group) = requests.first().map(|r| r.group_id) else {
            return Ok(());
        };
        if requests.iter().any(|r| r.group_id != group) {
            return Err(VoiceError::Validation(
                "a batch must target a single group".to_string(),
            ));
        }
        self.push(group, requests);
        Ok(())
    }

    fn push(&self, group: GroupId, requests: Vec<PlaybackRequest>) {
        for request in &requests {
            self.inner.status.report_request(request, Phase::Queued);
        }
        let count = requests.len();

        // The entry guard serializes against the registry cleanup in `drain`.
        let entry = self.inner.groups.entry(group).or_default();
        let state = Arc::clone(entry.value());
        let start_worker = {
            let mut q = state.lock();
            q.queue.extend(requests);
            let start = !q.worker_running;
            q.worker_running = true;
            start
        };
        drop(entry);

        debug!(group_id = %group, count, start_worker, "enqueued playback");
        if start_worker {
            let queue = self.clone();
            tokio::spawn(async move { queue.drain(group, state).await });
        }
    }

    /// Requests waiting in a group (not counting the one playing).
    pub fn pending(&self, group: GroupId) -> usize {
        self.inner
            .groups
            .get(&group)
            .map(|s| s.value().lock().queue.len())
            .unwrap_or(0)
    }

    /// Whether a worker is currently draining the group.
    pub fn is_running(&self, group: GroupId) -> bool {
        self.inner
            .groups
            .get(&group)
            .map(|s| s.value().lock().worker_running)
            .unwrap_or(false)
    }

    async fn drain(self, group: GroupId, state: Arc<GroupPlaybackState>) {
        info!(group_id = %group, "playback worker started");
        loop {
            let next = {
                let mut q = state.lock();
                match q.queue.pop_front() {
                    Some(request) => request,
                    None => {
                        q.worker_running = false;
                        break;
                    }
                }
            };
            self.run_one(next).await;
        }
        drop(state);
        // A concurrent enqueue either restarted the worker (state busy) or will
        // create fresh state after this removal.
        self.inner.groups.remove_if(&group, |_, s| {
            let q = s.lock();
            !q.worker_running && q.queue.is_empty()
        });
        info!(group_id = %group, "playback worker idle");
    }

    async fn run_one(&self, request: PlaybackRequest) {
        let outcome = AssertUnwindSafe(self.play(&request)).catch_unwind().await;
        let phase = match outcome {
            Ok(Ok(())) => {
                info!(group_id = %request.group_id, request_id = %request.id, "playback finished");
                Phase::Done
            }
            Ok(Err(e)) => {
                warn!(group_id = %request.group_id, request_id = %request.id, error = %e, "playback failed");
                Phase::Failed(e.user_message())
            }
            Err(_) => {
                error!(group_id = %request.group_id, request_id = %request.id, "playback panicked");
                Phase::Failed(VoiceError::Playback("panic".to_string()).user_message())
            }
        };
        // Released before the terminal status goes out, so an observer of the
        // status never sees a leftover temporary file.
        self.inner.assets.release(&request.asset).await;
        self.inner.status.report_request(&request, phase);
    }

    async fn play(&self, request: &PlaybackRequest) -> VoiceResult<()> {
        let channel = request.originator.voice_channel().ok_or_else(|| {
            VoiceError::Connection("requester is no longer in a voice channel".to_string())
        })?;
        let sessions = &self.inner.sessions;
        let handle = sessions.ensure_connected(request.group_id, channel).await?;

        self.inner.status.report_request(request, Phase::Playing);
        let completion = sessions
            .play(&handle, &request.asset, request.options)
            .await?;
        debug!(group_id = %request.group_id, request_id = %request.id, "playback started");
        match completion.await {
            Ok(result) => result,
            Err(_) => Err(VoiceError::Playback(
                "transport dropped the completion signal".to_string(),
            )),
        }
    }
}
