//! **Voice Session Manager** - one voice session per group.
//!
//! Connects lazily, reuses a live session, and leaves when the channel empties.
//! Every connect and disconnect for a group runs under that group's slot lock, so
//! concurrent `ensure_connected` calls never race into duplicate connections.
//! Callers that queued up behind a failed attempt for the same channel get that
//! attempt's error instead of retrying one after another.

use crate::asset::Asset;
use crate::error::{VoiceError, VoiceResult};
use crate::request::{ChannelRef, GroupId, PlaybackOptions};
use crate::transport::{OccupancyEvent, PlaybackCompletion, VoiceTransport};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

/// Snapshot of a group's voice session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSessionHandle {
    pub group_id: GroupId,
    pub channel: ChannelRef,
    pub state: ConnectionState,
}

#[derive(Default)]
struct SessionSlot {
    /// `attempt << 1 | in_flight`, readable without taking the lock.
    progress: AtomicU64,
    state: Mutex<SlotState>,
}

impl SessionSlot {
    /// The connect attempt a caller arriving now will accept the outcome of.
    fn joinable_attempt(&self) -> u64 {
        let progress = self.progress.load(Ordering::SeqCst);
        let attempt = progress >> 1;
        if progress & 1 == 1 {
            attempt
        } else {
            attempt + 1
        }
    }
}

#[derive(Default)]
struct SlotState {
    handle: Option<VoiceSessionHandle>,
    failure: Option<ConnectFailure>,
}

struct ConnectFailure {
    attempt: u64,
    channel: ChannelRef,
    reason: String,
}

pub struct VoiceSessionManager {
    transport: Arc<dyn VoiceTransport>,
    slots: DashMap<GroupId, Arc<SessionSlot>>,
}

impl VoiceSessionManager {
    pub fn new(transport: Arc<dyn VoiceTransport>) -> Self {
        Self {
            transport,
            slots: DashMap::new(),
        }
    }

    fn slot(&self, group: GroupId) -> Arc<SessionSlot> {
        Arc::clone(self.slots.entry(group).or_default().value())
    }

    /// Return a connected session for the group, connecting if needed.
    ///
    /// A session that is already connected is reused even when `channel` differs.
    pub async fn ensure_connected(
        &self,
        group: GroupId,
        channel: ChannelRef,
    ) -> VoiceResult<VoiceSessionHandle> {
        let slot = self.slot(group);
        let joined = slot.joinable_attempt();
        let mut guard = slot.state.lock().await;

        if let Some(handle) = guard.handle.as_ref() {
            if handle.state == ConnectionState::Connected && self.transport.is_connected(group) {
                debug!(group_id = %group, channel = %handle.channel, "reusing voice session");
                return Ok(handle.clone());
            }
            warn!(group_id = %group, state = ?handle.state, "dropping stale voice session");
        }
        if let Some(failure) = guard.failure.as_ref() {
            if failure.attempt >= joined && failure.channel == channel {
                debug!(group_id = %group, attempt = failure.attempt, "sharing failed connect");
                return Err(VoiceError::Connection(failure.reason.clone()));
            }
        }

        let attempt = (slot.progress.load(Ordering::SeqCst) >> 1) + 1;
        slot.progress.store((attempt << 1) | 1, Ordering::SeqCst);
        guard.handle = Some(VoiceSessionHandle {
            group_id: group,
            channel,
            state: ConnectionState::Connecting,
        });
        let outcome = self.transport.connect(group, channel).await;
        let result = match outcome {
            Ok(()) => {
                let handle = VoiceSessionHandle {
                    group_id: group,
                    channel,
                    state: ConnectionState::Connected,
                };
                guard.handle = Some(handle.clone());
                guard.failure = None;
                info!(group_id = %group, channel = %channel, "voice session connected");
                Ok(handle)
            }
            Err(e) => {
                guard.handle = None;
                warn!(group_id = %group, channel = %channel, error = %e, "voice connect failed");
                let reason = match e {
                    VoiceError::Connection(reason) => reason,
                    other => other.to_string(),
                };
                guard.failure = Some(ConnectFailure {
                    attempt,
                    channel,
                    reason: reason.clone(),
                });
                Err(VoiceError::Connection(reason))
            }
        };
        slot.progress.store(attempt << 1, Ordering::SeqCst);
        result
    }

    /// Start playing an asset through a connected session.
    pub async fn play(
        &self,
        handle: &VoiceSessionHandle,
        asset: &Asset,
        options: PlaybackOptions,
    ) -> VoiceResult<PlaybackCompletion> {
        self.transport
            .play(handle.group_id, asset.path(), options)
            .await
    }

    pub fn is_playing(&self, group: GroupId) -> bool {
        self.transport.is_playing(group)
    }

    /// Leave the group's voice channel. Disconnecting an idle group is a no-op.
    pub async fn disconnect(&self, group: GroupId) -> VoiceResult<()> {
        self.disconnect_where(group, |_| true).await
    }

    /// Feed from the voice-chat layer: leave once nobody but us is left.
    pub async fn on_occupancy_change(&self, event: OccupancyEvent) -> VoiceResult<()> {
        if event.members_excluding_self > 0 {
            return Ok(());
        }
        let channel = event.channel;
        self.disconnect_where(event.group_id, |h| h.channel == channel)
            .await
    }

    /// Drain an occupancy feed until the sender side closes.
    pub fn watch_occupancy(self: &Arc<Self>, mut rx: mpsc::Receiver<OccupancyEvent>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = manager.on_occupancy_change(event).await {
                    warn!(group_id = %event.group_id, error = %e, "disconnect on empty channel failed");
                }
            }
            debug!("occupancy feed closed");
        })
    }

    /// Current handle for a group, if any.
    pub async fn session(&self, group: GroupId) -> Option<VoiceSessionHandle> {
        let slot = self.slots.get(&group).map(|s| Arc::clone(s.value()))?;
        let guard = slot.state.lock().await;
        guard.handle.clone()
    }

    async fn disconnect_where<F>(&self, group: GroupId, matches: F) -> VoiceResult<()>
    where
        F: FnOnce(&VoiceSessionHandle) -> bool,
    {
        let Some(slot) = self.slots.get(&group).map(|s| Arc::clone(s.value())) else {
            return Ok(());
        };
        let result = {
            let mut guard = slot.state.lock().await;
            let matched = guard.handle.as_ref().map(matches).unwrap_or(false);
            if !matched {
                debug!(group_id = %group, "disconnect skipped, no matching session");
                return Ok(());
            }
            if let Some(handle) = guard.handle.as_mut() {
                handle.state = ConnectionState::Disconnecting;
            }
            let result = self.transport.disconnect(group).await;
            // Cleared even on error; the transport session is unusable either way.
            guard.handle = None;
            info!(group_id = %group, "voice session disconnected");
            result
        };
        drop(slot);
        self.forget_idle(group);
        result
    }

    /// Drop an empty slot nobody else is waiting on.
    fn forget_idle(&self, group: GroupId) {
        self.slots.remove_if(&group, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot
                    .state
                    .try_lock()
                    .map(|guard| guard.handle.is_none())
                    .unwrap_or(false)
        });
    }
}
