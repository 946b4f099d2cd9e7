//! Abstract voice-chat transport. The wire protocol lives outside this crate;
//! the core only needs connect / play / disconnect and an occupancy feed.

use crate::error::VoiceResult;
use crate::request::{ChannelRef, GroupId, PlaybackOptions};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::oneshot;

/// Resolves once playback of one asset finishes (Ok) or breaks (Err).
pub type PlaybackCompletion = oneshot::Receiver<VoiceResult<()>>;

/// "Play this encoded audio into this group's session."
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Join a voice channel for the group.
    async fn connect(&self, group: GroupId, channel: ChannelRef) -> VoiceResult<()>;

    /// Start output and return a completion signal.
    async fn play(
        &self,
        group: GroupId,
        asset: &Path,
        options: PlaybackOptions,
    ) -> VoiceResult<PlaybackCompletion>;

    fn is_playing(&self, group: GroupId) -> bool;

    /// Whether the group's session is still attached to a reachable channel.
    fn is_connected(&self, group: GroupId) -> bool;

    async fn disconnect(&self, group: GroupId) -> VoiceResult<()>;
}

/// Voice-channel membership change reported by the voice-chat layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyEvent {
    pub group_id: GroupId,
    pub channel: ChannelRef,
    /// Reachable members left in the channel, not counting our own connection.
    pub members_excluding_self: usize,
}
