//! Identifiers and the playback request handed from producers to the queue.

use crate::asset::Asset;
use crate::error::{VoiceError, VoiceResult};
use crate::originator::Originator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Channel-group (guild) whose queue and voice session are isolated from all others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Voice channel inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef(pub u64);

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-request output settings passed to the transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Speed multiplier (1.0 = unchanged).
    pub tempo: f32,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self { tempo: 1.0 }
    }
}

/// A ready asset waiting to be played into a group's voice session.
#[derive(Clone)]
pub struct PlaybackRequest {
    pub id: RequestId,
    pub group_id: GroupId,
    pub originator: Arc<dyn Originator>,
    pub asset: Asset,
    pub options: PlaybackOptions,
    /// Whether lifecycle phases are reported to the originator (off for pre-roll tones).
    pub announce: bool,
    pub enqueued_at: DateTime<Utc>,
}

impl PlaybackRequest {
    /// Build a request, rejecting originators that are not in a voice channel.
    pub fn new(
        group_id: GroupId,
        originator: Arc<dyn Originator>,
        asset: Asset,
    ) -> VoiceResult<Self> {
        Self::with_id(RequestId::new(), group_id, originator, asset)
    }

    /// Same as [`PlaybackRequest::new`] but keeps an id the producer already reported under.
    pub fn with_id(
        id: RequestId,
        group_id: GroupId,
        originator: Arc<dyn Originator>,
        asset: Asset,
    ) -> VoiceResult<Self> {
        if originator.voice_channel().is_none() {
            return Err(VoiceError::Validation(
                "You need to be in a voice channel!".to_string(),
            ));
        }
        Ok(Self {
            id,
            group_id,
            originator,
            asset,
            options: PlaybackOptions::default(),
            announce: true,
            enqueued_at: Utc::now(),
        })
    }

    pub fn with_options(mut self, options: PlaybackOptions) -> Self {
        self.options = options;
        self
    }

    /// Play without status updates.
    pub fn quiet(mut self) -> Self {
        self.announce = false;
        self
    }

    pub fn is_temporary(&self) -> bool {
        self.asset.is_temporary()
    }
}

impl fmt::Debug for PlaybackRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackRequest")
            .field("id", &self.id)
            .field("group_id", &self.group_id)
            .field("originator", &self.originator.id())
            .field("asset", &self.asset)
            .field("options", &self.options)
            .field("announce", &self.announce)
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}
