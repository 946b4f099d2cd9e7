//! Originator: the capability set of whoever asked for a playback.
//!
//! A live slash-command interaction and a passive message carrying an audio
//! attachment both implement [`Originator`], so the worker and the status
//! reporter never care which one triggered a request.

use crate::error::VoiceResult;
use crate::request::ChannelRef;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Capabilities the playback core needs from a request's originator.
#[async_trait]
pub trait Originator: Send + Sync {
    /// Voice channel the requesting user currently sits in.
    fn voice_channel(&self) -> Option<ChannelRef>;

    /// Requesting user.
    fn id(&self) -> u64;

    /// Replace the visible status text.
    async fn update_status(&self, text: &str) -> VoiceResult<()>;

    /// Upload a file back to the requester.
    async fn send_file(&self, path: &Path, display_name: &str) -> VoiceResult<()>;
}

/// Message posted by [`ChatSurface::post_message`], addressable for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Text-chat side of the external chat layer.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    async fn edit_interaction_response(&self, token: &str, content: &str) -> VoiceResult<()>;

    async fn post_message(
        &self,
        channel_id: u64,
        reply_to: Option<u64>,
        content: &str,
    ) -> VoiceResult<MessageRef>;

    async fn edit_message(&self, message: MessageRef, content: &str) -> VoiceResult<()>;

    async fn upload_file(&self, channel_id: u64, path: &Path, display_name: &str) -> VoiceResult<()>;
}

/// Slash-command interaction; status edits the deferred response.
pub struct InteractionOriginator {
    surface: Arc<dyn ChatSurface>,
    token: String,
    user_id: u64,
    text_channel: u64,
    voice_channel: Option<ChannelRef>,
}

impl InteractionOriginator {
    pub fn new(
        surface: Arc<dyn ChatSurface>,
        token: impl Into<String>,
        user_id: u64,
        text_channel: u64,
        voice_channel: Option<ChannelRef>,
    ) -> Self {
        Self {
            surface,
            token: token.into(),
            user_id,
            text_channel,
            voice_channel,
        }
    }
}

#[async_trait]
impl Originator for InteractionOriginator {
    fn voice_channel(&self) -> Option<ChannelRef> {
        self.voice_channel
    }

    fn id(&self) -> u64 {
        self.user_id
    }

    async fn update_status(&self, text: &str) -> VoiceResult<()> {
        self.surface.edit_interaction_response(&self.token, text).await
    }

    async fn send_file(&self, path: &Path, display_name: &str) -> VoiceResult<()> {
        self.surface
            .upload_file(self.text_channel, path, display_name)
            .await
    }
}

/// Plain message with an audio attachment. The first status posts a reply,
/// later ones edit it.
pub struct AttachmentOriginator {
    surface: Arc<dyn ChatSurface>,
    user_id: u64,
    channel_id: u64,
    message_id: u64,
    voice_channel: Option<ChannelRef>,
    status_message: Mutex<Option<MessageRef>>,
}

impl AttachmentOriginator {
    pub fn new(
        surface: Arc<dyn ChatSurface>,
        user_id: u64,
        channel_id: u64,
        message_id: u64,
        voice_channel: Option<ChannelRef>,
    ) -> Self {
        Self {
            surface,
            user_id,
            channel_id,
            message_id,
            voice_channel,
            status_message: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Originator for AttachmentOriginator {
    fn voice_channel(&self) -> Option<ChannelRef> {
        self.voice_channel
    }

    fn id(&self) -> u64 {
        self.user_id
    }

    async fn update_status(&self, text: &str) -> VoiceResult<()> {
        // Held across the post so two racing updates cannot create two replies.
        let mut slot = self.status_message.lock().await;
        match *slot {
            Some(msg) => self.surface.edit_message(msg, text).await,
            None => {
                let msg = self
                    .surface
                    .post_message(self.channel_id, Some(self.message_id), text)
                    .await?;
                *slot = Some(msg);
                Ok(())
            }
        }
    }

    async fn send_file(&self, path: &Path, display_name: &str) -> VoiceResult<()> {
        self.surface
            .upload_file(self.channel_id, path, display_name)
            .await
    }
}
