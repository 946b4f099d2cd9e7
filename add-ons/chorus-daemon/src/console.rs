//! Terminal stand-in for the chat layer: status text goes to stdout and
//! uploaded files are copied into an outbox directory.

use async_trait::async_trait;
use chorus_voice::{ChatSurface, MessageRef, VoiceError, VoiceResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub struct ConsoleSurface {
    outbox: PathBuf,
    next_message: AtomicU64,
}

impl ConsoleSurface {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
            next_message: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl ChatSurface for ConsoleSurface {
    async fn edit_interaction_response(&self, token: &str, content: &str) -> VoiceResult<()> {
        println!("[{}] {}", token, content);
        Ok(())
    }

    async fn post_message(
        &self,
        channel_id: u64,
        reply_to: Option<u64>,
        content: &str,
    ) -> VoiceResult<MessageRef> {
        let message_id = self.next_message.fetch_add(1, Ordering::Relaxed);
        match reply_to {
            Some(parent) => println!("[#{} msg {} > {}] {}", channel_id, message_id, parent, content),
            None => println!("[#{} msg {}] {}", channel_id, message_id, content),
        }
        Ok(MessageRef {
            channel_id,
            message_id,
        })
    }

    async fn edit_message(&self, message: MessageRef, content: &str) -> VoiceResult<()> {
        println!("[#{} msg {} edited] {}", message.channel_id, message.message_id, content);
        Ok(())
    }

    async fn upload_file(&self, channel_id: u64, path: &Path, display_name: &str) -> VoiceResult<()> {
        let target = self.outbox.join(display_name);
        let delivered = async {
            tokio::fs::create_dir_all(&self.outbox).await?;
            tokio::fs::copy(path, &target).await
        };
        delivered
            .await
            .map_err(|e| VoiceError::Chat(format!("upload of {} failed: {}", display_name, e)))?;
        debug!(channel_id, target = %target.display(), "copy delivered");
        println!("[#{}] sent {}", channel_id, target.display());
        Ok(())
    }
}
