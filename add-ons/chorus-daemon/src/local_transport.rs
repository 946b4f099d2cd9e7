//! Plays assets on this machine through an external player process.
//!
//! "Connecting" only records which channel a group is attached to; each
//! playback is one child process, killed on disconnect.

use async_trait::async_trait;
use chorus_voice::{
    ChannelRef, GroupId, PlaybackCompletion, PlaybackOptions, VoiceError, VoiceResult,
    VoiceTransport,
};
use dashmap::DashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// ffmpeg's `atempo` filter accepts this range in a single stage.
const TEMPO_RANGE: (f32, f32) = (0.5, 2.0);

pub struct ProcessTransport {
    player: String,
    connected: DashMap<GroupId, ChannelRef>,
    /// Stop handle of the running child, per group.
    playing: DashMap<GroupId, oneshot::Sender<()>>,
}

impl ProcessTransport {
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            connected: DashMap::new(),
            playing: DashMap::new(),
        }
    }

    fn command(&self, asset: &Path, options: PlaybackOptions) -> Command {
        let tempo = options.tempo.clamp(TEMPO_RANGE.0, TEMPO_RANGE.1);
        let mut cmd = Command::new(&self.player);
        cmd.args(["-nodisp", "-autoexit", "-loglevel", "error"]);
        if (tempo - 1.0).abs() > f32::EPSILON {
            cmd.arg("-af").arg(format!("atempo={}", tempo));
        }
        cmd.arg(asset)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl VoiceTransport for ProcessTransport {
    async fn connect(&self, group: GroupId, channel: ChannelRef) -> VoiceResult<()> {
        self.connected.insert(group, channel);
        info!(group_id = %group, channel = %channel, "local output attached");
        Ok(())
    }

    async fn play(
        &self,
        group: GroupId,
        asset: &Path,
        options: PlaybackOptions,
    ) -> VoiceResult<PlaybackCompletion> {
        if !self.connected.contains_key(&group) {
            return Err(VoiceError::Connection(format!("group {} is not attached", group)));
        }
        let mut child = self
            .command(asset, options)
            .spawn()
            .map_err(|e| VoiceError::Playback(format!("could not start {}: {}", self.player, e)))?;
        debug!(group_id = %group, asset = %asset.display(), tempo = options.tempo, "player started");

        let (stop_tx, stop_rx) = oneshot::channel();
        self.playing.insert(group, stop_tx);
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                Ok(()) = stop_rx => None,
            };
            let outcome = match exited {
                Some(Ok(status)) if status.success() => Ok(()),
                Some(Ok(status)) => Err(VoiceError::Playback(format!("player exited with {}", status))),
                Some(Err(e)) => Err(VoiceError::Io(e)),
                None => {
                    if let Err(e) = child.kill().await {
                        warn!(group_id = %group, error = %e, "could not stop player");
                    }
                    Err(VoiceError::Playback("stopped".to_string()))
                }
            };
            let _ = done_tx.send(outcome);
        });
        Ok(done_rx)
    }

    fn is_playing(&self, group: GroupId) -> bool {
        self.playing
            .get(&group)
            .is_some_and(|stop| !stop.is_closed())
    }

    fn is_connected(&self, group: GroupId) -> bool {
        self.connected.contains_key(&group)
    }

    async fn disconnect(&self, group: GroupId) -> VoiceResult<()> {
        if let Some((_, stop)) = self.playing.remove(&group) {
            let _ = stop.send(());
        }
        self.connected.remove(&group);
        info!(group_id = %group, "local output detached");
        Ok(())
    }
}
