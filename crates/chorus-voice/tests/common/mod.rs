//! Shared fakes for the integration tests: an in-memory voice transport that
//! records every lifecycle event, and an originator that records status text.

#![allow(dead_code)]

use async_trait::async_trait;
use chorus_voice::{
    AssetStore, ChannelRef, GroupId, Originator, PlaybackCompletion, PlaybackOptions,
    PlaybackQueue, StatusReporter, VoiceError, VoiceResult, VoiceSessionManager, VoiceTransport,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct TransportLog {
    events: Vec<String>,
    connected: HashSet<GroupId>,
    outstanding: HashMap<GroupId, usize>,
    max_outstanding: usize,
    refused: HashSet<ChannelRef>,
}

/// Transport that "plays" by sleeping. File names containing `broken` fail
/// during playback; names containing `panic` panic inside `play`.
pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
    play_time: Duration,
}

impl FakeTransport {
    pub fn new(play_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(TransportLog::default())),
            play_time,
        })
    }

    /// Make every connect to `channel` fail.
    pub fn refuse(&self, channel: ChannelRef) {
        self.log.lock().unwrap().refused.insert(channel);
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().events.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Highest number of simultaneous playbacks seen in any one group.
    pub fn max_outstanding(&self) -> usize {
        self.log.lock().unwrap().max_outstanding
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(&self, group: GroupId, channel: ChannelRef) -> VoiceResult<()> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut log = self.log.lock().unwrap();
        if log.refused.contains(&channel) {
            log.events.push(format!("refused:{}", channel));
            return Err(VoiceError::Connection(format!("channel {} is full", channel)));
        }
        log.connected.insert(group);
        log.events.push(format!("connect:{}:{}", group, channel));
        Ok(())
    }

    async fn play(
        &self,
        group: GroupId,
        asset: &Path,
        _options: PlaybackOptions,
    ) -> VoiceResult<PlaybackCompletion> {
        let name = asset
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.contains("panic") {
            panic!("decoder exploded on {}", name);
        }
        {
            let mut log = self.log.lock().unwrap();
            let n = {
                let n = log.outstanding.entry(group).or_insert(0);
                *n += 1;
                *n
            };
            log.max_outstanding = log.max_outstanding.max(n);
            log.events.push(format!("start:{}:{}", group, name));
        }

        let outcome = if name.contains("broken") {
            Err(VoiceError::Playback(format!("corrupt frame in {}", name)))
        } else {
            Ok(())
        };
        let (tx, rx) = oneshot::channel();
        let log = Arc::clone(&self.log);
        let play_time = self.play_time;
        tokio::spawn(async move {
            tokio::time::sleep(play_time).await;
            {
                let mut log = log.lock().unwrap();
                if let Some(n) = log.outstanding.get_mut(&group) {
                    *n -= 1;
                }
                log.events.push(format!("end:{}:{}", group, name));
            }
            let _ = tx.send(outcome);
        });
        Ok(rx)
    }

    fn is_playing(&self, group: GroupId) -> bool {
        self.log
            .lock()
            .unwrap()
            .outstanding
            .get(&group)
            .is_some_and(|n| *n > 0)
    }

    fn is_connected(&self, group: GroupId) -> bool {
        self.log.lock().unwrap().connected.contains(&group)
    }

    async fn disconnect(&self, group: GroupId) -> VoiceResult<()> {
        let mut log = self.log.lock().unwrap();
        log.connected.remove(&group);
        log.events.push(format!("disconnect:{}", group));
        Ok(())
    }
}

/// Originator that records every status text and file it receives.
pub struct RecordingOriginator {
    pub user_id: u64,
    pub channel: Option<ChannelRef>,
    statuses: Mutex<Vec<String>>,
    files: Mutex<Vec<String>>,
}

impl RecordingOriginator {
    pub fn in_channel(user_id: u64, channel: u64) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            channel: Some(ChannelRef(channel)),
            statuses: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
        })
    }

    pub fn outside_voice(user_id: u64) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            channel: None,
            statuses: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
        })
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<String> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub fn files(&self) -> Vec<String> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl Originator for RecordingOriginator {
    fn voice_channel(&self) -> Option<ChannelRef> {
        self.channel
    }

    fn id(&self) -> u64 {
        self.user_id
    }

    async fn update_status(&self, text: &str) -> VoiceResult<()> {
        self.statuses.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_file(&self, _path: &Path, display_name: &str) -> VoiceResult<()> {
        self.files.lock().unwrap().push(display_name.to_string());
        Ok(())
    }
}

/// A queue wired to a fake transport over a throwaway asset directory.
pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub sessions: Arc<VoiceSessionManager>,
    pub queue: PlaybackQueue,
    pub assets: AssetStore,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(play_time: Duration) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetStore::open(dir.path().join("assets")).unwrap();
        let transport = FakeTransport::new(play_time);
        let sessions = Arc::new(VoiceSessionManager::new(transport.clone()));
        let status = StatusReporter::new(Duration::from_secs(1));
        let queue = PlaybackQueue::new(Arc::clone(&sessions), status, assets.clone());
        Self {
            transport,
            sessions,
            queue,
            assets,
            dir,
        }
    }
}

/// Poll `cond` every few milliseconds, failing the test after `limit`.
pub async fn wait_for<F>(limit: Duration, mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {:?}",
            limit
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
