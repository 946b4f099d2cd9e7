//! End-to-end producer flows: command in, statuses and playback out.

mod common;

use async_trait::async_trait;
use chorus_voice::{
    Asset, AssetOwnership, AssetStore, CloningApi, DispatchSettings, Dispatcher, GroupId,
    JobPoller, JobStatus, LocalRenderer, RenderParams, SynthesisRequest, SynthesisSerializer,
    SynthesisServer, VoiceError, VoiceProfile, VoiceResult,
};
use common::{wait_for, Harness, RecordingOriginator};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(5);

/// Renders every phrase to a small temporary file named after the first word.
struct CannedRenderer {
    assets: AssetStore,
    calls: AtomicUsize,
}

#[async_trait]
impl LocalRenderer for CannedRenderer {
    async fn render(&self, text: &str, _lang: &str, _accent: &str) -> VoiceResult<Asset> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let word = text.split_whitespace().next().unwrap_or("silence");
        let path = self.assets.root().join(format!("{}.mp3", word));
        tokio::fs::write(&path, text.as_bytes()).await?;
        self.assets.adopt(path, AssetOwnership::Temporary)
    }
}

struct OfflineServer;

#[async_trait]
impl SynthesisServer for OfflineServer {
    async fn probe(&self) -> VoiceResult<()> {
        Err(VoiceError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    async fn switch_model(&self, _model: &str) -> VoiceResult<()> {
        unreachable!("probe never succeeds")
    }

    async fn infer(&self, _request: &SynthesisRequest) -> VoiceResult<Vec<u8>> {
        unreachable!("probe never succeeds")
    }
}

struct EchoServer;

#[async_trait]
impl SynthesisServer for EchoServer {
    async fn probe(&self) -> VoiceResult<()> {
        Ok(())
    }

    async fn switch_model(&self, _model: &str) -> VoiceResult<()> {
        Ok(())
    }

    async fn infer(&self, request: &SynthesisRequest) -> VoiceResult<Vec<u8>> {
        Ok(request.text.as_bytes().to_vec())
    }
}

/// Cloning backend whose jobs never finish.
struct StuckCloner {
    polls: AtomicUsize,
}

#[async_trait]
impl CloningApi for StuckCloner {
    async fn submit(&self, _text: &str, _voice_id: &str) -> VoiceResult<String> {
        Ok("job-1".to_string())
    }

    async fn poll_status(&self, _job_token: &str) -> VoiceResult<JobStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(JobStatus::Pending)
    }
}

struct Fixture {
    harness: Harness,
    renderer: Arc<CannedRenderer>,
    tone: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let harness = Harness::new(Duration::from_millis(10));
        let renderer = Arc::new(CannedRenderer {
            assets: harness.assets.clone(),
            calls: AtomicUsize::new(0),
        });
        let tone = harness.dir.path().join("tritone.mp3");
        std::fs::write(&tone, b"tone").unwrap();
        Self {
            harness,
            renderer,
            tone,
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.harness.queue.clone(),
            self.harness.assets.clone(),
            self.renderer.clone(),
            DispatchSettings {
                tone_path: self.tone.clone(),
                ..DispatchSettings::default()
            },
        )
    }

    fn starts(&self) -> Vec<String> {
        self.harness
            .transport
            .events()
            .into_iter()
            .filter(|e| e.starts_with("start:"))
            .collect()
    }
}

#[tokio::test]
async fn speak_plays_tone_then_speech_and_cleans_up() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher();
    let speaker = RecordingOriginator::in_channel(1, 10);

    dispatcher
        .speak(speaker.clone(), GroupId(1), "en", "com", "hello there", true)
        .await
        .unwrap();

    wait_for(LIMIT, || {
        speaker.last_status().as_deref() == Some("Done playing.")
    })
    .await;
    assert_eq!(fx.starts(), vec!["start:1:tritone.mp3", "start:1:hello.mp3"]);
    assert!(fx.tone.exists());
    assert!(!fx.harness.assets.root().join("hello.mp3").exists());
    // The tone is quiet: one terminal status for the whole command.
    let done = speaker
        .statuses()
        .iter()
        .filter(|s| s.as_str() == "Done playing.")
        .count();
    assert_eq!(done, 1);
}

#[tokio::test]
async fn speak_without_voice_channel_is_rejected_before_rendering() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher();
    let lurker = RecordingOriginator::outside_voice(2);

    let err = dispatcher
        .speak(lurker.clone(), GroupId(1), "en", "com", "hello", false)
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::Validation(_)));
    wait_for(LIMIT, || lurker.last_status().is_some()).await;
    assert_eq!(
        lurker.last_status().as_deref(),
        Some("You need to be in a voice channel!")
    );
    assert_eq!(fx.renderer.calls.load(Ordering::SeqCst), 0);
    assert!(!dispatcher.queue().is_running(GroupId(1)));
}

#[tokio::test]
async fn unsupported_language_is_reported() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher();
    let speaker = RecordingOriginator::in_channel(1, 10);

    dispatcher
        .speak(speaker.clone(), GroupId(1), "klingon", "com", "qapla", false)
        .await
        .unwrap_err();
    wait_for(LIMIT, || speaker.last_status().is_some()).await;
    assert!(speaker
        .last_status()
        .unwrap()
        .starts_with("Language not supported."));
    assert_eq!(fx.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn offline_synthesis_server_fails_without_queueing() {
    let fx = Fixture::new();
    let serializer = Arc::new(SynthesisSerializer::new(
        Arc::new(OfflineServer),
        fx.harness.assets.clone(),
        Duration::from_millis(200),
    ));
    let dispatcher = fx.dispatcher().with_synthesis(serializer);
    let speaker = RecordingOriginator::in_channel(1, 10);

    let err = dispatcher
        .speak_synthesized(
            speaker.clone(),
            GroupId(1),
            SynthesisRequest {
                text: "good evening".to_string(),
                voice: VoiceProfile::new("narrator"),
                params: RenderParams::default(),
            },
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::BackendUnavailable(_)));
    wait_for(LIMIT, || {
        speaker.last_status().as_deref()
            == Some("The synthesis server is offline. Try again later.")
    })
    .await;
    assert!(!dispatcher.queue().is_running(GroupId(1)));
    assert!(fx.starts().is_empty());
}

#[tokio::test]
async fn synthesized_speech_is_played_and_a_copy_is_sent() {
    let fx = Fixture::new();
    let serializer = Arc::new(SynthesisSerializer::new(
        Arc::new(EchoServer),
        fx.harness.assets.clone(),
        Duration::from_millis(200),
    ));
    let dispatcher = fx.dispatcher().with_synthesis(serializer);
    let speaker = RecordingOriginator::in_channel(1, 10);

    dispatcher
        .speak_synthesized(
            speaker.clone(),
            GroupId(3),
            SynthesisRequest {
                text: "good evening".to_string(),
                voice: VoiceProfile::new("narrator"),
                params: RenderParams::default(),
            },
            true,
        )
        .await
        .unwrap();

    wait_for(LIMIT, || {
        speaker.last_status().as_deref() == Some("Done playing.")
    })
    .await;
    assert_eq!(speaker.files().len(), 1);
    assert_eq!(fx.starts().len(), 1);
}

#[tokio::test]
async fn cloning_job_that_never_finishes_times_out() {
    let fx = Fixture::new();
    let cloner = Arc::new(StuckCloner {
        polls: AtomicUsize::new(0),
    });
    let poller = Arc::new(JobPoller::new(cloner.clone(), 3, Duration::from_millis(10)));
    let dispatcher = fx.dispatcher().with_jobs(poller);
    let speaker = RecordingOriginator::in_channel(1, 10);

    let err = dispatcher
        .speak_cloned(speaker.clone(), GroupId(1), "hi", "voice-9", false)
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::TimedOut { attempts: 3, .. }));
    assert_eq!(cloner.polls.load(Ordering::SeqCst), 3);
    wait_for(LIMIT, || {
        speaker.last_status().as_deref() == Some("The voice job took too long.")
    })
    .await;
    assert!(fx.starts().is_empty());
}

#[tokio::test]
async fn cloning_without_backend_is_a_config_error() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher();
    let speaker = RecordingOriginator::in_channel(1, 10);

    let err = dispatcher
        .speak_cloned(speaker, GroupId(1), "hi", "voice-9", false)
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::Config(_)));
}

#[tokio::test]
async fn upload_with_unknown_extension_is_rejected() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher();
    let uploader = RecordingOriginator::in_channel(4, 10);

    let err = dispatcher
        .play_upload(
            uploader.clone(),
            GroupId(1),
            "https://cdn.invalid/attachments/notes.txt",
            "notes.txt",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::Validation(_)));
    wait_for(LIMIT, || uploader.last_status().is_some()).await;
    assert!(uploader
        .last_status()
        .unwrap()
        .starts_with("Unsupported file type."));
}
