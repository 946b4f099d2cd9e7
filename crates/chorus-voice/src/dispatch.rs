//! Producers: turn a user command into ready audio and hand it to the queue.
//!
//! Every pre-enqueue failure (validation, synthesis, job polling, download) is
//! reported to the originator as a failed status and no queue entry is created.

use crate::asset::{Asset, AssetOwnership, AssetStore};
use crate::error::{VoiceError, VoiceResult};
use crate::jobs::JobPoller;
use crate::originator::Originator;
use crate::queue::PlaybackQueue;
use crate::render::{validate_accent, validate_language, LocalRenderer};
use crate::request::{GroupId, PlaybackOptions, PlaybackRequest, RequestId};
use crate::status::Phase;
use crate::synthesis::{SynthesisRequest, SynthesisSerializer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Attachment types accepted by `play_upload`.
const UPLOAD_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "opus", "m4a", "flac", "webm"];

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Tempo for rendered or synthesized speech.
    pub speech_tempo: f32,
    /// Retained pre-roll tone.
    pub tone_path: PathBuf,
    /// Extension used for downloaded cloning results.
    pub cloned_extension: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            speech_tempo: 1.2,
            tone_path: PathBuf::from("tritone.mp3"),
            cloned_extension: "mp3".to_string(),
        }
    }
}

pub struct Dispatcher {
    queue: PlaybackQueue,
    assets: AssetStore,
    renderer: Arc<dyn LocalRenderer>,
    synthesis: Option<Arc<SynthesisSerializer>>,
    jobs: Option<Arc<JobPoller>>,
    http: reqwest::Client,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        queue: PlaybackQueue,
        assets: AssetStore,
        renderer: Arc<dyn LocalRenderer>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            queue,
            assets,
            renderer,
            synthesis: None,
            jobs: None,
            // Timeout and size cap are applied per download by the asset store.
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn with_synthesis(mut self, serializer: Arc<SynthesisSerializer>) -> Self {
        self.synthesis = Some(serializer);
        self
    }

    pub fn with_jobs(mut self, poller: Arc<JobPoller>) -> Self {
        self.jobs = Some(poller);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    fn speech_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            tempo: self.settings.speech_tempo,
        }
    }

    /// Render `text` locally and play it, optionally after the pre-roll tone.
    pub async fn speak(
        &self,
        originator: Arc<dyn Originator>,
        group: GroupId,
        lang: &str,
        accent: &str,
        text: &str,
        play_tone: bool,
    ) -> VoiceResult<RequestId> {
        let id = RequestId::new();
        let result = async {
            require_voice_channel(originator.as_ref())?;
            validate_language(lang)?;
            validate_accent(accent)?;
            let tone = if play_tone {
                Some(self.assets.adopt(&self.settings.tone_path, AssetOwnership::Retained)?)
            } else {
                None
            };

            self.queue.status().report(id, &originator, Phase::Generating);
            let speech = self.renderer.render(text, lang, accent).await?;

            let built = PlaybackRequest::with_id(id, group, Arc::clone(&originator), speech.clone())
                .map(|r| r.with_options(self.speech_options()));
            let speech_request = self.request_or_release(built, &speech).await?;
            let mut batch = Vec::with_capacity(2);
            if let Some(tone) = tone {
                let built = PlaybackRequest::new(group, Arc::clone(&originator), tone);
                let tone_request = self.request_or_release(built, &speech).await?;
                batch.push(tone_request.quiet());
            }
            batch.push(speech_request);
            self.queue.enqueue_batch(batch)
        }
        .await;
        self.settle(id, &originator, result)
    }

    /// Render through the stateful synthesis server and play.
    pub async fn speak_synthesized(
        &self,
        originator: Arc<dyn Originator>,
        group: GroupId,
        request: SynthesisRequest,
        send_copy: bool,
    ) -> VoiceResult<RequestId> {
        let id = RequestId::new();
        let result = async {
            require_voice_channel(originator.as_ref())?;
            let serializer = self
                .synthesis
                .as_ref()
                .ok_or_else(|| VoiceError::Config("synthesis server is not configured".to_string()))?;

            self.queue.status().report(id, &originator, Phase::Generating);
            let asset = serializer.synthesize(&request).await?;
            self.finish(id, group, &originator, asset, send_copy).await
        }
        .await;
        self.settle(id, &originator, result)
    }

    /// Submit a cloning job, wait for it, download the result and play it.
    pub async fn speak_cloned(
        &self,
        originator: Arc<dyn Originator>,
        group: GroupId,
        text: &str,
        voice_id: &str,
        send_copy: bool,
    ) -> VoiceResult<RequestId> {
        let id = RequestId::new();
        let result = async {
            require_voice_channel(originator.as_ref())?;
            let poller = self
                .jobs
                .as_ref()
                .ok_or_else(|| VoiceError::Config("voice cloning is not configured".to_string()))?;

            self.queue.status().report(id, &originator, Phase::Generating);
            let mut job = poller.submit(text, voice_id).await?;
            let url = poller.poll_until_terminal(&mut job).await?;

            self.queue.status().report(id, &originator, Phase::Downloading);
            let asset = self
                .assets
                .fetch(&self.http, &url, &self.settings.cloned_extension, AssetOwnership::Temporary)
                .await?;
            self.finish(id, group, &originator, asset, send_copy).await
        }
        .await;
        self.settle(id, &originator, result)
    }

    /// Download an uploaded audio attachment and play it.
    pub async fn play_upload(
        &self,
        originator: Arc<dyn Originator>,
        group: GroupId,
        url: &str,
        filename: &str,
    ) -> VoiceResult<RequestId> {
        let id = RequestId::new();
        let result = async {
            require_voice_channel(originator.as_ref())?;
            let extension = upload_extension(filename)?;

            self.queue.status().report(id, &originator, Phase::Downloading);
            let asset = self
                .assets
                .fetch(&self.http, url, &extension, AssetOwnership::Temporary)
                .await?;
            let built = PlaybackRequest::with_id(id, group, Arc::clone(&originator), asset.clone());
            let request = self.request_or_release(built, &asset).await?;
            self.queue.enqueue(request);
            Ok::<(), VoiceError>(())
        }
        .await;
        self.settle(id, &originator, result)
    }

    async fn finish(
        &self,
        id: RequestId,
        group: GroupId,
        originator: &Arc<dyn Originator>,
        asset: Asset,
        send_copy: bool,
    ) -> VoiceResult<()> {
        if send_copy {
            if let Err(e) = originator.send_file(asset.path(), &asset.display_name()).await {
                warn!(request_id = %id, error = %e, "could not send audio copy");
            }
        }
        let built = PlaybackRequest::with_id(id, group, Arc::clone(originator), asset.clone())
            .map(|r| r.with_options(self.speech_options()));
        let request = self.request_or_release(built, &asset).await?;
        self.queue.enqueue(request);
        Ok(())
    }

    /// Pass a built request through, or release the asset it would have owned.
    async fn request_or_release(
        &self,
        built: VoiceResult<PlaybackRequest>,
        asset: &Asset,
    ) -> VoiceResult<PlaybackRequest> {
        match built {
            Ok(request) => Ok(request),
            Err(e) => {
                self.assets.release(asset).await;
                Err(e)
            }
        }
    }

    fn settle(
        &self,
        id: RequestId,
        originator: &Arc<dyn Originator>,
        result: VoiceResult<()>,
    ) -> VoiceResult<RequestId> {
        match result {
            Ok(()) => {
                info!(request_id = %id, user = originator.id(), "request queued");
                Ok(id)
            }
            Err(e) => {
                warn!(request_id = %id, error = %e, "request rejected before queueing");
                self.queue
                    .status()
                    .report(id, originator, Phase::Failed(e.user_message()));
                Err(e)
            }
        }
    }
}

fn require_voice_channel(originator: &dyn Originator) -> VoiceResult<()> {
    originator
        .voice_channel()
        .map(|_| ())
        .ok_or_else(|| VoiceError::Validation("You need to be in a voice channel!".to_string()))
}

fn upload_extension(filename: &str) -> VoiceResult<String> {
    let ext = std::path::Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(VoiceError::Validation(format!(
            "Unsupported file type. Upload one of: {}",
            UPLOAD_EXTENSIONS.join(", ")
        )))
    }
}
