//! **Synthesis Backend Serializer** - single-flight access to a stateful synthesis server.
//!
//! The server keeps one voice model loaded and can only run one
//! "switch model, then infer" sequence at a time. Callers queue on a fair
//! (FIFO) lock; the liveness probe runs before the lock is taken.

use crate::asset::{Asset, AssetOwnership, AssetStore};
use crate::config::SynthesisConfig;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Voice to render with: the model the server must have loaded, plus optional reference prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
}

impl VoiceProfile {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reference_audio: None,
            prompt_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderParams {
    pub language: String,
    pub speed: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            speed: 1.0,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: VoiceProfile,
    pub params: RenderParams,
}

/// The three endpoints of the stateful synthesis server.
#[async_trait]
pub trait SynthesisServer: Send + Sync {
    async fn probe(&self) -> VoiceResult<()>;

    async fn switch_model(&self, model: &str) -> VoiceResult<()>;

    /// Run inference with the currently loaded model; returns encoded audio.
    async fn infer(&self, request: &SynthesisRequest) -> VoiceResult<Vec<u8>>;

    /// File extension of the audio `infer` returns.
    fn audio_extension(&self) -> &str {
        "wav"
    }
}

#[derive(Debug, Default)]
struct BackendState {
    current_model: Option<String>,
}

pub struct SynthesisSerializer {
    server: Arc<dyn SynthesisServer>,
    assets: AssetStore,
    probe_timeout: Duration,
    state: Mutex<BackendState>,
}

impl SynthesisSerializer {
    pub fn new(server: Arc<dyn SynthesisServer>, assets: AssetStore, probe_timeout: Duration) -> Self {
        Self {
            server,
            assets,
            probe_timeout,
            state: Mutex::new(BackendState::default()),
        }
    }

    /// Model the server is believed to have loaded.
    pub async fn current_model(&self) -> Option<String> {
        self.state.lock().await.current_model.clone()
    }

    /// Probe, then (exclusively) switch model if needed and run inference.
    /// The returned asset is temporary.
    #[instrument(skip(self, request), fields(model = %request.voice.model))]
    pub async fn synthesize(&self, request: &SynthesisRequest) -> VoiceResult<Asset> {
        match tokio::time::timeout(self.probe_timeout, self.server.probe()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(VoiceError::BackendUnavailable(e.to_string())),
            Err(_) => {
                return Err(VoiceError::BackendUnavailable(format!(
                    "probe timed out after {:?}",
                    self.probe_timeout
                )))
            }
        }

        let mut state = self.state.lock().await;
        let wanted = &request.voice.model;
        if state.current_model.as_deref() != Some(wanted.as_str()) {
            info!(from = ?state.current_model, to = %wanted, "switching synthesis model");
            if let Err(e) = self.server.switch_model(wanted).await {
                // Server state is unknown after a failed switch.
                state.current_model = None;
                return Err(VoiceError::ModelSwitchFailed {
                    model: wanted.clone(),
                    reason: e.to_string(),
                });
            }
            state.current_model = Some(wanted.clone());
        } else {
            debug!("model already loaded");
        }

        let audio = self
            .server
            .infer(request)
            .await
            .map_err(|e| VoiceError::InferenceFailed(e.to_string()))?;
        if audio.is_empty() {
            warn!("synthesis server returned no audio");
            return Err(VoiceError::InferenceFailed("empty audio".to_string()));
        }
        self.assets
            .stage_bytes(&audio, self.server.audio_extension(), AssetOwnership::Temporary)
            .await
            .map_err(|e| VoiceError::InferenceFailed(format!("could not store audio: {}", e)))
    }
}

/// HTTP client for the synthesis server.
#[derive(Debug, Clone)]
pub struct HttpSynthesisServer {
    config: SynthesisConfig,
    client: reqwest::Client,
}

impl HttpSynthesisServer {
    pub fn new(config: SynthesisConfig) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl SynthesisServer for HttpSynthesisServer {
    async fn probe(&self) -> VoiceResult<()> {
        // Any HTTP answer means the server is up; only transport errors count as down.
        self.client
            .get(self.url(&self.config.probe_path))
            .timeout(self.config.probe_timeout())
            .send()
            .await?;
        Ok(())
    }

    async fn switch_model(&self, model: &str) -> VoiceResult<()> {
        self.client
            .post(self.url(&self.config.model_path))
            .json(&serde_json::json!({ "model": model }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn infer(&self, request: &SynthesisRequest) -> VoiceResult<Vec<u8>> {
        let body = serde_json::json!({
            "text": request.text,
            "text_lang": request.params.language,
            "speed_factor": request.params.speed,
            "temperature": request.params.temperature,
            "ref_audio_path": request.voice.reference_audio,
            "prompt_text": request.voice.prompt_text,
            "media_type": self.config.audio_extension,
        });
        let res = self
            .client
            .post(self.url(&self.config.inference_path))
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(VoiceError::InferenceFailed(format!("{}: {}", status, detail)));
        }
        Ok(res.bytes().await?.to_vec())
    }

    fn audio_extension(&self) -> &str {
        &self.config.audio_extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct ScriptedServer {
        log: StdMutex<Vec<String>>,
        probe_hangs: bool,
        fail_switch: bool,
    }

    #[async_trait]
    impl SynthesisServer for ScriptedServer {
        async fn probe(&self) -> VoiceResult<()> {
            if self.probe_hangs {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(())
        }

        async fn switch_model(&self, model: &str) -> VoiceResult<()> {
            self.log.lock().unwrap().push(format!("switch:{}", model));
            if self.fail_switch {
                return Err(VoiceError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "weights missing",
                )));
            }
            Ok(())
        }

        async fn infer(&self, request: &SynthesisRequest) -> VoiceResult<Vec<u8>> {
            self.log.lock().unwrap().push(format!("infer:{}", request.voice.model));
            Ok(b"RIFF".to_vec())
        }
    }

    fn request(model: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: "hello".into(),
            voice: VoiceProfile::new(model),
            params: RenderParams::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probe_timeout_is_backend_unavailable_without_switch() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(ScriptedServer {
            probe_hangs: true,
            ..Default::default()
        });
        let serializer = SynthesisSerializer::new(
            server.clone(),
            AssetStore::open(dir.path()).unwrap(),
            Duration::from_secs(2),
        );

        let err = serializer.synthesize(&request("alto")).await.unwrap_err();
        assert!(matches!(err, VoiceError::BackendUnavailable(_)));
        assert!(server.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_model_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(ScriptedServer::default());
        let serializer = SynthesisSerializer::new(
            server.clone(),
            AssetStore::open(dir.path()).unwrap(),
            Duration::from_secs(2),
        );

        let first = serializer.synthesize(&request("alto")).await.unwrap();
        let second = serializer.synthesize(&request("alto")).await.unwrap();
        assert!(first.is_temporary());
        assert_ne!(first.path(), second.path());
        assert_eq!(
            *server.log.lock().unwrap(),
            vec!["switch:alto", "infer:alto", "infer:alto"]
        );
        assert_eq!(serializer.current_model().await.as_deref(), Some("alto"));
    }

    #[tokio::test]
    async fn failed_switch_forgets_loaded_model() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(ScriptedServer {
            fail_switch: true,
            ..Default::default()
        });
        let serializer = SynthesisSerializer::new(
            server.clone(),
            AssetStore::open(dir.path()).unwrap(),
            Duration::from_secs(2),
        );

        let err = serializer.synthesize(&request("bass")).await.unwrap_err();
        assert!(matches!(err, VoiceError::ModelSwitchFailed { .. }));
        assert_eq!(serializer.current_model().await, None);
        assert_eq!(*server.log.lock().unwrap(), vec!["switch:bass"]);
    }
}
