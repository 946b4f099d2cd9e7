//! Chorus console daemon
//!
//! Runs the playback core against the local sound card: commands typed on stdin
//! play through an external player, status lines print to the terminal.

mod commands;
mod console;
mod local_transport;

use anyhow::Context;
use chorus_voice::{
    AssetStore, AttachmentOriginator, ChannelRef, ChatSurface, ChorusConfig, DispatchSettings,
    Dispatcher, GoogleTranslateRenderer, GroupId, HttpCloningApi, HttpSynthesisServer,
    InteractionOriginator, JobPoller, OccupancyEvent, Originator, PlaybackQueue, RenderParams,
    StatusReporter, SynthesisRequest, SynthesisSerializer, VoiceProfile, VoiceSessionManager,
};
use commands::Command;
use console::ConsoleSurface;
use local_transport::ProcessTransport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The console is a single guild with a single user.
const CONSOLE_GROUP: GroupId = GroupId(1);
const CONSOLE_USER: u64 = 1;
const CONSOLE_TEXT_CHANNEL: u64 = 1;
const DEFAULT_VOICE_CHANNEL: u64 = 100;

struct Console {
    dispatcher: Arc<Dispatcher>,
    surface: Arc<dyn ChatSurface>,
    occupancy: mpsc::Sender<OccupancyEvent>,
    default_lang: String,
    default_accent: String,
    voice_channel: Option<ChannelRef>,
    next_token: AtomicU64,
}

impl Console {
    fn interaction(&self) -> Arc<dyn Originator> {
        let token = format!("cmd-{}", self.next_token.fetch_add(1, Ordering::Relaxed));
        Arc::new(InteractionOriginator::new(
            Arc::clone(&self.surface),
            token,
            CONSOLE_USER,
            CONSOLE_TEXT_CHANNEL,
            self.voice_channel,
        ))
    }

    fn attachment(&self) -> Arc<dyn Originator> {
        let message_id = self.next_token.fetch_add(1, Ordering::Relaxed);
        Arc::new(AttachmentOriginator::new(
            Arc::clone(&self.surface),
            CONSOLE_USER,
            CONSOLE_TEXT_CHANNEL,
            message_id,
            self.voice_channel,
        ))
    }

    /// Apply one command. Returns false on `quit`.
    async fn handle(&mut self, command: Command) -> bool {
        let dispatcher = Arc::clone(&self.dispatcher);
        match command {
            Command::Speak { lang, accent, text } => {
                let origin = self.interaction();
                let text = text.join(" ");
                let lang = lang.unwrap_or_else(|| self.default_lang.clone());
                let accent = accent.unwrap_or_else(|| self.default_accent.clone());
                tokio::spawn(async move {
                    let _ = dispatcher
                        .speak(origin, CONSOLE_GROUP, &lang, &accent, &text, false)
                        .await;
                });
            }
            Command::Tone { text } => {
                let origin = self.interaction();
                let text = text.join(" ");
                let (lang, accent) = (self.default_lang.clone(), self.default_accent.clone());
                tokio::spawn(async move {
                    let _ = dispatcher
                        .speak(origin, CONSOLE_GROUP, &lang, &accent, &text, true)
                        .await;
                });
            }
            Command::Synth { model, text } => {
                let origin = self.interaction();
                let request = SynthesisRequest {
                    text: text.join(" "),
                    voice: VoiceProfile::new(model),
                    params: RenderParams {
                        language: self.default_lang.clone(),
                        ..RenderParams::default()
                    },
                };
                tokio::spawn(async move {
                    let _ = dispatcher
                        .speak_synthesized(origin, CONSOLE_GROUP, request, true)
                        .await;
                });
            }
            Command::Cloned { voice_id, text } => {
                let origin = self.interaction();
                let text = text.join(" ");
                tokio::spawn(async move {
                    let _ = dispatcher
                        .speak_cloned(origin, CONSOLE_GROUP, &text, &voice_id, true)
                        .await;
                });
            }
            Command::Play { url } => {
                let origin = self.attachment();
                let filename = url
                    .rsplit('/')
                    .next()
                    .and_then(|name| name.split('?').next())
                    .unwrap_or_default()
                    .to_string();
                tokio::spawn(async move {
                    let _ = dispatcher
                        .play_upload(origin, CONSOLE_GROUP, &url, &filename)
                        .await;
                });
            }
            Command::Join { channel } => {
                self.voice_channel = Some(ChannelRef(channel));
                println!("joined voice channel {}", channel);
            }
            Command::Leave => {
                if let Some(channel) = self.voice_channel.take() {
                    let event = OccupancyEvent {
                        group_id: CONSOLE_GROUP,
                        channel,
                        members_excluding_self: 0,
                    };
                    if self.occupancy.send(event).await.is_err() {
                        tracing::warn!("occupancy watcher is gone");
                    }
                    println!("left voice channel {}", channel);
                } else {
                    println!("not in a voice channel");
                }
            }
            Command::Quit => return false,
        }
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[chorus-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ChorusConfig::load().context("load chorus config")?;
    let player = std::env::var("CHORUS_PLAYER").unwrap_or_else(|_| "ffplay".into());
    let outbox = std::env::var("CHORUS_OUTBOX").unwrap_or_else(|_| "./data/outbox".into());

    let assets = AssetStore::open(&config.assets.staging_dir)
        .context("open asset staging dir")?
        .with_download_limits(config.assets.download_timeout(), config.assets.max_download_bytes);
    let transport = Arc::new(ProcessTransport::new(player.clone()));
    let sessions = Arc::new(VoiceSessionManager::new(transport));
    let (occupancy_tx, occupancy_rx) = mpsc::channel(16);
    let occupancy_task = sessions.watch_occupancy(occupancy_rx);

    let status = StatusReporter::new(config.playback.status_timeout());
    let queue = PlaybackQueue::new(Arc::clone(&sessions), status, assets.clone());
    let renderer = Arc::new(GoogleTranslateRenderer::new(&config.renderer, assets.clone())?);
    let server = Arc::new(HttpSynthesisServer::new(config.synthesis.clone())?);
    let serializer = Arc::new(SynthesisSerializer::new(
        server,
        assets.clone(),
        config.synthesis.probe_timeout(),
    ));

    let mut dispatcher = Dispatcher::new(
        queue,
        assets,
        renderer,
        DispatchSettings {
            speech_tempo: config.playback.speech_tempo,
            tone_path: config.assets.tone_path.clone(),
            cloned_extension: config.cloning.audio_extension.clone(),
        },
    )
    .with_synthesis(serializer);
    if config.cloning.api_key.is_some() {
        let api = Arc::new(HttpCloningApi::new(&config.cloning)?);
        dispatcher = dispatcher.with_jobs(Arc::new(JobPoller::from_config(api, &config.cloning)));
    } else {
        tracing::info!("no cloning api key configured; `clone` is disabled");
    }

    let mut console = Console {
        dispatcher: Arc::new(dispatcher),
        surface: Arc::new(ConsoleSurface::new(outbox)),
        occupancy: occupancy_tx,
        default_lang: config.renderer.default_lang.clone(),
        default_accent: config.renderer.default_accent.clone(),
        voice_channel: Some(ChannelRef(DEFAULT_VOICE_CHANNEL)),
        next_token: AtomicU64::new(1),
    };

    tracing::info!(
        player = %player,
        staging_dir = %config.assets.staging_dir.display(),
        synthesis = %config.synthesis.base_url,
        "Chorus daemon started"
    );
    println!("{}", commands::usage());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match commands::parse(&line) {
                    Ok(command) => {
                        if !console.handle(command).await {
                            break;
                        }
                    }
                    Err(usage) => println!("{}", usage),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down daemon");
                break;
            }
        }
    }

    sessions.disconnect(CONSOLE_GROUP).await?;
    drop(console);
    let _ = occupancy_task.await;
    Ok(())
}
