//! # Chorus Voice - Ordered Voice Playback Orchestration
//!
//! Several producers (local text-to-speech, remote voice-cloning jobs, a stateful
//! synthesis server, direct uploads) race to play audio into shared voice sessions.
//! This crate keeps that orderly: one FIFO queue and one worker per group, one voice
//! session per group, and single-flight access to the synthesis server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │ LocalRenderer│  │  Synthesis   │  │  JobPoller   │  uploads   │
//! │  │  (translate) │  │  Serializer  │  │  (cloning)   │            │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘            │
//! │         └─────────────────┼─────────────────┘                    │
//! │                           ↓                                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐            │
//! │  │  AssetStore  │← │ PlaybackQueue│→ │VoiceSession  │→ transport │
//! │  │  (cleanup)   │  │ (per group)  │  │   Manager    │            │
//! │  └──────────────┘  └──────┬───────┘  └──────────────┘            │
//! │                           ↓                                      │
//! │                    StatusReporter → Originator                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod asset;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod originator;
pub mod queue;
pub mod render;
pub mod request;
pub mod session;
pub mod status;
pub mod synthesis;
pub mod transport;

pub use asset::{Asset, AssetOwnership, AssetStore};
pub use config::{
    AssetConfig, ChorusConfig, CloningConfig, PlaybackConfig, RendererConfig, SynthesisConfig,
};
pub use dispatch::{DispatchSettings, Dispatcher};
pub use error::{VoiceError, VoiceResult};
pub use jobs::{BackendJob, CloningApi, HttpCloningApi, JobPoller, JobStatus};
pub use originator::{AttachmentOriginator, ChatSurface, InteractionOriginator, MessageRef, Originator};
pub use queue::PlaybackQueue;
pub use render::{GoogleTranslateRenderer, LocalRenderer};
pub use request::{ChannelRef, GroupId, PlaybackOptions, PlaybackRequest, RequestId};
pub use session::{ConnectionState, VoiceSessionHandle, VoiceSessionManager};
pub use status::{Phase, StatusReporter};
pub use synthesis::{
    HttpSynthesisServer, RenderParams, SynthesisRequest, SynthesisSerializer, SynthesisServer,
    VoiceProfile,
};
pub use transport::{OccupancyEvent, PlaybackCompletion, VoiceTransport};
