//! Local text-to-speech renderer backed by the Google Translate TTS endpoint.
//!
//! Language and accent are validated up front so bad input is rejected before
//! any request is queued. Long text is split into chunks the endpoint accepts
//! and the returned MP3 segments are concatenated.

use crate::asset::{Asset, AssetOwnership, AssetStore};
use crate::config::RendererConfig;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Longest text the translate endpoint accepts per request.
const MAX_CHUNK_CHARS: usize = 100;

const ACCENTS_DOC_URL: &str = "https://gtts.readthedocs.io/en/latest/module.html#localized-accents";

/// Language codes accepted by the translate TTS endpoint.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("af", "Afrikaans"), ("ar", "Arabic"), ("bg", "Bulgarian"), ("bn", "Bengali"),
    ("bs", "Bosnian"), ("ca", "Catalan"), ("cs", "Czech"), ("cy", "Welsh"),
    ("da", "Danish"), ("de", "German"), ("el", "Greek"), ("en", "English"),
    ("es", "Spanish"), ("et", "Estonian"), ("fi", "Finnish"), ("fr", "French"),
    ("gu", "Gujarati"), ("hi", "Hindi"), ("hr", "Croatian"), ("hu", "Hungarian"),
    ("id", "Indonesian"), ("is", "Icelandic"), ("it", "Italian"), ("iw", "Hebrew"),
    ("ja", "Japanese"), ("jw", "Javanese"), ("km", "Khmer"), ("kn", "Kannada"),
    ("ko", "Korean"), ("la", "Latin"), ("lv", "Latvian"), ("ml", "Malayalam"),
    ("mr", "Marathi"), ("ms", "Malay"), ("my", "Myanmar (Burmese)"), ("ne", "Nepali"),
    ("nl", "Dutch"), ("no", "Norwegian"), ("pl", "Polish"), ("pt", "Portuguese"),
    ("ro", "Romanian"), ("ru", "Russian"), ("si", "Sinhala"), ("sk", "Slovak"),
    ("sq", "Albanian"), ("sr", "Serbian"), ("su", "Sundanese"), ("sv", "Swedish"),
    ("sw", "Swahili"), ("ta", "Tamil"), ("te", "Telugu"), ("th", "Thai"),
    ("tl", "Filipino"), ("tr", "Turkish"), ("uk", "Ukrainian"), ("ur", "Urdu"),
    ("vi", "Vietnamese"), ("zh-CN", "Chinese (Simplified)"), ("zh-TW", "Chinese (Traditional)"),
];

/// Top-level domains that select a regional accent.
pub const SUPPORTED_ACCENTS: &[&str] = &[
    "com", "com.au", "co.uk", "us", "ca", "co.in", "ie", "co.za", "com.ng",
    "fr", "com.br", "pt", "es", "com.mx", "cn", "com.hk", "co.jp", "de", "it",
];

/// Validate a language code (case-insensitive for the region part).
pub fn validate_language(lang: &str) -> VoiceResult<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(lang.trim()))
        .map(|(code, _)| *code)
        .ok_or_else(|| {
            let codes: Vec<&str> = SUPPORTED_LANGUAGES.iter().map(|(c, _)| *c).collect();
            VoiceError::Validation(format!("Language not supported. {}", codes.join(", ")))
        })
}

pub fn validate_accent(accent: &str) -> VoiceResult<&'static str> {
    SUPPORTED_ACCENTS
        .iter()
        .find(|tld| tld.eq_ignore_ascii_case(accent.trim()))
        .copied()
        .ok_or_else(|| VoiceError::Validation(format!("Accent not supported. {}", ACCENTS_DOC_URL)))
}

/// Split text into whitespace-bounded chunks of at most `max` characters.
/// Words longer than `max` are hard-split.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let split_at = word.char_indices().nth(max).map(|(i, _)| i).unwrap_or(word.len());
            chunks.push(word[..split_at].to_string());
            word = &word[split_at..];
        }
        if word.is_empty() {
            continue;
        }
        let separator = usize::from(!current.is_empty());
        let needed = separator + word.chars().count();
        if current.chars().count() + needed > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Renders text to a temporary audio asset.
#[async_trait]
pub trait LocalRenderer: Send + Sync {
    async fn render(&self, text: &str, lang: &str, accent: &str) -> VoiceResult<Asset>;
}

pub struct GoogleTranslateRenderer {
    client: reqwest::Client,
    assets: AssetStore,
}

impl GoogleTranslateRenderer {
    pub fn new(config: &RendererConfig, assets: AssetStore) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, assets })
    }
}

#[async_trait]
impl LocalRenderer for GoogleTranslateRenderer {
    async fn render(&self, text: &str, lang: &str, accent: &str) -> VoiceResult<Asset> {
        let lang = validate_language(lang)?;
        let accent = validate_accent(accent)?;
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(VoiceError::Validation("Nothing to say.".to_string()));
        }

        let url = format!("https://translate.google.{}/translate_tts", accent);
        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let res = self
                .client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", lang),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?;
            audio.extend_from_slice(&res.bytes().await?);
        }
        debug!(lang, accent, chunks = chunks.len(), bytes = audio.len(), "speech rendered");
        self.assets
            .stage_bytes(&audio, "mp3", AssetOwnership::Temporary)
            .await
    }
}
