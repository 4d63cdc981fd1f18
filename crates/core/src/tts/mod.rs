mod basic;
mod cartesia;

use crate::profile::VoiceProfile;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use basic::{BasicTtsClient, BasicTtsProvider};
pub use cartesia::{CartesiaProvider, CartesiaTtsClient, CARTESIA_VERSION, DEFAULT_CARTESIA_BASE_URL};

/// Speeds accepted by synthesis backends.
pub const SPEED_RANGE: std::ops::RangeInclusive<f32> = -1.0..=1.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtsRequest {
    pub text: String,
}

impl TtsRequest {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TtsAudio {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub pcm_i16: Vec<i16>,
}

impl TtsAudio {
    pub fn duration(&self) -> Duration {
        let frames = self.pcm_i16.len() as u64 / u64::from(self.channels.max(1));
        Duration::from_millis(frames * 1000 / u64::from(self.sample_rate_hz.max(1)))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    /// The backend cannot honour the requested voice parameters.
    #[error("unsupported voice configuration: {0}")]
    Configuration(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tts backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("tts error: {0}")]
    Other(String),
}

impl TtsError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TtsError::Http(e) => e.is_timeout() || e.is_connect(),
            TtsError::Status { status, .. } => crate::util::is_http_retryable(*status),
            TtsError::Configuration(_) | TtsError::Other(_) => false,
        }
    }
}

/// A configured synthesis backend. Voice parameters are fixed when the
/// client is built, so a client is replaced rather than reconfigured.
pub trait TtsClient: Send + Sync {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>>;
}

pub type TtsHandle = Arc<dyn TtsClient>;

/// Builds backend handles for a voice profile.
pub trait TtsProvider: Send + Sync {
    fn build(&self, profile: &VoiceProfile) -> BoxFuture<'_, Result<TtsHandle, TtsError>>;
}

pub(crate) fn check_speed(speed: f32) -> Result<(), TtsError> {
    if SPEED_RANGE.contains(&speed) {
        Ok(())
    } else {
        Err(TtsError::Configuration(format!(
            "speed {speed} outside [-1.0, 1.0]"
        )))
    }
}
