mod dummy;

use crate::tts::TtsAudio;
use futures::future::BoxFuture;

pub use dummy::DummyPlaybackSink;

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    OutputUnavailable { details: String },

    #[error("playback interrupted")]
    Interrupted,
}

/// Destination for synthesized replies.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, audio: TtsAudio) -> BoxFuture<'_, Result<(), PlaybackError>>;
}
