use crate::playback::{PlaybackError, PlaybackSink};
use crate::tts::TtsAudio;
use futures::future::BoxFuture;
use futures::FutureExt;

const LOG_TARGET: &str = "playback::dummy";

/// Discards audio after logging how long it would have played.
#[derive(Clone, Debug)]
pub struct DummyPlaybackSink;

impl DummyPlaybackSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyPlaybackSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSink for DummyPlaybackSink {
    fn play(&self, audio: TtsAudio) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            tracing::info!(
                target: LOG_TARGET,
                duration_ms = audio.duration().as_millis() as u64,
                sample_rate_hz = audio.sample_rate_hz,
                "discarding synthesized audio"
            );
            Ok(())
        }
        .boxed()
    }
}
