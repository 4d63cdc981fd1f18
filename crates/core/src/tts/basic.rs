use crate::profile::VoiceProfile;
use crate::tts::{check_speed, TtsAudio, TtsClient, TtsError, TtsHandle, TtsProvider, TtsRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::f32::consts::PI;
use std::sync::Arc;

const SAMPLE_RATE_HZ: usize = 22050;
const MS_PER_CHAR: f32 = 60.0;
const MIN_DURATION_MS: f32 = 500.0;
const BASE_FREQ_HZ: f32 = 220.0;

/// Offline tone generator used when no cloud voice is configured.
///
/// Output length follows the text length and the profile speed: slower
/// voices produce longer audio.
#[derive(Clone, Debug, PartialEq)]
pub struct BasicTtsClient {
    speed: f32,
    positive: bool,
}

impl BasicTtsClient {
    pub fn new(speed: f32) -> Self {
        Self {
            speed,
            positive: false,
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }
}

impl Default for BasicTtsClient {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl TtsClient for BasicTtsClient {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            // speed -1.0 stretches to 1.5x, +1.0 compresses to 0.5x
            let stretch = 1.0 - 0.5 * self.speed;
            let chars = request.text.chars().count() as f32;
            let duration_ms = (chars * MS_PER_CHAR).max(MIN_DURATION_MS) * stretch;

            // brighter tone for positive affect
            let freq = if self.positive {
                BASE_FREQ_HZ * 1.25
            } else {
                BASE_FREQ_HZ
            };

            let samples = (duration_ms as usize * SAMPLE_RATE_HZ) / 1000;
            let mut pcm_i16 = Vec::with_capacity(samples);
            for i in 0..samples {
                let t = i as f32 / SAMPLE_RATE_HZ as f32;
                let amplitude = (2.0 * PI * freq * t).sin() * 0.5;
                pcm_i16.push((amplitude * i16::MAX as f32) as i16);
            }

            Ok(TtsAudio {
                sample_rate_hz: SAMPLE_RATE_HZ as u32,
                channels: 1,
                pcm_i16,
            })
        }
        .boxed()
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicTtsProvider;

impl BasicTtsProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TtsProvider for BasicTtsProvider {
    fn build(&self, profile: &VoiceProfile) -> BoxFuture<'_, Result<TtsHandle, TtsError>> {
        let speed = profile.speed();
        let positive = profile
            .affect_tags()
            .iter()
            .any(|tag| tag.starts_with("positivity:high"));
        async move {
            check_speed(speed)?;
            let handle: TtsHandle = Arc::new(BasicTtsClient { speed, positive });
            Ok(handle)
        }
        .boxed()
    }
}
