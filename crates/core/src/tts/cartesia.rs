use crate::config::CartesiaConfig;
use crate::profile::VoiceProfile;
use crate::tts::{check_speed, TtsAudio, TtsClient, TtsError, TtsHandle, TtsProvider, TtsRequest};
use crate::util::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_CARTESIA_BASE_URL: &str = "https://api.cartesia.ai";
pub const CARTESIA_VERSION: &str = "2024-06-10";

const LOG_TARGET: &str = "tts::cartesia";
const SAMPLE_RATE_HZ: u32 = 24_000;
const EMOTION_NAMES: [&str; 5] = ["anger", "positivity", "surprise", "sadness", "curiosity"];
const EMOTION_LEVELS: [&str; 4] = ["lowest", "low", "high", "highest"];

/// Builds [`CartesiaTtsClient`]s, one per voice profile.
#[derive(Clone)]
pub struct CartesiaProvider {
    client: Client,
    config: CartesiaConfig,
    base_url: String,
    retry: RetryConfig,
}

impl CartesiaProvider {
    pub fn new(config: CartesiaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            base_url: DEFAULT_CARTESIA_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Builds a client without boxing, for callers that want the concrete type.
    pub fn client_for(&self, profile: &VoiceProfile) -> Result<CartesiaTtsClient, TtsError> {
        check_speed(profile.speed())?;
        for tag in profile.affect_tags() {
            check_affect_tag(tag)?;
        }
        Ok(CartesiaTtsClient {
            client: self.client.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            retry: self.retry.clone(),
            speed: profile.speed(),
            affect_tags: profile.affect_tags().to_vec(),
        })
    }
}

impl TtsProvider for CartesiaProvider {
    fn build(&self, profile: &VoiceProfile) -> BoxFuture<'_, Result<TtsHandle, TtsError>> {
        let built = self.client_for(profile);
        async move {
            let client = built?;
            tracing::info!(
                target: LOG_TARGET,
                speed = client.speed,
                affect_tags = ?client.affect_tags,
                "cartesia voice configured"
            );
            let handle: TtsHandle = Arc::new(client);
            Ok(handle)
        }
        .boxed()
    }
}

/// Accepts `name` or `name:level` with Cartesia's emotion vocabulary.
fn check_affect_tag(tag: &str) -> Result<(), TtsError> {
    let (name, level) = match tag.split_once(':') {
        Some((name, level)) => (name, Some(level)),
        None => (tag, None),
    };
    let known_name = EMOTION_NAMES.contains(&name);
    let known_level = level.iter().all(|l| EMOTION_LEVELS.contains(l));
    if known_name && known_level {
        Ok(())
    } else {
        Err(TtsError::Configuration(format!("unknown affect tag {tag:?}")))
    }
}

#[derive(Clone)]
pub struct CartesiaTtsClient {
    client: Client,
    config: CartesiaConfig,
    base_url: String,
    retry: RetryConfig,
    speed: f32,
    affect_tags: Vec<String>,
}

#[derive(Serialize)]
struct CartesiaRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: CartesiaVoice<'a>,
    output_format: OutputFormat,
    language: &'a str,
}

#[derive(Serialize)]
struct CartesiaVoice<'a> {
    mode: &'static str,
    id: &'a str,
    #[serde(rename = "__experimental_controls", skip_serializing_if = "Option::is_none")]
    controls: Option<VoiceControls<'a>>,
}

#[derive(Serialize)]
struct VoiceControls<'a> {
    speed: f32,
    #[serde(skip_serializing_if = "no_tags")]
    emotion: &'a [String],
}

fn no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}

#[derive(Serialize)]
struct OutputFormat {
    container: &'static str,
    encoding: &'static str,
    sample_rate: u32,
}

impl CartesiaTtsClient {
    fn request_body<'a>(&'a self, text: &'a str) -> CartesiaRequest<'a> {
        // vendor defaults apply when nothing is adjusted
        let controls = if self.speed == 0.0 && self.affect_tags.is_empty() {
            None
        } else {
            Some(VoiceControls {
                speed: self.speed,
                emotion: &self.affect_tags,
            })
        };

        CartesiaRequest {
            model_id: &self.config.model,
            transcript: text,
            voice: CartesiaVoice {
                mode: "id",
                id: &self.config.voice_id,
                controls,
            },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_s16le",
                sample_rate: SAMPLE_RATE_HZ,
            },
            language: &self.config.language,
        }
    }

    async fn post_once(&self, text: &str) -> Result<Vec<i16>, TtsError> {
        let url = format!("{}/tts/bytes", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-API-Key", self.config.api_key.expose())
            .header("Cartesia-Version", CARTESIA_VERSION)
            .json(&self.request_body(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(decode_pcm_s16le(&bytes))
    }
}

impl TtsClient for CartesiaTtsClient {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            let client = self;
            let text = request.text.as_str();
            let pcm_i16 = retry_with_backoff(
                &self.retry,
                move || client.post_once(text),
                TtsError::is_retryable,
            )
            .await?;

            tracing::debug!(
                target: LOG_TARGET,
                samples = pcm_i16.len(),
                "cartesia synthesis complete"
            );

            Ok(TtsAudio {
                sample_rate_hz: SAMPLE_RATE_HZ,
                channels: 1,
                pcm_i16,
            })
        }
        .boxed()
    }
}

/// Little-endian 16-bit PCM; a trailing odd byte is dropped.
fn decode_pcm_s16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;

    fn provider() -> CartesiaProvider {
        let config = CartesiaConfig::new(
            ApiKey::new("test-key").unwrap(),
            "sonic-2".into(),
            "voice-123".into(),
            "es".into(),
        )
        .unwrap();
        CartesiaProvider::new(config).with_retry(RetryConfig::none())
    }

    #[test]
    fn adapted_voice_serializes_controls() {
        let profile = VoiceProfile::new(
            -0.5,
            vec!["positivity:high".into(), "sadness:low".into()],
            "test",
        );
        let client = provider().client_for(&profile).unwrap();
        let body = serde_json::to_value(client.request_body("hola")).unwrap();

        assert_eq!(body["model_id"], "sonic-2");
        assert_eq!(body["transcript"], "hola");
        assert_eq!(body["language"], "es");
        assert_eq!(body["voice"]["mode"], "id");
        assert_eq!(body["voice"]["id"], "voice-123");
        assert_eq!(body["voice"]["__experimental_controls"]["speed"], -0.5);
        assert_eq!(
            body["voice"]["__experimental_controls"]["emotion"],
            serde_json::json!(["positivity:high", "sadness:low"])
        );
        assert_eq!(body["output_format"]["encoding"], "pcm_s16le");
        assert_eq!(body["output_format"]["sample_rate"], 24_000);
    }

    #[test]
    fn baseline_voice_omits_controls() {
        let client = provider().client_for(&VoiceProfile::baseline()).unwrap();
        let body = serde_json::to_value(client.request_body("hola")).unwrap();
        assert!(body["voice"].get("__experimental_controls").is_none());
    }

    #[test]
    fn speed_only_profile_omits_emotion_list() {
        let client = provider()
            .client_for(&VoiceProfile::default())
            .unwrap();
        let body = serde_json::to_value(client.request_body("hola")).unwrap();
        let controls = &body["voice"]["__experimental_controls"];
        assert!(controls.get("emotion").is_none());
    }

    #[test]
    fn affect_tag_vocabulary() {
        assert!(check_affect_tag("positivity:high").is_ok());
        assert!(check_affect_tag("sadness:lowest").is_ok());
        assert!(check_affect_tag("curiosity").is_ok());
        assert!(check_affect_tag("joy:high").is_err());
        assert!(check_affect_tag("positivity:extreme").is_err());
        assert!(check_affect_tag("").is_err());
    }

    #[tokio::test]
    async fn build_rejects_unknown_tags() {
        let profile = VoiceProfile::new(-0.3, vec!["euphoria:high".into()], "bad");
        let err = provider().build(&profile).await.err().unwrap();
        assert!(matches!(err, TtsError::Configuration(_)));
    }

    #[test]
    fn every_derived_profile_is_accepted() {
        use crate::emotion::{EmotionCategory, EmotionSignal, IntensityLevel};
        use crate::profile::derive_profile;

        let provider = provider();
        for category in EmotionCategory::ALL {
            for intensity in [IntensityLevel::Medium, IntensityLevel::Critical] {
                let profile = derive_profile(&EmotionSignal::from_iter([(category, intensity)]));
                assert!(provider.client_for(&profile).is_ok(), "{category:?}");
            }
        }
    }

    #[test]
    fn pcm_decoding() {
        assert_eq!(decode_pcm_s16le(&[0x01, 0x00, 0xff, 0xff, 0x7f]), vec![1, -1]);
    }
}
