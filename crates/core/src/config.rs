use crate::profile::VoiceProfile;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

pub const DEFAULT_CARTESIA_MODEL: &str = "sonic-2";
pub const DEFAULT_CARTESIA_VOICE_ID: &str = "5c5ad5e7-1020-476b-8b91-fdcbe9cc313c";
pub const DEFAULT_CARTESIA_LANGUAGE: &str = "es";
pub const DEFAULT_BASELINE_SPEED: f32 = 0.0;
pub const ENV_CARTESIA_API_KEY: &str = "CARTESIA_API_KEY";
pub const ENV_CARTESIA_MODEL: &str = "CARTESIA_MODEL";
pub const ENV_CARTESIA_VOICE_ID: &str = "CARTESIA_VOICE_ID";
pub const ENV_CARTESIA_LANGUAGE: &str = "CARTESIA_LANGUAGE";
pub const ENV_CARTESIA_SPEED: &str = "CARTESIA_SPEED";
pub const ENV_CARTESIA_EMOTION: &str = "CARTESIA_EMOTION";
pub const ENV_ENABLE_ADAPTIVE_VOICE: &str = "ENABLE_ADAPTIVE_VOICE";
pub const ENV_LEXICON_PATH: &str = "MARIA_LEXICON_PATH";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

/// Cartesia voice settings that stay fixed for the whole process.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartesiaConfig {
    pub api_key: ApiKey,
    pub model: String,
    pub voice_id: String,
    pub language: String,
}

impl CartesiaConfig {
    pub fn new(
        api_key: ApiKey,
        model: String,
        voice_id: String,
        language: String,
    ) -> Result<Self, ConfigError> {
        for (field, value) in [("model", &model), ("voice id", &voice_id), ("language", &language)] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField(field));
            }
        }
        Ok(Self {
            api_key,
            model,
            voice_id,
            language,
        })
    }
}

/// Voice used before adaptation applies and whenever an adapted voice is rejected.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BaselineVoice {
    pub speed: f32,
    pub affect_tags: Vec<String>,
}

impl BaselineVoice {
    pub fn new(speed: f32, affect_tags: Vec<String>) -> Result<Self, ConfigError> {
        if !(-1.0..=1.0).contains(&speed) {
            return Err(ConfigError::SpeedOutOfRange(speed));
        }
        Ok(Self { speed, affect_tags })
    }

    pub fn to_profile(&self) -> VoiceProfile {
        if self.speed == DEFAULT_BASELINE_SPEED && self.affect_tags.is_empty() {
            return VoiceProfile::baseline();
        }
        VoiceProfile::new(
            self.speed,
            self.affect_tags.clone(),
            "Voz base configurada",
        )
    }
}

impl Default for BaselineVoice {
    fn default() -> Self {
        Self {
            speed: DEFAULT_BASELINE_SPEED,
            affect_tags: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// `None` selects the offline tone generator.
    pub cartesia: Option<CartesiaConfig>,
    pub baseline: BaselineVoice,
    pub adaptive_voice: bool,
    pub lexicon_path: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("baseline speed {0} outside [-1.0, 1.0]")]
    SpeedOutOfRange(f32),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value.or_else(|| env.var(env_key)) {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => Ok(None),
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}

pub fn resolve_bool_with_default(
    cli_value: Option<bool>,
    env_key: &'static str,
    env: &impl Env,
    default: bool,
) -> Result<bool, ConfigError> {
    if let Some(v) = cli_value {
        return Ok(v);
    }
    match env.var(env_key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: env_key,
                value: raw,
            }),
        },
    }
}

pub fn resolve_f32_with_default(
    cli_value: Option<f32>,
    env_key: &'static str,
    env: &impl Env,
    default: f32,
) -> Result<f32, ConfigError> {
    if let Some(v) = cli_value {
        return Ok(v);
    }
    match env.var(env_key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f32>()
            .map_err(|_| ConfigError::InvalidValue {
                key: env_key,
                value: raw,
            }),
    }
}

/// Splits a comma separated affect tag list, dropping blanks.
pub fn parse_affect_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}
