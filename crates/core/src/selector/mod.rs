//! Per-conversation voice adaptation.
//!
//! Each user utterance is classified, mapped to a [`VoiceProfile`], and the
//! synthesis handle is rebuilt only when the result differs meaningfully from
//! what is already in use. All mutable data lives in an
//! [`AdaptiveSynthesisState`] owned by one conversation; the selector itself
//! holds only shared, immutable collaborators.

use crate::emotion::{EmotionAnalyzer, EmotionSignal, LexicalEmotionAnalyzer};
use crate::profile::{derive_profile, VoiceProfile};
use crate::tts::{TtsError, TtsHandle, TtsProvider};
use std::fmt;
use std::sync::Arc;

const LOG_TARGET: &str = "voice::selector";

/// Minimum speed difference that warrants a new handle.
pub const SPEED_CHANGE_THRESHOLD: f32 = 0.1;
/// Absorbs binary rounding so table speeds exactly 0.1 apart still count.
const SPEED_TOLERANCE: f32 = 1e-6;

pub const DEFAULT_VOICE_DESCRIPTION: &str = "Voz empática y calmada por defecto";
pub const NO_EMOTIONS_SUMMARY: &str = "Sin emociones detectadas";

#[derive(thiserror::Error, Debug)]
pub enum SelectorError {
    #[error("voice synthesis unavailable: adapted voice failed ({adapted}), baseline voice failed ({baseline})")]
    SynthesisUnavailable { adapted: TtsError, baseline: TtsError },

    #[error("baseline voice unavailable: {0}")]
    BaselineUnavailable(#[source] TtsError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveVoiceConfig {
    /// When false every turn uses the baseline voice.
    pub enabled: bool,
    /// Voice used when adaptation is off or an adapted voice is rejected.
    pub baseline: VoiceProfile,
}

impl Default for AdaptiveVoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            baseline: VoiceProfile::baseline(),
        }
    }
}

/// Voice state of a single conversation.
///
/// The handle, when present, was always built from `current_profile`; all
/// fields are only ever replaced together. `requested_profile` is what the
/// last turn asked for and differs from `current_profile` only after a
/// rejected voice fell back to the baseline.
#[derive(Default)]
pub struct AdaptiveSynthesisState {
    backend: Option<TtsHandle>,
    current_profile: Option<VoiceProfile>,
    requested_profile: Option<VoiceProfile>,
    last_signal: Option<EmotionSignal>,
}

impl AdaptiveSynthesisState {
    pub fn backend(&self) -> Option<&TtsHandle> {
        self.backend.as_ref()
    }

    pub fn current_profile(&self) -> Option<&VoiceProfile> {
        self.current_profile.as_ref()
    }

    pub fn requested_profile(&self) -> Option<&VoiceProfile> {
        self.requested_profile.as_ref()
    }

    pub fn last_signal(&self) -> Option<&EmotionSignal> {
        self.last_signal.as_ref()
    }

    fn replace(&mut self, built: BuiltVoice, signal: Option<EmotionSignal>) {
        *self = Self {
            backend: Some(built.backend),
            current_profile: Some(built.applied),
            requested_profile: Some(built.requested),
            last_signal: signal,
        };
    }
}

/// A handle together with the profile it was built from and the profile
/// that was asked for.
struct BuiltVoice {
    backend: TtsHandle,
    applied: VoiceProfile,
    requested: VoiceProfile,
}

impl BuiltVoice {
    fn baseline(backend: TtsHandle, baseline: VoiceProfile) -> Self {
        Self {
            backend,
            applied: baseline.clone(),
            requested: baseline,
        }
    }
}

impl fmt::Debug for AdaptiveSynthesisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveSynthesisState")
            .field("has_backend", &self.backend.is_some())
            .field("current_profile", &self.current_profile)
            .field("requested_profile", &self.requested_profile)
            .field("last_signal", &self.last_signal)
            .finish()
    }
}

/// Why a handle has to be rebuilt. All flags false means reuse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildDecision {
    pub first_use: bool,
    pub speed_changed: bool,
    pub tags_changed: bool,
    pub signal_changed: bool,
}

impl RebuildDecision {
    /// Compares against the profile the state last asked for, so a turn that
    /// fell back to the baseline is not retried while nothing changes.
    pub fn evaluate(
        state: &AdaptiveSynthesisState,
        profile: &VoiceProfile,
        signal: &EmotionSignal,
    ) -> Self {
        let requested = state
            .requested_profile
            .as_ref()
            .or(state.current_profile.as_ref());
        let current = match (&state.backend, requested) {
            (Some(_), Some(current)) => current,
            _ => {
                return Self {
                    first_use: true,
                    ..Self::default()
                }
            }
        };

        Self {
            first_use: false,
            speed_changed: speed_changed(current.speed(), profile.speed()),
            tags_changed: current.affect_tags() != profile.affect_tags(),
            signal_changed: state.last_signal.as_ref() != Some(signal),
        }
    }

    pub fn should_rebuild(&self) -> bool {
        self.first_use || self.speed_changed || self.tags_changed || self.signal_changed
    }
}

/// True when the speeds differ by at least [`SPEED_CHANGE_THRESHOLD`].
pub fn speed_changed(previous: f32, next: f32) -> bool {
    (next - previous).abs() + SPEED_TOLERANCE >= SPEED_CHANGE_THRESHOLD
}

/// Chooses the synthesis handle for each turn of a conversation.
///
/// Cheap to clone and safe to share between conversations: per-conversation
/// data is passed in as `&mut AdaptiveSynthesisState`.
#[derive(Clone)]
pub struct AdaptiveVoiceSelector {
    analyzer: Arc<dyn EmotionAnalyzer>,
    provider: Arc<dyn TtsProvider>,
    config: AdaptiveVoiceConfig,
}

impl AdaptiveVoiceSelector {
    pub fn new(
        analyzer: Arc<dyn EmotionAnalyzer>,
        provider: Arc<dyn TtsProvider>,
        config: AdaptiveVoiceConfig,
    ) -> Self {
        tracing::info!(
            target: LOG_TARGET,
            enabled = config.enabled,
            baseline = config.baseline.description(),
            "adaptive voice selector ready"
        );
        Self {
            analyzer,
            provider,
            config,
        }
    }

    /// Selector backed by the built-in Spanish lexicon.
    pub fn spanish(provider: Arc<dyn TtsProvider>, config: AdaptiveVoiceConfig) -> Self {
        Self::new(LexicalEmotionAnalyzer::spanish(), provider, config)
    }

    pub fn config(&self) -> &AdaptiveVoiceConfig {
        &self.config
    }

    pub fn create_state(&self) -> AdaptiveSynthesisState {
        AdaptiveSynthesisState::default()
    }

    /// Releases the conversation's handle.
    pub fn destroy_state(&self, state: AdaptiveSynthesisState) {
        tracing::debug!(
            target: LOG_TARGET,
            had_backend = state.backend.is_some(),
            "releasing conversation voice state"
        );
        drop(state);
    }

    /// Returns the handle to use for the reply to `text`, rebuilding it when
    /// the detected emotion calls for a different voice.
    ///
    /// A rejected voice degrades to the baseline voice; only a failure of the
    /// baseline as well is returned as an error, and then `state` is untouched.
    pub async fn select_backend(
        &self,
        text: &str,
        state: &mut AdaptiveSynthesisState,
    ) -> Result<TtsHandle, SelectorError> {
        if !self.config.enabled {
            return self.baseline_backend(state).await;
        }

        let signal = self.analyzer.analyze_text(text);
        let profile = derive_profile(&signal);
        let decision = RebuildDecision::evaluate(state, &profile, &signal);

        if !decision.should_rebuild() {
            if let Some(backend) = &state.backend {
                return Ok(Arc::clone(backend));
            }
        }

        tracing::debug!(target: LOG_TARGET, ?decision, "voice rebuild needed");
        tracing::info!(
            target: LOG_TARGET,
            description = profile.description(),
            speed = profile.speed(),
            "adapting voice"
        );

        let built = self.build_with_fallback(profile).await?;
        let backend = Arc::clone(&built.backend);
        state.replace(built, Some(signal));
        Ok(backend)
    }

    /// Switches to the baseline voice and forgets the last signal.
    pub async fn reset_to_default(
        &self,
        state: &mut AdaptiveSynthesisState,
    ) -> Result<TtsHandle, SelectorError> {
        tracing::info!(target: LOG_TARGET, "resetting voice to baseline");
        let baseline = self.config.baseline.clone();
        let backend = self
            .provider
            .build(&baseline)
            .await
            .map_err(SelectorError::BaselineUnavailable)?;
        state.replace(BuiltVoice::baseline(Arc::clone(&backend), baseline), None);
        Ok(backend)
    }

    /// Applies `profile` directly, bypassing classification. The last
    /// observed signal is kept.
    pub async fn force_profile(
        &self,
        state: &mut AdaptiveSynthesisState,
        profile: VoiceProfile,
    ) -> Result<TtsHandle, SelectorError> {
        tracing::info!(
            target: LOG_TARGET,
            description = profile.description(),
            "forcing voice profile"
        );
        let built = self.build_with_fallback(profile).await?;
        let backend = Arc::clone(&built.backend);
        let signal = state.last_signal.take();
        state.replace(built, signal);
        Ok(backend)
    }

    pub fn current_voice_description(&self, state: &AdaptiveSynthesisState) -> String {
        state
            .current_profile
            .as_ref()
            .map(|p| p.description().to_owned())
            .unwrap_or_else(|| DEFAULT_VOICE_DESCRIPTION.to_owned())
    }

    pub fn emotion_summary(&self, state: &AdaptiveSynthesisState) -> String {
        match &state.last_signal {
            Some(signal) if !signal.is_empty() => signal.summary(),
            _ => NO_EMOTIONS_SUMMARY.to_owned(),
        }
    }

    async fn baseline_backend(
        &self,
        state: &mut AdaptiveSynthesisState,
    ) -> Result<TtsHandle, SelectorError> {
        if let Some(backend) = &state.backend {
            return Ok(Arc::clone(backend));
        }
        let baseline = self.config.baseline.clone();
        let backend = self
            .provider
            .build(&baseline)
            .await
            .map_err(SelectorError::BaselineUnavailable)?;
        state.replace(BuiltVoice::baseline(Arc::clone(&backend), baseline), None);
        Ok(backend)
    }

    async fn build_with_fallback(&self, profile: VoiceProfile) -> Result<BuiltVoice, SelectorError> {
        let adapted = match self.provider.build(&profile).await {
            Ok(backend) => {
                return Ok(BuiltVoice {
                    backend,
                    applied: profile.clone(),
                    requested: profile,
                })
            }
            Err(e) => e,
        };

        tracing::warn!(
            target: LOG_TARGET,
            error = %adapted,
            description = profile.description(),
            "adapted voice rejected, using baseline voice"
        );

        let baseline = self.config.baseline.clone();
        match self.provider.build(&baseline).await {
            Ok(backend) => Ok(BuiltVoice {
                backend,
                applied: baseline,
                requested: profile,
            }),
            Err(e) => {
                tracing::error!(
                    target: LOG_TARGET,
                    adapted = %adapted,
                    baseline = %e,
                    "no voice could be configured"
                );
                Err(SelectorError::SynthesisUnavailable {
                    adapted,
                    baseline: e,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{EmotionCategory, IntensityLevel};
    use crate::tts::{BasicTtsClient, TtsAudio, TtsClient, TtsRequest};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every profile it is asked to build; rejects profiles whose
    /// speed is listed in `reject_speeds`.
    #[derive(Default)]
    struct RecordingProvider {
        builds: AtomicUsize,
        built: Mutex<Vec<VoiceProfile>>,
        reject_speeds: Vec<f32>,
        reject_all: bool,
    }

    impl RecordingProvider {
        fn rejecting(speeds: &[f32]) -> Self {
            Self {
                reject_speeds: speeds.to_vec(),
                ..Self::default()
            }
        }

        fn broken() -> Self {
            Self {
                reject_all: true,
                ..Self::default()
            }
        }

        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    impl TtsProvider for RecordingProvider {
        fn build(&self, profile: &VoiceProfile) -> BoxFuture<'_, Result<TtsHandle, TtsError>> {
            let profile = profile.clone();
            async move {
                self.builds.fetch_add(1, Ordering::SeqCst);
                self.built.lock().unwrap().push(profile.clone());
                if self.reject_all || self.reject_speeds.contains(&profile.speed()) {
                    return Err(TtsError::Configuration(format!(
                        "cannot honour speed {}",
                        profile.speed()
                    )));
                }
                let handle: TtsHandle = Arc::new(BasicTtsClient::new(profile.speed()));
                Ok(handle)
            }
            .boxed()
        }
    }

    fn selector(provider: Arc<RecordingProvider>) -> AdaptiveVoiceSelector {
        AdaptiveVoiceSelector::spanish(provider, AdaptiveVoiceConfig::default())
    }

    #[tokio::test]
    async fn first_call_builds_a_handle() {
        let provider = Arc::new(RecordingProvider::default());
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        selector
            .select_backend("Tengo miedo de la oscuridad", &mut state)
            .await
            .unwrap();

        assert_eq!(provider.builds(), 1);
        let profile = state.current_profile().unwrap();
        assert_eq!(profile.speed(), -0.5);
        assert_eq!(profile.affect_tags(), ["positivity:high"]);
        assert_eq!(
            state.last_signal().unwrap().get(EmotionCategory::Fear),
            Some(IntensityLevel::High)
        );
    }

    #[tokio::test]
    async fn same_signal_reuses_the_handle() {
        let provider = Arc::new(RecordingProvider::default());
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        let first = selector
            .select_backend("estoy muy triste", &mut state)
            .await
            .unwrap();
        let second = selector
            .select_backend("ESTOY MUY TRISTE!!", &mut state)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.builds(), 1);
    }

    #[tokio::test]
    async fn changed_signal_rebuilds_even_with_same_profile() {
        let provider = Arc::new(RecordingProvider::default());
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        // medium and critical sadness derive the same profile
        let first = selector.select_backend("estoy triste", &mut state).await.unwrap();
        let second = selector
            .select_backend("ayuda, estoy triste", &mut state)
            .await
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(provider.builds(), 2);
        let built = provider.built.lock().unwrap();
        assert_eq!(built[0], built[1]);
    }

    #[test]
    fn speed_threshold_is_inclusive() {
        assert!(speed_changed(-0.3, -0.2));
        assert!(speed_changed(-0.5, -0.4));
        assert!(speed_changed(-0.1, -0.2));
        assert!(speed_changed(0.0, 0.1));
        assert!(!speed_changed(-0.3, -0.201));
        assert!(!speed_changed(0.0, 0.099));
        assert!(!speed_changed(-0.4, -0.4));
    }

    #[tokio::test]
    async fn decision_reports_each_reason() {
        let provider = Arc::new(RecordingProvider::default());
        let selector = selector(provider);
        let mut state = selector.create_state();

        let fresh = RebuildDecision::evaluate(&state, &VoiceProfile::default(), &EmotionSignal::neutral());
        assert!(fresh.first_use && fresh.should_rebuild());

        selector.select_backend("hola", &mut state).await.unwrap();
        let neutral = EmotionSignal::neutral();

        let same = RebuildDecision::evaluate(&state, &VoiceProfile::default(), &neutral);
        assert_eq!(same, RebuildDecision::default());
        assert!(!same.should_rebuild());

        let tenth = VoiceProfile::new(-0.2, vec![], "faster by 0.1");
        let decision = RebuildDecision::evaluate(&state, &tenth, &neutral);
        assert!(decision.speed_changed && !decision.tags_changed && !decision.signal_changed);

        let almost = VoiceProfile::new(-0.3 + 0.099, vec![], "faster by 0.099");
        assert!(!RebuildDecision::evaluate(&state, &almost, &neutral).should_rebuild());

        let tagged = VoiceProfile::new(-0.3, vec!["positivity:low".into()], "tagged");
        let decision = RebuildDecision::evaluate(&state, &tagged, &neutral);
        assert!(decision.tags_changed && !decision.speed_changed);
    }

    #[tokio::test]
    async fn rejected_voice_degrades_to_baseline() {
        let provider = Arc::new(RecordingProvider::rejecting(&[-0.5]));
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        let handle = selector
            .select_backend("tengo miedo", &mut state)
            .await
            .expect("baseline handle");

        assert_eq!(provider.builds(), 2);
        assert_eq!(state.current_profile(), Some(&VoiceProfile::baseline()));
        assert!(Arc::ptr_eq(state.backend().unwrap(), &handle));
        assert!(state.last_signal().unwrap().contains(EmotionCategory::Fear));

        let audio: TtsAudio = handle.synthesize(TtsRequest::new("aquí estoy")).await.unwrap();
        assert!(!audio.pcm_i16.is_empty());
    }

    #[tokio::test]
    async fn repeated_utterance_after_fallback_reuses_baseline_handle() {
        let provider = Arc::new(RecordingProvider::rejecting(&[-0.5]));
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        let first = selector.select_backend("tengo miedo", &mut state).await.unwrap();
        let second = selector.select_backend("tengo miedo", &mut state).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.builds(), 2);
        assert_eq!(state.current_profile(), Some(&VoiceProfile::baseline()));
        assert_eq!(state.requested_profile().unwrap().speed(), -0.5);
    }

    #[tokio::test]
    async fn new_emotion_after_fallback_rebuilds() {
        let provider = Arc::new(RecordingProvider::rejecting(&[-0.5]));
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        selector.select_backend("tengo miedo", &mut state).await.unwrap();
        selector
            .select_backend("me siento tranquilo y en paz", &mut state)
            .await
            .unwrap();

        assert_eq!(provider.builds(), 3);
        assert_eq!(state.current_profile().unwrap().speed(), -0.1);
        assert_eq!(state.current_profile(), state.requested_profile());
    }

    #[tokio::test]
    async fn total_failure_is_reported_and_state_untouched() {
        let provider = Arc::new(RecordingProvider::broken());
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        let err = selector
            .select_backend("estoy ansioso", &mut state)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SelectorError::SynthesisUnavailable { .. }));
        assert_eq!(provider.builds(), 2);
        assert!(state.backend().is_none());
        assert!(state.current_profile().is_none());
        assert!(state.last_signal().is_none());
    }

    #[tokio::test]
    async fn disabled_adaptation_always_uses_baseline() {
        let provider = Arc::new(RecordingProvider::default());
        let config = AdaptiveVoiceConfig {
            enabled: false,
            ..AdaptiveVoiceConfig::default()
        };
        let selector = AdaptiveVoiceSelector::spanish(provider.clone(), config);
        let mut state = selector.create_state();

        let first = selector.select_backend("tengo miedo", &mut state).await.unwrap();
        let second = selector
            .select_backend("estoy desesperado, no hay solución", &mut state)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.builds(), 1);
        assert_eq!(state.current_profile(), Some(&VoiceProfile::baseline()));
        assert_eq!(selector.emotion_summary(&state), NO_EMOTIONS_SUMMARY);
    }

    #[tokio::test]
    async fn accessors_have_defaults_before_first_turn() {
        let selector = selector(Arc::new(RecordingProvider::default()));
        let state = selector.create_state();
        assert_eq!(
            selector.current_voice_description(&state),
            "Voz empática y calmada por defecto"
        );
        assert_eq!(selector.emotion_summary(&state), "Sin emociones detectadas");
        assert_eq!(
            selector.current_voice_description(&state),
            VoiceProfile::default().description()
        );
    }

    #[tokio::test]
    async fn accessors_reflect_last_turn() {
        let selector = selector(Arc::new(RecordingProvider::default()));
        let mut state = selector.create_state();
        selector
            .select_backend("estoy muy ansioso, no puedo parar de pensar", &mut state)
            .await
            .unwrap();

        assert_eq!(
            selector.current_voice_description(&state),
            "Voz muy empática y calmante para ansiedad intensa"
        );
        assert_eq!(
            selector.emotion_summary(&state),
            "Estado emocional detectado: Ansiedad (alta)"
        );
    }

    #[tokio::test]
    async fn force_and_reset() {
        let provider = Arc::new(RecordingProvider::default());
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        selector.select_backend("estoy triste", &mut state).await.unwrap();
        selector
            .force_profile(&mut state, VoiceProfile::greeting())
            .await
            .unwrap();
        assert_eq!(state.current_profile(), Some(&VoiceProfile::greeting()));
        assert!(state.last_signal().is_some());

        selector.reset_to_default(&mut state).await.unwrap();
        assert_eq!(state.current_profile(), Some(&VoiceProfile::baseline()));
        assert!(state.last_signal().is_none());
        assert_eq!(provider.builds(), 3);
    }

    #[tokio::test]
    async fn repeated_utterance_after_force_rebuilds_once() {
        let provider = Arc::new(RecordingProvider::default());
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        selector
            .force_profile(&mut state, VoiceProfile::greeting())
            .await
            .unwrap();
        let first = selector.select_backend("estoy triste", &mut state).await.unwrap();
        let second = selector.select_backend("estoy triste", &mut state).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.builds(), 2);
        assert_eq!(state.current_profile().unwrap().speed(), -0.4);
    }

    #[tokio::test]
    async fn repeated_utterance_after_reset_rebuilds_once() {
        let provider = Arc::new(RecordingProvider::default());
        let selector = selector(provider.clone());
        let mut state = selector.create_state();

        selector.select_backend("estoy triste", &mut state).await.unwrap();
        selector.reset_to_default(&mut state).await.unwrap();
        let first = selector.select_backend("estoy triste", &mut state).await.unwrap();
        let second = selector.select_backend("estoy triste", &mut state).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.builds(), 3);
    }

    #[tokio::test]
    async fn conversations_do_not_share_state() {
        let provider = Arc::new(RecordingProvider::default());
        let selector = selector(provider.clone());
        let mut anxious = selector.create_state();
        let mut calm = selector.create_state();

        let (a, b) = tokio::join!(
            selector.select_backend("estoy muy ansioso", &mut anxious),
            selector.select_backend("me siento tranquilo y en paz", &mut calm),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(anxious.current_profile().unwrap().speed(), -0.5);
        assert_eq!(calm.current_profile().unwrap().speed(), -0.1);

        selector.destroy_state(anxious);
        assert!(calm.backend().is_some());
    }

    #[test]
    fn client_handles_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn TtsClient>();
        assert_send_sync::<AdaptiveVoiceSelector>();
    }
}
