//! Drives one spoken conversation: every reply is voiced with the handle the
//! selector picked for the user's last utterance.

use crate::playback::{PlaybackError, PlaybackSink};
use crate::profile::VoiceProfile;
use crate::selector::{AdaptiveSynthesisState, AdaptiveVoiceSelector, SelectorError};
use crate::tts::{TtsHandle, TtsRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const LOG_TARGET: &str = "voice::conversation";

#[derive(thiserror::Error, Debug)]
pub enum ConversationError {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum VoiceEvent {
    /// A new synthesis handle replaced the previous one.
    VoiceAdapted {
        description: String,
        emotion_summary: String,
    },
    SpeechStarted { text: String },
    SpeechFinished { duration: Duration },
    SynthesisFailed { error: String },
}

pub trait VoiceListener: Send + Sync {
    /// Registry key; two listeners with the same id are the same listener.
    fn id(&self) -> &str;
    fn on_event(&self, event: &VoiceEvent);
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn VoiceListener>>,
}

impl ListenerRegistry {
    /// Returns false if a listener with the same id is already registered.
    pub fn register(&mut self, listener: Arc<dyn VoiceListener>) -> bool {
        if self.listeners.iter().any(|l| l.id() == listener.id()) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Returns false if no listener had this id.
    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id() != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit(&self, event: &VoiceEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Spoken(Duration),
    /// The backend could not produce audio; nothing was played.
    SynthesisFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub user_text: String,
    pub reply_text: String,
}

impl ConversationTurn {
    pub fn new<U: Into<String>, R: Into<String>>(user_text: U, reply_text: R) -> Self {
        Self {
            user_text: user_text.into(),
            reply_text: reply_text.into(),
        }
    }
}

pub struct VoiceConversation<P> {
    selector: AdaptiveVoiceSelector,
    state: AdaptiveSynthesisState,
    playback: P,
    listeners: ListenerRegistry,
}

impl<P: PlaybackSink> VoiceConversation<P> {
    pub fn new(selector: AdaptiveVoiceSelector, playback: P) -> Self {
        let state = selector.create_state();
        Self {
            selector,
            state,
            playback,
            listeners: ListenerRegistry::default(),
        }
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }

    pub fn state(&self) -> &AdaptiveSynthesisState {
        &self.state
    }

    pub fn voice_description(&self) -> String {
        self.selector.current_voice_description(&self.state)
    }

    pub fn emotion_summary(&self) -> String {
        self.selector.emotion_summary(&self.state)
    }

    /// Speaks `text` with the fixed greeting voice.
    pub async fn greet(&mut self, text: &str) -> Result<TurnOutcome, ConversationError> {
        let previous = self.state.backend().cloned();
        let backend = self
            .selector
            .force_profile(&mut self.state, VoiceProfile::greeting())
            .await?;
        self.announce_if_changed(previous.as_ref(), &backend);
        self.speak_with(&backend, text).await
    }

    /// Adapts the voice to `user_text`, then speaks `reply_text` with it.
    pub async fn speak_reply(
        &mut self,
        user_text: &str,
        reply_text: &str,
    ) -> Result<TurnOutcome, ConversationError> {
        let previous = self.state.backend().cloned();
        let backend = self
            .selector
            .select_backend(user_text, &mut self.state)
            .await?;
        self.announce_if_changed(previous.as_ref(), &backend);
        self.speak_with(&backend, reply_text).await
    }

    /// Ends the conversation and releases its voice state.
    pub fn close(self) {
        self.selector.destroy_state(self.state);
    }

    fn announce_if_changed(&self, previous: Option<&TtsHandle>, current: &TtsHandle) {
        let changed = match previous {
            Some(previous) => !Arc::ptr_eq(previous, current),
            None => true,
        };
        if changed {
            self.listeners.emit(&VoiceEvent::VoiceAdapted {
                description: self.voice_description(),
                emotion_summary: self.emotion_summary(),
            });
        }
    }

    async fn speak_with(
        &self,
        backend: &TtsHandle,
        text: &str,
    ) -> Result<TurnOutcome, ConversationError> {
        self.listeners.emit(&VoiceEvent::SpeechStarted {
            text: text.to_owned(),
        });

        let audio = match backend.synthesize(TtsRequest::new(text)).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "synthesis failed");
                self.listeners.emit(&VoiceEvent::SynthesisFailed {
                    error: e.to_string(),
                });
                return Ok(TurnOutcome::SynthesisFailed);
            }
        };

        let duration = audio.duration();
        self.playback.play(audio).await?;
        self.listeners.emit(&VoiceEvent::SpeechFinished { duration });
        Ok(TurnOutcome::Spoken(duration))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnStats {
    pub spoken: usize,
    pub failed: usize,
}

/// Speaks turns until every sender is dropped, then closes the conversation.
pub async fn run_turns<P: PlaybackSink>(
    mut conversation: VoiceConversation<P>,
    mut turns: mpsc::Receiver<ConversationTurn>,
) -> TurnStats {
    let mut stats = TurnStats::default();
    while let Some(turn) = turns.recv().await {
        match conversation
            .speak_reply(&turn.user_text, &turn.reply_text)
            .await
        {
            Ok(TurnOutcome::Spoken(duration)) => {
                stats.spoken += 1;
                tracing::info!(
                    target: LOG_TARGET,
                    voice = %conversation.voice_description(),
                    emotions = %conversation.emotion_summary(),
                    duration_ms = duration.as_millis() as u64,
                    "turn spoken"
                );
            }
            Ok(TurnOutcome::SynthesisFailed) => stats.failed += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::error!(target: LOG_TARGET, error = %e, "turn failed");
            }
        }
    }
    tracing::debug!(target: LOG_TARGET, ?stats, "turn channel closed");
    conversation.close();
    stats
}
