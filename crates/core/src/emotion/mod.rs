mod analyzer;
mod lexicon;


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use analyzer::{classify, EmotionAnalyzer, LexicalEmotionAnalyzer};
pub use lexicon::{CategoryPatterns, LexiconError, PatternTable};

/// Emotion categories recognised in user utterances.
///
/// Declaration order is the priority order: it drives both the iteration
/// order of an [`EmotionSignal`] and the tie-break when two categories share
/// the highest intensity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionCategory {
    Anxiety,
    Sadness,
    Fear,
    Stress,
    Frustration,
    Confusion,
    Urgency,
    Despair,
    Hope,
    Calm,
    Neutral,
}

impl EmotionCategory {
    pub const ALL: [EmotionCategory; 11] = [
        EmotionCategory::Anxiety,
        EmotionCategory::Sadness,
        EmotionCategory::Fear,
        EmotionCategory::Stress,
        EmotionCategory::Frustration,
        EmotionCategory::Confusion,
        EmotionCategory::Urgency,
        EmotionCategory::Despair,
        EmotionCategory::Hope,
        EmotionCategory::Calm,
        EmotionCategory::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionCategory::Anxiety => "anxiety",
            EmotionCategory::Sadness => "sadness",
            EmotionCategory::Fear => "fear",
            EmotionCategory::Stress => "stress",
            EmotionCategory::Frustration => "frustration",
            EmotionCategory::Confusion => "confusion",
            EmotionCategory::Urgency => "urgency",
            EmotionCategory::Despair => "despair",
            EmotionCategory::Hope => "hope",
            EmotionCategory::Calm => "calm",
            EmotionCategory::Neutral => "neutral",
        }
    }

    /// Spanish label used in conversation summaries.
    pub fn label(&self) -> &'static str {
        match self {
            EmotionCategory::Anxiety => "Ansiedad",
            EmotionCategory::Sadness => "Tristeza",
            EmotionCategory::Fear => "Miedo",
            EmotionCategory::Stress => "Estrés",
            EmotionCategory::Frustration => "Frustración",
            EmotionCategory::Confusion => "Confusión",
            EmotionCategory::Urgency => "Urgencia",
            EmotionCategory::Despair => "Desesperación",
            EmotionCategory::Hope => "Esperanza",
            EmotionCategory::Calm => "Calma",
            EmotionCategory::Neutral => "Neutral",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl IntensityLevel {
    /// Numeric rank used for dominance comparison: low=1 .. critical=4.
    pub fn rank(&self) -> u8 {
        match self {
            IntensityLevel::Low => 1,
            IntensityLevel::Medium => 2,
            IntensityLevel::High => 3,
            IntensityLevel::Critical => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IntensityLevel::Low => "baja",
            IntensityLevel::Medium => "media",
            IntensityLevel::High => "alta",
            IntensityLevel::Critical => "critica",
        }
    }
}

/// Result of classifying one utterance.
///
/// Categories without a lexical match are absent rather than stored at a
/// zero level. The map is ordered by [`EmotionCategory`] priority, so every
/// iteration over a signal is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionSignal(BTreeMap<EmotionCategory, IntensityLevel>);

impl EmotionSignal {
    /// The signal produced when nothing matched: `{neutral: low}`.
    pub fn neutral() -> Self {
        Self::from_iter([(EmotionCategory::Neutral, IntensityLevel::Low)])
    }

    pub fn get(&self, category: EmotionCategory) -> Option<IntensityLevel> {
        self.0.get(&category).copied()
    }

    pub fn contains(&self, category: EmotionCategory) -> bool {
        self.0.contains_key(&category)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionCategory, IntensityLevel)> + '_ {
        self.0.iter().map(|(c, i)| (*c, *i))
    }

    /// Category with the strictly highest rank. Ties go to the category that
    /// comes first in priority order; `None` only for an empty signal.
    pub fn dominant(&self) -> Option<(EmotionCategory, IntensityLevel)> {
        let mut best: Option<(EmotionCategory, IntensityLevel)> = None;
        for (category, intensity) in self.iter() {
            let improves = best.map_or(true, |(_, top)| intensity.rank() > top.rank());
            if improves {
                best = Some((category, intensity));
            }
        }
        best
    }

    /// Human-readable summary for logs, e.g.
    /// `Estado emocional detectado: Ansiedad (alta), Miedo (media)`.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "Estado emocional neutral".to_owned();
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(category, intensity)| format!("{} ({})", category.label(), intensity.label()))
            .collect();
        format!("Estado emocional detectado: {}", parts.join(", "))
    }
}

impl FromIterator<(EmotionCategory, IntensityLevel)> for EmotionSignal {
    fn from_iter<T: IntoIterator<Item = (EmotionCategory, IntensityLevel)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
