use crate::emotion::{EmotionCategory, EmotionSignal, IntensityLevel, LexiconError, PatternTable};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

const LOG_TARGET: &str = "emotion::analyzer";
const PREVIEW_CHARS: usize = 50;

static SPANISH: Lazy<Arc<LexicalEmotionAnalyzer>> = Lazy::new(|| {
    Arc::new(
        LexicalEmotionAnalyzer::from_table(&PatternTable::spanish())
            .expect("built-in spanish lexicon compiles"),
    )
});

/// Classifies a user utterance into an [`EmotionSignal`].
///
/// Implementations must be total: every string, including empty and
/// pathological input, yields a non-empty signal.
pub trait EmotionAnalyzer: Send + Sync {
    fn analyze_text(&self, text: &str) -> EmotionSignal;
}

/// Classifies `text` with the built-in Spanish lexicon.
pub fn classify(text: &str) -> EmotionSignal {
    SPANISH.analyze_text(text)
}

struct CompiledCategory {
    category: EmotionCategory,
    patterns: Vec<Regex>,
}

/// Regex-driven classifier compiled from a [`PatternTable`].
pub struct LexicalEmotionAnalyzer {
    categories: Vec<CompiledCategory>,
    intensifiers: Vec<Regex>,
    crisis_indicators: Vec<Regex>,
}

impl LexicalEmotionAnalyzer {
    pub fn from_table(table: &PatternTable) -> Result<Self, LexiconError> {
        table.validate()?;

        let categories = table
            .categories
            .iter()
            .map(|entry| {
                Ok(CompiledCategory {
                    category: entry.category,
                    patterns: compile_all(&entry.patterns)?,
                })
            })
            .collect::<Result<Vec<_>, LexiconError>>()?;

        Ok(Self {
            categories,
            intensifiers: compile_all(&table.intensifiers)?,
            crisis_indicators: compile_all(&table.crisis_indicators)?,
        })
    }

    /// Shared instance of the built-in Spanish analyzer.
    pub fn spanish() -> Arc<Self> {
        Arc::clone(&SPANISH)
    }
}

impl EmotionAnalyzer for LexicalEmotionAnalyzer {
    fn analyze_text(&self, text: &str) -> EmotionSignal {
        if text.trim().is_empty() {
            return EmotionSignal::neutral();
        }

        let normalized = text.to_lowercase();
        let has_crisis = any_match(&self.crisis_indicators, &normalized);
        let has_intensifier = any_match(&self.intensifiers, &normalized);

        let detected: EmotionSignal = self
            .categories
            .iter()
            .filter_map(|compiled| {
                let matches = compiled
                    .patterns
                    .iter()
                    .filter(|p| p.is_match(&normalized))
                    .count();
                grade(matches, has_crisis, has_intensifier).map(|level| (compiled.category, level))
            })
            .collect();

        let signal = if detected.is_empty() {
            EmotionSignal::neutral()
        } else {
            detected
        };

        tracing::debug!(
            target: LOG_TARGET,
            preview = %preview(text),
            signal = ?signal,
            "emotions detected"
        );
        signal
    }
}

/// Intensity for a category with `matches` distinct pattern hits.
///
/// `Low` is never produced here; it only exists for the neutral fallback.
fn grade(matches: usize, has_crisis: bool, has_intensifier: bool) -> Option<IntensityLevel> {
    if matches == 0 {
        None
    } else if has_crisis || matches >= 3 {
        Some(IntensityLevel::Critical)
    } else if has_intensifier || matches >= 2 {
        Some(IntensityLevel::High)
    } else {
        Some(IntensityLevel::Medium)
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, LexiconError> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| LexiconError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
