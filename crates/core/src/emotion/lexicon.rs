//! Declarative pattern tables for the lexical classifier.
//!
//! A table maps each category to a list of regular expressions. A pattern
//! counts once no matter how many of its alternatives occur in the text.
//! Intensifier and crisis patterns are global: they are checked once per
//! utterance and apply to every category that matched.

use crate::emotion::EmotionCategory;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum LexiconError {
    #[error("failed to read pattern table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern table json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("category {0} has no patterns")]
    EmptyCategory(&'static str),

    #[error("category {0} appears more than once")]
    DuplicateCategory(&'static str),

    #[error("neutral is the fallback category and cannot carry patterns")]
    NeutralPatterns,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryPatterns {
    pub category: EmotionCategory,
    pub patterns: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternTable {
    pub categories: Vec<CategoryPatterns>,
    pub intensifiers: Vec<String>,
    pub crisis_indicators: Vec<String>,
}

impl PatternTable {
    pub fn from_json_str(json: &str) -> Result<Self, LexiconError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LexiconError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Every `(category, pattern)` pair in table order.
    pub fn pairs(&self) -> impl Iterator<Item = (EmotionCategory, &str)> + '_ {
        self.categories
            .iter()
            .flat_map(|c| c.patterns.iter().map(move |p| (c.category, p.as_str())))
    }

    /// Structural checks that do not need the regex engine.
    pub(crate) fn validate(&self) -> Result<(), LexiconError> {
        let mut seen = Vec::with_capacity(self.categories.len());
        for entry in &self.categories {
            if entry.category == EmotionCategory::Neutral {
                return Err(LexiconError::NeutralPatterns);
            }
            if seen.contains(&entry.category) {
                return Err(LexiconError::DuplicateCategory(entry.category.as_str()));
            }
            if entry.patterns.is_empty() {
                return Err(LexiconError::EmptyCategory(entry.category.as_str()));
            }
            seen.push(entry.category);
        }
        Ok(())
    }

    /// Built-in Spanish lexicon for mental-health support conversations.
    pub fn spanish() -> Self {
        use EmotionCategory::*;

        let group = |category: EmotionCategory, patterns: &[&str]| CategoryPatterns {
            category,
            patterns: patterns.iter().map(|p| (*p).to_owned()).collect(),
        };

        Self {
            categories: vec![
                group(
                    Anxiety,
                    &[
                        r"\b(ansiedad|ansioso|ansiosa|nervios|nervioso|nerviosa)\b",
                        r"\b(preocup\w+|inquiet\w+|intranquil\w+)\b",
                        r"\b(agitad\w+|alterad\w+|desasoseg\w+)\b",
                        r"\b(no puedo parar de pensar|mi mente no para|no puedo relajarme)\b",
                        r"\b(me siento agobiad\w+|me ahogo|no puedo respirar bien)\b",
                        r"\b(tengo miedo de que|y si pasa|qué tal si)\b",
                        r"\b(me da pánico|me da terror|me aterra)\b",
                    ],
                ),
                group(
                    Sadness,
                    &[
                        r"\b(triste|tristeza|melancolía|melancólic\w+)\b",
                        r"\b(deprimid\w+|bajoneado|decaíd\w+)\b",
                        r"\b(llor\w+|ganas de llorar|quiero llorar)\b",
                        r"\b(sin ganas|sin energía|sin ánimo)\b",
                        r"\b(me siento vacío|me siento vacía|todo me da igual)\b",
                    ],
                ),
                group(
                    Fear,
                    &[
                        r"\b(miedo|temor|terror|pánico|pavor)\b",
                        r"\b(asustado|asustada|aterrorizado|aterrorizada)\b",
                        r"\b(fobia|me da miedo|tengo miedo)\b",
                        r"\b(me aterra|me horroriza|me espanta)\b",
                    ],
                ),
                group(
                    Stress,
                    &[
                        r"\b(estrés|estresado|estresada|estresante)\b",
                        r"\b(agobio|agobiad\w+|abrumad\w+)\b",
                        r"\b(presión|presionad\w+|saturad\w+)\b",
                        r"\b(no doy más|no puedo más|estoy al límite)\b",
                        r"\b(sobrecargad\w+|desbordad\w+)\b",
                    ],
                ),
                group(
                    Frustration,
                    &[
                        r"\b(frustrad\w+|frustrante|frustración)\b",
                        r"\b(harto|harta|cansad\w+ de|fed up)\b",
                        r"\b(impotencia|rabia|ira|molest\w+)\b",
                        r"\b(no aguanto|no soporto|me irrita)\b",
                    ],
                ),
                group(
                    Confusion,
                    &[
                        r"\b(confundid\w+|confusión|desoriented\w+)\b",
                        r"\b(no entiendo|no sé qué|no sé cómo)\b",
                        r"\b(perdid\w+|desubicad\w+|sin rumbo)\b",
                        r"\b(no sé qué hacer|no sé por dónde empezar)\b",
                    ],
                ),
                group(
                    Urgency,
                    &[
                        r"\b(urgente|rápido|ya|ahora mismo|inmediatamente)\b",
                        r"\b(necesito ya|tengo que|debo urgente)\b",
                        r"\b(no puedo esperar|es urgente|por favor rápido)\b",
                    ],
                ),
                group(
                    Despair,
                    &[
                        r"\b(desesperación|desesperada|desesperado)\b",
                        r"\b(sin esperanza|sin salida|no hay solución)\b",
                        r"\b(no puedo más|ya no aguanto|estoy perdida|estoy perdido)\b",
                        r"\b(quiero desaparecer|no vale la pena|todo está mal)\b",
                    ],
                ),
                group(
                    Hope,
                    &[
                        r"\b(esperanza|esperanzad\w+|optimista)\b",
                        r"\b(mejorando|mejor|progreso|avance)\b",
                        r"\b(creo que puedo|siento que|tengo fe)\b",
                    ],
                ),
                group(
                    Calm,
                    &[
                        r"\b(calm\w+|tranquil\w+|relax\w+|sereno)\b",
                        r"\b(en paz|equilibrio|estable)\b",
                        r"\b(me siento bien|está todo bien|todo ok)\b",
                    ],
                ),
            ],
            intensifiers: [
                r"\b(muy|mucho|muchísimo|extremadamente|súper|ultra)\b",
                r"\b(demasiado|bastante|realmente|verdaderamente)\b",
                r"\b(increíblemente|terriblemente|horriblemente)\b",
                r"\b(totalmente|completamente|absolutamente)\b",
            ]
            .iter()
            .map(|p| (*p).to_owned())
            .collect(),
            crisis_indicators: [
                r"\b(crisis|emergencia|urgente|crítico|grave)\b",
                r"\b(no puedo más|al límite|breaking point|colapso)\b",
                r"\b(ayuda|socorro|sos|auxilio)\b",
            ]
            .iter()
            .map(|p| (*p).to_owned())
            .collect(),
        }
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::spanish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_table_is_valid_and_in_priority_order() {
        let table = PatternTable::spanish();
        table.validate().expect("built-in table is valid");

        let order: Vec<EmotionCategory> = table.categories.iter().map(|c| c.category).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(order.len(), 10);
    }

    #[test]
    fn every_built_in_pattern_compiles() {
        let table = PatternTable::spanish();
        let all = table
            .pairs()
            .map(|(_, p)| p)
            .chain(table.intensifiers.iter().map(String::as_str))
            .chain(table.crisis_indicators.iter().map(String::as_str));
        for pattern in all {
            assert!(regex::Regex::new(pattern).is_ok(), "{pattern}");
        }
    }

    #[test]
    fn rejects_neutral_patterns() {
        let mut table = PatternTable::spanish();
        table.categories.push(CategoryPatterns {
            category: EmotionCategory::Neutral,
            patterns: vec![r"\bhola\b".into()],
        });
        assert!(matches!(table.validate(), Err(LexiconError::NeutralPatterns)));
    }

    #[test]
    fn rejects_duplicate_and_empty_categories() {
        let mut dup = PatternTable::spanish();
        dup.categories.push(dup.categories[0].clone());
        assert!(matches!(
            dup.validate(),
            Err(LexiconError::DuplicateCategory("anxiety"))
        ));

        let mut empty = PatternTable::spanish();
        empty.categories[1].patterns.clear();
        assert!(matches!(
            empty.validate(),
            Err(LexiconError::EmptyCategory("sadness"))
        ));
    }

    #[test]
    fn loads_table_from_json() {
        let json = r#"{
            "categories": [
                { "category": "hope", "patterns": ["\\b(hopeful)\\b"] }
            ],
            "intensifiers": ["\\b(very)\\b"],
            "crisis_indicators": ["\\b(emergency|help)\\b"]
        }"#;
        let table = PatternTable::from_json_str(json).expect("valid json");
        assert_eq!(table.categories[0].category, EmotionCategory::Hope);
        assert_eq!(table.pairs().count(), 1);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PatternTable::from_path("/nonexistent/lexicon.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/lexicon.json"));
    }
}
