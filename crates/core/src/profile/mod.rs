//! Voice parameters derived from an emotion signal.
//!
//! The dominant category of a signal selects one row of a fixed table of
//! synthesis parameters. Anxiety is the only category whose row also depends
//! on intensity.

use crate::emotion::{EmotionCategory, EmotionSignal, IntensityLevel};
use serde::{Deserialize, Serialize};

/// Synthesis parameters for one turn. Speeds run from -1.0 (slowest) to 1.0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    speed: f32,
    affect_tags: Vec<String>,
    description: String,
}

impl VoiceProfile {
    pub fn new<S: Into<String>>(speed: f32, affect_tags: Vec<String>, description: S) -> Self {
        Self {
            speed,
            affect_tags,
            description: description.into(),
        }
    }

    /// Vendor defaults: no speed adjustment and no affect tags.
    pub fn baseline() -> Self {
        Self::new(0.0, Vec::new(), "Voz base del proveedor")
    }

    /// Warm, slightly slowed voice for the opening greeting of a conversation.
    pub fn greeting() -> Self {
        Self::new(
            -0.4,
            vec!["positivity:low".to_owned()],
            "Voz cálida y acogedora para el saludo inicial",
        )
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn affect_tags(&self) -> &[String] {
        &self.affect_tags
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        DEFAULT_ROW.to_profile()
    }
}

struct ProfileRow {
    speed: f32,
    affect_tags: &'static [&'static str],
    description: &'static str,
}

impl ProfileRow {
    fn to_profile(&self) -> VoiceProfile {
        VoiceProfile::new(
            self.speed,
            self.affect_tags.iter().map(|t| (*t).to_owned()).collect(),
            self.description,
        )
    }
}

static INTENSE_ANXIETY: ProfileRow = ProfileRow {
    speed: -0.5,
    affect_tags: &["positivity:high", "sadness:low"],
    description: "Voz muy empática y calmante para ansiedad intensa",
};

static MODERATE_ANXIETY: ProfileRow = ProfileRow {
    speed: -0.3,
    affect_tags: &["positivity:low", "sadness:low"],
    description: "Voz empática y serena para ansiedad moderada",
};

static DEFAULT_ROW: ProfileRow = ProfileRow {
    speed: -0.3,
    affect_tags: &[],
    description: "Voz empática y calmada por defecto",
};

fn row_for(category: EmotionCategory, intensity: IntensityLevel) -> &'static ProfileRow {
    static SADNESS: ProfileRow = ProfileRow {
        speed: -0.4,
        affect_tags: &["positivity:low", "sadness:high"],
        description: "Voz cálida y comprensiva para tristeza",
    };
    static FEAR: ProfileRow = ProfileRow {
        speed: -0.5,
        affect_tags: &["positivity:high"],
        description: "Voz protectora y tranquilizadora para miedo",
    };
    static STRESS: ProfileRow = ProfileRow {
        speed: -0.4,
        affect_tags: &["positivity:low"],
        description: "Voz serena y equilibrada para estrés",
    };
    static FRUSTRATION: ProfileRow = ProfileRow {
        speed: -0.3,
        affect_tags: &["positivity:low", "sadness:low"],
        description: "Voz validante y paciente para frustración",
    };
    static DESPAIR: ProfileRow = ProfileRow {
        speed: -0.6,
        affect_tags: &["positivity:high", "sadness:high"],
        description: "Voz muy empática y esperanzadora para desesperación",
    };
    static URGENCY: ProfileRow = ProfileRow {
        speed: -0.2,
        affect_tags: &["positivity:low"],
        description: "Voz equilibrada pero atenta para urgencia",
    };
    static CONFUSION: ProfileRow = ProfileRow {
        speed: -0.4,
        affect_tags: &["positivity:low"],
        description: "Voz clara y paciente para confusión",
    };
    static HOPE: ProfileRow = ProfileRow {
        speed: -0.2,
        affect_tags: &["positivity:high"],
        description: "Voz alentadora y esperanzadora",
    };
    static CALM: ProfileRow = ProfileRow {
        speed: -0.1,
        affect_tags: &["positivity:low"],
        description: "Voz natural y estable para calma",
    };

    match category {
        EmotionCategory::Anxiety if intensity.rank() >= IntensityLevel::High.rank() => {
            &INTENSE_ANXIETY
        }
        EmotionCategory::Anxiety => &MODERATE_ANXIETY,
        EmotionCategory::Sadness => &SADNESS,
        EmotionCategory::Fear => &FEAR,
        EmotionCategory::Stress => &STRESS,
        EmotionCategory::Frustration => &FRUSTRATION,
        EmotionCategory::Despair => &DESPAIR,
        EmotionCategory::Urgency => &URGENCY,
        EmotionCategory::Confusion => &CONFUSION,
        EmotionCategory::Hope => &HOPE,
        EmotionCategory::Calm => &CALM,
        EmotionCategory::Neutral => &DEFAULT_ROW,
    }
}

/// Maps a signal to the voice used for the next reply.
///
/// An empty signal falls back to the default row.
pub fn derive_profile(signal: &EmotionSignal) -> VoiceProfile {
    match signal.dominant() {
        Some((category, intensity)) => row_for(category, intensity).to_profile(),
        None => DEFAULT_ROW.to_profile(),
    }
}
