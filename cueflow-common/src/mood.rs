//! Mood vocabulary and rule-based classification
//!
//! The mood set is closed. Classification is a prioritised rule list over the
//! clamped feature inputs; the first matching rule picks the dominant tag,
//! per-tag scores come from fixed prototype coordinates in an
//! arousal/valence plane, and confidence is the margin between the dominant
//! tag's score and the runner-up.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The fixed mood vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Energetic,
    Happy,
    Calm,
    Melancholic,
    Aggressive,
    Euphoric,
    Dark,
    Driving,
    Neutral,
}

/// All moods, in declaration order
pub const MOODS: [Mood; 9] = [
    Mood::Energetic,
    Mood::Happy,
    Mood::Calm,
    Mood::Melancholic,
    Mood::Aggressive,
    Mood::Euphoric,
    Mood::Dark,
    Mood::Driving,
    Mood::Neutral,
];

impl Mood {
    /// Fixed (arousal, valence) prototype for this tag.
    ///
    /// Drives both the per-tag score vector and [`mood_distance`].
    fn prototype(&self) -> (f64, f64) {
        match self {
            Mood::Energetic => (0.85, 0.60),
            Mood::Happy => (0.60, 0.85),
            Mood::Calm => (0.15, 0.60),
            Mood::Melancholic => (0.25, 0.20),
            Mood::Aggressive => (0.90, 0.15),
            Mood::Euphoric => (0.85, 0.90),
            Mood::Dark => (0.55, 0.15),
            Mood::Driving => (0.70, 0.45),
            Mood::Neutral => (0.50, 0.50),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Energetic => "energetic",
            Mood::Happy => "happy",
            Mood::Calm => "calm",
            Mood::Melancholic => "melancholic",
            Mood::Aggressive => "aggressive",
            Mood::Euphoric => "euphoric",
            Mood::Dark => "dark",
            Mood::Driving => "driving",
            Mood::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        MOODS
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown mood: {s:?}")))
    }
}

/// Per-tag score over the closed mood set; always sums to 1.0 once
/// [`MoodScores::normalised`] has run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MoodScores {
    pub energetic: f64,
    pub happy: f64,
    pub calm: f64,
    pub melancholic: f64,
    pub aggressive: f64,
    pub euphoric: f64,
    pub dark: f64,
    pub driving: f64,
    pub neutral: f64,
}

impl MoodScores {
    pub fn get(&self, mood: Mood) -> f64 {
        match mood {
            Mood::Energetic => self.energetic,
            Mood::Happy => self.happy,
            Mood::Calm => self.calm,
            Mood::Melancholic => self.melancholic,
            Mood::Aggressive => self.aggressive,
            Mood::Euphoric => self.euphoric,
            Mood::Dark => self.dark,
            Mood::Driving => self.driving,
            Mood::Neutral => self.neutral,
        }
    }

    pub fn set(&mut self, mood: Mood, value: f64) {
        match mood {
            Mood::Energetic => self.energetic = value,
            Mood::Happy => self.happy = value,
            Mood::Calm => self.calm = value,
            Mood::Melancholic => self.melancholic = value,
            Mood::Aggressive => self.aggressive = value,
            Mood::Euphoric => self.euphoric = value,
            Mood::Dark => self.dark = value,
            Mood::Driving => self.driving = value,
            Mood::Neutral => self.neutral = value,
        }
    }

    /// Scale so the scores sum to 1.0; an all-zero vector becomes pure neutral
    pub fn normalised(mut self) -> Self {
        let sum: f64 = MOODS.iter().map(|&m| self.get(m)).sum();
        if sum <= f64::EPSILON || !sum.is_finite() {
            let mut neutral = MoodScores::default();
            neutral.neutral = 1.0;
            return neutral;
        }
        for mood in MOODS {
            let v = self.get(mood);
            self.set(mood, v / sum);
        }
        self
    }

    /// Highest-scoring tag and its score
    pub fn dominant(&self) -> (Mood, f64) {
        let mut best = (Mood::Neutral, f64::MIN);
        for mood in MOODS {
            let score = self.get(mood);
            if score > best.1 {
                best = (mood, score);
            }
        }
        best
    }

    fn sum(&self) -> f64 {
        MOODS.iter().map(|&m| self.get(m)).sum()
    }
}

/// Fixed pairwise distance between mood tags, in `[0, 1]`
pub fn mood_distance(a: Mood, b: Mood) -> f64 {
    let (ax, ay) = a.prototype();
    let (bx, by) = b.prototype();
    let d = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt() / std::f64::consts::SQRT_2;
    d.min(1.0)
}

/// Feature inputs to classification
#[derive(Debug, Clone, Copy)]
pub struct MoodInputs {
    pub energy: f64,
    pub valence: f64,
    pub bpm: f64,
    pub acousticness: f64,
    /// Key mode; minor keys bias towards the darker tags
    pub minor: bool,
}

/// Classification outcome
#[derive(Debug, Clone)]
pub struct MoodClassification {
    pub mood: Mood,
    pub scores: MoodScores,
    /// Margin between the dominant tag's score and the runner-up, `[0, 1]`
    pub confidence: f64,
}

/// Rule-based mood classifier.
///
/// The rule order is the priority order; the first rule whose predicate holds
/// wins. The table is tunable but the tag set is fixed.
#[derive(Debug, Default, Clone)]
pub struct MoodClassifier;

impl MoodClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, inputs: MoodInputs) -> MoodClassification {
        if !inputs.energy.is_finite() || !inputs.valence.is_finite() || !inputs.bpm.is_finite() {
            return MoodClassification {
                mood: Mood::Neutral,
                scores: MoodScores::default().normalised(),
                confidence: 0.0,
            };
        }

        let energy = inputs.energy.clamp(0.0, 1.0);
        let valence = inputs.valence.clamp(0.0, 1.0);
        let acousticness = inputs.acousticness.clamp(0.0, 1.0);
        let bpm = inputs.bpm.clamp(40.0, 240.0);

        let dominant = self.first_matching_rule(energy, valence, bpm, acousticness, inputs.minor);

        // Score every tag by closeness to its prototype in the
        // arousal/valence plane, then normalise to a distribution.
        let mut scores = MoodScores::default();
        for mood in MOODS {
            let (px, py) = mood.prototype();
            let d = ((energy - px).powi(2) + (valence - py).powi(2)).sqrt()
                / std::f64::consts::SQRT_2;
            scores.set(mood, (1.0 - d).max(0.0).powi(2));
        }
        let scores = scores.normalised();

        let dominant_score = scores.get(dominant);
        let runner_up = MOODS
            .iter()
            .filter(|&&m| m != dominant)
            .map(|&m| scores.get(m))
            .fold(0.0f64, f64::max);
        let confidence = (dominant_score - runner_up).clamp(0.0, 1.0);

        MoodClassification {
            mood: dominant,
            scores,
            confidence,
        }
    }

    /// The prioritised rule table. First match wins; the final rule always
    /// matches.
    fn first_matching_rule(
        &self,
        energy: f64,
        valence: f64,
        bpm: f64,
        acousticness: f64,
        minor: bool,
    ) -> Mood {
        if energy > 0.80 && valence < 0.35 {
            Mood::Aggressive
        } else if energy > 0.75 && valence > 0.75 {
            Mood::Euphoric
        } else if valence < 0.30 && minor && energy >= 0.45 {
            Mood::Dark
        } else if energy > 0.70 {
            Mood::Energetic
        } else if (118.0..=136.0).contains(&bpm) && energy >= 0.55 {
            Mood::Driving
        } else if valence > 0.65 {
            Mood::Happy
        } else if valence < 0.35 && energy < 0.50 {
            Mood::Melancholic
        } else if energy < 0.35 || acousticness > 0.70 {
            Mood::Calm
        } else {
            Mood::Neutral
        }
    }
}
