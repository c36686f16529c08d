//! Animation script structures and the JSON script loader.
//!
//! A script maps each status to an ordered list of phrases:
//!
//! ```json
//! {
//!   "OPEN": [
//!     { "duration": 1.5, "actor": "door", "from": [0, 0], "to": [400, 0], "easing": "OUT" },
//!     { "duration": 2.0, "color": "GREEN", "sound": "fanfare", "confetti": true }
//!   ],
//!   "CLOSED": [{ "duration": 1.0, "color": "RED" }]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use strum::Display;

use crate::engine::LampColor;
use crate::engine::SpaceState;

/// Integer screen coordinate
pub type Point = (i32, i32);

/// Progress remapping applied to actor motion
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Easing {
    #[default]
    None,
    In,
    Out,
}

impl Easing {
    pub fn apply(self, progress: f64) -> f64 {
        match self {
            Easing::None => progress,
            Easing::In => progress * progress,
            Easing::Out => 1.0 - (1.0 - progress) * (1.0 - progress),
        }
    }
}

/// One timed step of an animation
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub duration: Duration,
    /// Asset id of the sprite moved during this phrase
    pub actor: Option<String>,
    pub from: Point,
    pub to: Point,
    pub easing: Easing,
    pub color: Option<LampColor>,
    /// Asset id of the sound cue played when the phrase starts
    pub sound: Option<String>,
    pub confetti: bool,
}

impl Phrase {
    /// A phrase that does nothing but take time
    pub fn pause(duration: Duration) -> Self {
        Self {
            duration,
            actor: None,
            from: (0, 0),
            to: (0, 0),
            easing: Easing::None,
            color: None,
            sound: None,
            confetti: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PhraseRecord {
    duration: f64,
    #[serde(default)]
    actor: Option<String>,
    #[serde(default)]
    from: Option<Point>,
    #[serde(default)]
    to: Option<Point>,
    #[serde(default)]
    easing: Easing,
    #[serde(default)]
    color: Option<LampColor>,
    #[serde(default)]
    sound: Option<String>,
    #[serde(default)]
    confetti: bool,
}

/// Ordered phrases for every status
#[derive(Debug, Clone, Default)]
pub struct AnimationScript {
    phrases: HashMap<SpaceState, Vec<Phrase>>,
}

impl AnimationScript {
    pub fn new(phrases: HashMap<SpaceState, Vec<Phrase>>) -> Self {
        Self { phrases }
    }

    /// Phrases for `state`; empty when the script has none
    pub fn phrases(&self, state: SpaceState) -> &[Phrase] {
        self.phrases.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Load a script from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ScriptError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_json(&contents)
    }

    /// Parse a script from JSON text
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        let records: HashMap<SpaceState, Vec<PhraseRecord>> = serde_json::from_str(json)?;

        let mut phrases = HashMap::new();
        for (state, list) in records {
            let list = list
                .into_iter()
                .enumerate()
                .map(|(index, record)| {
                    if !(record.duration.is_finite() && record.duration > 0.0) {
                        return Err(ScriptError::InvalidDuration {
                            state,
                            index,
                            duration: record.duration,
                        });
                    }

                    let from = record.from.unwrap_or((0, 0));
                    Ok(Phrase {
                        duration: Duration::from_secs_f64(record.duration),
                        actor: record.actor,
                        from,
                        to: record.to.unwrap_or(from),
                        easing: record.easing,
                        color: record.color,
                        sound: record.sound,
                        confetti: record.confetti,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            phrases.insert(state, list);
        }

        Ok(Self { phrases })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to read animation script {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse animation script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Phrase {state}.{index} has invalid duration {duration}; durations must be positive")]
    InvalidDuration {
        state: SpaceState,
        index: usize,
        duration: f64,
    },
}
