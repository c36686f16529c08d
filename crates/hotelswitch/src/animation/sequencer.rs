use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;

use super::script::AnimationScript;
use super::script::Phrase;
use super::script::Point;
use crate::engine::LampColor;
use crate::engine::Lamps;
use crate::engine::SpaceState;

/// An actor sprite to draw this frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorPlacement {
    pub actor: String,
    pub position: Point,
}

/// Filled indicator drawn over the local location on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconIndicator {
    pub position: Point,
    pub color: LampColor,
}

/// What the sequencer wants rendered and played for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Index of the current phrase; `None` while idle
    pub phrase: Option<usize>,
    /// Eased progress through the current phrase, 0 to 1
    pub progress: f64,
    pub actor: Option<ActorPlacement>,
    pub beacon: Option<BeaconIndicator>,
    /// Sound cues to start this frame
    pub sounds: Vec<String>,
}

fn interpolate(from: Point, to: Point, progress: f64) -> Point {
    let lerp = |a: i32, b: i32| (f64::from(a) * (1.0 - progress) + f64::from(b) * progress).round() as i32;
    (lerp(from.0, to.0), lerp(from.1, to.1))
}

/// Plays the phrase list of the current status against elapsed time
///
/// The sequencer never draws; each [`tick`](Self::tick) yields a [`Frame`]
/// for the rendering collaborator. Lamp colors and confetti are driven
/// directly, once per phrase, when the phrase becomes current.
pub struct AnimationSequencer {
    script: Arc<AnimationScript>,
    lamps: Arc<dyn Lamps>,
    state: SpaceState,
    state_entered: Instant,
    cursor: usize,
    phrase_start: Instant,
    /// Whether the side effects of the phrase at `cursor` have fired
    entered: bool,
    color: Option<LampColor>,
    hotel_coordinates: Option<Point>,
}

impl AnimationSequencer {
    /// Start in the UNDETERMINED session, as the process does
    pub fn new(script: Arc<AnimationScript>, lamps: Arc<dyn Lamps>, now: Instant) -> Self {
        Self {
            script,
            lamps,
            state: SpaceState::Undetermined,
            state_entered: now,
            cursor: 0,
            phrase_start: now,
            entered: false,
            color: None,
            hotel_coordinates: None,
        }
    }

    pub fn state(&self) -> SpaceState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phrase_start(&self) -> Instant {
        self.phrase_start
    }

    /// Time spent in the current status
    pub fn time_in_state(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state_entered)
    }

    /// Whether the current status still has phrases to play
    pub fn is_playing(&self) -> bool {
        self.cursor < self.script.phrases(self.state).len()
    }

    /// Switch to a new status session. Re-entering the current status is a no-op.
    pub fn set_state(&mut self, state: SpaceState, now: Instant) {
        if state == self.state {
            return;
        }

        debug!("Animation switching from {} to {}", self.state, state);
        self.state = state;
        self.state_entered = now;
        self.cursor = 0;
        self.phrase_start = now;
        self.entered = false;
        self.color = None;
    }

    /// Screen position of the local location's beacon
    pub fn set_hotel_coordinates(&mut self, position: Point) {
        self.hotel_coordinates = Some(position);
    }

    /// Advance to `now` and describe the frame to render
    pub fn tick(&mut self, now: Instant) -> Frame {
        let script = self.script.clone();
        let phrases = script.phrases(self.state);
        let mut frame = Frame::default();

        if self.cursor >= phrases.len() {
            return frame;
        }

        if !self.entered {
            self.enter(&phrases[self.cursor], &mut frame);
        }

        // Finished phrases hand their unused time to the next one, so long
        // frames never stretch the timeline.
        loop {
            let phrase = &phrases[self.cursor];
            if now.saturating_duration_since(self.phrase_start) <= phrase.duration {
                break;
            }

            self.phrase_start += phrase.duration;
            self.cursor += 1;
            if self.cursor >= phrases.len() {
                debug!("Animation for {} finished", self.state);
                return frame;
            }
            self.enter(&phrases[self.cursor], &mut frame);
        }

        let phrase = &phrases[self.cursor];
        let elapsed = now.saturating_duration_since(self.phrase_start);
        let progress = (elapsed.as_secs_f64() / phrase.duration.as_secs_f64()).clamp(0.0, 1.0);
        let progress = phrase.easing.apply(progress);

        frame.phrase = Some(self.cursor);
        frame.progress = progress;
        frame.actor = phrase.actor.as_ref().map(|actor| ActorPlacement {
            actor: actor.clone(),
            position: interpolate(phrase.from, phrase.to, progress),
        });
        frame.beacon = match (self.hotel_coordinates, self.color) {
            (Some(position), Some(color)) => Some(BeaconIndicator { position, color }),
            _ => None,
        };

        frame
    }

    fn enter(&mut self, phrase: &Phrase, frame: &mut Frame) {
        debug!("Entering phrase: {}.{}", self.state, self.cursor);
        self.entered = true;

        if let Some(color) = phrase.color {
            self.lamps.set_color(color);
            self.color = Some(color);
        }

        if let Some(sound) = &phrase.sound {
            frame.sounds.push(sound.clone());
        }

        if phrase.confetti {
            self.lamps.fire_confetti();
        }
    }
}
