//! Phrase-based animation timeline that reacts to status changes.

mod script;
mod sequencer;

pub use script::AnimationScript;
pub use script::Easing;
pub use script::Phrase;
pub use script::Point;
pub use script::ScriptError;
pub use sequencer::ActorPlacement;
pub use sequencer::AnimationSequencer;
pub use sequencer::BeaconIndicator;
pub use sequencer::Frame;
