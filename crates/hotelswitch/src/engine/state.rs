use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumIter;
use strum::EnumString;

/// Status of a monitored location.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SpaceState {
    Closed,
    #[default]
    Undetermined,
    Open,
}

impl SpaceState {
    /// Color the lamps take when the switch settles into this state.
    pub fn lamp_color(self) -> LampColor {
        match self {
            SpaceState::Open => LampColor::Green,
            SpaceState::Closed => LampColor::Red,
            SpaceState::Undetermined => LampColor::Orange,
        }
    }
}

/// Latest logical values of the two switch contacts.
///
/// `true` means the contact is made, after the deployment's input polarity
/// has been applied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwitchReading {
    pub top: bool,
    pub bottom: bool,
}

/// One of the two contacts of the status switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SwitchContact {
    Top,
    Bottom,
}

/// Color shown by the physical indicator lamps.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LampColor {
    #[default]
    Off,
    Red,
    Orange,
    Yellow,
    Green,
}

impl LampColor {
    /// Whether the red lamp channels are lit for this color.
    pub fn red(self) -> bool {
        matches!(self, LampColor::Red | LampColor::Yellow)
    }

    /// Whether the orange lamp channels are lit for this color.
    pub fn orange(self) -> bool {
        matches!(self, LampColor::Orange | LampColor::Yellow)
    }

    /// Whether the green lamp channels are lit for this color.
    pub fn green(self) -> bool {
        self == LampColor::Green
    }

    /// On-screen color used when drawing the beacon indicator.
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            LampColor::Off => (0, 0, 0),
            LampColor::Red => (255, 0, 0),
            LampColor::Orange => (255, 128, 0),
            LampColor::Yellow => (255, 255, 0),
            LampColor::Green => (0, 255, 0),
        }
    }
}
