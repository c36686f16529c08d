//! Configuration file parsing and structures.
//!
//! hotelswitch is configured with a single TOML file. Everything hardware
//! specific (serial device, pin numbers, polarity) lives here so that one
//! deployment's wiring never leaks into the code.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use strum::Display;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    /// Outward status publishing; disabled when absent
    #[serde(default)]
    pub publish: Option<PublishConfig>,
    /// Read-only status HTTP API; disabled when absent
    #[serde(default)]
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"hotelswitch::integrations::feed" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the per-target filter used by the tracing subscriber
    pub fn filter(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

/// Electrical convention of the switch inputs
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Polarity {
    /// A high reading means the contact is made
    #[default]
    ActiveHigh,
    /// A low reading means the contact is made (pull-up wiring)
    ActiveLow,
}

impl Polarity {
    /// Translate a raw electrical reading into "contact made"
    pub fn is_active(self, raw: bool) -> bool {
        match self {
            Polarity::ActiveHigh => raw,
            Polarity::ActiveLow => !raw,
        }
    }
}

/// Hardware link and wiring
#[derive(Debug, Clone, Deserialize)]
pub struct HardwareConfig {
    /// Serial device of the Firmata board
    #[serde(default = "default_device")]
    pub device: PathBuf,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Quiet interval after the last switch edge before evaluating
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long the confetti relay stays energized per trigger
    #[serde(default = "default_confetti_pulse_ms")]
    pub confetti_pulse_ms: u64,

    #[serde(default)]
    pub input_polarity: Polarity,

    pub inputs: InputPins,

    pub outputs: RelayTable,
}

fn default_device() -> PathBuf {
    PathBuf::from("/dev/ttyUSB0")
}

fn default_baud_rate() -> u32 {
    57600
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_confetti_pulse_ms() -> u64 {
    2000
}

/// The two switch contacts
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputPins {
    pub top: u8,
    pub bottom: u8,
}

/// Logical relay channels. Every lamp color is wired to two relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayChannel {
    Red1,
    Red2,
    Orange1,
    Orange2,
    Green1,
    Green2,
    Confetti,
}

/// A physical output pin and its polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputPin {
    pub pin: u8,
    #[serde(default = "default_true")]
    pub active_low: bool,
}

/// Relay board power is switched on by driving its pin high
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PowerPin {
    pub pin: u8,
    #[serde(default)]
    pub active_low: bool,
}

fn default_true() -> bool {
    true
}

impl OutputPin {
    /// Electrical level that puts this output in the given logical state
    pub fn level(self, active: bool) -> bool {
        active != self.active_low
    }
}

impl From<PowerPin> for OutputPin {
    fn from(p: PowerPin) -> Self {
        Self {
            pin: p.pin,
            active_low: p.active_low,
        }
    }
}

/// Static table mapping every logical channel to its pin.
///
/// All channels are required; a table with a channel missing fails to parse.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayTable {
    pub red1: OutputPin,
    pub red2: OutputPin,
    pub orange1: OutputPin,
    pub orange2: OutputPin,
    pub green1: OutputPin,
    pub green2: OutputPin,
    pub confetti: OutputPin,
    pub relay_power: PowerPin,
}

impl RelayTable {
    pub fn get(&self, channel: RelayChannel) -> OutputPin {
        match channel {
            RelayChannel::Red1 => self.red1,
            RelayChannel::Red2 => self.red2,
            RelayChannel::Orange1 => self.orange1,
            RelayChannel::Orange2 => self.orange2,
            RelayChannel::Green1 => self.green1,
            RelayChannel::Green2 => self.green2,
            RelayChannel::Confetti => self.confetti,
        }
    }

    /// Every relay channel with its pin, in a fixed order
    pub fn channels(&self) -> [(RelayChannel, OutputPin); 7] {
        [
            RelayChannel::Red1,
            RelayChannel::Red2,
            RelayChannel::Orange1,
            RelayChannel::Orange2,
            RelayChannel::Green1,
            RelayChannel::Green2,
            RelayChannel::Confetti,
        ]
        .map(|channel| (channel, self.get(channel)))
    }

    pub fn power(&self) -> OutputPin {
        self.relay_power.into()
    }
}

/// Remote feed of sibling locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,

    /// Polling period in seconds (60 to 120)
    pub refresh_secs: u64,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Name of this installation's own location in the feed
    pub local_name: String,

    /// Coordinates used when the feed doesn't list the local location
    pub local_latitude: f64,
    pub local_longitude: f64,

    /// Marker symbols that identify open and closed locations
    pub open_marker: String,
    pub closed_marker: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://hackerspaces.nl/hsmap/hsnl.geojson".to_string(),
            refresh_secs: 60,
            timeout_secs: 10,
            local_name: "Hacker Hotel".to_string(),
            local_latitude: 52.2208671,
            local_longitude: 5.7208085,
            open_marker: "/hsmap/hs_open.png".to_string(),
            closed_marker: "/hsmap/hs_closed.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// JSON animation script
    pub script: PathBuf,

    /// Host loop frames per second
    pub frame_rate: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("data/animations.json"),
            frame_rate: 60,
        }
    }
}

/// Outward status publishing
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishConfig {
    pub url: String,

    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

fn default_publish_timeout() -> u64 {
    10
}

/// Status HTTP API
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

pub const MIN_REFRESH_SECS: u64 = 60;
pub const MAX_REFRESH_SECS: u64 = 120;

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let hw = &self.hardware;

        let mut used: Vec<(u8, String)> = vec![
            (hw.inputs.top, "inputs.top".to_string()),
            (hw.inputs.bottom, "inputs.bottom".to_string()),
        ];
        used.extend(
            hw.outputs
                .channels()
                .iter()
                .map(|(channel, out)| (out.pin, format!("outputs.{}", channel))),
        );
        used.push((hw.outputs.relay_power.pin, "outputs.relay_power".to_string()));

        for (i, (pin, name)) in used.iter().enumerate() {
            if let Some((_, first)) = used[..i].iter().find(|(p, _)| p == pin) {
                return Err(ConfigError::PinConflict {
                    pin: *pin,
                    first: first.clone(),
                    second: name.clone(),
                });
            }
        }

        if hw.debounce_ms == 0 {
            return Err(ConfigError::Invalid(
                "hardware.debounce_ms must be positive".to_string(),
            ));
        }

        if hw.confetti_pulse_ms == 0 {
            return Err(ConfigError::Invalid(
                "hardware.confetti_pulse_ms must be positive".to_string(),
            ));
        }

        if !(MIN_REFRESH_SECS..=MAX_REFRESH_SECS).contains(&self.feed.refresh_secs) {
            return Err(ConfigError::Invalid(format!(
                "feed.refresh_secs must be between {} and {}, got {}",
                MIN_REFRESH_SECS, MAX_REFRESH_SECS, self.feed.refresh_secs
            )));
        }

        if self.animation.frame_rate == 0 {
            return Err(ConfigError::Invalid(
                "animation.frame_rate must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Pin {pin} is assigned to both {first} and {second}")]
    PinConflict {
        pin: u8,
        first: String,
        second: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use super::*;

    pub(crate) const MINIMAL: &str = r#"
        [hardware.inputs]
        top = 8
        bottom = 9

        [hardware.outputs]
        red1 = { pin = 10 }
        red2 = { pin = 11 }
        orange1 = { pin = 12 }
        orange2 = { pin = 13 }
        green1 = { pin = 2 }
        green2 = { pin = 3 }
        confetti = { pin = 4 }
        relay_power = { pin = 7 }
    "#;

    /// Parsed minimal config, for tests elsewhere in the crate
    pub(crate) fn minimal() -> Config {
        Config::parse(MINIMAL).unwrap()
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = minimal();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.hardware.debounce_ms, 100);
        assert_eq!(config.hardware.confetti_pulse_ms, 2000);
        assert_eq!(config.hardware.input_polarity, Polarity::ActiveHigh);
        assert_eq!(config.hardware.device, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(config.feed.refresh_secs, 60);
        assert_eq!(config.feed.local_name, "Hacker Hotel");
        assert!(config.publish.is_none());
        assert!(config.api.is_none());
    }

    #[test]
    fn test_relay_polarity_defaults() {
        let config = minimal();
        let outputs = config.hardware.outputs;

        // Relays are active low, relay power is active high
        assert!(outputs.get(RelayChannel::Red1).active_low);
        assert!(!outputs.get(RelayChannel::Red1).level(true));
        assert!(outputs.get(RelayChannel::Red1).level(false));
        assert!(!outputs.power().active_low);
        assert!(outputs.power().level(true));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = format!(
            r#"
            [logging]
            level = "debug"

            [logging.overrides]
            "hotelswitch::integrations::feed" = "trace"

            [feed]
            refresh_secs = 90
            local_name = "Test Space"

            [publish]
            url = "http://example.invalid/throwswitch.php"

            [api]
            port = 9000

            [hardware]
            device = "/dev/ttyACM0"
            input_polarity = "active_low"
            {}
            "#,
            MINIMAL
        );

        let config = Config::parse(&toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config
                .logging
                .overrides
                .get("hotelswitch::integrations::feed"),
            Some(&LogLevel::Trace)
        );
        assert_eq!(config.feed.refresh_secs, 90);
        assert_eq!(config.feed.local_name, "Test Space");
        assert_eq!(config.feed.open_marker, "/hsmap/hs_open.png");
        assert_eq!(config.hardware.input_polarity, Polarity::ActiveLow);
        assert_eq!(config.hardware.device, PathBuf::from("/dev/ttyACM0"));
        assert_eq!(config.api.unwrap().port, 9000);
        assert_eq!(
            config.publish.unwrap().url,
            "http://example.invalid/throwswitch.php"
        );
    }

    #[test]
    fn test_missing_channel_fails() {
        let toml = MINIMAL.replace("confetti = { pin = 4 }", "");
        let err = Config::parse(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("confetti"));
    }

    #[test]
    fn test_unknown_channel_fails() {
        let toml = MINIMAL.replace(
            "confetti = { pin = 4 }",
            "confetti = { pin = 4 }\nblue1 = { pin = 5 }",
        );
        assert!(Config::parse(&toml).is_err());
    }

    #[test]
    fn test_pin_conflict() {
        let toml = MINIMAL.replace("green2 = { pin = 3 }", "green2 = { pin = 9 }");
        let err = Config::parse(&toml).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"Pin 9 is assigned to both inputs.bottom and outputs.GREEN2");
    }

    #[test]
    fn test_refresh_period_range() {
        let toml = format!("{}\n[feed]\nrefresh_secs = 30\n", MINIMAL);
        let err = Config::parse(&toml).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"Invalid configuration: feed.refresh_secs must be between 60 and 120, got 30");
    }

    #[test]
    fn test_polarity() {
        assert!(Polarity::ActiveHigh.is_active(true));
        assert!(!Polarity::ActiveHigh.is_active(false));
        assert!(Polarity::ActiveLow.is_active(false));
        assert!(!Polarity::ActiveLow.is_active(true));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", MINIMAL).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.hardware.inputs.top, 8);
        assert_eq!(config.hardware.inputs.bottom, 9);

        let missing = Config::from_file("/nonexistent/hotelswitch.toml");
        assert!(matches!(missing, Err(ConfigError::Io(_, _))));
    }

    #[test]
    fn test_example_config() {
        let config = Config::parse(include_str!("../../../hotelswitch.example.toml")).unwrap();
        assert_eq!(config.hardware.outputs.relay_power.pin, 7);
        assert!(!config.hardware.outputs.relay_power.active_low);
        assert_eq!(config.api.map(|api| api.port), Some(8565));
        assert_eq!(
            config.logging.overrides.get("hotelswitch::integrations::firmata"),
            Some(&LogLevel::Debug)
        );
    }
}
