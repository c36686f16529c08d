//! Firmata wire format: the handful of messages needed for digital I/O.

/// Digital pins per Firmata port
pub const PORT_WIDTH: u8 = 8;

/// Firmata addresses at most 16 digital ports
pub const MAX_PIN: u8 = 16 * PORT_WIDTH - 1;

const DIGITAL_MESSAGE: u8 = 0x90;
const ANALOG_MESSAGE: u8 = 0xE0;
const REPORT_ANALOG: u8 = 0xC0;
const REPORT_DIGITAL: u8 = 0xD0;
const SET_PIN_MODE: u8 = 0xF4;
const SET_DIGITAL_PIN_VALUE: u8 = 0xF5;
const REPORT_VERSION: u8 = 0xF9;
const SYSTEM_RESET: u8 = 0xFF;
const START_SYSEX: u8 = 0xF0;
const END_SYSEX: u8 = 0xF7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PinMode {
    Input = 0x00,
    Output = 0x01,
}

pub fn port_of(pin: u8) -> u8 {
    pin / PORT_WIDTH
}

pub fn bit_of(pin: u8) -> u8 {
    1 << (pin % PORT_WIDTH)
}

pub fn set_pin_mode(pin: u8, mode: PinMode) -> [u8; 3] {
    [SET_PIN_MODE, pin & 0x7F, mode as u8]
}

/// Write all eight pins of a port at once
pub fn digital_port(port: u8, levels: u8) -> [u8; 3] {
    [DIGITAL_MESSAGE | (port & 0x0F), levels & 0x7F, levels >> 7]
}

pub fn report_digital(port: u8, enabled: bool) -> [u8; 2] {
    [REPORT_DIGITAL | (port & 0x0F), enabled as u8]
}

/// Decoded board-to-host message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Current input levels of one port, bit n = pin `port * 8 + n`
    DigitalPort { port: u8, levels: u8 },
    Version { major: u8, minor: u8 },
    /// Anything else the board may send; carries the command byte
    Ignored(u8),
}

/// Incremental decoder for the board's byte stream
///
/// Bytes before the first command byte and stray data bytes are dropped, so
/// the decoder resynchronizes on the next command.
#[derive(Debug, Default)]
pub struct Decoder {
    command: Option<u8>,
    data: Vec<u8>,
    in_sysex: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data bytes following `command`, or `None` for sysex framing
    fn expected_len(command: u8) -> Option<usize> {
        match command {
            0x80..=0xBF | 0xE0..=0xEF => Some(2),
            0xC0..=0xDF => Some(1),
            SET_PIN_MODE | SET_DIGITAL_PIN_VALUE | REPORT_VERSION => Some(2),
            START_SYSEX => None,
            _ => Some(0),
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Message> {
        if self.in_sysex {
            if byte == END_SYSEX {
                self.in_sysex = false;
                self.data.clear();
                return Some(Message::Ignored(START_SYSEX));
            }
            // Sysex payloads are not needed, only framed
            return None;
        }

        if byte & 0x80 != 0 {
            self.data.clear();
            match Self::expected_len(byte) {
                None => {
                    self.in_sysex = true;
                    self.command = None;
                    None
                }
                Some(0) => {
                    self.command = None;
                    (byte != END_SYSEX && byte != SYSTEM_RESET).then_some(Message::Ignored(byte))
                }
                Some(_) => {
                    self.command = Some(byte);
                    None
                }
            }
        } else {
            let command = self.command?;
            self.data.push(byte);
            if Some(self.data.len()) != Self::expected_len(command) {
                return None;
            }

            self.command = None;
            let message = match command {
                0x90..=0x9F => Message::DigitalPort {
                    port: command & 0x0F,
                    levels: self.data[0] | (self.data[1] << 7),
                },
                REPORT_VERSION => Message::Version {
                    major: self.data[0],
                    minor: self.data[1],
                },
                ANALOG_MESSAGE..=0xEF | REPORT_ANALOG..=0xDF => Message::Ignored(command & 0xF0),
                _ => Message::Ignored(command),
            };
            self.data.clear();
            Some(message)
        }
    }
}
