//! ==============================================================================
//! domain.rs - pin model shared by the stores, the reconciler and the console
//! ==============================================================================
//!
//! purpose:
//!     typed view of one position on the 40-pin header as reported by the
//!     remote hardware-access service, plus the wire records it is decoded from.
//!
//! relationships:
//!     - decoded by: service.rs (GET /api/pins, pin_info of action replies)
//!     - stored by: snapshot.rs
//!     - consumed by: reconcile.rs, controller.rs, console.rs
//!
//! ==============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// number of physical positions on the header
pub const HEADER_PINS: u8 = 40;

/// physical header position (1..=40), the stable identifier of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Position(u8);

impl Position {
    pub fn new(value: u8) -> Option<Self> {
        (1..=HEADER_PINS).contains(&value).then_some(Self(value))
    }

    #[cfg(test)]
    pub fn get(self) -> u8 {
        self.0
    }

    /// every position on the header, in order
    pub fn all() -> impl Iterator<Item = Position> {
        (1..=HEADER_PINS).map(Position)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Position::new(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("position {} outside 1..={}", raw, HEADER_PINS)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    Power,
    Ground,
    Gpio,
    #[serde(other)]
    Reserved,
}

impl PinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PinKind::Power => "power",
            PinKind::Ground => "ground",
            PinKind::Gpio => "gpio",
            PinKind::Reserved => "reserved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "INPUT")]
    Input,
    #[serde(rename = "OUTPUT")]
    Output,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "INPUT",
            Direction::Output => "OUTPUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INPUT" => Ok(Direction::Input),
            "OUTPUT" => Ok(Direction::Output),
            other => Err(format!("Invalid direction '{}'. Use INPUT or OUTPUT", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Level {
    #[default]
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "HIGH")]
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::High => "HIGH",
            Level::Low => "LOW",
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// last-known state of one header position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub position: Position,
    pub kind: PinKind,
    pub description: String,
    pub has_control_number: bool,
    /// logic-line identifier, absent for power/ground and unaddressable pins
    pub control_number: Option<u32>,
    /// whether the board enables this line for use (device tree)
    pub is_configured: bool,
    pub direction: Option<Direction>,
    pub level: Level,
}

impl Pin {
    /// gpio with an addressable line that the board has enabled
    pub fn controllable(&self) -> bool {
        self.kind == PinKind::Gpio && self.has_control_number && self.is_configured
    }
}

// ==============================================================================
// wire records
// ==============================================================================
// field names follow the service's json. `state` arrives as a bool or as the
// 0/1 integer the gpio library returns, so it is decoded leniently.

/// one entry of GET /api/pins, or the `pin_info` of an action reply
#[derive(Debug, Clone, Deserialize)]
pub struct PinInfo {
    #[serde(rename = "type")]
    pub kind: PinKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub gpio_num: Option<u32>,
    #[serde(default)]
    pub dts_configured: bool,
    #[serde(default)]
    pub has_gpio_num: bool,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default, deserialize_with = "lenient_level")]
    pub state: Option<bool>,
}

impl PinInfo {
    pub fn into_pin(self, position: Position) -> Pin {
        Pin {
            position,
            kind: self.kind,
            description: self.description,
            has_control_number: self.has_gpio_num,
            control_number: self.gpio_num,
            is_configured: self.dts_configured,
            direction: self.direction,
            level: Level::from(self.state.unwrap_or(false)),
        }
    }
}

/// accepts `true`/`false`, `0`/`1` or `null`
pub fn lenient_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Bool(b)) => Some(b),
        Some(Raw::Int(i)) => Some(i != 0),
        None => None,
    })
}

/// decode the GET /api/pins body (keys are decimal positions)
pub fn pins_from_wire(raw: BTreeMap<String, PinInfo>) -> Result<BTreeMap<Position, Pin>, String> {
    raw.into_iter()
        .map(|(key, info)| {
            let position = key
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(Position::new)
                .ok_or_else(|| format!("invalid pin position '{}'", key))?;
            Ok((position, info.into_pin(position)))
        })
        .collect()
}

/// board summary from GET /api/gpio-info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioInfo {
    pub gpio_mode: String,
    #[serde(default)]
    pub total_pins: u32,
    #[serde(default)]
    pub controllable_pins: u32,
    #[serde(default)]
    pub pin_mapping: BTreeMap<String, PinMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinMapping {
    pub physical_pin: u8,
    pub gpio_number: u32,
    pub description: String,
}
