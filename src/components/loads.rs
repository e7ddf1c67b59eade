//! Loads and measurement devices: motors, pilot lamps, resistors, ammeters.

use serde::{Deserialize, Serialize};

use super::{pair_energized, Bridge, ElectricalComponent, TerminalRole, TerminalSpec};
use crate::circuit::Potential;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorType {
    /// Three-phase, six terminals (U1 V1 W1 / W2 U2 V2).
    ThreePhaseSix,
    /// Single-phase with a centre neutral (L1 N L2).
    SinglePhaseThree,
    /// Single-phase two-wire (L N).
    SinglePhaseTwo,
}

impl std::str::FromStr for MotorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "3ph6" | "3phase_6t" => Ok(MotorType::ThreePhaseSix),
            "1ph3" | "1phase_3t" => Ok(MotorType::SinglePhaseThree),
            "1ph2" | "1phase_2t" => Ok(MotorType::SinglePhaseTwo),
            other => Err(format!("unknown motor type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Motor {
    pub motor_type: MotorType,
}

impl Motor {
    pub fn new(motor_type: MotorType) -> Self {
        Motor { motor_type }
    }
}

impl ElectricalComponent for Motor {
    fn type_name(&self) -> &'static str {
        "motor"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        let labels: &[&str] = match self.motor_type {
            MotorType::ThreePhaseSix => &["U1", "V1", "W1", "W2", "U2", "V2"],
            MotorType::SinglePhaseThree => &["L1", "N", "L2"],
            MotorType::SinglePhaseTwo => &["L", "N"],
        };
        let per_row = if labels.len() == 6 { 3 } else { labels.len() };
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let x = 1.0 + 2.0 * (i % per_row) as f64;
                let y = 2.0 * (i / per_row) as f64;
                TerminalSpec::new(*label, TerminalRole::Load, x, y)
            })
            .collect()
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        Vec::new()
    }

    /// Running once its terminals carry both polarities between them.
    fn energized(&self, potentials: &[Potential]) -> bool {
        let seen = potentials
            .iter()
            .fold(Potential::None, |acc, p| acc.union(*p));
        seen == Potential::Both
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LampColor {
    #[default]
    Red,
    Yellow,
    Green,
    White,
    Blue,
    Orange,
}

impl LampColor {
    pub const ALL: [LampColor; 6] = [
        LampColor::Red,
        LampColor::Yellow,
        LampColor::Green,
        LampColor::White,
        LampColor::Blue,
        LampColor::Orange,
    ];

    pub fn code(self) -> &'static str {
        match self {
            LampColor::Red => "RL",
            LampColor::Yellow => "YL",
            LampColor::Green => "GL",
            LampColor::White => "WL",
            LampColor::Blue => "BL",
            LampColor::Orange => "OL",
        }
    }

    pub fn next(self) -> LampColor {
        let i = Self::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }
}

impl std::str::FromStr for LampColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        LampColor::ALL
            .iter()
            .copied()
            .find(|c| c.code() == upper)
            .ok_or_else(|| format!("unknown lamp color '{}'", s))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lamp {
    pub color: LampColor,
}

impl Lamp {
    pub fn new(color: LampColor) -> Self {
        Lamp { color }
    }

    pub fn cycle_color(&mut self) {
        self.color = self.color.next();
    }
}

impl ElectricalComponent for Lamp {
    fn type_name(&self) -> &'static str {
        "lamp"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        vec![
            TerminalSpec::new("X1", TerminalRole::Load, 1.0, 0.0),
            TerminalSpec::new("X2", TerminalRole::Load, 1.0, 2.0),
        ]
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        Vec::new()
    }

    fn energized(&self, potentials: &[Potential]) -> bool {
        pair_energized(potentials, 0, 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resistor {
    pub ohms: f64,
    #[serde(skip)]
    current: f64,
}

impl Resistor {
    pub fn new(ohms: f64) -> Self {
        Resistor { ohms, current: 0.0 }
    }

    /// Current recorded by the last solve, in amperes.
    pub fn current(&self) -> f64 {
        self.current
    }
}

impl ElectricalComponent for Resistor {
    fn type_name(&self) -> &'static str {
        "resistor"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        vec![
            TerminalSpec::new("1", TerminalRole::Passive, 0.0, 1.0),
            TerminalSpec::new("2", TerminalRole::Passive, 3.0, 1.0),
        ]
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        vec![(0, 1)]
    }

    fn resistance(&self) -> Option<f64> {
        Some(self.ohms)
    }

    fn record_current(&mut self, amps: f64) {
        self.current = self.current.max(amps);
    }

    fn clear_transient(&mut self) {
        self.current = 0.0;
    }

    fn energized(&self, _potentials: &[Potential]) -> bool {
        self.current > 0.0
    }
}

/// Series ammeter. Adds no resistance to the loop it sits in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ammeter {
    #[serde(skip)]
    reading: f64,
}

impl Ammeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reading(&self) -> f64 {
        self.reading
    }
}

impl ElectricalComponent for Ammeter {
    fn type_name(&self) -> &'static str {
        "ammeter"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        vec![
            TerminalSpec::new("+", TerminalRole::In, 0.0, 1.0),
            TerminalSpec::new("-", TerminalRole::Out, 2.0, 1.0),
        ]
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        vec![(0, 1)]
    }

    fn resistance(&self) -> Option<f64> {
        Some(0.0)
    }

    fn record_current(&mut self, amps: f64) {
        self.reading = self.reading.max(amps);
    }

    fn clear_transient(&mut self) {
        self.reading = 0.0;
    }
}
