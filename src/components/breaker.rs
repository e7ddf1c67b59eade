//! No-fuse breaker, which doubles as the power source of a diagram.

use serde::{Deserialize, Serialize};

use super::{Bridge, ElectricalComponent, TerminalRole, TerminalSpec};

pub const DEFAULT_VOLTAGE: f64 = 110.0;
pub const DEFAULT_AMPERAGE_LIMIT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoleType {
    OneP,
    TwoP,
    ThreeP,
    FourP,
}

impl PoleType {
    /// Pole names in terminal order.
    pub fn pole_names(self) -> &'static [&'static str] {
        match self {
            PoleType::OneP => &["L"],
            PoleType::TwoP => &["L", "N"],
            PoleType::ThreeP => &["R", "S", "T"],
            PoleType::FourP => &["R", "S", "T", "N"],
        }
    }

    /// Neutral poles feed the negative side. On a 3P breaker the T phase
    /// plays that part.
    pub fn is_neutral(self, pole: &str) -> bool {
        pole == "N" || (self == PoleType::ThreeP && pole == "T")
    }

    pub fn pole_count(self) -> usize {
        self.pole_names().len()
    }
}

impl std::str::FromStr for PoleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "1P" => Ok(PoleType::OneP),
            "2P" => Ok(PoleType::TwoP),
            "3P" => Ok(PoleType::ThreeP),
            "4P" => Ok(PoleType::FourP),
            other => Err(format!("unknown pole type '{}'", other)),
        }
    }
}

/// Breaker with one line and one load terminal per pole.
///
/// Terminal layout: pole `i` has its line terminal at index `2i` (labelled
/// with the odd number `2i + 1`) and its load terminal at `2i + 1`
/// (labelled `2i + 2`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breaker {
    pub poles: PoleType,
    pub is_on: bool,
    pub voltage: f64,
    pub limit: Option<f64>,
}

impl Breaker {
    pub fn new(poles: PoleType) -> Self {
        Breaker {
            poles,
            is_on: false,
            voltage: DEFAULT_VOLTAGE,
            limit: Some(DEFAULT_AMPERAGE_LIMIT),
        }
    }

    pub fn with_voltage(mut self, voltage: f64) -> Self {
        self.voltage = voltage;
        self
    }

    pub fn with_limit(mut self, limit: Option<f64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn switched_on(mut self) -> Self {
        self.is_on = true;
        self
    }

    pub fn toggle(&mut self) {
        self.is_on = !self.is_on;
    }

    pub fn set_poles(&mut self, poles: PoleType) {
        self.poles = poles;
    }
}

impl ElectricalComponent for Breaker {
    fn type_name(&self) -> &'static str {
        "breaker"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        let count = self.poles.pole_count();
        let height = 5.0;
        let mut specs = Vec::with_capacity(count * 2);
        for (i, pole) in self.poles.pole_names().iter().enumerate() {
            let x = if count >= 3 {
                1.0 + 2.0 * i as f64
            } else {
                1.0 + i as f64
            };
            let role = if self.poles.is_neutral(pole) {
                TerminalRole::NeutralInput
            } else {
                TerminalRole::PositiveInput
            };
            specs.push(TerminalSpec::new((2 * i + 1).to_string(), role, x, 0.0));
            specs.push(TerminalSpec::new(
                (2 * i + 2).to_string(),
                TerminalRole::Output,
                x,
                height,
            ));
        }
        specs
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        if !self.is_on {
            return Vec::new();
        }
        (0..self.poles.pole_count()).map(|i| (2 * i, 2 * i + 1)).collect()
    }

    fn amperage_limit(&self) -> Option<f64> {
        self.limit
    }

    fn source_voltage(&self) -> Option<f64> {
        Some(self.voltage)
    }

    fn trip(&mut self) -> bool {
        let was_on = self.is_on;
        self.is_on = false;
        was_on
    }
}
