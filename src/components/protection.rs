//! Protective devices: fuses and thermal overload relays.

use serde::{Deserialize, Serialize};

use super::{pair_energized, Bridge, ElectricalComponent, TerminalRole, TerminalSpec};
use crate::circuit::Potential;

pub const DEFAULT_FUSE_LIMIT: f64 = 10.0;
pub const DEFAULT_THERMAL_LIMIT: f64 = 15.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fuse {
    pub blown: bool,
    pub limit: Option<f64>,
}

impl Default for Fuse {
    fn default() -> Self {
        Fuse {
            blown: false,
            limit: Some(DEFAULT_FUSE_LIMIT),
        }
    }
}

impl Fuse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: Option<f64>) -> Self {
        self.limit = limit;
        self
    }

    /// Fit a new cartridge.
    pub fn replace(&mut self) {
        self.blown = false;
    }

    pub fn toggle(&mut self) {
        self.blown = !self.blown;
    }
}

impl ElectricalComponent for Fuse {
    fn type_name(&self) -> &'static str {
        "fuse"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        vec![
            TerminalSpec::new("1", TerminalRole::In, 1.0, 0.0),
            TerminalSpec::new("2", TerminalRole::Out, 1.0, 3.0),
        ]
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        if self.blown {
            Vec::new()
        } else {
            vec![(0, 1)]
        }
    }

    fn amperage_limit(&self) -> Option<f64> {
        self.limit
    }

    fn after_propagation(&mut self, potentials: &[Potential]) -> bool {
        if !self.blown && pair_energized(potentials, 0, 1) {
            log::warn!("fuse blown by short circuit");
            self.blown = true;
            return true;
        }
        false
    }

    fn trip(&mut self) -> bool {
        !std::mem::replace(&mut self.blown, true)
    }
}

/// Auxiliary contact wiring of a thermal overload relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThermalRelayType {
    /// Separate NO (97-98) and NC (95-96) pairs.
    A,
    /// Common 95 switching between NC 96 and NO 98.
    B,
}

impl std::str::FromStr for ThermalRelayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(ThermalRelayType::A),
            "B" => Ok(ThermalRelayType::B),
            other => Err(format!("unknown thermal relay type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalOverloadRelay {
    relay_type: ThermalRelayType,
    pub tripped: bool,
    pub limit: Option<f64>,
}

impl ThermalOverloadRelay {
    pub fn new(relay_type: ThermalRelayType) -> Self {
        ThermalOverloadRelay {
            relay_type,
            tripped: false,
            limit: Some(DEFAULT_THERMAL_LIMIT),
        }
    }

    pub fn with_limit(mut self, limit: Option<f64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn relay_type(&self) -> ThermalRelayType {
        self.relay_type
    }

    pub fn set_relay_type(&mut self, relay_type: ThermalRelayType) {
        self.relay_type = relay_type;
        self.tripped = false;
    }

    pub fn reset(&mut self) {
        self.tripped = false;
    }
}

impl ElectricalComponent for ThermalOverloadRelay {
    fn type_name(&self) -> &'static str {
        "thermal_relay"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        let mut specs = Vec::with_capacity(10);
        for (i, (line, load)) in [("L1", "T1"), ("L2", "T2"), ("L3", "T3")].iter().enumerate() {
            let x = 1.0 + 2.0 * i as f64;
            specs.push(TerminalSpec::new(*line, TerminalRole::MainIn, x, 0.0));
            specs.push(TerminalSpec::new(*load, TerminalRole::MainOut, x, 4.0));
        }
        match self.relay_type {
            ThermalRelayType::A => specs.extend([
                TerminalSpec::new("97", TerminalRole::NormallyOpenIn, 7.0, 0.0),
                TerminalSpec::new("98", TerminalRole::NormallyOpenOut, 7.0, 4.0),
                TerminalSpec::new("95", TerminalRole::NormallyClosedIn, 8.0, 0.0),
                TerminalSpec::new("96", TerminalRole::NormallyClosedOut, 8.0, 4.0),
            ]),
            ThermalRelayType::B => specs.extend([
                TerminalSpec::new("95", TerminalRole::Common, 7.5, 0.0),
                TerminalSpec::new("96", TerminalRole::NormallyClosedOut, 7.0, 4.0),
                TerminalSpec::new("98", TerminalRole::NormallyOpenOut, 8.0, 4.0),
            ]),
        }
        specs
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        // Main poles pass through whatever the trip state.
        let mut bridges = vec![(0, 1), (2, 3), (4, 5)];
        bridges.push(match (self.relay_type, self.tripped) {
            (ThermalRelayType::A, true) => (6, 7),
            (ThermalRelayType::A, false) => (8, 9),
            (ThermalRelayType::B, true) => (6, 8),
            (ThermalRelayType::B, false) => (6, 7),
        });
        bridges
    }

    fn amperage_limit(&self) -> Option<f64> {
        self.limit
    }

    fn trip(&mut self) -> bool {
        !std::mem::replace(&mut self.tripped, true)
    }
}
