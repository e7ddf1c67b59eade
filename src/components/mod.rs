//! Component variants and the contract the engine drives them through.
//!
//! Every variant implements [`ElectricalComponent`]. The propagation engine
//! and the current solver only ever talk to that trait; neither knows which
//! concrete device it is looking at.
//!
//! Terminals are addressed locally by their index in the list returned from
//! [`ElectricalComponent::terminal_specs`]. The owning [`crate::Circuit`]
//! maps those indices onto stable terminal ids.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit::{Point, Polarity, Potential};

pub mod breaker;
pub mod contactor;
pub mod loads;
pub mod protection;
pub mod relay;
pub mod switch;
pub mod terminal_block;
pub mod timer;

pub use breaker::{Breaker, PoleType};
pub use contactor::Contactor;
pub use loads::{Ammeter, Lamp, LampColor, Motor, MotorType, Resistor};
pub use protection::{Fuse, ThermalOverloadRelay, ThermalRelayType};
pub use relay::{ContactFunction, KnobIndex, Relay, RelayType};
pub use switch::{Switch, SwitchType};
pub use terminal_block::{Orientation, TerminalBlock};
pub use timer::DelayTimer;

/// A pair of local terminal indices that are electrically bridged.
pub type Bridge = (usize, usize);

/// What a terminal is for. The vocabulary varies by variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminalRole {
    /// Supply-side terminal of a live breaker pole.
    PositiveInput,
    /// Supply-side terminal of a neutral breaker pole.
    NeutralInput,
    Output,
    In,
    Out,
    Common,
    Coil,
    MainIn,
    MainOut,
    NormallyOpenIn,
    NormallyOpenOut,
    NormallyClosedIn,
    NormallyClosedOut,
    Load,
    Passive,
}

impl TerminalRole {
    /// Polarity injected at this terminal when it belongs to a power source.
    pub fn source_polarity(self) -> Option<Polarity> {
        match self {
            TerminalRole::PositiveInput => Some(Polarity::Positive),
            TerminalRole::NeutralInput => Some(Polarity::Negative),
            _ => None,
        }
    }
}

/// Layout entry for one terminal, produced by a variant for its current
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalSpec {
    pub label: String,
    pub role: TerminalRole,
    /// Offset from the component origin, in grid units.
    pub offset: Point,
}

impl TerminalSpec {
    pub fn new(label: impl Into<String>, role: TerminalRole, x: f64, y: f64) -> Self {
        TerminalSpec {
            label: label.into(),
            role,
            offset: Point::new(x, y),
        }
    }
}

/// The capability set shared by every component variant.
///
/// `internal_connections` must be a pure function of the stored state: the
/// engine may call it any number of times per tick.
pub trait ElectricalComponent {
    /// Short lowercase name of the variant, used in logs and reports.
    fn type_name(&self) -> &'static str;

    /// Terminal layout for the current configuration.
    fn terminal_specs(&self) -> Vec<TerminalSpec>;

    /// Local terminal pairs bridged right now.
    fn internal_connections(&self) -> Vec<Bridge>;

    /// Series resistance in ohms, for resistance-bearing devices.
    fn resistance(&self) -> Option<f64> {
        None
    }

    /// Current rating in amperes, for protective devices.
    fn amperage_limit(&self) -> Option<f64> {
        None
    }

    /// Supply voltage, for devices that act as a power source.
    fn source_voltage(&self) -> Option<f64> {
        None
    }

    /// Per-tick state update run before propagation. `potentials` holds the
    /// potentials of this component's terminals from the previous tick.
    fn update(&mut self, _potentials: &[Potential], _dt: Duration) {}

    /// Hook run once both polarity passes are complete. Returns `true` when
    /// the component changed state (a fuse blowing on a short).
    fn after_propagation(&mut self, _potentials: &[Potential]) -> bool {
        false
    }

    /// Open the device because of overcurrent. Returns `true` if the state
    /// actually changed.
    fn trip(&mut self) -> bool {
        false
    }

    /// Store the current flowing through a resistance-bearing device.
    fn record_current(&mut self, _amps: f64) {}

    /// Forget per-tick scratch values.
    fn clear_transient(&mut self) {}

    /// Whether the device is doing its job: lamp lit, motor running, coil
    /// pulled in.
    fn energized(&self, _potentials: &[Potential]) -> bool {
        false
    }
}

/// Closed set of variants placed on a diagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComponentType {
    Breaker(Breaker),
    Switch(Switch),
    Contactor(Contactor),
    Relay(Relay),
    Fuse(Fuse),
    ThermalRelay(ThermalOverloadRelay),
    Motor(Motor),
    Lamp(Lamp),
    TerminalBlock(TerminalBlock),
    Resistor(Resistor),
    Ammeter(Ammeter),
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            ComponentType::Breaker($inner) => $body,
            ComponentType::Switch($inner) => $body,
            ComponentType::Contactor($inner) => $body,
            ComponentType::Relay($inner) => $body,
            ComponentType::Fuse($inner) => $body,
            ComponentType::ThermalRelay($inner) => $body,
            ComponentType::Motor($inner) => $body,
            ComponentType::Lamp($inner) => $body,
            ComponentType::TerminalBlock($inner) => $body,
            ComponentType::Resistor($inner) => $body,
            ComponentType::Ammeter($inner) => $body,
        }
    };
}

impl ElectricalComponent for ComponentType {
    fn type_name(&self) -> &'static str {
        dispatch!(self, c => c.type_name())
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        dispatch!(self, c => c.terminal_specs())
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        dispatch!(self, c => c.internal_connections())
    }

    fn resistance(&self) -> Option<f64> {
        dispatch!(self, c => c.resistance())
    }

    fn amperage_limit(&self) -> Option<f64> {
        dispatch!(self, c => c.amperage_limit())
    }

    fn source_voltage(&self) -> Option<f64> {
        dispatch!(self, c => c.source_voltage())
    }

    fn update(&mut self, potentials: &[Potential], dt: Duration) {
        dispatch!(self, c => c.update(potentials, dt))
    }

    fn after_propagation(&mut self, potentials: &[Potential]) -> bool {
        dispatch!(self, c => c.after_propagation(potentials))
    }

    fn trip(&mut self) -> bool {
        dispatch!(self, c => c.trip())
    }

    fn record_current(&mut self, amps: f64) {
        dispatch!(self, c => c.record_current(amps))
    }

    fn clear_transient(&mut self) {
        dispatch!(self, c => c.clear_transient())
    }

    fn energized(&self, potentials: &[Potential]) -> bool {
        dispatch!(self, c => c.energized(potentials))
    }
}

/// Potential of local terminal `index`, or `None` for an index the caller
/// did not supply.
pub(crate) fn potential_at(potentials: &[Potential], index: usize) -> Potential {
    potentials.get(index).copied().unwrap_or_default()
}

/// True when terminals `a` and `b` carry opposite polarities.
pub(crate) fn pair_energized(potentials: &[Potential], a: usize, b: usize) -> bool {
    potential_at(potentials, a).opposes(potential_at(potentials, b))
}
