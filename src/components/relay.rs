//! Plug-in relays and timers.
//!
//! Each [`RelayType`] has a fixed pin layout and a list of contact functions.
//! A contact function names two pins and the rule deciding whether they are
//! bridged. Timed contacts are driven by the delay timer of the dial (knob)
//! they reference; timers only run while the coil is energized.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::timer::DelayTimer;
use super::{pair_energized, Bridge, ElectricalComponent, TerminalRole, TerminalSpec};
use crate::circuit::{CircuitError, Potential};

/// Index of an adjustable dial on a relay face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnobIndex(pub u8);

impl KnobIndex {
    fn get(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactFunction {
    /// Closes while the coil is energized.
    A,
    /// Closes while the coil is not energized.
    B,
    /// Closes once the dial delay has elapsed with the coil energized.
    TimedA(KnobIndex),
    /// Closed while de-energized and during the delay; opens once it elapses.
    TimedB(KnobIndex),
}

#[derive(Debug, Clone, Copy)]
struct ContactDef {
    function: ContactFunction,
    pins: (&'static str, &'static str),
}

#[derive(Debug, Clone, Copy)]
struct KnobDef {
    default_value: u32,
    max_value: u32,
}

#[derive(Debug)]
struct RelayLayout {
    pins: &'static [(&'static str, f64, f64)],
    coil: (&'static str, &'static str),
    contacts: &'static [ContactDef],
    knobs: &'static [KnobDef],
}

const fn contact(function: ContactFunction, from: &'static str, to: &'static str) -> ContactDef {
    ContactDef {
        function,
        pins: (from, to),
    }
}

use ContactFunction::{TimedA, TimedB, A, B};

const EIGHT_PIN: &[(&str, f64, f64)] = &[
    ("1", 1.0, 0.0),
    ("2", 2.0, 0.0),
    ("3", 3.0, 0.0),
    ("4", 4.0, 0.0),
    ("5", 4.0, 4.0),
    ("6", 3.0, 4.0),
    ("7", 2.0, 4.0),
    ("8", 1.0, 4.0),
];

const ELEVEN_PIN: &[(&str, f64, f64)] = &[
    ("1", 1.0, 0.0),
    ("2", 2.0, 0.0),
    ("3", 3.0, 0.0),
    ("4", 4.0, 0.0),
    ("5", 5.0, 0.0),
    ("6", 6.0, 0.0),
    ("7", 5.0, 4.0),
    ("8", 4.0, 4.0),
    ("9", 3.0, 4.0),
    ("10", 2.0, 4.0),
    ("11", 1.0, 4.0),
];

const FOURTEEN_PIN: &[(&str, f64, f64)] = &[
    ("1", 1.0, 0.0),
    ("2", 2.0, 0.0),
    ("3", 3.0, 0.0),
    ("4", 4.0, 0.0),
    ("5", 1.0, 1.0),
    ("6", 2.0, 1.0),
    ("7", 3.0, 1.0),
    ("8", 4.0, 1.0),
    ("9", 1.0, 2.0),
    ("10", 2.0, 2.0),
    ("11", 3.0, 2.0),
    ("12", 4.0, 2.0),
    ("13", 1.0, 3.0),
    ("14", 4.0, 3.0),
];

const DIAL: KnobDef = KnobDef {
    default_value: 0,
    max_value: 30,
};

const TWO_C: RelayLayout = RelayLayout {
    pins: EIGHT_PIN,
    coil: ("2", "7"),
    contacts: &[
        contact(A, "1", "3"),
        contact(B, "1", "4"),
        contact(A, "8", "6"),
        contact(B, "8", "5"),
    ],
    knobs: &[],
};

const THREE_C: RelayLayout = RelayLayout {
    pins: ELEVEN_PIN,
    coil: ("2", "10"),
    contacts: &[
        contact(A, "1", "3"),
        contact(B, "1", "4"),
        contact(A, "6", "7"),
        contact(B, "6", "5"),
        contact(A, "11", "9"),
        contact(B, "11", "8"),
    ],
    knobs: &[],
};

const FOUR_C: RelayLayout = RelayLayout {
    pins: FOURTEEN_PIN,
    coil: ("13", "14"),
    contacts: &[
        contact(A, "9", "5"),
        contact(B, "9", "1"),
        contact(A, "10", "6"),
        contact(B, "10", "2"),
        contact(A, "11", "7"),
        contact(B, "11", "3"),
        contact(A, "12", "8"),
        contact(B, "12", "4"),
    ],
    knobs: &[],
};

const ON_DELAY: RelayLayout = RelayLayout {
    pins: EIGHT_PIN,
    coil: ("2", "7"),
    contacts: &[
        contact(TimedA(KnobIndex(0)), "1", "3"),
        contact(TimedB(KnobIndex(0)), "1", "4"),
        contact(TimedA(KnobIndex(0)), "8", "6"),
        contact(TimedB(KnobIndex(0)), "8", "5"),
    ],
    knobs: &[DIAL],
};

// Star contact drops out and delta contact pulls in on the same dial.
const Y_DELTA_27: RelayLayout = RelayLayout {
    pins: EIGHT_PIN,
    coil: ("2", "7"),
    contacts: &[
        contact(A, "1", "3"),
        contact(TimedB(KnobIndex(0)), "8", "5"),
        contact(TimedA(KnobIndex(0)), "8", "6"),
    ],
    knobs: &[DIAL],
};

// Separate dials for star time and delta pull-in.
const Y_DELTA_28: RelayLayout = RelayLayout {
    pins: EIGHT_PIN,
    coil: ("2", "7"),
    contacts: &[
        contact(A, "1", "3"),
        contact(TimedB(KnobIndex(0)), "8", "5"),
        contact(TimedA(KnobIndex(1)), "8", "6"),
    ],
    knobs: &[
        DIAL,
        KnobDef {
            default_value: 1,
            max_value: 30,
        },
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayType {
    TwoC,
    ThreeC,
    FourC,
    OnDelay,
    YDelta27,
    YDelta28,
}

impl RelayType {
    fn layout(self) -> &'static RelayLayout {
        match self {
            RelayType::TwoC => &TWO_C,
            RelayType::ThreeC => &THREE_C,
            RelayType::FourC => &FOUR_C,
            RelayType::OnDelay => &ON_DELAY,
            RelayType::YDelta27 => &Y_DELTA_27,
            RelayType::YDelta28 => &Y_DELTA_28,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RelayType::TwoC => "2C",
            RelayType::ThreeC => "3C",
            RelayType::FourC => "4C",
            RelayType::OnDelay => "ON-delay",
            RelayType::YDelta27 => "Y-delta-27",
            RelayType::YDelta28 => "Y-delta-28",
        }
    }
}

impl std::str::FromStr for RelayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "2c" => Ok(RelayType::TwoC),
            "3c" => Ok(RelayType::ThreeC),
            "4c" => Ok(RelayType::FourC),
            "on-delay" | "ondelay" => Ok(RelayType::OnDelay),
            "y-delta-27" | "yd27" => Ok(RelayType::YDelta27),
            "y-delta-28" | "yd28" => Ok(RelayType::YDelta28),
            other => Err(format!("unknown relay type '{}'", other)),
        }
    }
}

/// Dial setting in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Knob {
    pub value: u32,
    pub max_value: u32,
}

impl Knob {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relay {
    relay_type: RelayType,
    knobs: Vec<Knob>,
    #[serde(skip)]
    energized: bool,
    /// One timer per knob, indexed like `knobs`.
    #[serde(skip)]
    timers: Vec<DelayTimer>,
}

impl Relay {
    pub fn new(relay_type: RelayType) -> Self {
        let knobs: Vec<Knob> = relay_type
            .layout()
            .knobs
            .iter()
            .map(|k| Knob {
                value: k.default_value,
                max_value: k.max_value,
            })
            .collect();
        let timers = vec![DelayTimer::default(); knobs.len()];
        Relay {
            relay_type,
            knobs,
            energized: false,
            timers,
        }
    }

    pub fn relay_type(&self) -> RelayType {
        self.relay_type
    }

    /// Switch to another catalog entry. Coil state, dials and timers start
    /// over.
    pub fn set_relay_type(&mut self, relay_type: RelayType) {
        *self = Relay::new(relay_type);
    }

    pub fn is_energized(&self) -> bool {
        self.energized
    }

    pub fn knobs(&self) -> &[Knob] {
        &self.knobs
    }

    pub fn set_knob(&mut self, index: KnobIndex, value: u32) -> Result<(), CircuitError> {
        let count = self.knobs.len();
        let knob = self
            .knobs
            .get_mut(index.get())
            .ok_or(CircuitError::InvalidKnob {
                index: index.0,
                count,
            })?;
        knob.value = value.min(knob.max_value);
        Ok(())
    }

    pub fn timer(&self, index: KnobIndex) -> Option<&DelayTimer> {
        self.timers.get(index.get())
    }

    pub fn contact_functions(&self) -> impl Iterator<Item = ContactFunction> + '_ {
        self.relay_type.layout().contacts.iter().map(|c| c.function)
    }

    fn pin_index(&self, label: &str) -> Option<usize> {
        self.relay_type
            .layout()
            .pins
            .iter()
            .position(|(pin, _, _)| *pin == label)
    }

    fn contact_closed(&self, function: ContactFunction) -> bool {
        match function {
            ContactFunction::A => self.energized,
            ContactFunction::B => !self.energized,
            ContactFunction::TimedA(knob) => self.timer(knob).is_some_and(|t| t.expired()),
            ContactFunction::TimedB(knob) => {
                !self.energized
                    || self
                        .timer(knob)
                        .is_some_and(|t| self.energized && t.elapsed < t.delay)
            }
        }
    }
}

impl ElectricalComponent for Relay {
    fn type_name(&self) -> &'static str {
        "relay"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        let layout = self.relay_type.layout();
        layout
            .pins
            .iter()
            .map(|(label, x, y)| {
                let role = if *label == layout.coil.0 || *label == layout.coil.1 {
                    TerminalRole::Coil
                } else {
                    TerminalRole::Passive
                };
                TerminalSpec::new(*label, role, *x, *y)
            })
            .collect()
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        self.relay_type
            .layout()
            .contacts
            .iter()
            .filter(|c| self.contact_closed(c.function))
            .filter_map(|c| Some((self.pin_index(c.pins.0)?, self.pin_index(c.pins.1)?)))
            .collect()
    }

    fn update(&mut self, potentials: &[Potential], dt: Duration) {
        let (a, b) = self.relay_type.layout().coil;
        let now = match (self.pin_index(a), self.pin_index(b)) {
            (Some(a), Some(b)) => pair_energized(potentials, a, b),
            _ => false,
        };
        let was = self.energized;
        self.energized = now;

        // Timers are not persisted; rebuild them after a load.
        if self.timers.len() != self.knobs.len() {
            self.timers = vec![DelayTimer::default(); self.knobs.len()];
        }

        for (timer, knob) in self.timers.iter_mut().zip(&self.knobs) {
            if now {
                if !was {
                    timer.start(knob.delay());
                }
                timer.advance(dt);
            } else {
                timer.stop();
            }
        }
    }

    fn energized(&self, _potentials: &[Potential]) -> bool {
        self.energized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coil_potentials(relay: &Relay, on: bool) -> Vec<Potential> {
        let mut potentials = vec![Potential::None; relay.terminal_specs().len()];
        if on {
            let (a, b) = relay.relay_type.layout().coil;
            potentials[relay.pin_index(a).unwrap()] = Potential::Positive;
            potentials[relay.pin_index(b).unwrap()] = Potential::Negative;
        }
        potentials
    }

    fn bridged(relay: &Relay, from: &str, to: &str) -> bool {
        let pair = (relay.pin_index(from).unwrap(), relay.pin_index(to).unwrap());
        relay.internal_connections().contains(&pair)
    }

    #[test]
    fn test_every_layout_resolves_its_pins() {
        for relay_type in [
            RelayType::TwoC,
            RelayType::ThreeC,
            RelayType::FourC,
            RelayType::OnDelay,
            RelayType::YDelta27,
            RelayType::YDelta28,
        ] {
            let relay = Relay::new(relay_type);
            let layout = relay_type.layout();
            assert!(relay.pin_index(layout.coil.0).is_some());
            assert!(relay.pin_index(layout.coil.1).is_some());
            for c in layout.contacts {
                assert!(relay.pin_index(c.pins.0).is_some(), "{:?}", relay_type);
                assert!(relay.pin_index(c.pins.1).is_some(), "{:?}", relay_type);
            }
        }
    }

    #[test]
    fn test_plain_contacts_follow_coil() {
        let mut relay = Relay::new(RelayType::TwoC);
        assert!(bridged(&relay, "1", "4"));
        assert!(!bridged(&relay, "1", "3"));

        relay.update(&coil_potentials(&relay, true), Duration::from_millis(16));
        assert!(relay.is_energized());
        assert!(bridged(&relay, "1", "3"));
        assert!(bridged(&relay, "8", "6"));
        assert!(!bridged(&relay, "1", "4"));
    }

    #[test]
    fn test_timed_a_contact() {
        let mut relay = Relay::new(RelayType::OnDelay);
        relay.set_knob(KnobIndex(0), 2).unwrap();
        let on = coil_potentials(&relay, true);
        let off = coil_potentials(&relay, false);

        relay.update(&on, Duration::from_millis(1000));
        assert!(!bridged(&relay, "1", "3"));
        relay.update(&on, Duration::from_millis(999));
        assert!(!bridged(&relay, "1", "3"));
        relay.update(&on, Duration::from_millis(1));
        assert!(bridged(&relay, "1", "3"));

        relay.update(&off, Duration::from_millis(16));
        assert!(!bridged(&relay, "1", "3"));
        assert_eq!(relay.timer(KnobIndex(0)).unwrap().elapsed, Duration::ZERO);
    }

    #[test]
    fn test_timed_b_contact_literal_rule() {
        let mut relay = Relay::new(RelayType::OnDelay);
        relay.set_knob(KnobIndex(0), 1).unwrap();
        let on = coil_potentials(&relay, true);
        assert!(bridged(&relay, "1", "4"));

        relay.update(&on, Duration::from_millis(500));
        assert!(bridged(&relay, "1", "4"));
        relay.update(&on, Duration::from_millis(500));
        assert!(!bridged(&relay, "1", "4"));
    }

    #[test]
    fn test_delay_latched_on_energize() {
        let mut relay = Relay::new(RelayType::OnDelay);
        relay.set_knob(KnobIndex(0), 1).unwrap();
        let on = coil_potentials(&relay, true);
        relay.update(&on, Duration::from_millis(100));
        relay.set_knob(KnobIndex(0), 10).unwrap();
        relay.update(&on, Duration::from_millis(900));
        assert!(bridged(&relay, "1", "3"));
    }

    #[test]
    fn test_y_delta_28_uses_two_dials() {
        let mut relay = Relay::new(RelayType::YDelta28);
        relay.set_knob(KnobIndex(0), 2).unwrap();
        relay.set_knob(KnobIndex(1), 3).unwrap();
        let on = coil_potentials(&relay, true);

        relay.update(&on, Duration::from_millis(2500));
        assert!(!bridged(&relay, "8", "5"));
        assert!(!bridged(&relay, "8", "6"));
        relay.update(&on, Duration::from_millis(500));
        assert!(bridged(&relay, "8", "6"));
        assert!(bridged(&relay, "1", "3"));
    }

    #[test]
    fn test_knob_bounds() {
        let mut relay = Relay::new(RelayType::OnDelay);
        relay.set_knob(KnobIndex(0), 500).unwrap();
        assert_eq!(relay.knobs()[0].value, 30);
        assert!(relay.set_knob(KnobIndex(3), 1).is_err());
        assert!(Relay::new(RelayType::TwoC).set_knob(KnobIndex(0), 1).is_err());
    }

    #[test]
    fn test_type_change_resets() {
        let mut relay = Relay::new(RelayType::TwoC);
        relay.update(&coil_potentials(&relay, true), Duration::from_millis(16));
        relay.set_relay_type(RelayType::FourC);
        assert!(!relay.is_energized());
        assert_eq!(relay.terminal_specs().len(), 14);
    }
}
