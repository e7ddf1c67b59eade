//! Magnetic contactor with three main poles and auxiliary contacts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{pair_energized, Bridge, ElectricalComponent, TerminalRole, TerminalSpec};
use crate::circuit::Potential;

const A1: usize = 0;
const A2: usize = 1;
const MAIN_IN: usize = 2;
const MAIN_OUT: usize = 5;
const AUX_NO: Bridge = (8, 9);
const AUX_NC: Bridge = (10, 11);
const ADDON_NO: Bridge = (12, 13);
const ADDON_NC: Bridge = (14, 15);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contactor {
    /// Add-on auxiliary block with one NO and one NC pair.
    pub has_left_aux: bool,
    #[serde(skip)]
    coil_energized: bool,
}

impl Contactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_left_aux(mut self) -> Self {
        self.has_left_aux = true;
        self
    }

    pub fn coil_energized(&self) -> bool {
        self.coil_energized
    }
}

impl ElectricalComponent for Contactor {
    fn type_name(&self) -> &'static str {
        "contactor"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        let ox = if self.has_left_aux { 3.0 } else { 0.0 };
        let (top, bottom) = (2.0, 5.0);
        let mut specs = vec![
            TerminalSpec::new("A1", TerminalRole::Coil, ox + 2.0, 0.0),
            TerminalSpec::new("A2", TerminalRole::Coil, ox + 4.0, 0.0),
        ];
        for (i, label) in ["L1", "L2", "L3"].iter().enumerate() {
            specs.push(TerminalSpec::new(*label, TerminalRole::MainIn, ox + 1.0 + 2.0 * i as f64, top));
        }
        for (i, label) in ["T1", "T2", "T3"].iter().enumerate() {
            specs.push(TerminalSpec::new(*label, TerminalRole::MainOut, ox + 1.0 + 2.0 * i as f64, bottom));
        }
        specs.extend([
            TerminalSpec::new("13", TerminalRole::NormallyOpenIn, ox + 7.0, top),
            TerminalSpec::new("14", TerminalRole::NormallyOpenOut, ox + 7.0, bottom),
            TerminalSpec::new("21", TerminalRole::NormallyClosedIn, ox + 8.0, top),
            TerminalSpec::new("22", TerminalRole::NormallyClosedOut, ox + 8.0, bottom),
        ]);
        if self.has_left_aux {
            specs.extend([
                TerminalSpec::new("53", TerminalRole::NormallyOpenIn, 2.0, top),
                TerminalSpec::new("54", TerminalRole::NormallyOpenOut, 2.0, bottom),
                TerminalSpec::new("61", TerminalRole::NormallyClosedIn, 1.0, top),
                TerminalSpec::new("62", TerminalRole::NormallyClosedOut, 1.0, bottom),
            ]);
        }
        specs
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        let mut bridges = Vec::with_capacity(5);
        if self.coil_energized {
            bridges.extend((0..3).map(|p| (MAIN_IN + p, MAIN_OUT + p)));
            bridges.push(AUX_NO);
            if self.has_left_aux {
                bridges.push(ADDON_NO);
            }
        } else {
            bridges.push(AUX_NC);
            if self.has_left_aux {
                bridges.push(ADDON_NC);
            }
        }
        bridges
    }

    fn update(&mut self, potentials: &[Potential], _dt: Duration) {
        self.coil_energized = pair_energized(potentials, A1, A2);
    }

    fn energized(&self, _potentials: &[Potential]) -> bool {
        self.coil_energized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coil(a1: Potential, a2: Potential) -> Vec<Potential> {
        let mut potentials = vec![Potential::None; 12];
        potentials[A1] = a1;
        potentials[A2] = a2;
        potentials
    }

    #[test]
    fn test_deenergized_only_nc() {
        let contactor = Contactor::new();
        assert_eq!(contactor.terminal_specs().len(), 12);
        assert_eq!(contactor.internal_connections(), vec![AUX_NC]);
    }

    #[test]
    fn test_energized_closes_main_and_no() {
        let mut contactor = Contactor::new();
        contactor.update(&coil(Potential::Positive, Potential::Negative), Duration::ZERO);
        assert!(contactor.coil_energized());
        assert_eq!(
            contactor.internal_connections(),
            vec![(2, 5), (3, 6), (4, 7), AUX_NO]
        );
    }

    #[test]
    fn test_same_polarity_does_not_energize() {
        let mut contactor = Contactor::new();
        contactor.update(&coil(Potential::Positive, Potential::Positive), Duration::ZERO);
        assert!(!contactor.coil_energized());
        contactor.update(&coil(Potential::Negative, Potential::None), Duration::ZERO);
        assert!(!contactor.coil_energized());
    }

    #[test]
    fn test_left_aux_pairs() {
        let mut contactor = Contactor::new().with_left_aux();
        let specs = contactor.terminal_specs();
        assert_eq!(specs.len(), 16);
        assert_eq!(specs[12].label, "53");
        assert_eq!(contactor.internal_connections(), vec![AUX_NC, ADDON_NC]);

        contactor.update(&coil(Potential::Negative, Potential::Positive), Duration::ZERO);
        assert!(contactor.internal_connections().contains(&ADDON_NO));
        assert!(!contactor.internal_connections().contains(&ADDON_NC));
    }
}
