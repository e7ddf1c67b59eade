//! Dual-polarity signal propagation.
//!
//! Each polarity is flooded independently from the source terminals that
//! inject it, through wires and internally bridged pairs. Reachability does
//! not depend on visiting order, so the result is a pure function of the
//! topology and the component state at the start of the pass.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

use crate::circuit::{Circuit, Component, ComponentId, Polarity, Potential, TerminalId};
use crate::components::ElectricalComponent;
use crate::graph::Topology;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationStats {
    pub positive: usize,
    pub negative: usize,
    /// Terminals reached by both passes.
    pub shorted: usize,
    /// Components that changed state in the post-pass (blown fuses).
    pub settled: Vec<ComponentId>,
}

/// Every terminal reachable from `seeds`.
pub fn flood<I>(topology: &Topology, seeds: I) -> HashSet<TerminalId>
where
    I: IntoIterator<Item = TerminalId>,
{
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    for seed in seeds {
        if visited.insert(seed) {
            queue.push_back(seed);
        }
    }

    while let Some(terminal) = queue.pop_front() {
        for (next, _) in topology.neighbors(terminal) {
            if visited.insert(*next) {
                queue.push_back(*next);
            }
        }
    }
    visited
}

/// Union of both polarity floods over `topology`, with the number of
/// terminals each polarity reached.
fn polarities(circuit: &Circuit, topology: &Topology) -> (HashMap<TerminalId, Potential>, [usize; 2]) {
    let mut potentials: HashMap<TerminalId, Potential> = HashMap::new();
    let mut counts = [0; 2];
    for (polarity, count) in Polarity::ALL.into_iter().zip(counts.iter_mut()) {
        let reached = flood(topology, circuit.source_terminals(polarity));
        *count = reached.len();
        for terminal in reached {
            let entry = potentials.entry(terminal).or_default();
            *entry = entry.with(polarity);
        }
    }
    (potentials, counts)
}

/// Accepts components that bridge without resistance. Loads stop the flood.
fn conducts_solidly(component: &Component) -> bool {
    !component
        .component_type
        .resistance()
        .is_some_and(|ohms| ohms > 0.0)
}

/// Recompute the potential of every terminal and wire, then let components
/// react to the final result.
///
/// Post-pass hooks (fuses) see a second flood that stops at
/// resistance-bearing components, so only a zero-resistance loop counts as
/// a short. Overloads through a load are left to the current solver.
pub fn propagate(circuit: &mut Circuit) -> PropagationStats {
    circuit.clear_potentials();
    let topology = Topology::snapshot(circuit);
    let (potentials, [positive, negative]) = polarities(circuit, &topology);

    let mut stats = PropagationStats {
        positive,
        negative,
        shorted: potentials
            .values()
            .filter(|p| **p == Potential::Both)
            .count(),
        settled: Vec::new(),
    };
    circuit.assign_potentials(&potentials);

    let solid = Topology::snapshot_where(circuit, conducts_solidly);
    let (direct, _) = polarities(circuit, &solid);
    stats.settled = circuit.settle(&direct);

    debug!(
        "propagation: {} positive, {} negative, {} shorted over {} edges",
        stats.positive,
        stats.negative,
        stats.shorted,
        topology.edge_count()
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Point;
    use crate::components::{Ammeter, Breaker, ComponentType, Fuse, Lamp, PoleType, Resistor, Switch, SwitchType};

    fn with_breaker(on: bool) -> (Circuit, ComponentId) {
        let mut circuit = Circuit::new("t");
        let mut breaker = Breaker::new(PoleType::TwoP);
        breaker.is_on = on;
        circuit
            .add_component("Q1", Point::default(), ComponentType::Breaker(breaker))
            .unwrap();
        let h1 = circuit
            .add_component("H1", Point::default(), ComponentType::Lamp(Lamp::default()))
            .unwrap();
        circuit.connect_labels("Q1.2", "H1.X1").unwrap();
        circuit.connect_labels("Q1.4", "H1.X2").unwrap();
        (circuit, h1)
    }

    #[test]
    fn test_lamp_lit_with_breaker_on() {
        let (mut circuit, h1) = with_breaker(true);
        let stats = propagate(&mut circuit);
        assert_eq!(circuit.potential(circuit.resolve("H1.X1").unwrap()), Potential::Positive);
        assert_eq!(circuit.potential(circuit.resolve("H1.X2").unwrap()), Potential::Negative);
        assert!(circuit.device_energized(h1));
        assert_eq!(stats.positive, 3);
        assert_eq!(stats.shorted, 0);
        assert!(circuit.wires().all(|w| w.potential.is_live()));
    }

    #[test]
    fn test_lamp_dark_with_breaker_off() {
        let (mut circuit, h1) = with_breaker(false);
        propagate(&mut circuit);
        assert!(!circuit.device_energized(h1));
        assert_eq!(circuit.potential(circuit.resolve("H1.X1").unwrap()), Potential::None);
        // Supply side stays live even with the breaker open.
        assert_eq!(circuit.potential(circuit.resolve("Q1.1").unwrap()), Potential::Positive);
    }

    #[test]
    fn test_propagation_is_idempotent() {
        let (mut circuit, _) = with_breaker(true);
        propagate(&mut circuit);
        let first: Vec<Potential> = circuit.terminals().map(|t| t.potential).collect();
        propagate(&mut circuit);
        let second: Vec<Potential> = circuit.terminals().map(|t| t.potential).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_blows_fuse() {
        let (mut circuit, _) = with_breaker(true);
        let f1 = circuit
            .add_component("F1", Point::default(), ComponentType::Fuse(Fuse::new()))
            .unwrap();
        circuit.connect_labels("Q1.2", "F1.1").unwrap();
        circuit.connect_labels("F1.2", "Q1.4").unwrap();

        let stats = propagate(&mut circuit);
        assert_eq!(stats.settled, vec![f1]);
        assert!(stats.shorted > 0);
        match &circuit.component(f1).unwrap().component_type {
            ComponentType::Fuse(fuse) => assert!(fuse.blown),
            other => panic!("unexpected {:?}", other),
        }
        assert!(circuit.internal_connections(f1).is_empty());

        // Next pass sees the open fuse and the short is gone.
        let stats = propagate(&mut circuit);
        assert_eq!(stats.shorted, 0);
        assert!(stats.settled.is_empty());
    }

    #[test]
    fn test_fuse_in_series_with_load_survives() {
        let mut circuit = Circuit::new("t");
        circuit
            .add_component(
                "Q1",
                Point::default(),
                ComponentType::Breaker(Breaker::new(PoleType::TwoP).switched_on()),
            )
            .unwrap();
        let f1 = circuit
            .add_component("F1", Point::default(), ComponentType::Fuse(Fuse::new().with_limit(Some(15.0))))
            .unwrap();
        circuit
            .add_component("R1", Point::default(), ComponentType::Resistor(Resistor::new(10.0)))
            .unwrap();
        circuit.connect_labels("Q1.2", "F1.1").unwrap();
        circuit.connect_labels("F1.2", "R1.1").unwrap();
        circuit.connect_labels("R1.2", "Q1.4").unwrap();

        let stats = propagate(&mut circuit);
        // The loop is closed through the resistor, so both floods meet...
        assert_eq!(circuit.potential(circuit.resolve("F1.1").unwrap()), Potential::Both);
        assert!(stats.shorted > 0);
        // ...but that is a load, not a short.
        assert!(stats.settled.is_empty());
        assert_eq!(circuit.internal_connections(f1).len(), 1);
    }

    #[test]
    fn test_ammeter_does_not_hide_a_short() {
        let (mut circuit, _) = with_breaker(true);
        let f1 = circuit
            .add_component("F1", Point::default(), ComponentType::Fuse(Fuse::new()))
            .unwrap();
        circuit
            .add_component("A1", Point::default(), ComponentType::Ammeter(Ammeter::new()))
            .unwrap();
        circuit.connect_labels("Q1.2", "A1.+").unwrap();
        circuit.connect_labels("A1.-", "F1.1").unwrap();
        circuit.connect_labels("F1.2", "Q1.4").unwrap();

        let stats = propagate(&mut circuit);
        assert_eq!(stats.settled, vec![f1]);
    }

    #[test]
    fn test_rotary_feeds_one_output() {
        let mut circuit = Circuit::new("t");
        circuit
            .add_component("Q1", Point::default(), ComponentType::Breaker(Breaker::new(PoleType::OneP).switched_on()))
            .unwrap();
        let s1 = circuit
            .add_component("S1", Point::default(), ComponentType::Switch(Switch::new(SwitchType::Rotary3)))
            .unwrap();
        circuit.connect_labels("Q1.2", "S1.COM").unwrap();

        for position in 1..=3u8 {
            if let ComponentType::Switch(s) = &mut circuit.component_mut(s1).unwrap().component_type {
                s.set_position(position);
            }
            propagate(&mut circuit);
            for output in 1..=3u8 {
                let p = circuit.potential(circuit.resolve(&format!("S1.{}", output)).unwrap());
                assert_eq!(p.is_live(), output == position, "position {}", position);
            }
        }
    }

    #[test]
    fn test_flood_handles_cycles() {
        let (mut circuit, _) = with_breaker(true);
        circuit.connect_labels("H1.X1", "Q1.2").unwrap();
        let topology = Topology::snapshot(&circuit);
        let reached = flood(&topology, circuit.source_terminals(Polarity::Positive));
        assert_eq!(reached.len(), 3);
    }
}
