use std::collections::BTreeMap;

use panelsim::components::{Breaker, Fuse, Lamp, PoleType, Resistor, Switch, SwitchType, TerminalBlock};
use panelsim::{propagate, Circuit, ComponentType, Point, Potential};
use proptest::prelude::*;
use proptest::sample::Index;

/// `(kind, flag)` per part plus wire endpoints chosen among all terminals.
type Parts = Vec<(u8, bool)>;
type Links = Vec<(Index, Index)>;

fn part(kind: u8, flag: bool) -> (&'static str, ComponentType) {
    match kind % 6 {
        0 => {
            let mut breaker = Breaker::new(PoleType::TwoP);
            breaker.is_on = flag;
            ("Q", ComponentType::Breaker(breaker))
        }
        1 => ("H", ComponentType::Lamp(Lamp::default())),
        2 => ("X", ComponentType::TerminalBlock(TerminalBlock::new(3))),
        3 => {
            let mut switch = Switch::new(SwitchType::PushbuttonNo);
            switch.pressed = flag;
            ("S", ComponentType::Switch(switch))
        }
        4 => {
            let mut fuse = Fuse::new();
            fuse.blown = flag;
            ("F", ComponentType::Fuse(fuse))
        }
        _ => ("R", ComponentType::Resistor(Resistor::new(10.0))),
    }
}

/// Build the diagram inserting components and wires in the given orders.
/// Names and wire endpoints do not depend on the order.
fn build(parts: &Parts, links: &Links, part_order: &[usize], link_order: &[usize]) -> Circuit {
    let named: Vec<(String, ComponentType)> = std::iter::once((0u8, true))
        .chain(parts.iter().copied())
        .enumerate()
        .map(|(i, (kind, flag))| {
            let (prefix, component_type) = part(kind, flag);
            (format!("{}{}", prefix, i), component_type)
        })
        .collect();

    // Canonical address list, independent of insertion order.
    let mut reference = Circuit::new("reference");
    for (name, component_type) in &named {
        reference
            .add_component(name.clone(), Point::default(), component_type.clone())
            .unwrap();
    }
    let addresses: Vec<String> = named
        .iter()
        .flat_map(|(name, _)| {
            let component = reference.component_by_name(name).unwrap();
            component
                .terminals
                .iter()
                .map(|t| reference.address(*t).unwrap())
                .collect::<Vec<_>>()
        })
        .collect();

    let mut circuit = Circuit::new("diagram");
    // The always-on supply goes first, the rest follow `part_order`.
    let order = std::iter::once(0).chain(part_order.iter().map(|i| i + 1));
    for i in order {
        let (name, component_type) = &named[i];
        circuit
            .add_component(name.clone(), Point::default(), component_type.clone())
            .unwrap();
    }
    for &i in link_order {
        let (a, b) = &links[i];
        let from = &addresses[a.index(addresses.len())];
        let to = &addresses[b.index(addresses.len())];
        circuit.connect_labels(from, to).unwrap();
    }
    circuit
}

fn potentials(circuit: &Circuit) -> BTreeMap<String, Potential> {
    circuit
        .terminals()
        .map(|t| (circuit.address(t.id).unwrap(), t.potential))
        .collect()
}

fn wire_potentials(circuit: &Circuit) -> Vec<(String, String, Potential)> {
    let mut wires: Vec<(String, String, Potential)> = circuit
        .wires()
        .map(|w| {
            let mut ends = [circuit.address(w.start).unwrap(), circuit.address(w.end).unwrap()];
            ends.sort();
            let [a, b] = ends;
            (a, b, w.potential)
        })
        .collect();
    wires.sort_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)));
    wires
}

fn diagram() -> impl Strategy<Value = (Parts, Links, Vec<usize>, Vec<usize>)> {
    (
        prop::collection::vec((0u8..6, any::<bool>()), 1..8),
        prop::collection::vec((any::<Index>(), any::<Index>()), 0..24),
    )
        .prop_flat_map(|(parts, links)| {
            let part_order: Vec<usize> = (0..parts.len()).collect();
            let link_order: Vec<usize> = (0..links.len()).collect();
            (
                Just(parts),
                Just(links),
                Just(part_order).prop_shuffle(),
                Just(link_order).prop_shuffle(),
            )
        })
}

proptest! {
    #[test]
    fn propagation_is_order_independent((parts, links, part_order, link_order) in diagram()) {
        let identity_parts: Vec<usize> = (0..parts.len()).collect();
        let identity_links: Vec<usize> = (0..links.len()).collect();

        let mut canonical = build(&parts, &links, &identity_parts, &identity_links);
        let mut shuffled = build(&parts, &links, &part_order, &link_order);
        propagate(&mut canonical);
        propagate(&mut shuffled);

        prop_assert_eq!(potentials(&canonical), potentials(&shuffled));
        prop_assert_eq!(wire_potentials(&canonical), wire_potentials(&shuffled));
    }

    #[test]
    fn propagation_is_idempotent((parts, links, part_order, link_order) in diagram()) {
        let mut circuit = build(&parts, &links, &part_order, &link_order);
        let first = propagate(&mut circuit);
        let after_first = potentials(&circuit);

        // A fuse blown by the first pass changes the graph; after that the
        // state is stable.
        let second = propagate(&mut circuit);
        let after_second = potentials(&circuit);
        if first.settled.is_empty() {
            prop_assert_eq!(&after_first, &after_second);
        }
        prop_assert!(second.settled.is_empty());

        propagate(&mut circuit);
        prop_assert_eq!(after_second, potentials(&circuit));
    }

    #[test]
    fn energized_means_opposite_polarities((parts, links, part_order, link_order) in diagram()) {
        let mut circuit = build(&parts, &links, &part_order, &link_order);
        propagate(&mut circuit);
        for component in circuit.components() {
            if let ComponentType::Lamp(_) = component.component_type {
                let p = circuit.potentials_of(component);
                prop_assert_eq!(circuit.device_energized(component.id), p[0].opposes(p[1]));
            }
        }
    }

    #[test]
    fn wires_mirror_their_endpoints((parts, links, part_order, link_order) in diagram()) {
        let mut circuit = build(&parts, &links, &part_order, &link_order);
        propagate(&mut circuit);
        for wire in circuit.wires() {
            prop_assert_eq!(wire.potential, circuit.potential(wire.start));
            prop_assert_eq!(wire.potential, circuit.potential(wire.end));
        }
    }
}
