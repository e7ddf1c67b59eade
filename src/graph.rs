//! Traversable view of a circuit for one tick.
//!
//! The snapshot holds every wire and every currently bridged internal pair
//! as an undirected edge between terminal ids. Wires whose endpoints no
//! longer exist are skipped.

use std::collections::HashMap;

use log::debug;

use crate::circuit::{Circuit, Component, ComponentId, TerminalId, WireId};

/// How two adjacent terminals are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Wire(WireId),
    /// Bridge reported by the component that owns both terminals.
    Internal(ComponentId),
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    adjacency: HashMap<TerminalId, Vec<(TerminalId, Edge)>>,
    edge_count: usize,
}

impl Topology {
    pub fn snapshot(circuit: &Circuit) -> Self {
        Self::snapshot_where(circuit, |_| true)
    }

    /// Like [`Topology::snapshot`], but internal bridges are kept only for
    /// components accepted by `conducts`. Wires are always kept.
    pub fn snapshot_where<F>(circuit: &Circuit, conducts: F) -> Self
    where
        F: Fn(&Component) -> bool,
    {
        let mut topology = Topology::default();
        let mut stale = 0;

        for wire in circuit.wires() {
            if circuit.terminal(wire.start).is_none() || circuit.terminal(wire.end).is_none() {
                stale += 1;
                continue;
            }
            topology.link(wire.start, wire.end, Edge::Wire(wire.id));
        }

        for component in circuit.components().filter(|c| conducts(c)) {
            for (a, b) in circuit.internal_connections(component.id) {
                topology.link(a, b, Edge::Internal(component.id));
            }
        }

        if stale > 0 {
            debug!("skipped {} wires with missing endpoints", stale);
        }
        topology
    }

    fn link(&mut self, a: TerminalId, b: TerminalId, edge: Edge) {
        self.adjacency.entry(a).or_default().push((b, edge));
        self.adjacency.entry(b).or_default().push((a, edge));
        self.edge_count += 1;
    }

    pub fn neighbors(&self, terminal: TerminalId) -> &[(TerminalId, Edge)] {
        self.adjacency
            .get(&terminal)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}
