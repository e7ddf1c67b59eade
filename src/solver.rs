use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Instant;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, ComponentId, Polarity, TerminalId, WireId};
use crate::components::{breaker, ElectricalComponent};
use crate::graph::{Edge, Topology};

/// Solver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Resistance floor in ohms, so a bare short yields a finite current.
    pub epsilon: f64,
    /// Voltage used for sources that do not report one.
    pub default_voltage: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            epsilon: 1e-3,
            default_voltage: breaker::DEFAULT_VOLTAGE,
        }
    }
}

/// A closed loop from a positive source terminal back to a neutral terminal
/// of the same source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopPath {
    pub source: ComponentId,
    pub from: TerminalId,
    pub to: TerminalId,
    pub wires: Vec<WireId>,
    /// Components crossed through an internal bridge, in path order.
    pub components: Vec<ComponentId>,
    pub resistance: f64,
    pub min_limit: Option<f64>,
    pub current: f64,
}

impl LoopPath {
    pub fn is_overloaded(&self) -> bool {
        self.min_limit.is_some_and(|limit| self.current > limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripEvent {
    pub component: ComponentId,
    pub name: String,
    pub current: f64,
    pub limit: f64,
}

/// Solver statistics
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    pub paths: Vec<LoopPath>,
    pub trips: Vec<TripEvent>,
    pub solve_time: f64,
}

impl SolverStats {
    pub fn max_current(&self) -> f64 {
        self.paths.iter().map(|p| p.current).fold(0.0, f64::max)
    }
}

/// Per-loop Ohm's-law solver. Each source terminal is solved on its own;
/// parallel loops are not combined.
pub struct CurrentSolver {
    config: SolverConfig,
}

impl CurrentSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        CurrentSolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        CurrentSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Find every source loop, record currents on wires and devices, and
    /// trip protective devices on overload. Expects potentials from the
    /// current tick.
    pub fn solve(&self, circuit: &mut Circuit) -> SolverStats {
        let start_time = Instant::now();
        let topology = Topology::snapshot(circuit);
        let mut stats = SolverStats::default();

        for source in circuit.sources() {
            for path in self.find_paths(circuit, &topology, source) {
                self.apply(circuit, &path, &mut stats.trips);
                stats.paths.push(path);
            }
        }

        stats.solve_time = start_time.elapsed().as_secs_f64();
        debug!(
            "current solver: {} loops, {} trips, peak {:.3}A",
            stats.paths.len(),
            stats.trips.len(),
            stats.max_current()
        );
        stats
    }

    fn find_paths(&self, circuit: &Circuit, topology: &Topology, source: ComponentId) -> Vec<LoopPath> {
        let Some(component) = circuit.component(source) else {
            return Vec::new();
        };
        let voltage = component
            .component_type
            .source_voltage()
            .unwrap_or(self.config.default_voltage);

        let role_of = |t: &TerminalId| circuit.terminal(*t).and_then(|t| t.role.source_polarity());
        let targets: BTreeSet<TerminalId> = component
            .terminals
            .iter()
            .filter(|t| role_of(t) == Some(Polarity::Negative))
            .copied()
            .collect();

        component
            .terminals
            .iter()
            .filter(|t| role_of(t) == Some(Polarity::Positive))
            .filter(|t| circuit.potential(**t).has(Polarity::Positive))
            .filter_map(|from| {
                let edges = shortest_path(topology, *from, &targets)?;
                Some(self.measure(circuit, source, *from, voltage, edges))
            })
            .collect()
    }

    fn measure(
        &self,
        circuit: &Circuit,
        source: ComponentId,
        from: TerminalId,
        voltage: f64,
        edges: Vec<(TerminalId, Edge)>,
    ) -> LoopPath {
        let to = edges.last().map(|(t, _)| *t).unwrap_or(from);
        let mut wires = Vec::new();
        let mut components: Vec<ComponentId> = Vec::new();
        let mut resistance = 0.0;

        for (_, edge) in &edges {
            match edge {
                Edge::Wire(id) => wires.push(*id),
                Edge::Internal(id) => {
                    if let Some(ohms) = circuit.component(*id).and_then(|c| c.component_type.resistance()) {
                        resistance += ohms;
                    }
                    if !components.contains(id) {
                        components.push(*id);
                    }
                }
            }
        }

        let min_limit = components
            .iter()
            .filter_map(|id| circuit.component(*id)?.component_type.amperage_limit())
            .reduce(f64::min);
        let current = voltage / resistance.max(self.config.epsilon);

        LoopPath {
            source,
            from,
            to,
            wires,
            components,
            resistance,
            min_limit,
            current,
        }
    }

    fn apply(&self, circuit: &mut Circuit, path: &LoopPath, trips: &mut Vec<TripEvent>) {
        let overloaded = path.is_overloaded();

        for id in &path.wires {
            if let Some(wire) = circuit.wire_mut(*id) {
                wire.current = wire.current.max(path.current);
                wire.overcurrent |= overloaded;
            }
        }

        for id in &path.components {
            let Some(component) = circuit.component_mut(*id) else {
                continue;
            };
            if component.component_type.resistance().is_some() {
                component.component_type.record_current(path.current);
            }
        }

        let Some(min_limit) = path.min_limit.filter(|_| overloaded) else {
            return;
        };
        for id in &path.components {
            let Some(component) = circuit.component_mut(*id) else {
                continue;
            };
            let Some(limit) = component.component_type.amperage_limit() else {
                continue;
            };
            if limit <= min_limit && component.component_type.trip() {
                warn!(
                    "{} tripped: {:.3}A exceeds {:.3}A",
                    component.name, path.current, limit
                );
                trips.push(TripEvent {
                    component: *id,
                    name: component.name.clone(),
                    current: path.current,
                    limit,
                });
            }
        }
    }
}

impl Default for CurrentSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Breadth-first search from `from` to the nearest terminal in `targets`.
/// Returns the edges walked, each paired with the terminal it arrives at.
fn shortest_path(
    topology: &Topology,
    from: TerminalId,
    targets: &BTreeSet<TerminalId>,
) -> Option<Vec<(TerminalId, Edge)>> {
    let mut parent: HashMap<TerminalId, (TerminalId, Edge)> = HashMap::new();
    let mut queue = VecDeque::from([from]);

    while let Some(terminal) = queue.pop_front() {
        if terminal != from && targets.contains(&terminal) {
            let mut edges = Vec::new();
            let mut at = terminal;
            while at != from {
                let (prev, edge) = parent[&at];
                edges.push((at, edge));
                at = prev;
            }
            edges.reverse();
            return Some(edges);
        }
        for (next, edge) in topology.neighbors(terminal) {
            if *next != from && !parent.contains_key(next) {
                parent.insert(*next, (terminal, *edge));
                queue.push_back(*next);
            }
        }
    }
    None
}
