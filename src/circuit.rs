use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::{ComponentType, ElectricalComponent, TerminalRole};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Stable identity of a terminal. Never reused within a circuit.
    TerminalId,
    "t"
);
define_id!(ComponentId, "c");
define_id!(WireId, "w");

/// One side of a power source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub const ALL: [Polarity; 2] = [Polarity::Positive, Polarity::Negative];

    pub fn opposite(self) -> Polarity {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
        }
    }
}

/// Set of polarities that reached a terminal during the last propagation.
///
/// `Both` only appears when the two passes overlap, which means a short
/// between the sides of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Potential {
    #[default]
    None,
    Positive,
    Negative,
    Both,
}

impl Potential {
    pub fn has(self, polarity: Polarity) -> bool {
        match (self, polarity) {
            (Potential::Both, _) => true,
            (Potential::Positive, Polarity::Positive) => true,
            (Potential::Negative, Polarity::Negative) => true,
            _ => false,
        }
    }

    pub fn with(self, polarity: Polarity) -> Potential {
        self.union(polarity.into())
    }

    pub fn union(self, other: Potential) -> Potential {
        let positive = self.has(Polarity::Positive) || other.has(Polarity::Positive);
        let negative = self.has(Polarity::Negative) || other.has(Polarity::Negative);
        match (positive, negative) {
            (true, true) => Potential::Both,
            (true, false) => Potential::Positive,
            (false, true) => Potential::Negative,
            (false, false) => Potential::None,
        }
    }

    /// True when one side carries a polarity the other side carries the
    /// opposite of. This is the "energized" test for two-terminal devices.
    pub fn opposes(self, other: Potential) -> bool {
        (self.has(Polarity::Positive) && other.has(Polarity::Negative))
            || (self.has(Polarity::Negative) && other.has(Polarity::Positive))
    }

    pub fn is_live(self) -> bool {
        self != Potential::None
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Potential::None => "0",
            Potential::Positive => "+",
            Potential::Negative => "-",
            Potential::Both => "±",
        }
    }
}

impl From<Polarity> for Potential {
    fn from(polarity: Polarity) -> Self {
        match polarity {
            Polarity::Positive => Potential::Positive,
            Polarity::Negative => Potential::Negative,
        }
    }
}

/// Grid position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn offset(self, by: Point) -> Point {
        Point::new(self.x + by.x, self.y + by.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Terminal {
    pub id: TerminalId,
    pub component: ComponentId,
    /// Index into the owning component's terminal layout.
    pub index: usize,
    pub label: String,
    pub role: TerminalRole,
    pub position: Point,
    #[serde(skip)]
    pub potential: Potential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wire {
    pub id: WireId,
    pub start: TerminalId,
    pub end: TerminalId,
    #[serde(skip)]
    pub potential: Potential,
    #[serde(skip)]
    pub current: f64,
    #[serde(skip)]
    pub overcurrent: bool,
}

impl Wire {
    fn clear_transient(&mut self) {
        self.potential = Potential::None;
        self.current = 0.0;
        self.overcurrent = false;
    }
}

/// A placed device: identity, name, position and variant state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    pub origin: Point,
    pub component_type: ComponentType,
    /// Terminal ids in layout order.
    pub terminals: Vec<TerminalId>,
}

impl Component {
    pub fn type_name(&self) -> &'static str {
        self.component_type.type_name()
    }

    pub fn terminal(&self, index: usize) -> Option<TerminalId> {
        self.terminals.get(index).copied()
    }
}

#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("unknown terminal '{0}'")]
    UnknownTerminal(String),

    #[error("component name '{0}' is already in use")]
    DuplicateName(String),

    #[error("knob index {index} out of range (relay has {count})")]
    InvalidKnob { index: u8, count: usize },

    #[error("{component} does not support '{action}'")]
    UnsupportedAction { component: String, action: String },
}

/// The simulation context: every component, terminal and wire on a diagram.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
    pub title: String,
    components: BTreeMap<ComponentId, Component>,
    terminals: BTreeMap<TerminalId, Terminal>,
    wires: BTreeMap<WireId, Wire>,
    next_id: u32,
}

impl Circuit {
    pub fn new(title: impl Into<String>) -> Self {
        Circuit {
            title: title.into(),
            ..Default::default()
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Place a component and create its terminals.
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        origin: Point,
        component_type: ComponentType,
    ) -> Result<ComponentId, CircuitError> {
        let name = name.into();
        if self.component_id(&name).is_some() {
            return Err(CircuitError::DuplicateName(name));
        }

        let id = ComponentId(self.allocate());
        self.components.insert(
            id,
            Component {
                id,
                name,
                origin,
                component_type,
                terminals: Vec::new(),
            },
        );
        self.spawn_terminals(id);
        Ok(id)
    }

    fn spawn_terminals(&mut self, id: ComponentId) {
        let Some((origin, specs)) = self
            .components
            .get(&id)
            .map(|c| (c.origin, c.component_type.terminal_specs()))
        else {
            return;
        };

        let mut ids = Vec::with_capacity(specs.len());
        for (index, spec) in specs.into_iter().enumerate() {
            let terminal_id = TerminalId(self.allocate());
            self.terminals.insert(
                terminal_id,
                Terminal {
                    id: terminal_id,
                    component: id,
                    index,
                    label: spec.label,
                    role: spec.role,
                    position: origin.offset(spec.offset),
                    potential: Potential::None,
                },
            );
            ids.push(terminal_id);
        }
        if let Some(component) = self.components.get_mut(&id) {
            component.terminals = ids;
        }
    }

    /// Discard the terminals of `id` and create new ones for its current
    /// configuration. Returns the wires that referenced the old terminals;
    /// they are left in place for the caller to remove or rewire.
    #[must_use = "wires attached to the old terminals are now dangling"]
    pub fn rebuild_terminals(&mut self, id: ComponentId) -> Vec<WireId> {
        let Some(component) = self.components.get(&id) else {
            return Vec::new();
        };
        let old = component.terminals.clone();
        for terminal in &old {
            self.terminals.remove(terminal);
        }
        self.spawn_terminals(id);

        let invalid: Vec<WireId> = self
            .wires
            .values()
            .filter(|w| old.contains(&w.start) || old.contains(&w.end))
            .map(|w| w.id)
            .collect();
        debug!(
            "rebuilt terminals of {}: {} wires invalidated",
            id,
            invalid.len()
        );
        invalid
    }

    /// Apply a configuration change (pole count, switch type, relay type,
    /// aux block) and rebuild the terminals.
    #[must_use = "wires attached to the old terminals are now dangling"]
    pub fn reconfigure<F>(&mut self, id: ComponentId, change: F) -> Result<Vec<WireId>, CircuitError>
    where
        F: FnOnce(&mut ComponentType),
    {
        let component = self
            .components
            .get_mut(&id)
            .ok_or_else(|| CircuitError::UnknownComponent(id.to_string()))?;
        change(&mut component.component_type);
        Ok(self.rebuild_terminals(id))
    }

    /// Delete a component and its terminals. Returns the wires left without
    /// an endpoint.
    #[must_use = "wires attached to the removed component are now dangling"]
    pub fn remove_component(&mut self, id: ComponentId) -> Result<Vec<WireId>, CircuitError> {
        let component = self
            .components
            .remove(&id)
            .ok_or_else(|| CircuitError::UnknownComponent(id.to_string()))?;
        for terminal in &component.terminals {
            self.terminals.remove(terminal);
        }
        Ok(self
            .wires
            .values()
            .filter(|w| component.terminals.contains(&w.start) || component.terminals.contains(&w.end))
            .map(|w| w.id)
            .collect())
    }

    /// Move a component. Terminal positions follow; identities do not change.
    pub fn move_component(&mut self, id: ComponentId, origin: Point) -> Result<(), CircuitError> {
        let component = self
            .components
            .get_mut(&id)
            .ok_or_else(|| CircuitError::UnknownComponent(id.to_string()))?;
        component.origin = origin;
        let specs = component.component_type.terminal_specs();
        for (terminal, spec) in component.terminals.iter().zip(specs) {
            if let Some(t) = self.terminals.get_mut(terminal) {
                t.position = origin.offset(spec.offset);
            }
        }
        Ok(())
    }

    pub fn connect(&mut self, start: TerminalId, end: TerminalId) -> Result<WireId, CircuitError> {
        for t in [start, end] {
            if !self.terminals.contains_key(&t) {
                return Err(CircuitError::UnknownTerminal(t.to_string()));
            }
        }
        if self.terminals[&start].component == self.terminals[&end].component {
            warn!("wire {} - {} joins two terminals of one component", start, end);
        }
        let id = WireId(self.allocate());
        self.wires.insert(
            id,
            Wire {
                id,
                start,
                end,
                potential: Potential::None,
                current: 0.0,
                overcurrent: false,
            },
        );
        Ok(id)
    }

    /// Wire two terminals given as `component.label` addresses.
    pub fn connect_labels(&mut self, start: &str, end: &str) -> Result<WireId, CircuitError> {
        let start = self.resolve(start)?;
        let end = self.resolve(end)?;
        self.connect(start, end)
    }

    pub fn remove_wire(&mut self, id: WireId) -> Option<Wire> {
        self.wires.remove(&id)
    }

    pub fn remove_wires<I: IntoIterator<Item = WireId>>(&mut self, ids: I) -> usize {
        ids.into_iter()
            .filter(|id| self.wires.remove(id).is_some())
            .count()
    }

    /// Wires with at least one endpoint that no longer exists.
    pub fn dangling_wires(&self) -> Vec<WireId> {
        self.wires
            .values()
            .filter(|w| !self.terminals.contains_key(&w.start) || !self.terminals.contains_key(&w.end))
            .map(|w| w.id)
            .collect()
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Mutable access for user-settable state. Configuration changes that
    /// alter the terminal layout must go through [`Circuit::reconfigure`].
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(&id)
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.components
            .values()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    pub fn component_by_name(&self, name: &str) -> Option<&Component> {
        self.component_id(name).and_then(|id| self.components.get(&id))
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn terminal(&self, id: TerminalId) -> Option<&Terminal> {
        self.terminals.get(&id)
    }

    pub fn terminals(&self) -> impl Iterator<Item = &Terminal> {
        self.terminals.values()
    }

    pub fn wire(&self, id: WireId) -> Option<&Wire> {
        self.wires.get(&id)
    }

    pub(crate) fn wire_mut(&mut self, id: WireId) -> Option<&mut Wire> {
        self.wires.get_mut(&id)
    }

    pub fn wires(&self) -> impl Iterator<Item = &Wire> {
        self.wires.values()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    /// Look up a terminal by `component.label`, e.g. `Q1.2` or `X1.3A`.
    pub fn resolve(&self, address: &str) -> Result<TerminalId, CircuitError> {
        let (name, label) = address
            .rsplit_once('.')
            .ok_or_else(|| CircuitError::UnknownTerminal(address.to_string()))?;
        let component = self
            .component_by_name(name)
            .ok_or_else(|| CircuitError::UnknownComponent(name.to_string()))?;
        component
            .terminals
            .iter()
            .copied()
            .find(|t| self.terminals.get(t).is_some_and(|t| t.label == label))
            .ok_or_else(|| CircuitError::UnknownTerminal(address.to_string()))
    }

    /// `component.label` form of a terminal id.
    pub fn address(&self, id: TerminalId) -> Option<String> {
        let terminal = self.terminals.get(&id)?;
        let component = self.components.get(&terminal.component)?;
        Some(format!("{}.{}", component.name, terminal.label))
    }

    pub fn potential(&self, id: TerminalId) -> Potential {
        self.terminals
            .get(&id)
            .map(|t| t.potential)
            .unwrap_or_default()
    }

    /// Potentials of a component's terminals in layout order. Missing
    /// terminals read as `None`.
    pub fn potentials_of(&self, component: &Component) -> Vec<Potential> {
        component
            .terminals
            .iter()
            .map(|t| self.potential(*t))
            .collect()
    }

    /// Bridged terminal pairs of a component, in terminal ids. Pairs whose
    /// local indices fall outside the component's layout are dropped.
    pub fn internal_connections(&self, id: ComponentId) -> Vec<(TerminalId, TerminalId)> {
        let Some(component) = self.components.get(&id) else {
            return Vec::new();
        };
        component
            .component_type
            .internal_connections()
            .into_iter()
            .filter_map(|(a, b)| match (component.terminal(a), component.terminal(b)) {
                (Some(a), Some(b)) => Some((a, b)),
                _ => {
                    warn!("{} reported a bridge ({}, {}) outside its layout", component.name, a, b);
                    None
                }
            })
            .collect()
    }

    /// Terminals injecting `polarity`: the supply-side terminals of power
    /// sources.
    pub fn source_terminals(&self, polarity: Polarity) -> Vec<TerminalId> {
        self.terminals
            .values()
            .filter(|t| t.role.source_polarity() == Some(polarity))
            .map(|t| t.id)
            .collect()
    }

    /// Components owning at least one source terminal.
    pub fn sources(&self) -> Vec<ComponentId> {
        self.components
            .values()
            .filter(|c| {
                c.terminals.iter().any(|t| {
                    self.terminals
                        .get(t)
                        .is_some_and(|t| t.role.source_polarity().is_some())
                })
            })
            .map(|c| c.id)
            .collect()
    }

    pub fn clear_potentials(&mut self) {
        for terminal in self.terminals.values_mut() {
            terminal.potential = Potential::None;
        }
        for wire in self.wires.values_mut() {
            wire.potential = Potential::None;
        }
    }

    /// Reset every per-tick field: potentials, currents, overcurrent flags
    /// and recorded device currents.
    pub fn reset_transient(&mut self) {
        for terminal in self.terminals.values_mut() {
            terminal.potential = Potential::None;
        }
        for wire in self.wires.values_mut() {
            wire.clear_transient();
        }
        for component in self.components.values_mut() {
            component.component_type.clear_transient();
        }
    }

    /// Store propagation results and mirror them onto wires.
    pub(crate) fn assign_potentials(&mut self, potentials: &HashMap<TerminalId, Potential>) {
        for (id, potential) in potentials {
            if let Some(terminal) = self.terminals.get_mut(id) {
                terminal.potential = *potential;
            }
        }
        let terminals = &self.terminals;
        for wire in self.wires.values_mut() {
            let at = |t: &TerminalId| terminals.get(t).map(|t| t.potential).unwrap_or_default();
            wire.potential = at(&wire.start).union(at(&wire.end));
        }
    }

    /// Advance every component by `dt` using the potentials left by the
    /// previous tick.
    pub fn update_components(&mut self, dt: Duration) {
        let inputs: Vec<(ComponentId, Vec<Potential>)> = self
            .components
            .values()
            .map(|c| (c.id, self.potentials_of(c)))
            .collect();
        for (id, potentials) in inputs {
            if let Some(component) = self.components.get_mut(&id) {
                component.component_type.update(&potentials, dt);
            }
        }
    }

    /// Run the post-propagation hook of every component against `potentials`,
    /// which may differ from the assigned terminal potentials. Returns the
    /// components that changed state.
    pub fn settle(&mut self, potentials: &HashMap<TerminalId, Potential>) -> Vec<ComponentId> {
        let inputs: Vec<(ComponentId, Vec<Potential>)> = self
            .components
            .values()
            .map(|c| {
                let seen = c
                    .terminals
                    .iter()
                    .map(|t| potentials.get(t).copied().unwrap_or_default())
                    .collect();
                (c.id, seen)
            })
            .collect();
        let mut changed = Vec::new();
        for (id, seen) in inputs {
            if let Some(component) = self.components.get_mut(&id) {
                if component.component_type.after_propagation(&seen) {
                    debug!("{} changed state after propagation", component.name);
                    changed.push(id);
                }
            }
        }
        changed
    }

    /// Lamp lit, motor running, coil pulled in.
    pub fn device_energized(&self, id: ComponentId) -> bool {
        self.components
            .get(&id)
            .is_some_and(|c| c.component_type.energized(&self.potentials_of(c)))
    }

    pub fn energized_devices(&self) -> Vec<ComponentId> {
        self.components
            .keys()
            .copied()
            .filter(|id| self.device_energized(*id))
            .collect()
    }

    pub fn live_terminal_count(&self) -> usize {
        self.terminals
            .values()
            .filter(|t| t.potential.is_live())
            .count()
    }
}
