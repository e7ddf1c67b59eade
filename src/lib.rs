pub mod circuit;
pub mod cli;
pub mod components;
pub mod graph;
pub mod parser;
pub mod propagation;
pub mod simulator;
pub mod solver;

// Re-export commonly used types
pub use circuit::{Circuit, CircuitError, Component, ComponentId, Point, Polarity, Potential, TerminalId, WireId};
pub use components::{ComponentType, ElectricalComponent};
pub use parser::{ScenarioParser, Scenario};
pub use propagation::propagate;
pub use simulator::{Simulator, SimulationResult};
pub use solver::CurrentSolver;

// Error types
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
