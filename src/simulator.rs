use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, CircuitError};
use crate::cli::OutputFormat;
use crate::components::{ComponentType, ElectricalComponent};
use crate::parser::{ActionKind, RunSpec, Scenario, ScenarioParser, ScriptAction};
use crate::propagation::propagate;
use crate::solver::{CurrentSolver, SolverConfig, TripEvent};

/// Default tick length, one frame at 60 Hz.
pub const DEFAULT_TICK: Duration = Duration::from_micros(16_667);

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub solver_config: SolverConfig,
    pub enable_current_solver: bool,
    /// Longest delta fed to component timers in one tick. A host that
    /// stalls does not advance relay timers by the whole gap.
    pub max_tick_delta: Duration,
    pub record_trace: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            solver_config: SolverConfig::default(),
            enable_current_solver: true,
            max_tick_delta: Duration::from_secs(1),
            record_trace: true,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub time: f64,
    pub live_terminals: usize,
    pub shorted_terminals: usize,
    pub blown: Vec<String>,
    pub trips: Vec<TripEvent>,
    pub loops: usize,
    pub peak_current: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub time: f64,
    pub component: String,
    pub event: String,
}

/// Simulation results container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    pub title: String,
    pub time_points: Vec<f64>,
    /// Per device: energized (lamp lit, motor running, coil pulled in) at
    /// each time point.
    pub device_states: BTreeMap<String, Vec<bool>>,
    /// Per resistor or ammeter: recorded current at each time point.
    pub currents: BTreeMap<String, Vec<f64>>,
    pub events: Vec<TraceEvent>,
    pub total_time: f64,
    pub ticks: usize,
}

/// Main simulator engine
pub struct Simulator {
    circuit: Circuit,
    solver: CurrentSolver,
    config: SimulatorConfig,
    time: Duration,
    script: VecDeque<ScriptAction>,
    run_spec: Option<RunSpec>,
    results: SimulationResult,
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulatorConfig) -> Self {
        Simulator {
            circuit: Circuit::default(),
            solver: CurrentSolver::with_config(config.solver_config.clone()),
            config,
            time: Duration::ZERO,
            script: VecDeque::new(),
            run_spec: None,
            results: SimulationResult::default(),
        }
    }

    /// Take ownership of an already built circuit.
    pub fn with_circuit(mut self, circuit: Circuit) -> Self {
        self.results.title = circuit.title.clone();
        self.circuit = circuit;
        self
    }

    /// Load a scenario netlist from file
    pub fn load_scenario(&mut self, filename: &str) -> Result<()> {
        info!("Loading scenario from: {}", filename);

        let scenario = ScenarioParser::new().parse_file(filename)?;
        self.load_scenario_from_parsed(scenario)
    }

    /// Load from a parsed scenario
    pub fn load_scenario_from_parsed(&mut self, scenario: Scenario) -> Result<()> {
        let circuit = scenario.build()?;
        info!(
            "Loaded circuit: {} ({} components, {} wires)",
            circuit.title,
            circuit.component_count(),
            circuit.wire_count()
        );

        self.script = scenario.sorted_script().into();
        self.run_spec = scenario.run;
        self.results = SimulationResult {
            title: circuit.title.clone(),
            ..Default::default()
        };
        self.circuit = circuit;
        self.time = Duration::ZERO;
        Ok(())
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Editor access between ticks.
    pub fn circuit_mut(&mut self) -> &mut Circuit {
        &mut self.circuit
    }

    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn run_spec(&self) -> Option<RunSpec> {
        self.run_spec
    }

    /// Advance by `dt`: component timers, reset, propagation, then the
    /// current solver. Never fails.
    pub fn tick(&mut self, dt: Duration) -> TickReport {
        let dt = dt.min(self.config.max_tick_delta);

        self.circuit.update_components(dt);
        self.circuit.reset_transient();
        let propagation = propagate(&mut self.circuit);

        let mut report = TickReport {
            live_terminals: self.circuit.live_terminal_count(),
            shorted_terminals: propagation.shorted,
            blown: propagation
                .settled
                .iter()
                .filter_map(|id| self.circuit.component(*id).map(|c| c.name.clone()))
                .collect(),
            ..Default::default()
        };

        if self.config.enable_current_solver {
            let stats = self.solver.solve(&mut self.circuit);
            report.loops = stats.paths.len();
            report.peak_current = stats.max_current();
            report.trips = stats.trips;
        }

        self.time += dt;
        report.time = self.time.as_secs_f64();
        debug!(
            "tick t={:.3}s: {} live terminals, {} loops",
            report.time, report.live_terminals, report.loops
        );

        if self.config.record_trace {
            self.record(&report);
        }
        report
    }

    fn record(&mut self, report: &TickReport) {
        let results = &mut self.results;
        results.ticks += 1;
        results.time_points.push(report.time);

        for component in self.circuit.components() {
            let energized = self.circuit.device_energized(component.id);
            results
                .device_states
                .entry(component.name.clone())
                .or_default()
                .push(energized);

            let current = match &component.component_type {
                ComponentType::Resistor(r) => Some(r.current()),
                ComponentType::Ammeter(a) => Some(a.reading()),
                _ => None,
            };
            if let Some(current) = current {
                results
                    .currents
                    .entry(component.name.clone())
                    .or_default()
                    .push(current);
            }
        }

        for name in &report.blown {
            results.events.push(TraceEvent {
                time: report.time,
                component: name.clone(),
                event: "blown".to_string(),
            });
        }
        for trip in &report.trips {
            results.events.push(TraceEvent {
                time: report.time,
                component: trip.name.clone(),
                event: format!("tripped at {:.3}A (limit {:.3}A)", trip.current, trip.limit),
            });
        }
    }

    /// Perform a user action on a component.
    pub fn apply(&mut self, action: &ScriptAction) -> std::result::Result<(), CircuitError> {
        let unsupported = |type_name: &str| CircuitError::UnsupportedAction {
            component: format!("{} ({})", action.target, type_name),
            action: format!("{:?}", action.kind).to_lowercase(),
        };

        let id = self
            .circuit
            .component_id(&action.target)
            .ok_or_else(|| CircuitError::UnknownComponent(action.target.clone()))?;
        let component = self
            .circuit
            .component_mut(id)
            .ok_or_else(|| CircuitError::UnknownComponent(action.target.clone()))?;

        match (&mut component.component_type, action.kind) {
            (ComponentType::Switch(s), ActionKind::Press) => s.press(),
            (ComponentType::Switch(s), ActionKind::Release) => s.release(),
            (ComponentType::Switch(s), ActionKind::Toggle) => s.toggle(),
            (ComponentType::Switch(s), ActionKind::Position(p)) => s.set_position(p),
            (ComponentType::Breaker(b), ActionKind::Toggle) => b.toggle(),
            (ComponentType::Breaker(b), ActionKind::On) => b.is_on = true,
            (ComponentType::Breaker(b), ActionKind::Off) => b.is_on = false,
            (ComponentType::Breaker(b), ActionKind::Trip) => {
                b.trip();
            }
            (ComponentType::Fuse(f), ActionKind::Trip) => {
                f.trip();
            }
            (ComponentType::Fuse(f), ActionKind::Toggle) => f.toggle(),
            (ComponentType::Fuse(f), ActionKind::Replace | ActionKind::Reset) => f.replace(),
            (ComponentType::ThermalRelay(t), ActionKind::Trip) => {
                t.trip();
            }
            (ComponentType::ThermalRelay(t), ActionKind::Reset) => t.reset(),
            (ComponentType::Relay(r), ActionKind::Knob { index, seconds }) => r.set_knob(index, seconds)?,
            (ComponentType::Lamp(l), ActionKind::Toggle) => l.cycle_color(),
            (other, _) => return Err(unsupported(other.type_name())),
        }

        info!("t={:.3}s: {:?} {}", self.time.as_secs_f64(), action.kind, action.target);
        self.results.events.push(TraceEvent {
            time: self.time.as_secs_f64(),
            component: action.target.clone(),
            event: format!("{:?}", action.kind).to_lowercase(),
        });
        Ok(())
    }

    /// Run for `duration` in steps of `dt`, applying script actions when
    /// their time comes up.
    pub fn run(&mut self, dt: Duration, duration: Duration) -> Result<&SimulationResult> {
        if dt.is_zero() {
            return Err(anyhow!("Tick length must be positive"));
        }
        info!(
            "Starting run: dt={:?}, duration={:?}, {} scripted actions",
            dt,
            duration,
            self.script.len()
        );
        let start_time = Instant::now();
        let end = self.time + duration;

        while self.time < end {
            while let Some(action) = self.script.front() {
                if action.at > self.time {
                    break;
                }
                if let Some(action) = self.script.pop_front() {
                    if let Err(e) = self.apply(&action) {
                        return Err(anyhow!("line {}: {}", action.line, e));
                    }
                }
            }
            self.tick(dt.min(end - self.time));
        }

        if !self.script.is_empty() {
            warn!("{} scripted actions fall after the end of the run", self.script.len());
        }
        self.results.total_time += start_time.elapsed().as_secs_f64();
        info!(
            "Run completed: {} ticks in {:.3}ms",
            self.results.ticks,
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        Ok(&self.results)
    }

    /// Run with the scenario's `.run` line, falling back to one second of
    /// 60 Hz ticks.
    pub fn run_scenario(&mut self) -> Result<&SimulationResult> {
        let spec = self.run_spec.unwrap_or(RunSpec {
            dt: DEFAULT_TICK,
            duration: Duration::from_secs(1),
        });
        self.run(spec.dt, spec.duration)
    }

    /// Get simulation results
    pub fn get_results(&self) -> &SimulationResult {
        &self.results
    }

    /// Export simulation results to file
    pub fn export_results(&self, filename: &str, format: OutputFormat) -> Result<()> {
        if self.results.time_points.is_empty() {
            return Err(anyhow!("No simulation results available"));
        }

        match format {
            OutputFormat::Csv => self.export_csv(filename),
            OutputFormat::Json => self.export_json(filename),
        }
    }

    /// Export results to CSV format
    fn export_csv(&self, filename: &str) -> Result<()> {
        use csv::Writer;
        use std::fs::File;

        let results = &self.results;
        let file = File::create(filename)?;
        let mut writer = Writer::from_writer(file);

        let mut header = vec!["time".to_string()];
        for name in results.device_states.keys() {
            header.push(format!("E({})", name));
        }
        for name in results.currents.keys() {
            header.push(format!("I({})", name));
        }
        writer.write_record(&header)?;

        for (i, &time) in results.time_points.iter().enumerate() {
            let mut record = vec![time.to_string()];
            for states in results.device_states.values() {
                let energized = states.get(i).copied().unwrap_or(false);
                record.push(u8::from(energized).to_string());
            }
            for currents in results.currents.values() {
                record.push(currents.get(i).copied().unwrap_or(0.0).to_string());
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!("Results exported to CSV: {}", filename);
        Ok(())
    }

    /// Export results to JSON format
    fn export_json(&self, filename: &str) -> Result<()> {
        use std::fs::File;

        let file = File::create(filename)?;
        serde_json::to_writer_pretty(file, &self.results)?;

        info!("Results exported to JSON: {}", filename);
        Ok(())
    }

    /// Print simulation summary
    pub fn print_summary(&self) {
        let results = &self.results;
        println!("\n=== Simulation Summary ===");
        println!("Circuit: {}", results.title);
        println!("Simulated time: {:.3}s", self.time.as_secs_f64());
        println!("Ticks: {}", results.ticks);
        println!("Wall time: {:.3}ms", results.total_time * 1000.0);

        let energized: Vec<String> = self
            .circuit
            .energized_devices()
            .into_iter()
            .filter_map(|id| self.circuit.component(id))
            .map(|c| format!("{} ({})", c.name, c.type_name()))
            .collect();
        if !energized.is_empty() {
            println!("\nEnergized devices (final state):");
            for device in energized {
                println!("  {}", device);
            }
        }

        if !results.currents.is_empty() {
            println!("\nCurrents (final values):");
            for (name, currents) in &results.currents {
                if let Some(&current) = currents.last() {
                    println!("  I({}): {:.3}A", name, current);
                }
            }
        }

        if !results.events.is_empty() {
            println!("\nEvents:");
            for event in &results.events {
                println!("  {:>8.3}s  {:<8} {}", event.time, event.component, event.event);
            }
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::KnobIndex;

    const LAMP_CIRCUIT: &str = "\
Start/stop lamp
BREAKER Q1 poles=2P on
SWITCH S1 type=no
LAMP H1
WIRE Q1.2 S1.13
WIRE S1.14 H1.X1
WIRE H1.X2 Q1.4
.at 100ms press S1
.at 300ms release S1
.run 10ms 500ms
";

    fn loaded(content: &str) -> Simulator {
        let scenario = ScenarioParser::new().parse_scenario(content).unwrap();
        let mut simulator = Simulator::new();
        simulator.load_scenario_from_parsed(scenario).unwrap();
        simulator
    }

    #[test]
    fn test_scripted_pushbutton() {
        let mut simulator = loaded(LAMP_CIRCUIT);
        let results = simulator.run_scenario().unwrap();

        assert_eq!(results.ticks, 50);
        let lamp = &results.device_states["H1"];
        assert!(!lamp[0]);
        assert!(lamp[10]);
        assert!(lamp[29]);
        assert!(!lamp[30]);
        assert_eq!(results.events.len(), 2);
    }

    #[test]
    fn test_tick_clamps_delta() {
        let mut simulator = Simulator::with_config(SimulatorConfig {
            max_tick_delta: Duration::from_millis(100),
            ..SimulatorConfig::default()
        });
        simulator.tick(Duration::from_secs(3600));
        assert_eq!(simulator.time(), Duration::from_millis(100));
    }

    #[test]
    fn test_unsupported_action() {
        let mut simulator = loaded(LAMP_CIRCUIT);
        let action = ScriptAction {
            line: 1,
            at: Duration::ZERO,
            kind: ActionKind::Knob {
                index: KnobIndex(0),
                seconds: 1,
            },
            target: "H1".to_string(),
        };
        assert!(matches!(
            simulator.apply(&action),
            Err(CircuitError::UnsupportedAction { .. })
        ));
        let action = ScriptAction {
            target: "Z9".to_string(),
            ..action
        };
        assert!(matches!(
            simulator.apply(&action),
            Err(CircuitError::UnknownComponent(_))
        ));
    }

    #[test]
    fn test_current_solver_can_be_disabled() {
        let content = "\
Loop
BREAKER Q1 poles=2P limit=5 on
RESISTOR R1 ohms=10
WIRE Q1.2 R1.1
WIRE R1.2 Q1.4
";
        let scenario = ScenarioParser::new().parse_scenario(content).unwrap();
        let mut simulator = Simulator::with_config(SimulatorConfig {
            enable_current_solver: false,
            ..SimulatorConfig::default()
        });
        simulator.load_scenario_from_parsed(scenario).unwrap();
        let report = simulator.tick(DEFAULT_TICK);
        assert!(report.trips.is_empty());
        assert_eq!(report.loops, 0);

        let mut simulator = loaded(content);
        let report = simulator.tick(DEFAULT_TICK);
        assert_eq!(report.trips.len(), 1);
        assert_eq!(report.trips[0].name, "Q1");
    }

    #[test]
    fn test_export_requires_results() {
        let simulator = Simulator::new();
        assert!(simulator.export_results("unused.csv", OutputFormat::Csv).is_err());
    }
}
