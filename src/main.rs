use clap::{Arg, ArgAction, Command};
use colored::*;
use log::{error, info};
use std::path::Path;
use std::time::Duration;

use panelsim::cli::CliArgs;
use panelsim::components::{ComponentType, ElectricalComponent};
use panelsim::simulator::{Simulator, SimulatorConfig, DEFAULT_TICK};
use panelsim::Circuit;

fn main() {
    let matches = create_cli().get_matches();

    let args = match CliArgs::from_matches(&matches) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(2);
        }
    };

    env_logger::Builder::new()
        .filter_level(args.level_filter())
        .parse_default_env()
        .init();

    if let Err(e) = run_application(args) {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("panelsim")
        .version(panelsim::VERSION)
        .about(panelsim::DESCRIPTION)
        .arg(
            Arg::new("input")
                .help("Scenario file describing the panel and its script")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for the run trace"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("dt")
                .long("dt")
                .value_name("TIME")
                .help("Tick length, overriding the scenario's .run line"),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .value_name("TIME")
                .help("Run length, overriding the scenario's .run line"),
        )
        .arg(
            Arg::new("no-current")
                .long("no-current")
                .action(ArgAction::SetTrue)
                .help("Skip the current solver (no overcurrent tripping)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
}

fn run_application(args: CliArgs) -> anyhow::Result<()> {
    info!("{}", "Starting panelsim".green().bold());
    info!("Scenario: {}", args.input_file.bright_blue());

    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let mut simulator = Simulator::with_config(SimulatorConfig {
        enable_current_solver: args.current_solver,
        ..SimulatorConfig::default()
    });
    simulator.load_scenario(&args.input_file)?;

    let spec = simulator.run_spec();
    let dt = args.dt.or(spec.map(|s| s.dt)).unwrap_or(DEFAULT_TICK);
    let duration = args
        .duration
        .or(spec.map(|s| s.duration))
        .unwrap_or(Duration::from_secs(1));
    simulator.run(dt, duration)?;

    if let Some(output_file) = args.output_file {
        simulator.export_results(&output_file, args.output_format)?;
        println!("Results exported to: {}", output_file.bright_green());
    } else {
        simulator.print_summary();
        print_panel(simulator.circuit());
    }

    info!("{}", "Simulation completed successfully!".green().bold());
    Ok(())
}

/// Colored one-line-per-device view of the final state.
fn print_panel(circuit: &Circuit) {
    println!("\n=== Panel ===");
    for component in circuit.components() {
        let energized = circuit.device_energized(component.id);
        let state = match &component.component_type {
            ComponentType::Breaker(b) if b.is_on => "ON".green(),
            ComponentType::Breaker(_) => "OFF".dimmed(),
            ComponentType::Fuse(f) if f.blown => "BLOWN".red().bold(),
            ComponentType::Fuse(_) => "ok".green(),
            ComponentType::ThermalRelay(t) if t.tripped => "TRIPPED".red().bold(),
            ComponentType::ThermalRelay(_) => "ok".green(),
            ComponentType::Switch(s) if s.switch_type().is_pushbutton() => {
                if s.pressed {
                    "pressed".yellow()
                } else {
                    "released".dimmed()
                }
            }
            ComponentType::Switch(s) => format!("position {}", s.position()).normal(),
            ComponentType::Lamp(l) if energized => format!("lit {}", l.color.code()).yellow().bold(),
            ComponentType::Motor(_) if energized => "running".green().bold(),
            ComponentType::Contactor(_) | ComponentType::Relay(_) if energized => "pulled in".cyan(),
            ComponentType::Resistor(r) => format!("{:.3}A", r.current()).normal(),
            ComponentType::Ammeter(a) => format!("{:.3}A", a.reading()).normal(),
            _ => "-".dimmed(),
        };
        println!(
            "  {:<8} {:<15} {}",
            component.name.bold(),
            component.component_type.type_name(),
            state
        );
    }

    let overcurrent = circuit.wires().filter(|w| w.overcurrent).count();
    if overcurrent > 0 {
        println!("{}", format!("{} wires over their rating", overcurrent).red());
    }
}
