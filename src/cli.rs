use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::ArgMatches;
use log::LevelFilter;

use crate::parser::parse_time_with_unit;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    /// Overrides the scenario's tick length.
    pub dt: Option<Duration>,
    /// Overrides the scenario's run length.
    pub duration: Option<Duration>,
    pub current_solver: bool,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("csv") | None => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format: {}", other)),
        };

        let dt = matches
            .get_one::<String>("dt")
            .map(|v| parse_time_value(v))
            .transpose()?;
        if dt.is_some_and(|dt| dt.is_zero()) {
            return Err(anyhow!("Tick length must be positive"));
        }
        let duration = matches
            .get_one::<String>("duration")
            .map(|v| parse_time_value(v))
            .transpose()?;

        Ok(CliArgs {
            input_file,
            output_file,
            output_format,
            dt,
            duration,
            current_solver: !matches.get_flag("no-current"),
            verbose_level,
        })
    }

    /// Log level for `-v` repetitions; `RUST_LOG` still wins when set.
    pub fn level_filter(&self) -> LevelFilter {
        match self.verbose_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Parse time value with unit (e.g., "16ms", "2s", "500us")
fn parse_time_value(value: &str) -> Result<Duration> {
    let seconds = parse_time_with_unit(value)?;
    Duration::try_from_secs_f64(seconds).map_err(|e| anyhow!("Invalid time '{}': {}", value, e))
}
