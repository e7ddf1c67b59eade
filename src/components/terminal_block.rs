//! Terminal blocks: rows of feed-through poles.

use serde::{Deserialize, Serialize};

use super::{Bridge, ElectricalComponent, TerminalRole, TerminalSpec};

pub const MIN_POLES: u8 = 2;
pub const MAX_POLES: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

impl std::str::FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v" | "vertical" => Ok(Orientation::Vertical),
            "h" | "horizontal" => Ok(Orientation::Horizontal),
            other => Err(format!("unknown orientation '{}'", other)),
        }
    }
}

/// Pole `n` (1-based) has terminals `{n}A` at local index `2(n-1)` and
/// `{n}B` at `2(n-1) + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalBlock {
    poles: u8,
    pub orientation: Orientation,
}

impl TerminalBlock {
    pub fn new(poles: u8) -> Self {
        TerminalBlock {
            poles: poles.clamp(MIN_POLES, MAX_POLES),
            orientation: Orientation::Vertical,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn poles(&self) -> u8 {
        self.poles
    }

    pub fn set_poles(&mut self, poles: u8) {
        self.poles = poles.clamp(MIN_POLES, MAX_POLES);
    }
}

impl ElectricalComponent for TerminalBlock {
    fn type_name(&self) -> &'static str {
        "terminal_block"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        let mut specs = Vec::with_capacity(self.poles as usize * 2);
        for n in 1..=self.poles {
            let along = f64::from(n);
            let (a, b) = match self.orientation {
                Orientation::Vertical => ((along, 0.0), (along, 3.0)),
                Orientation::Horizontal => ((0.0, along), (3.0, along)),
            };
            specs.push(TerminalSpec::new(format!("{}A", n), TerminalRole::Passive, a.0, a.1));
            specs.push(TerminalSpec::new(format!("{}B", n), TerminalRole::Passive, b.0, b.1));
        }
        specs
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        (0..self.poles as usize).map(|i| (2 * i, 2 * i + 1)).collect()
    }
}
