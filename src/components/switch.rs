//! Pushbuttons and rotary selector switches.

use serde::{Deserialize, Serialize};

use super::{Bridge, ElectricalComponent, TerminalRole, TerminalSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchType {
    PushbuttonNo,
    PushbuttonNc,
    Rotary2,
    Rotary3,
}

impl SwitchType {
    pub fn is_pushbutton(self) -> bool {
        matches!(self, SwitchType::PushbuttonNo | SwitchType::PushbuttonNc)
    }

    /// Number of selectable positions (1 for pushbuttons).
    pub fn positions(self) -> u8 {
        match self {
            SwitchType::PushbuttonNo | SwitchType::PushbuttonNc => 1,
            SwitchType::Rotary2 => 2,
            SwitchType::Rotary3 => 3,
        }
    }
}

impl std::str::FromStr for SwitchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no" | "pushbutton_no" => Ok(SwitchType::PushbuttonNo),
            "nc" | "pushbutton_nc" => Ok(SwitchType::PushbuttonNc),
            "rotary2" | "rotary_2pos" => Ok(SwitchType::Rotary2),
            "rotary3" | "rotary_3pos" => Ok(SwitchType::Rotary3),
            other => Err(format!("unknown switch type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Switch {
    switch_type: SwitchType,
    pub pressed: bool,
    /// 1-based rotary position.
    position: u8,
}

impl Switch {
    pub fn new(switch_type: SwitchType) -> Self {
        Switch {
            switch_type,
            pressed: false,
            position: 1,
        }
    }

    pub fn switch_type(&self) -> SwitchType {
        self.switch_type
    }

    /// Changing the type resets the actuator to its rest state.
    pub fn set_switch_type(&mut self, switch_type: SwitchType) {
        self.switch_type = switch_type;
        self.pressed = false;
        self.position = 1;
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    pub fn set_position(&mut self, position: u8) {
        self.position = position.clamp(1, self.switch_type.positions());
    }

    pub fn press(&mut self) {
        if self.switch_type.is_pushbutton() {
            self.pressed = true;
        }
    }

    pub fn release(&mut self) {
        if self.switch_type.is_pushbutton() {
            self.pressed = false;
        }
    }

    /// Rotary switches step to the next position, wrapping around.
    /// Pushbuttons latch or unlatch.
    pub fn toggle(&mut self) {
        if self.switch_type.is_pushbutton() {
            self.pressed = !self.pressed;
        } else {
            self.position = self.position % self.switch_type.positions() + 1;
        }
    }

    fn is_closed(&self) -> bool {
        match self.switch_type {
            SwitchType::PushbuttonNo => self.pressed,
            SwitchType::PushbuttonNc => !self.pressed,
            _ => false,
        }
    }
}

impl ElectricalComponent for Switch {
    fn type_name(&self) -> &'static str {
        "switch"
    }

    fn terminal_specs(&self) -> Vec<TerminalSpec> {
        match self.switch_type {
            SwitchType::PushbuttonNo => vec![
                TerminalSpec::new("13", TerminalRole::In, 1.0, 0.0),
                TerminalSpec::new("14", TerminalRole::Out, 1.0, 4.0),
            ],
            SwitchType::PushbuttonNc => vec![
                TerminalSpec::new("11", TerminalRole::In, 1.0, 0.0),
                TerminalSpec::new("12", TerminalRole::Out, 1.0, 4.0),
            ],
            SwitchType::Rotary2 => vec![
                TerminalSpec::new("COM", TerminalRole::Common, 2.5, 0.0),
                TerminalSpec::new("1", TerminalRole::Output, 1.0, 5.0),
                TerminalSpec::new("2", TerminalRole::Output, 4.0, 5.0),
            ],
            SwitchType::Rotary3 => vec![
                TerminalSpec::new("COM", TerminalRole::Common, 2.5, 0.0),
                TerminalSpec::new("1", TerminalRole::Output, 1.0, 5.0),
                TerminalSpec::new("2", TerminalRole::Output, 2.5, 5.0),
                TerminalSpec::new("3", TerminalRole::Output, 4.0, 5.0),
            ],
        }
    }

    fn internal_connections(&self) -> Vec<Bridge> {
        if self.switch_type.is_pushbutton() {
            if self.is_closed() {
                vec![(0, 1)]
            } else {
                Vec::new()
            }
        } else {
            // Output n sits at local index n.
            vec![(0, self.position as usize)]
        }
    }
}
