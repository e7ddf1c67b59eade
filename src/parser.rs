use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, space0, space1},
    combinator::{map, opt, recognize},
    multi::many0,
    sequence::{pair, preceded, separated_pair},
    IResult,
};
use regex::Regex;
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;
use anyhow::{anyhow, Result};
use log::debug;
use thiserror::Error;

use crate::circuit::{Circuit, CircuitError, Point};
use crate::components::{
    Ammeter, Breaker, ComponentType, Contactor, Fuse, KnobIndex, Lamp, LampColor, Motor, MotorType,
    Orientation, PoleType, Relay, RelayType, Resistor, Switch, SwitchType, TerminalBlock,
    ThermalOverloadRelay, ThermalRelayType,
};

lazy_static! {
    static ref WIRE_PATTERN: Regex = Regex::new(
        r"(?i)^wire\s+(\S+)\s+(\S+)$"
    ).unwrap();

    static ref AT_PATTERN: Regex = Regex::new(
        r"(?i)^\.at\s+(\S+)\s+([a-z]+)\s+(\S+)((?:\s+\S+)*)$"
    ).unwrap();

    static ref RUN_PATTERN: Regex = Regex::new(
        r"(?i)^\.run\s+(\S+)\s+(\S+)$"
    ).unwrap();

    static ref VALUE_PATTERN: Regex = Regex::new(
        r"^([0-9]+\.?[0-9]*)\s*([a-zA-Z]*)$"
    ).unwrap();
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: unknown component kind '{kind}'")]
    UnknownKind { line: usize, kind: String },

    #[error("line {line}: unknown parameter '{key}' for {kind}")]
    UnknownParameter { line: usize, kind: String, key: String },

    #[error("line {line}: invalid {key} '{value}'")]
    InvalidValue { line: usize, key: String, value: String },

    #[error("line {line}: unknown action '{action}'")]
    UnknownAction { line: usize, action: String },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// A component declaration: `LAMP H1 color=GL at=4,10`.
#[derive(Debug, Clone)]
pub struct ComponentDecl {
    pub line: usize,
    pub name: String,
    pub origin: Point,
    pub component_type: ComponentType,
}

/// `WIRE Q1.2 H1.X1`
#[derive(Debug, Clone, PartialEq)]
pub struct WireDecl {
    pub line: usize,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Press,
    Release,
    Toggle,
    On,
    Off,
    Trip,
    Reset,
    Replace,
    Position(u8),
    Knob { index: KnobIndex, seconds: u32 },
}

/// `.at <time> <action> <target> [args]`
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptAction {
    pub line: usize,
    pub at: Duration,
    pub kind: ActionKind,
    pub target: String,
}

/// `.run <dt> <duration>`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSpec {
    pub dt: Duration,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub title: String,
    pub components: Vec<ComponentDecl>,
    pub wires: Vec<WireDecl>,
    pub script: Vec<ScriptAction>,
    pub run: Option<RunSpec>,
}

impl Scenario {
    /// Place every declared component and wire into a fresh circuit.
    pub fn build(&self) -> std::result::Result<Circuit, CircuitError> {
        let mut circuit = Circuit::new(self.title.clone());
        for decl in &self.components {
            circuit.add_component(decl.name.clone(), decl.origin, decl.component_type.clone())?;
        }
        for wire in &self.wires {
            circuit.connect_labels(&wire.from, &wire.to)?;
        }
        Ok(circuit)
    }

    /// Script actions ordered by time; actions at the same time keep file
    /// order.
    pub fn sorted_script(&self) -> Vec<ScriptAction> {
        let mut script = self.script.clone();
        script.sort_by_key(|a| a.at);
        script
    }
}

pub struct ScenarioParser;

impl Default for ScenarioParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioParser {
    pub fn new() -> Self {
        ScenarioParser
    }

    pub fn parse_file(&self, filename: &str) -> Result<Scenario> {
        let content = fs::read_to_string(filename)
            .map_err(|e| anyhow!("Failed to read file '{}': {}", filename, e))?;

        Ok(self.parse_scenario(&content)?)
    }

    pub fn parse_scenario(&self, content: &str) -> std::result::Result<Scenario, ParseError> {
        let mut scenario = Scenario::default();

        for (line_num, line) in self.preprocess_lines(content) {
            if scenario.title.is_empty() && !line.starts_with('.') {
                scenario.title = line;
                continue;
            }

            let lower = line.to_ascii_lowercase();
            if lower == ".end" {
                break;
            }
            if lower.starts_with(".at") {
                scenario.script.push(parse_action_line(line_num, &line)?);
            } else if lower.starts_with(".run") {
                scenario.run = Some(parse_run_line(line_num, &line)?);
            } else if line.starts_with('.') {
                return Err(ParseError::Syntax {
                    line: line_num,
                    message: format!("unknown directive '{}'", line),
                });
            } else if let Some(captures) = WIRE_PATTERN.captures(&line) {
                scenario.wires.push(WireDecl {
                    line: line_num,
                    from: captures[1].to_string(),
                    to: captures[2].to_string(),
                });
            } else {
                scenario.components.push(parse_component_line(line_num, &line)?);
            }
        }

        debug!(
            "parsed scenario '{}': {} components, {} wires, {} actions",
            scenario.title,
            scenario.components.len(),
            scenario.wires.len(),
            scenario.script.len()
        );
        Ok(scenario)
    }

    /// Strip comments and blank lines and join `+` continuations. Each line
    /// keeps the 1-based number it started on.
    fn preprocess_lines(&self, content: &str) -> Vec<(usize, String)> {
        let mut processed_lines: Vec<(usize, String)> = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('*') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('+') {
                if let Some((_, current)) = processed_lines.last_mut() {
                    current.push(' ');
                    current.push_str(rest.trim());
                    continue;
                }
            }
            processed_lines.push((index + 1, line.to_string()));
        }

        processed_lines
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn component_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic()),
        opt(take_while1(is_name_char)),
    ))(input)
}

fn parameter(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    alt((
        map(
            separated_pair(
                take_while1(is_name_char),
                char('='),
                take_while1(|c: char| !c.is_whitespace()),
            ),
            |(key, value)| (key, Some(value)),
        ),
        map(take_while1(is_name_char), |flag| (flag, None)),
    ))(input)
}

type Declaration<'a> = (&'a str, &'a str, Vec<(&'a str, Option<&'a str>)>);

fn declaration(input: &str) -> IResult<&str, Declaration<'_>> {
    let (input, kind) = take_while1(|c: char| c.is_ascii_alphabetic())(input)?;
    let (input, _) = space1(input)?;
    let (input, name) = component_name(input)?;
    let (input, params) = many0(preceded(space1, parameter))(input)?;
    let (input, _) = space0(input)?;
    Ok((input, (kind, name, params)))
}

/// Key/value parameters of one declaration. Every key must be consumed.
struct Params<'a> {
    line: usize,
    kind: String,
    values: BTreeMap<String, Option<&'a str>>,
}

impl<'a> Params<'a> {
    fn value(&mut self, key: &str) -> Option<&'a str> {
        self.values.remove(key).flatten()
    }

    fn flag(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    fn parsed<T: std::str::FromStr>(&mut self, key: &str) -> std::result::Result<Option<T>, ParseError> {
        match self.value(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| self.invalid(key, raw)),
        }
    }

    fn quantity(&mut self, key: &str, unit: &str) -> std::result::Result<Option<f64>, ParseError> {
        match self.value(key) {
            None => Ok(None),
            Some(raw) => {
                let lower = raw.to_ascii_lowercase();
                let number = lower.strip_suffix(unit).unwrap_or(&lower);
                parse_value_with_unit(number)
                    .map(Some)
                    .map_err(|_| self.invalid(key, raw))
            }
        }
    }

    /// `limit=none` removes the rating.
    fn limit(&mut self, default: Option<f64>) -> std::result::Result<Option<f64>, ParseError> {
        match self.values.get("limit").copied().flatten() {
            Some(raw) if raw.eq_ignore_ascii_case("none") => {
                self.values.remove("limit");
                Ok(None)
            }
            _ => Ok(self.quantity("limit", "a")?.or(default)),
        }
    }

    fn invalid(&self, key: &str, value: &str) -> ParseError {
        ParseError::InvalidValue {
            line: self.line,
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn finish(self) -> std::result::Result<(), ParseError> {
        match self.values.into_keys().next() {
            Some(key) => Err(ParseError::UnknownParameter {
                line: self.line,
                kind: self.kind,
                key,
            }),
            None => Ok(()),
        }
    }
}

fn parse_component_line(line_num: usize, line: &str) -> std::result::Result<ComponentDecl, ParseError> {
    let (rest, (kind, name, raw_params)) = declaration(line).map_err(|_| ParseError::Syntax {
        line: line_num,
        message: format!("expected '<KIND> <name> [params]', got '{}'", line),
    })?;
    if !rest.is_empty() {
        return Err(ParseError::Syntax {
            line: line_num,
            message: format!("unexpected '{}'", rest),
        });
    }

    let kind = kind.to_ascii_uppercase();
    let mut params = Params {
        line: line_num,
        kind: kind.clone(),
        values: raw_params
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect(),
    };

    let origin = match params.value("at") {
        None => Point::default(),
        Some(raw) => parse_point(raw).ok_or_else(|| params.invalid("at", raw))?,
    };

    let component_type = match kind.as_str() {
        "BREAKER" => {
            let poles = params.parsed::<PoleType>("poles")?.unwrap_or(PoleType::TwoP);
            let mut breaker = Breaker::new(poles);
            if let Some(voltage) = params.quantity("voltage", "v")? {
                breaker = breaker.with_voltage(voltage);
            }
            let limit = params.limit(breaker.limit)?;
            breaker = breaker.with_limit(limit);
            breaker.is_on = params.flag("on");
            ComponentType::Breaker(breaker)
        }
        "SWITCH" => {
            let switch_type = params.parsed::<SwitchType>("type")?.unwrap_or(SwitchType::PushbuttonNo);
            let mut switch = Switch::new(switch_type);
            if let Some(position) = params.parsed::<u8>("position")? {
                switch.set_position(position);
            }
            if params.flag("pressed") {
                switch.press();
            }
            ComponentType::Switch(switch)
        }
        "CONTACTOR" => {
            let mut contactor = Contactor::new();
            contactor.has_left_aux = params.flag("aux");
            ComponentType::Contactor(contactor)
        }
        "RELAY" => {
            let relay_type = params.parsed::<RelayType>("type")?.unwrap_or(RelayType::TwoC);
            let mut relay = Relay::new(relay_type);
            for index in 0..relay.knobs().len() {
                let key = format!("knob{}", index);
                if let Some(seconds) = params.parsed::<u32>(&key)? {
                    relay
                        .set_knob(KnobIndex(index as u8), seconds)
                        .map_err(|_| params.invalid(&key, &seconds.to_string()))?;
                }
            }
            ComponentType::Relay(relay)
        }
        "FUSE" => {
            let mut fuse = Fuse::new();
            fuse.limit = params.limit(fuse.limit)?;
            fuse.blown = params.flag("blown");
            ComponentType::Fuse(fuse)
        }
        "THRY" => {
            let relay_type = params.parsed::<ThermalRelayType>("type")?.unwrap_or(ThermalRelayType::A);
            let mut thry = ThermalOverloadRelay::new(relay_type);
            thry.limit = params.limit(thry.limit)?;
            thry.tripped = params.flag("tripped");
            ComponentType::ThermalRelay(thry)
        }
        "MOTOR" => {
            let motor_type = params.parsed::<MotorType>("type")?.unwrap_or(MotorType::ThreePhaseSix);
            ComponentType::Motor(Motor::new(motor_type))
        }
        "LAMP" => {
            let color = params.parsed::<LampColor>("color")?.unwrap_or_default();
            ComponentType::Lamp(Lamp::new(color))
        }
        "TB" => {
            let poles = params.parsed::<u8>("poles")?.unwrap_or(2);
            let orientation = params.parsed::<Orientation>("orientation")?.unwrap_or_default();
            ComponentType::TerminalBlock(TerminalBlock::new(poles).with_orientation(orientation))
        }
        "RESISTOR" => {
            let ohms = params
                .quantity("ohms", "ohm")?
                .ok_or_else(|| ParseError::Syntax {
                    line: line_num,
                    message: format!("resistor {} needs ohms=<value>", name),
                })?;
            ComponentType::Resistor(Resistor::new(ohms))
        }
        "AMMETER" => ComponentType::Ammeter(Ammeter::new()),
        _ => {
            return Err(ParseError::UnknownKind {
                line: line_num,
                kind,
            })
        }
    };
    params.finish()?;

    Ok(ComponentDecl {
        line: line_num,
        name: name.to_string(),
        origin,
        component_type,
    })
}

fn parse_point(raw: &str) -> Option<Point> {
    let (x, y) = raw.split_once(',')?;
    Some(Point::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn parse_duration(line: usize, key: &str, raw: &str) -> std::result::Result<Duration, ParseError> {
    parse_time_with_unit(raw)
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ParseError::InvalidValue {
            line,
            key: key.to_string(),
            value: raw.to_string(),
        })
}

fn parse_action_line(line_num: usize, line: &str) -> std::result::Result<ScriptAction, ParseError> {
    let captures = AT_PATTERN.captures(line).ok_or_else(|| ParseError::Syntax {
        line: line_num,
        message: "expected '.at <time> <action> <target> [args]'".to_string(),
    })?;
    let at = parse_duration(line_num, "time", &captures[1])?;
    let action = captures[2].to_ascii_lowercase();
    let target = captures[3].to_string();
    let args: Vec<&str> = captures
        .get(4)
        .map(|m| m.as_str().split_whitespace().collect())
        .unwrap_or_default();

    let arg = |i: usize, key: &str| -> std::result::Result<u32, ParseError> {
        let raw = args.get(i).copied().unwrap_or("");
        raw.parse::<u32>().map_err(|_| ParseError::InvalidValue {
            line: line_num,
            key: key.to_string(),
            value: raw.to_string(),
        })
    };

    let kind = match action.as_str() {
        "press" => ActionKind::Press,
        "release" => ActionKind::Release,
        "toggle" => ActionKind::Toggle,
        "on" => ActionKind::On,
        "off" => ActionKind::Off,
        "trip" => ActionKind::Trip,
        "reset" => ActionKind::Reset,
        "replace" => ActionKind::Replace,
        "position" => {
            let position = arg(0, "position")?;
            ActionKind::Position(u8::try_from(position).unwrap_or(u8::MAX))
        }
        "knob" => {
            let index = arg(0, "knob index")?;
            let seconds = arg(1, "knob seconds")?;
            ActionKind::Knob {
                index: KnobIndex(u8::try_from(index).unwrap_or(u8::MAX)),
                seconds,
            }
        }
        _ => {
            return Err(ParseError::UnknownAction {
                line: line_num,
                action,
            })
        }
    };

    Ok(ScriptAction {
        line: line_num,
        at,
        kind,
        target,
    })
}

fn parse_run_line(line_num: usize, line: &str) -> std::result::Result<RunSpec, ParseError> {
    let captures = RUN_PATTERN.captures(line).ok_or_else(|| ParseError::Syntax {
        line: line_num,
        message: "expected '.run <dt> <duration>'".to_string(),
    })?;
    let dt = parse_duration(line_num, "dt", &captures[1])?;
    let duration = parse_duration(line_num, "duration", &captures[2])?;
    if dt.is_zero() {
        return Err(ParseError::InvalidValue {
            line: line_num,
            key: "dt".to_string(),
            value: captures[1].to_string(),
        });
    }
    Ok(RunSpec { dt, duration })
}

/// Parse value with unit suffix (e.g., 1k, 1meg, 1m, 1u)
pub fn parse_value_with_unit(value_str: &str) -> Result<f64> {
    let value_str = value_str.trim().to_lowercase();

    if let Some(captures) = VALUE_PATTERN.captures(&value_str) {
        let value = captures[1].parse::<f64>()?;
        let multiplier = match &captures[2] {
            "u" => 1e-6,
            "m" => 1e-3,
            "" => 1.0,
            "k" => 1e3,
            "meg" => 1e6,
            unit => return Err(anyhow!("Unknown unit: {}", unit)),
        };
        Ok(value * multiplier)
    } else {
        value_str.parse::<f64>().map_err(|e| anyhow!("Invalid value: {}", e))
    }
}

/// Parse time value with unit (us, ms, s, min)
pub fn parse_time_with_unit(value_str: &str) -> Result<f64> {
    let value_str = value_str.trim().to_lowercase();

    if let Some(captures) = VALUE_PATTERN.captures(&value_str) {
        let value = captures[1].parse::<f64>()?;
        let multiplier = match &captures[2] {
            "us" => 1e-6,
            "ms" => 1e-3,
            "s" | "" => 1.0,
            "min" => 60.0,
            unit => return Err(anyhow!("Unknown time unit: {}", unit)),
        };
        Ok(value * multiplier)
    } else {
        Err(anyhow!("Invalid time value: {}", value_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAR_DELTA: &str = "\
Star-delta starter
* supply
BREAKER Q1 poles=3P voltage=380V limit=32 on at=0,0
SWITCH S1 type=nc
SWITCH S2 type=no
CONTACTOR KM1 aux
RELAY KT1 type=yd28 knob0=5
+ knob1=6
LAMP H1 color=GL
RESISTOR R1 ohms=1k
WIRE Q1.2 S1.11
wire S1.12 S2.13
.at 0 on Q1
.at 500ms press S2
.at 1s knob KT1 0 3
.run 16ms 10s
.end
LAMP H9
";

    #[test]
    fn test_preprocess_lines() {
        let parser = ScenarioParser::new();
        let lines = parser.preprocess_lines("Title\n\n* comment\nRELAY K1\n+ knob0=2\n; x\n.end");
        assert_eq!(
            lines,
            vec![
                (1, "Title".to_string()),
                (4, "RELAY K1 knob0=2".to_string()),
                (7, ".end".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_scenario() {
        let scenario = ScenarioParser::new().parse_scenario(STAR_DELTA).unwrap();
        assert_eq!(scenario.title, "Star-delta starter");
        assert_eq!(scenario.components.len(), 7);
        assert_eq!(scenario.wires.len(), 2);
        assert_eq!(scenario.script.len(), 3);
        assert_eq!(
            scenario.run,
            Some(RunSpec {
                dt: Duration::from_millis(16),
                duration: Duration::from_secs(10),
            })
        );

        match &scenario.components[0].component_type {
            ComponentType::Breaker(b) => {
                assert_eq!(b.poles, PoleType::ThreeP);
                assert_eq!(b.voltage, 380.0);
                assert_eq!(b.limit, Some(32.0));
                assert!(b.is_on);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &scenario.components[4].component_type {
            ComponentType::Relay(r) => {
                assert_eq!(r.relay_type(), RelayType::YDelta28);
                assert_eq!(r.knobs()[0].value, 5);
                assert_eq!(r.knobs()[1].value, 6);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &scenario.components[6].component_type {
            ComponentType::Resistor(r) => assert_eq!(r.ohms, 1000.0),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(scenario.script[1].at, Duration::from_millis(500));
        assert_eq!(
            scenario.script[2].kind,
            ActionKind::Knob {
                index: KnobIndex(0),
                seconds: 3
            }
        );
    }

    #[test]
    fn test_build_circuit() {
        let scenario = ScenarioParser::new().parse_scenario(STAR_DELTA).unwrap();
        let circuit = scenario.build().unwrap();
        assert_eq!(circuit.component_count(), 7);
        assert_eq!(circuit.wire_count(), 2);
        assert!(circuit.resolve("KM1.53").is_ok());
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let parser = ScenarioParser::new();
        assert_eq!(
            parser.parse_scenario("t\nVALVE V1").unwrap_err(),
            ParseError::UnknownKind {
                line: 2,
                kind: "VALVE".to_string()
            }
        );
        assert!(matches!(
            parser.parse_scenario("t\n\nLAMP H1 colour=RL").unwrap_err(),
            ParseError::UnknownParameter { line: 3, .. }
        ));
        assert!(matches!(
            parser.parse_scenario("t\nBREAKER Q1 poles=7P").unwrap_err(),
            ParseError::InvalidValue { line: 2, .. }
        ));
        assert!(matches!(
            parser.parse_scenario("t\n.at 1s explode Q1").unwrap_err(),
            ParseError::UnknownAction { line: 2, .. }
        ));
        assert!(matches!(
            parser.parse_scenario("t\nRESISTOR R1").unwrap_err(),
            ParseError::Syntax { line: 2, .. }
        ));
        assert!(matches!(
            parser.parse_scenario("t\n.run 0 1s").unwrap_err(),
            ParseError::InvalidValue { line: 2, .. }
        ));
    }

    #[test]
    fn test_limit_none() {
        let scenario = ScenarioParser::new()
            .parse_scenario("t\nFUSE F1 limit=none\nBREAKER Q1 limit=10A\nBREAKER Q2\nBREAKER Q3 limit=none on")
            .unwrap();
        match &scenario.components[0].component_type {
            ComponentType::Fuse(f) => assert_eq!(f.limit, None),
            other => panic!("unexpected {:?}", other),
        }
        match &scenario.components[1].component_type {
            ComponentType::Breaker(b) => assert_eq!(b.limit, Some(10.0)),
            other => panic!("unexpected {:?}", other),
        }
        match &scenario.components[2].component_type {
            ComponentType::Breaker(b) => assert_eq!(b.limit, Some(20.0)),
            other => panic!("unexpected {:?}", other),
        }
        match &scenario.components[3].component_type {
            ComponentType::Breaker(b) => {
                assert_eq!(b.limit, None);
                assert!(b.is_on);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_value_with_unit() {
        assert_eq!(parse_value_with_unit("1k").unwrap(), 1000.0);
        assert_eq!(parse_value_with_unit("1.5meg").unwrap(), 1.5e6);
        assert_eq!(parse_value_with_unit("10").unwrap(), 10.0);
        assert!(parse_value_with_unit("10x").is_err());
    }

    #[test]
    fn test_parse_time_with_unit() {
        assert_eq!(parse_time_with_unit("16ms").unwrap(), 16e-3);
        assert_eq!(parse_time_with_unit("2s").unwrap(), 2.0);
        assert_eq!(parse_time_with_unit("500us").unwrap(), 500e-6);
        assert_eq!(parse_time_with_unit("1min").unwrap(), 60.0);
        assert!(parse_time_with_unit("-1s").is_err());
    }
}
