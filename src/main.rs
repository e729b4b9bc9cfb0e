//! `drill-rig` operator console.
//!
//! Loads the rig file, builds both controllers behind the execution
//! mediator and reads line commands from stdin. Status snapshots are
//! printed as they arrive.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use chrono::NaiveDateTime;
use clap::Parser;
use serde_json::Value;

use drill_rig::config::{load_config, load_rig_config, Backend, CycleConfig, RigConfig};
use drill_rig::controller::{ChannelObserver, CycleController, DateGate, LogicId, SystemDateSource};
use drill_rig::input::{AnalogInput, SimAnalog};
use drill_rig::port::{AxisModel, Level, PinId, PortHandle, SimPort};
use drill_rig::{ExecutionMediator, Result};

/// Two-logic stepper drill rig controller
#[derive(Parser, Debug)]
#[command(name = "drill-rig", version, about = "Stepper drill rig controller")]
struct Args {
    /// Path to the rig file
    #[arg(short = 'r', long = "rig", value_name = "PATH", default_value_os = "config/rig.toml")]
    rig: PathBuf,

    /// Use the GPIO simulator regardless of the rig file
    #[arg(long)]
    simulate: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity_level: u8,
}

/// One console command.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Logic(LogicId),
    Mode(u8),
    Start,
    Stop,
    EmergencyStop,
    Manual(bool),
    Set(LogicId, String, Value),
    Save(LogicId),
    Config(LogicId),
    Status,
    Date(NaiveDateTime),
    Press(String),
    Release(String),
    Joystick(u16),
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  logic a|b            select and start a logic
  mode N               select level 1-5
  start | stop         start the selected logic / stop the active one
  estop                emergency stop everything
  manual on|off        manual jog mode
  set A|B path json    change one parameter
  save A|B             write the configuration file
  config A|B           print the configuration
  status               print both status lines
  date YYYY-MM-DD HH:MM:SS   program the Logic B date source
  press|release NAME   simulator: start stop reset tala safety home final
  joy N                simulator: joystick ADC value 0-1023
  quit";

fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();
    let rest: Vec<&str> = words.collect();
    let logic = |i: usize| -> std::result::Result<LogicId, String> {
        rest.get(i)
            .ok_or_else(|| format!("'{}' needs a logic (A or B)", verb))?
            .parse::<LogicId>()
            .map_err(|e| e.to_string())
    };
    let arg = |i: usize| -> std::result::Result<&str, String> {
        rest.get(i).copied().ok_or_else(|| format!("'{}' is missing an argument", verb))
    };

    match verb.as_str() {
        "logic" => Ok(Command::Logic(logic(0)?)),
        "mode" => arg(0)?
            .parse()
            .map(Command::Mode)
            .map_err(|_| "mode must be a number 1-5".to_string()),
        "start" => Ok(Command::Start),
        "stop" => Ok(Command::Stop),
        "estop" => Ok(Command::EmergencyStop),
        "manual" => match arg(0)? {
            "on" => Ok(Command::Manual(true)),
            "off" => Ok(Command::Manual(false)),
            other => Err(format!("manual expects on or off, got '{}'", other)),
        },
        "set" => {
            let id = logic(0)?;
            let path = arg(1)?.to_string();
            let raw = rest.get(2..).map(|r| r.join(" ")).unwrap_or_default();
            let value = serde_json::from_str(&raw).map_err(|e| format!("bad JSON value: {}", e))?;
            Ok(Command::Set(id, path, value))
        }
        "save" => Ok(Command::Save(logic(0)?)),
        "config" => Ok(Command::Config(logic(0)?)),
        "status" => Ok(Command::Status),
        "date" => {
            let text = rest.join(" ");
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
                .map(Command::Date)
                .map_err(|e| format!("bad date '{}': {}", text, e))
        }
        "press" => Ok(Command::Press(arg(0)?.to_ascii_lowercase())),
        "release" => Ok(Command::Release(arg(0)?.to_ascii_lowercase())),
        "joy" => arg(0)?
            .parse()
            .map(Command::Joystick)
            .map_err(|_| "joystick value must be 0-1023".to_string()),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}', try help", other)),
    }
}

/// Simulator handles, present only on the sim backend.
struct Simulation {
    port: Arc<SimPort>,
    joystick: Arc<SimAnalog>,
}

impl Simulation {
    fn input_pin(config: &CycleConfig, name: &str) -> Option<PinId> {
        let pins = &config.input_pins;
        Some(match name {
            "start" => pins.btn_start,
            "stop" => pins.btn_stop,
            "reset" => pins.btn_reset,
            "tala" | "drill" => pins.btn_tala,
            "safety" => pins.switch_s,
            "home" => pins.fin_home,
            "final" => pins.fin_final,
            _ => return None,
        })
    }

    fn drive(&self, config: &CycleConfig, name: &str, closed: bool) -> std::result::Result<(), String> {
        let pin = Self::input_pin(config, name).ok_or_else(|| format!("no input named '{}'", name))?;
        let active = Level::from_bool(config.input_polarity.active_high);
        self.port.drive(pin, if closed { active } else { !active });
        Ok(())
    }
}

fn init_logging(args: &Args, rig: &RigConfig) {
    let mut builder = env_logger::Builder::from_default_env();
    match args.verbosity_level {
        0 => {
            if std::env::var_os("RUST_LOG").is_none() {
                builder.parse_filters(&rig.log.level);
            }
        }
        1 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    builder.init();
}

fn build_port(
    rig: &RigConfig,
    backend: Backend,
    configs: [&CycleConfig; 2],
) -> Result<(PortHandle, Arc<dyn AnalogInput>, Option<Simulation>)> {
    match backend {
        Backend::Sim => {
            let port = Arc::new(SimPort::new());
            let joystick = Arc::new(SimAnalog::new(512));
            let mut attached: Vec<PinId> = Vec::new();
            for config in configs {
                if attached.contains(&config.motor_pins.pulsos1) {
                    continue;
                }
                attached.push(config.motor_pins.pulsos1);
                port.attach_axis(AxisModel {
                    step: config.motor_pins.pulsos1,
                    dir: config.motor_pins.dir1,
                    toward_home: Level::from_bool(config.motor_parameters.sentido_giro_lineal),
                    position: rig.simulator.start_position,
                    home_travel: rig.simulator.home_travel,
                    length: rig.simulator.length,
                    home_pin: config.input_pins.fin_home,
                    final_pin: config.input_pins.fin_final,
                    active: Level::from_bool(config.input_polarity.active_high),
                });
            }
            let sim = Simulation {
                port: port.clone(),
                joystick: joystick.clone(),
            };
            // Safety interlock closed at power-up.
            sim.drive(configs[0], "safety", true).ok();
            log::info!("using the GPIO simulator");
            let adc: Arc<dyn AnalogInput> = joystick;
            Ok((PortHandle::new(port), adc, Some(sim)))
        }
        Backend::Rpi => build_rpi_port(configs[0]),
    }
}

#[cfg(feature = "rpi")]
fn build_rpi_port(config: &CycleConfig) -> Result<(PortHandle, Arc<dyn AnalogInput>, Option<Simulation>)> {
    use drill_rig::error::ConfigError;
    use drill_rig::port::rpi::{Mcp3008, RppalPort};

    let port = RppalPort::new().map_err(|e| ConfigError::IoError(format!("GPIO: {}", e)))?;
    let adc = Mcp3008::new(config.input_pins.joystick_adc_channel)
        .map_err(|e| ConfigError::IoError(format!("SPI: {}", e)))?;
    log::info!("using Raspberry Pi GPIO");
    let adc: Arc<dyn AnalogInput> = Arc::new(adc);
    Ok((PortHandle::new(Arc::new(port)), adc, None))
}

#[cfg(not(feature = "rpi"))]
fn build_rpi_port(_config: &CycleConfig) -> Result<(PortHandle, Arc<dyn AnalogInput>, Option<Simulation>)> {
    Err(drill_rig::error::ConfigError::InvalidValue {
        field: "port.backend",
        reason: "rpi backend needs the `rpi` feature",
    }
    .into())
}

fn print_status(mediator: &ExecutionMediator) {
    for id in [LogicId::A, LogicId::B] {
        println!("{}", mediator.status(id).summary());
    }
}

fn execute(
    command: Command,
    mediator: &ExecutionMediator,
    sim: Option<&Simulation>,
) -> std::result::Result<(), String> {
    let err = |e: drill_rig::Error| e.to_string();
    match command {
        Command::Logic(id) => mediator.select_logic(id).map_err(err),
        Command::Mode(n) => mediator.select_mode(n).map_err(err),
        Command::Start => mediator.start().map_err(err),
        Command::Stop => mediator.stop().map_err(err),
        Command::EmergencyStop => {
            mediator.emergency_stop_all();
            Ok(())
        }
        Command::Manual(true) => mediator.enable_manual_mode().map_err(err),
        Command::Manual(false) => mediator.disable_manual_mode().map_err(err),
        Command::Set(id, path, value) => mediator
            .update_parameter(id, &path, value)
            .map(|old| println!("{}.{} was {}", id, path, old))
            .map_err(err),
        Command::Save(id) => mediator.save(id).map_err(err),
        Command::Config(id) => {
            let config = mediator.get_configuration(id);
            let text = serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?;
            println!("{}", text);
            Ok(())
        }
        Command::Status => {
            print_status(mediator);
            Ok(())
        }
        Command::Date(dt) => mediator.set_rtc_datetime(dt).map_err(err),
        Command::Press(name) | Command::Release(name) if sim.is_none() => {
            Err(format!("'{}': simulator commands need the sim backend", name))
        }
        Command::Press(name) => {
            let sim = sim.ok_or("no simulator")?;
            sim.drive(&focused_config(mediator), &name, true)
        }
        Command::Release(name) => {
            let sim = sim.ok_or("no simulator")?;
            sim.drive(&focused_config(mediator), &name, false)
        }
        Command::Joystick(value) => {
            let sim = sim.ok_or("simulator commands need the sim backend")?;
            sim.joystick.set(value.min(1023));
            Ok(())
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}

/// Configuration of the selected logic, or Logic A.
fn focused_config(mediator: &ExecutionMediator) -> CycleConfig {
    let id = mediator.state().selected.unwrap_or(LogicId::A);
    mediator.get_configuration(id)
}

fn run(args: Args, rig: RigConfig) -> Result<()> {
    let config_a = load_config(&rig.logic_a.config)?;
    let config_b = load_config(&rig.logic_b.config)?;
    let backend = if args.simulate { Backend::Sim } else { rig.port.backend };
    let (port, adc, sim) = build_port(&rig, backend, [&config_a, &config_b])?;

    let logic_a = CycleController::builder(LogicId::A)
        .port(port.clone())
        .adc(adc.clone())
        .config(config_a)
        .config_path(&rig.logic_a.config)
        .build()?;
    let logic_b = CycleController::builder(LogicId::B)
        .port(port)
        .adc(adc)
        .config(config_b)
        .config_path(&rig.logic_b.config)
        .date_gate(DateGate::rtc(Arc::new(SystemDateSource::new())))
        .build()?;

    let (observer, status_rx) = ChannelObserver::bounded(rig.status.channel_capacity);
    let mediator = ExecutionMediator::new(logic_a, logic_b, Arc::new(observer))?;

    let printer = thread::Builder::new()
        .name("status".into())
        .spawn(move || {
            for snapshot in status_rx {
                println!("{}", snapshot.summary());
            }
        })
        .map_err(|e| drill_rig::error::ConfigError::IoError(e.to_string()))?;

    println!("{}", HELP);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => {
                if let Err(e) = execute(command, &mediator, sim.as_ref()) {
                    println!("error: {}", e);
                }
            }
            Err(e) => println!("error: {}", e),
        }
        let _ = io::stdout().flush();
    }

    mediator.emergency_stop_all();
    drop(mediator);
    let _ = printer.join();
    log::info!("bye");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let rig = match load_rig_config(&args.rig) {
        Ok(rig) => rig,
        Err(e) => {
            eprintln!("cannot load {}: {}", args.rig.display(), e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&args, &rig);

    match run(args, rig) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse_command("logic b"), Ok(Command::Logic(LogicId::B)));
        assert_eq!(parse_command("MODE 3"), Ok(Command::Mode(3)));
        assert_eq!(parse_command("manual off"), Ok(Command::Manual(false)));
        assert_eq!(parse_command("estop"), Ok(Command::EmergencyStop));
        assert_eq!(parse_command("joy 1023"), Ok(Command::Joystick(1023)));
    }

    #[test]
    fn test_parse_set_takes_json_value() {
        assert_eq!(
            parse_command("set A velocidades_lineal.nivel1 900"),
            Ok(Command::Set(
                LogicId::A,
                "velocidades_lineal.nivel1".into(),
                Value::from(900)
            ))
        );
        assert!(parse_command("set A velocidades_lineal.nivel1 {oops").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_input() {
        assert!(parse_command("logic c").is_err());
        assert!(parse_command("mode").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn test_parse_date() {
        let cmd = parse_command("date 2030-01-02 03:04:05").unwrap();
        let Command::Date(dt) = cmd else {
            panic!("expected a date command");
        };
        assert_eq!(dt.format("%Y/%m/%d %H:%M:%S").to_string(), "2030/01/02 03:04:05");
    }
}
