// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use pinsim_config::{BoardProfile, ScriptAssertion, StimulusScript};
use pinsim_core::{SimWarning, SimulationEngine};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

/// Default absolute tolerance for `pin_analog` assertions.
const ANALOG_TOLERANCE: f64 = 1e-6;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "pinsim - microcontroller board pin simulator",
    long_about = None
)]
struct Cli {
    /// Enable per-generation propagation tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a stimulus script to a board and evaluate its assertions
    Run(RunArgs),
    /// List the built-in board profiles
    Profiles,
    /// Print a board's power-on state
    Show(ShowArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the stimulus script (YAML)
    #[arg(short, long)]
    script: PathBuf,

    /// Built-in board profile, overriding the one named by the script
    #[arg(short, long)]
    profile: Option<String>,

    /// Print the run result as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Write the final board snapshot to this path
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ShowArgs {
    /// Built-in board profile id
    #[arg(short, long)]
    profile: String,

    /// Print the board snapshot as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    profile: String,
    steps_executed: usize,
    generations: u32,
    warnings: Vec<SimWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    assertions: Vec<AssertionResult>,
    script: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AssertionResult {
    assertion: ScriptAssertion,
    passed: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays machine-readable.
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_script(args),
        Commands::Profiles => list_profiles(),
        Commands::Show(args) => show_profile(args),
    }
}

fn list_profiles() -> ExitCode {
    for id in BoardProfile::builtin_ids() {
        match BoardProfile::builtin(id) {
            Ok(profile) => println!(
                "{:<8} {:>2} pins {:>2} components  {}",
                profile.id,
                profile.pins.len(),
                profile.components.len(),
                profile.description.as_deref().unwrap_or("")
            ),
            Err(e) => {
                error!("{:#}", e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        }
    }
    ExitCode::from(EXIT_PASS)
}

fn show_profile(args: ShowArgs) -> ExitCode {
    let engine = match SimulationEngine::from_builtin(&args.profile) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if args.json {
        return match engine.snapshot().to_json() {
            Ok(json) => {
                println!("{}", json);
                ExitCode::from(EXIT_PASS)
            }
            Err(e) => {
                error!("{:#}", e);
                ExitCode::from(EXIT_RUNTIME_ERROR)
            }
        };
    }

    println!("Board {}", engine.profile().id);
    println!("Pins:");
    for pin in engine.pins().iter() {
        println!("  {:<5} {:<12} {:?}", pin.id, format!("{:?}", pin.function), pin.state);
    }
    println!("Components:");
    for component in engine.components().iter() {
        println!("  {:<10} {:?}", component.id, component.kind);
    }
    println!("Registers:");
    for register in engine.registers().iter() {
        println!("  {:<12} {:#010x}", register.name, register.value());
    }
    ExitCode::from(EXIT_PASS)
}

fn run_script(args: RunArgs) -> ExitCode {
    let script = match StimulusScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let profile = match resolve_profile(&args, &script) {
        Ok(p) => p,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut engine = match SimulationEngine::new(profile, script.engine) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    info!(
        "Running {} step(s) on {} (generation limit {})",
        script.steps.len(),
        engine.profile().id,
        script.engine.generation_limit
    );

    let mut result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "pass".to_string(),
        profile: engine.profile().id.clone(),
        steps_executed: 0,
        generations: 0,
        warnings: Vec::new(),
        message: None,
        assertions: Vec::new(),
        script: args.script.clone(),
    };

    let mut exit = EXIT_PASS;
    for (index, step) in script.steps.iter().enumerate() {
        tracing::debug!("step {}: {:?}", index, step);
        match engine.apply(step) {
            Ok(report) => {
                result.steps_executed += 1;
                result.generations += u32::from(report.generations);
                info!(
                    "step {}: {} pin(s), {} component(s), {} register(s) changed in {} generation(s)",
                    index,
                    report.pins.len(),
                    report.components.len(),
                    report.registers.len(),
                    report.generations
                );
                for warning in &report.warnings {
                    warn!("step {}: {}", index, warning);
                }
                result.warnings.extend(report.warnings);
            }
            Err(e) => {
                let msg = format!("step {} failed: {}", index, e);
                error!("{}", msg);
                result.status = "error".to_string();
                result.message = Some(msg);
                exit = EXIT_RUNTIME_ERROR;
                break;
            }
        }
    }

    if exit == EXIT_PASS {
        for assertion in &script.assertions {
            match evaluate(&engine, assertion) {
                Ok(passed) => {
                    if passed {
                        info!("Assertion passed: {}", describe(assertion));
                    } else {
                        error!("Assertion failed: {}", describe(assertion));
                    }
                    result.assertions.push(AssertionResult {
                        assertion: assertion.clone(),
                        passed,
                    });
                }
                Err(e) => {
                    let msg = format!("{}: {}", describe(assertion), e);
                    error!("Invalid assertion {}", msg);
                    result.status = "error".to_string();
                    result.message = Some(msg);
                    exit = EXIT_CONFIG_ERROR;
                    break;
                }
            }
        }
        if exit == EXIT_PASS && result.assertions.iter().any(|a| !a.passed) {
            result.status = "fail".to_string();
            exit = EXIT_ASSERT_FAIL;
        }
    }

    if let Some(path) = &args.snapshot {
        write_snapshot(&engine, path);
    }

    if args.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize run result: {}", e),
        }
    }

    info!(
        "Run {}: {} step(s), {}/{} assertion(s) passed",
        result.status,
        result.steps_executed,
        result.assertions.iter().filter(|a| a.passed).count(),
        script.assertions.len()
    );
    ExitCode::from(exit)
}

fn resolve_profile(args: &RunArgs, script: &StimulusScript) -> anyhow::Result<BoardProfile> {
    if let Some(id) = &args.profile {
        return BoardProfile::builtin(id);
    }
    let base_dir = args.script.parent().unwrap_or_else(|| Path::new("."));
    script.resolve_profile(base_dir)?.ok_or_else(|| {
        anyhow::anyhow!(
            "Script {:?} names no board; pass --profile or set 'profile' in the script",
            args.script
        )
    })
}

fn write_snapshot(engine: &SimulationEngine, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("Failed to create snapshot parent dir {:?}: {}", parent, e);
                return;
            }
        }
    }
    match engine.snapshot().save(path) {
        Ok(()) => info!("Snapshot written to {:?}", path),
        Err(e) => error!("{:#}", e),
    }
}

fn evaluate(engine: &SimulationEngine, assertion: &ScriptAssertion) -> pinsim_core::SimResult<bool> {
    Ok(match assertion {
        ScriptAssertion::RegisterValue(a) => {
            let check = &a.register_value;
            let mask = check.mask.unwrap_or(u32::MAX);
            engine.read_register(&check.name)? & mask == check.value & mask
        }
        ScriptAssertion::PinDigital(a) => {
            engine.pin(&a.pin_digital.pin)?.state.is_high() == a.pin_digital.high
        }
        ScriptAssertion::PinAnalog(a) => {
            let check = &a.pin_analog;
            let tolerance = check.tolerance.unwrap_or(ANALOG_TOLERANCE);
            (engine.pin(&check.pin)?.state.level() - check.value).abs() <= tolerance
        }
        ScriptAssertion::ComponentState(a) => {
            let check = &a.component_state;
            let state = &engine.component(&check.component)?.state;
            match serde_json::to_value(state) {
                Ok(actual) => json_contains(&actual, &check.state),
                Err(_) => false,
            }
        }
    })
}

/// Every field present in `expected` must match `actual`; extra fields in
/// `actual` are ignored. Numbers compare by value.
fn json_contains(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected
            .iter()
            .all(|(key, want)| actual.get(key).is_some_and(|got| json_contains(got, want))),
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && actual.iter().zip(expected).all(|(a, e)| json_contains(a, e))
        }
        (Value::Number(a), Value::Number(e)) => match (a.as_f64(), e.as_f64()) {
            (Some(a), Some(e)) => a == e,
            _ => a == e,
        },
        _ => actual == expected,
    }
}

fn describe(assertion: &ScriptAssertion) -> String {
    match assertion {
        ScriptAssertion::RegisterValue(a) => match a.register_value.mask {
            Some(mask) => format!(
                "register_value: {} & {:#x} == {:#x}",
                a.register_value.name, mask, a.register_value.value
            ),
            None => format!(
                "register_value: {} == {:#x}",
                a.register_value.name, a.register_value.value
            ),
        },
        ScriptAssertion::PinDigital(a) => format!(
            "pin_digital: {} is {}",
            a.pin_digital.pin,
            if a.pin_digital.high { "high" } else { "low" }
        ),
        ScriptAssertion::PinAnalog(a) => {
            format!("pin_analog: {} ~ {}", a.pin_analog.pin, a.pin_analog.value)
        }
        ScriptAssertion::ComponentState(a) => format!(
            "component_state: {} matches {}",
            a.component_state.component, a.component_state.state
        ),
    }
}
