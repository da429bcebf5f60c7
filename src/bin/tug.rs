//! TUG Sense CLI - Command-line interface for replaying recorded sensor logs
//!
//! Commands:
//! - replay: Run a recorded sample stream through the engine and print the report
//! - validate: Validate a config file
//! - defaults: Print the default engine configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tug_sense::config::EngineConfig;
use tug_sense::engine::{TugCallbacks, TugEngine};
use tug_sense::types::{
    DetectedStep, MotionSample, Phase, PocketSide, SessionInfo, Vec3, WalkingAid,
};
use tug_sense::{EngineError, ENGINE_VERSION, PRODUCER_NAME};

/// TUG Sense - sensor-fusion engine for the Timed Up & Go mobility test
#[derive(Parser)]
#[command(name = "tug")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Replay recorded motion streams through the TUG engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded sample stream through the engine and print the report
    Replay {
        /// Input file with one motion sample JSON object per line (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Engine config file (JSON); defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Rest gravity override as "x,y,z" in m/s². When omitted, the mean
        /// of the leading calibration samples is used.
        #[arg(long)]
        gravity: Option<String>,

        /// Number of leading samples averaged for gravity calibration
        #[arg(long, default_value = "50")]
        calibration_samples: usize,

        /// Device ID for provenance tracking
        #[arg(long, default_value = "unknown")]
        device_id: String,

        /// Pocket the phone was carried in
        #[arg(long, value_enum, default_value = "unspecified")]
        pocket: PocketArg,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Print phase transitions and steps to stderr while replaying
        #[arg(long)]
        progress: bool,
    },

    /// Validate an engine config file
    Validate {
        /// Config file path (use - for stdin)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the default engine configuration as JSON
    Defaults,

    /// Diagnose configuration and environment
    Doctor {
        /// Check a config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum PocketArg {
    Left,
    Right,
    Unspecified,
}

impl From<PocketArg> for PocketSide {
    fn from(arg: PocketArg) -> Self {
        match arg {
            PocketArg::Left => PocketSide::Left,
            PocketArg::Right => PocketSide::Right,
            PocketArg::Unspecified => PocketSide::Unspecified,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), TugCliError> {
    match cli.command {
        Commands::Replay {
            input,
            config,
            gravity,
            calibration_samples,
            device_id,
            pocket,
            output_format,
            progress,
        } => cmd_replay(
            &input,
            config.as_deref(),
            gravity.as_deref(),
            calibration_samples,
            device_id,
            pocket,
            output_format,
            progress,
        ),

        Commands::Validate { config } => cmd_validate(&config),

        Commands::Defaults => cmd_defaults(),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

/// Progress reporter wired into the engine callbacks.
struct ProgressCallbacks {
    enabled: bool,
}

impl TugCallbacks for ProgressCallbacks {
    fn on_phase_change(&mut self, from: Phase, to: Phase) {
        if self.enabled {
            eprintln!("phase: {} -> {}", from.as_str(), to.as_str());
        }
    }

    fn on_step_detected(&mut self, step: &DetectedStep) {
        if self.enabled {
            eprintln!(
                "step at {} ms (stride {:.2} m)",
                step.t_ms, step.stride_length_m
            );
        }
    }

    fn on_turn_cue(&mut self) {
        if self.enabled {
            eprintln!("turn cue");
        }
    }

    fn on_complete(&mut self, final_elapsed_ms: u64) {
        if self.enabled {
            eprintln!("complete: {} ms", final_elapsed_ms);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_replay(
    input: &Path,
    config: Option<&Path>,
    gravity: Option<&str>,
    calibration_samples: usize,
    device_id: String,
    pocket: PocketArg,
    output_format: OutputFormat,
    progress: bool,
) -> Result<(), TugCliError> {
    let config = load_config(config)?;
    let samples = read_samples(input)?;
    if samples.is_empty() {
        return Err(TugCliError::NoSamples);
    }

    let rest_gravity = match gravity {
        Some(spec) => parse_gravity(spec)?,
        None => mean_gravity(&samples, calibration_samples),
    };

    let session = SessionInfo {
        device_id,
        pocket_side: pocket.into(),
        walking_aid: WalkingAid::None,
        ..SessionInfo::default()
    };

    let mut engine = TugEngine::new(config, session, ProgressCallbacks { enabled: progress })?;
    engine.calibrate(rest_gravity)?;
    engine.start()?;

    for sample in samples {
        engine.handle_motion_event(sample);
    }

    if !engine.is_complete() {
        return Err(TugCliError::TestIncomplete(engine.phase()));
    }

    let report = engine.report()?;
    let output = match output_format {
        OutputFormat::Json => serde_json::to_string(&report)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&report)?,
    };
    println!("{}", output);

    Ok(())
}

fn cmd_validate(config: &Path) -> Result<(), TugCliError> {
    let data = read_input(config)?;
    let config = EngineConfig::from_json(&data)?;
    config.validate()?;
    println!("config ok");
    Ok(())
}

fn cmd_defaults() -> Result<(), TugCliError> {
    println!("{}", serde_json::to_string_pretty(&EngineConfig::default())?);
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), TugCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Engine version {}", ENGINE_VERSION),
    });

    if let Some(config_path) = config {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match EngineConfig::from_json(&content) {
                    Ok(_) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: "Config file valid".to_string(),
                    }),
                    Err(e) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid config: {}", e),
                    }),
                },
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("TUG Doctor Report");
        println!("=================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(TugCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(path: &Path) -> Result<String, TugCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, TugCliError> {
    match path {
        Some(path) => {
            let data = read_input(path)?;
            Ok(EngineConfig::from_json(&data)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Parse one motion sample per non-empty line.
fn read_samples(path: &Path) -> Result<Vec<MotionSample>, TugCliError> {
    let data = read_input(path)?;
    let mut samples = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let sample: MotionSample = serde_json::from_str(trimmed).map_err(|e| {
            TugCliError::ParseError(format!("line {}: {}", lineno + 1, e))
        })?;
        samples.push(sample);
    }
    Ok(samples)
}

fn parse_gravity(spec: &str) -> Result<Vec3, TugCliError> {
    let parts: Vec<&str> = spec.split(',').collect();
    if parts.len() != 3 {
        return Err(TugCliError::ParseError(format!(
            "gravity must be \"x,y,z\", got \"{}\"",
            spec
        )));
    }
    let mut values = [0.0f64; 3];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part.trim().parse().map_err(|_| {
            TugCliError::ParseError(format!("invalid gravity component \"{}\"", part))
        })?;
    }
    Ok(Vec3::new(values[0], values[1], values[2]))
}

/// Mean acceleration over the leading samples, assumed to be at rest.
fn mean_gravity(samples: &[MotionSample], count: usize) -> Vec3 {
    let lead = &samples[..count.clamp(1, samples.len())];
    let sum = lead
        .iter()
        .fold(Vec3::ZERO, |acc, s| Vec3::new(
            acc.x + s.accel.x,
            acc.y + s.accel.y,
            acc.z + s.accel.z,
        ));
    sum.scale(1.0 / lead.len() as f64)
}

// Error types

#[derive(Debug)]
enum TugCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    ParseError(String),
    NoSamples,
    TestIncomplete(Phase),
    DoctorFailed,
}

impl From<io::Error> for TugCliError {
    fn from(e: io::Error) -> Self {
        TugCliError::Io(e)
    }
}

impl From<EngineError> for TugCliError {
    fn from(e: EngineError) -> Self {
        TugCliError::Engine(e)
    }
}

impl From<serde_json::Error> for TugCliError {
    fn from(e: serde_json::Error) -> Self {
        TugCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TugCliError> for CliError {
    fn from(e: TugCliError) -> Self {
        match e {
            TugCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TugCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            TugCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            TugCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Expected one motion sample JSON object per line".to_string()),
            },
            TugCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            TugCliError::TestIncomplete(phase) => CliError {
                code: "TEST_INCOMPLETE".to_string(),
                message: format!("Stream ended in phase {}", phase.as_str()),
                hint: Some("The recording ended before the test completed".to_string()),
            },
            TugCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
