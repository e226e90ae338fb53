//! Thermoloop: command-line entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                     │
//! │                                                              │
//! │  InstrumentRig / SimulatedRig   LogEventSink   CsvRecorder   │
//! │  (Temperature + Heater)         (EventSink)    (EventSink)   │
//! │  SystemClock / SimClock         FileConfigStore              │
//! │  (Clock)                        (ConfigPort)                 │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              AppService (pure logic)                   │  │
//! │  │  FSM · Safety · Policy                                 │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Subcommands:
//!
//! | Command         | Does                                                |
//! |-----------------|-----------------------------------------------------|
//! | `simulate`      | Run the configured profile against the digital twin |
//! | `step-response` | Open-loop step test, recorded to CSV                |
//! | `identify`      | Fit FOPDT parameters to step-test recordings        |
//! | `run`           | Run the configured profile on the instrument        |
//! | `reset`         | Put the controller into its safe state              |
//! | `tune`          | Search PID gains against the digital twin           |
//! | `thermistor`    | Print NTC sensitivity and noise figures             |
//! | `config`        | Write the effective configuration to a file         |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use thermoloop::adapters::config_store::FileConfigStore;
use thermoloop::adapters::instrument::InstrumentRig;
use thermoloop::adapters::log_sink::LogEventSink;
use thermoloop::adapters::sim::SimulatedRig;
use thermoloop::adapters::time::{SimClock, SystemClock};
use thermoloop::app::commands::AppCommand;
use thermoloop::app::ports::{Clock, ConfigPort, EventSink, HeaterPort, TemperaturePort};
use thermoloop::app::service::AppService;
use thermoloop::config::SystemConfig;
use thermoloop::control::pid::PidGains;
use thermoloop::control::tune::tune_pid;
use thermoloop::env::HeaterEnv;
use thermoloop::instrument::transport::SerialTransport;
use thermoloop::instrument::vx::VxController;
use thermoloop::metrics::RunSummary;
use thermoloop::plant::identify::{average, fit_step_response};
use thermoloop::plant::thermistor::NtcThermistor;
use thermoloop::profile::Profile;
use thermoloop::recorder::{CsvRecorder, load_step_response};

const DEFAULT_CONFIG: &str = "thermoloop.toml";

const USAGE: &str = "\
usage: thermoloop [--config FILE] <command> [options]

commands:
  simulate       [--seed N] [--csv FILE] [--max-minutes M]
  step-response  [--output PCT] [--heat S] [--cool S] [--csv FILE] [--sim]
  identify       FILE...
  run            [--csv FILE] [--max-minutes M]
  reset          [--safe-temp C]
  tune           [--iterations N] [--steps N]
  thermistor     [--temp C] [--vin V] [--r-fixed OHM] [--bandwidth HZ]
  config         [--out FILE]

RUST_LOG controls verbosity (default: info).";

// ── Argument parsing ──────────────────────────────────────────

struct Args {
    command: String,
    options: HashMap<String, String>,
    flags: Vec<String>,
    positional: Vec<String>,
}

/// Flags that never take a value.
const SWITCHES: [&str; 1] = ["--sim"];

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut command = None;
    let mut options = HashMap::new();
    let mut flags = Vec::new();
    let mut positional = Vec::new();

    let mut i = 0;
    while i < raw.len() {
        let arg = &raw[i];
        if arg == "-h" || arg == "--help" {
            flags.push("--help".to_string());
        } else if SWITCHES.contains(&arg.as_str()) {
            flags.push(arg.clone());
        } else if let Some(key) = arg.strip_prefix("--") {
            i += 1;
            let value = raw
                .get(i)
                .ok_or_else(|| anyhow!("option --{key} needs a value"))?;
            options.insert(key.to_string(), value.clone());
        } else if command.is_none() {
            command = Some(arg.clone());
        } else {
            positional.push(arg.clone());
        }
        i += 1;
    }

    Ok(Args {
        command: command.unwrap_or_default(),
        options,
        flags,
        positional,
    })
}

impl Args {
    fn get<T: FromStr>(&self, key: &str, default: T) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.options.get(key) {
            Some(v) => v
                .parse()
                .map_err(|e| anyhow!("invalid --{key} '{v}': {e}")),
            None => Ok(default),
        }
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.options.get(key).map(PathBuf::from)
    }

    fn has(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

fn load_config(args: &Args) -> Result<SystemConfig> {
    let cfg = match args.path("config") {
        Some(path) => FileConfigStore::new(&path)
            .load()
            .with_context(|| format!("loading {}", path.display()))?,
        None => FileConfigStore::new(DEFAULT_CONFIG)
            .load_or_default()
            .with_context(|| format!("loading {DEFAULT_CONFIG}"))?,
    };
    Ok(cfg)
}

fn open_recorder(path: Option<PathBuf>) -> Result<Option<CsvRecorder>> {
    path.map(CsvRecorder::open)
        .transpose()
        .context("opening CSV recording")
}

fn tick_budget(cfg: &SystemConfig, max_minutes: f64) -> u64 {
    (max_minutes * 60.0 / cfg.timing.sample_period_secs()).ceil() as u64
}

fn open_instrument(cfg: &SystemConfig) -> Result<InstrumentRig<SerialTransport>> {
    let transport = SerialTransport::open(&cfg.serial)
        .with_context(|| format!("opening serial port {}", cfg.serial.port))?;
    Ok(InstrumentRig::new(VxController::from_config(transport, cfg)))
}

// ── Subcommands ───────────────────────────────────────────────

/// Start the service, run the configured profile, return the summary.
fn run_profile(
    cfg: SystemConfig,
    rig: &mut (impl TemperaturePort + HeaterPort),
    clock: &mut impl Clock,
    sink: &mut impl EventSink,
    max_ticks: u64,
) -> Result<RunSummary> {
    let mut service = AppService::new(cfg);
    service.start(sink);
    service
        .handle_command(AppCommand::Start, rig, sink)
        .context("taking control of the heater")?;
    Ok(service.run_to_completion(rig, clock, sink, max_ticks))
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    println!("{}", summary.to_json().context("serialising run summary")?);
    Ok(())
}

fn cmd_simulate(args: &Args, cfg: SystemConfig) -> Result<()> {
    let seed = args.get("seed", 0u64)?;
    let max_ticks = tick_budget(&cfg, args.get("max-minutes", 240.0)?);
    let mut rig = SimulatedRig::new(&cfg.plant, cfg.timing.sample_period_secs(), seed);
    let mut clock = SimClock::new();
    let mut sink = (
        LogEventSink::with_decimation(60),
        open_recorder(args.path("csv"))?,
    );
    let summary = run_profile(cfg, &mut rig, &mut clock, &mut sink, max_ticks)?;
    info!("Simulated {:.0}s of plant time", clock.elapsed().as_secs_f64());
    print_summary(&summary)
}

fn cmd_step_response(args: &Args, mut cfg: SystemConfig) -> Result<()> {
    let output = args.get("output", 40.0)?;
    let heat_s = args.get("heat", 1200.0)?;
    let cool_s = args.get("cool", 1200.0)?;
    cfg.experiment.profile = Profile::step_test(output, heat_s, cool_s);
    let max_ticks = tick_budget(&cfg, (heat_s + cool_s) / 60.0 + 10.0);
    let csv = args
        .path("csv")
        .unwrap_or_else(|| PathBuf::from("step_response.csv"));
    let mut sink = (LogEventSink::with_decimation(30), open_recorder(Some(csv))?);

    let summary = if args.has("--sim") {
        let seed = args.get("seed", 0u64)?;
        let mut rig = SimulatedRig::new(&cfg.plant, cfg.timing.sample_period_secs(), seed);
        run_profile(cfg, &mut rig, &mut SimClock::new(), &mut sink, max_ticks)?
    } else {
        let mut rig = open_instrument(&cfg)?;
        run_profile(cfg, &mut rig, &mut SystemClock::new(), &mut sink, max_ticks)?
    };
    print_summary(&summary)
}

fn cmd_identify(args: &Args) -> Result<()> {
    if args.positional.is_empty() {
        bail!("identify needs at least one CSV file");
    }
    let mut fits = Vec::new();
    for file in &args.positional {
        let path = Path::new(file);
        let samples = load_step_response(path)?;
        match fit_step_response(&samples) {
            Ok(fit) => {
                println!(
                    "{file}: K={:.4} tau={:.3}s theta={:.3}s rmse={:.4}C",
                    fit.params.gain,
                    fit.params.time_constant_s,
                    fit.params.dead_time_s,
                    fit.rmse
                );
                fits.push(fit);
            }
            Err(e) => warn!("{file}: {e}"),
        }
    }
    let params = average(&fits)?;
    let gains = PidGains::simc(&params);
    println!(
        "average over {} runs: K={:.4} tau={:.3}s theta={:.3}s",
        fits.len(),
        params.gain,
        params.time_constant_s,
        params.dead_time_s
    );
    println!(
        "SIMC PI gains: kp={:.4} ki={:.5} kd={:.4}",
        gains.kp, gains.ki, gains.kd
    );
    Ok(())
}

fn cmd_run(args: &Args, cfg: SystemConfig) -> Result<()> {
    let max_ticks = tick_budget(&cfg, args.get("max-minutes", 240.0)?);
    let mut rig = open_instrument(&cfg)?;
    let mut sink = (
        LogEventSink::with_decimation(10),
        open_recorder(args.path("csv"))?,
    );
    let summary = run_profile(cfg, &mut rig, &mut SystemClock::new(), &mut sink, max_ticks)?;
    print_summary(&summary)
}

fn cmd_reset(args: &Args, cfg: &SystemConfig) -> Result<()> {
    let safe = args.get("safe-temp", cfg.experiment.safe_temp_c)?;
    let mut rig = open_instrument(cfg)?;
    rig.controller_mut()
        .reset_to_safe_state(safe)
        .context("safe-state reset incomplete")?;
    info!("Controller reset: output 0%, SV1 {safe:.1}C, STOP");
    Ok(())
}

fn cmd_tune(args: &Args, cfg: &SystemConfig) -> Result<()> {
    let iterations = args.get("iterations", 8usize)?;
    let steps = args.get("steps", cfg.env.max_steps as usize)?;
    let mut env = HeaterEnv::from_config(cfg);
    let initial = PidGains::from(&cfg.pid);
    let result = tune_pid(&mut env, initial, iterations, steps);
    println!(
        "kp={:.5} ki={:.6} kd={:.5} return={:.2} ({} evaluations)",
        result.gains.kp,
        result.gains.ki,
        result.gains.kd,
        result.total_reward,
        result.evaluations
    );
    Ok(())
}

fn cmd_thermistor(args: &Args) -> Result<()> {
    let t = args.get("temp", 25.0)?;
    let v_in = args.get("vin", 3.3)?;
    let r_fixed = args.get("r-fixed", 10_000.0)?;
    let bandwidth = args.get("bandwidth", 10.0)?;

    for (name, ntc) in [
        ("commercial 10k", NtcThermistor::COMMERCIAL_10K),
        ("NiO film", NtcThermistor::RESEARCH_NIO),
    ] {
        let noise = ntc.johnson_noise_rms(t, bandwidth);
        let net = ntc.noise_equivalent_temperature(noise, v_in, t);
        let r = ntc.resistance(t);
        let v_out = v_in * r / (r + r_fixed);
        println!("{name} (R25={:.0} ohm, B={:.0} K) at {t:.1}C:", ntc.r25_ohm, ntc.beta_k);
        println!("  R = {r:.1} ohm, dR/dT = {:.2} ohm/K", ntc.sensitivity(t));
        println!("  divider dV/dT = {:.3} mV/K", ntc.divider_sensitivity(v_in, t) * 1e3);
        println!("  Johnson noise = {:.3} uV rms, NET = {:.3} mK", noise * 1e6, net * 1e3);
        if let Some(back) = ntc.celsius_from_divider(v_out, v_in, r_fixed) {
            println!("  divider {v_out:.4} V ({r_fixed:.0} ohm fixed) -> {back:.2}C");
        }
    }
    Ok(())
}

fn cmd_config(args: &Args, cfg: &SystemConfig) -> Result<()> {
    let out = args
        .path("out")
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    FileConfigStore::new(&out)
        .save(cfg)
        .with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;
    if args.command.is_empty() || args.has("--help") {
        println!("{USAGE}");
        return Ok(());
    }

    info!("thermoloop v{}", env!("CARGO_PKG_VERSION"));

    match args.command.as_str() {
        "identify" => cmd_identify(&args),
        "thermistor" => cmd_thermistor(&args),
        command => {
            let cfg = load_config(&args)?;
            match command {
                "simulate" => cmd_simulate(&args, cfg),
                "step-response" => cmd_step_response(&args, cfg),
                "run" => cmd_run(&args, cfg),
                "reset" => cmd_reset(&args, &cfg),
                "tune" => cmd_tune(&args, &cfg),
                "config" => cmd_config(&args, &cfg),
                other => bail!("unknown command '{other}'\n\n{USAGE}"),
            }
        }
    }
}
