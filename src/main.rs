//! midimap demo host.
//!
//! Wires a hardware controller to a small built-in parameter set so the
//! mapping engine can be exercised end to end: bind knobs interactively,
//! watch two-way feedback, save and reload the mapping file.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midimap::clock::TempoClock;
use midimap::config::ControllerConfig;
use midimap::device::{self, InputConnection, MidiSendPort, MidirSendPort, NullPort};
use midimap::input::InputDispatcher;
use midimap::mapper::MidiMapper;
use midimap::modulation::Modulations;
use midimap::param::{EnumParam, FloatParam, ParamRegistry};

mod cli;

/// Bind MIDI controllers to host parameters with two-way feedback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the mapping file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<String>,

    /// Input port name substring (overrides the config)
    #[arg(long)]
    device_in: Option<String>,

    /// Output port name substring for feedback (overrides the config)
    #[arg(long)]
    device_out: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Engine tick interval in milliseconds
    #[arg(long, default_value = "33")]
    tick_ms: u64,

    /// Tempo (BPM) driving the feedback blink phase
    #[arg(long, default_value = "120")]
    tempo: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level)?;

    if args.list_ports {
        list_ports_formatted();
        return Ok(());
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => midimap::paths::default_config_path()?
            .to_string_lossy()
            .into_owned(),
    };
    info!("Mapping file: {}", config_path);

    let mut config = match ControllerConfig::load(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            warn!("No usable mapping file, starting empty ({:#})", e);
            ControllerConfig::default()
        }
    };
    if let Some(device_in) = &args.device_in {
        config.device_in = device_in.clone();
    }
    if let Some(device_out) = &args.device_out {
        config.device_out = device_out.clone();
    }
    config.validate()?;

    let params = Arc::new(demo_params());
    let input = Arc::new(InputDispatcher::new(Arc::new(Modulations::new())));
    let clock = Arc::new(TempoClock::new(args.tempo, 4));

    let port: Box<dyn MidiSendPort> = if config.device_out.is_empty() {
        info!("No output device configured, feedback disabled");
        Box::new(NullPort)
    } else {
        match MidirSendPort::connect(&config.device_out, config.out_channel) {
            Ok(port) => Box::new(port),
            Err(e) => {
                warn!("{}, feedback disabled", e);
                Box::new(NullPort)
            }
        }
    };

    let mut mapper = MidiMapper::new(input.clone(), params.clone(), port, clock);
    mapper.apply_settings(&config);
    mapper.load_mappings(&config);

    if config.device_in.is_empty() {
        info!("No input device configured, console only");
    } else {
        match InputConnection::open(&config.device_in, input) {
            Ok(conn) => mapper.attach_input(conn),
            Err(e) => warn!("{}, running without controller input", e),
        }
    }

    run(mapper, params, config, config_path, args.tick_ms).await?;

    info!("midimap shutdown complete");
    Ok(())
}

async fn run(
    mut mapper: MidiMapper,
    params: Arc<ParamRegistry>,
    mut config: ControllerConfig,
    config_path: String,
    tick_ms: u64,
) -> Result<()> {
    println!("{}", "midimap console ready, type 'help' for commands".bold());

    let mut lines = cli::spawn_console();
    let mut tick = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => mapper.tick(),
            line = lines.recv() => match line {
                Some(line) => {
                    let outcome =
                        cli::handle(&line, &mut mapper, &params, &mut config, &config_path).await;
                    if matches!(outcome, cli::Outcome::Quit) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Leave no LED lit and no fader pinned.
    mapper.zero_all_outputs();
    Ok(())
}

/// The stand-in parameter set a real host would provide.
fn demo_params() -> ParamRegistry {
    let params = ParamRegistry::new();
    params.register(FloatParam::new("osc1/freq", 20.0, 20000.0, 440.0));
    params.register(FloatParam::new("osc1/level", 0.0, 1.0, 0.8));
    params.register(EnumParam::new("osc1/wave", 4));
    params.register(FloatParam::new("filter/cutoff", 20.0, 20000.0, 1000.0));
    params.register(FloatParam::new("filter/res", 0.0, 1.0, 0.2));
    params.register(FloatParam::new("master/volume", 0.0, 1.0, 0.7));
    params.register(EnumParam::bitmask("seq/steps", 8));
    params
}

fn list_ports_formatted() {
    println!("{}", "MIDI input ports:".bold());
    match device::list_input_ports() {
        Ok(ports) if ports.is_empty() => println!("  (none)"),
        Ok(ports) => {
            for name in ports {
                println!("  {}", name.cyan());
            }
        }
        Err(e) => eprintln!("  {}", e.to_string().red()),
    }

    println!("{}", "MIDI output ports:".bold());
    match device::list_output_ports() {
        Ok(ports) if ports.is_empty() => println!("  (none)"),
        Ok(ports) => {
            for name in ports {
                println!("  {}", name.cyan());
            }
        }
        Err(e) => eprintln!("  {}", e.to_string().red()),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
