use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use cadence_engine::host::{Host, HostConfig};
use cadence_engine::logging::{init_logging, LoggingConfig};
use cadence_engine::pacing::{Pacer, PacerConfig};
use cadence_engine::runtime::{run_loop, CancelToken};
use cadence_engine::sim::{SimCompositor, SimConfig};

#[derive(Parser, Debug)]
#[command(name = "cadence-cal")]
#[command(about = "Paces window redraws against the display refresh cadence")]
#[command(version)]
struct Cli {
    /// Run fullscreen
    #[arg(short, long)]
    fullscreen: bool,

    /// Request an opaque surface
    #[arg(short, long)]
    opaque: bool,

    /// Use a 16-bit framebuffer
    #[arg(short = 's', long = "rgb16")]
    rgb16: bool,

    /// Do not lock buffer swaps to vblank
    #[arg(short = 'b', long)]
    no_vsync: bool,

    /// Drive the pacer against a simulated compositor instead of opening a window
    #[arg(long)]
    simulate: bool,

    /// Frame budget of the simulated compositor
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Refresh rate in millihertz, for the simulation and as the fallback rate
    #[arg(long, default_value_t = 60_000)]
    refresh_mhz: u32,

    /// Simulate a compositor without presentation feedback
    #[arg(long)]
    no_feedback: bool,

    /// Log filter, env_logger syntax (overrides RUST_LOG)
    #[arg(long)]
    log: Option<String>,
}

impl Cli {
    fn pacer_config(&self) -> PacerConfig {
        PacerConfig {
            default_refresh_mhz: self.refresh_mhz,
            ..PacerConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(LoggingConfig {
        env_filter: cli.log.clone(),
        ..LoggingConfig::default()
    });

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let cancel = CancelToken::new();
    cancel
        .install_ctrlc()
        .context("failed to install the Ctrl-C handler")?;

    if cli.simulate {
        simulate(&cli, &cancel)
    } else {
        let config = HostConfig {
            fullscreen: cli.fullscreen,
            opaque: cli.opaque,
            buffer_bits: if cli.rgb16 { 16 } else { 32 },
            vsync: !cli.no_vsync,
            pacer: cli.pacer_config(),
            ..HostConfig::default()
        };
        Host::run(config, cancel)
    }
}

fn simulate(cli: &Cli, cancel: &CancelToken) -> Result<()> {
    let refresh_mhz = i32::try_from(cli.refresh_mhz).context("refresh rate out of range")?;
    let mut sim = SimCompositor::new(SimConfig {
        refresh_mhz,
        presentation: !cli.no_feedback,
        max_frames: Some(cli.frames),
        ..SimConfig::default()
    });

    let clock = sim.clock();
    let mut pacer = Pacer::connect(&mut sim, clock, cli.pacer_config())
        .context("simulated compositor setup failed")?;
    pacer.create_window(&mut sim)?;

    let exit = run_loop(&mut pacer, &mut sim, cancel)?;
    let leaked = pacer.shutdown(&mut sim)?;

    let stats = sim.stats();
    log::info!(
        "{exit:?}: {} commits, {} presented, {} discarded, {} released, {} leaked outputs",
        stats.commits,
        stats.presented,
        stats.discarded,
        stats.released,
        leaked,
    );
    Ok(())
}
