use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{info, warn};

use rs_chain_control::config::ControlConfig;
use rs_chain_control::driver::{ControlLoopDriver, TickOutcome};
use rs_chain_control::simulation::{simulated_backend, SimulatedArm};
use rs_chain_control::urdf::from_urdf_file;
use rs_chain_control::utils::format_joints;

/// Runs the configured trajectory on the simulated arm and reports the tracking error.
#[derive(Parser, Debug)]
#[command(author, version, name = "rs-chain-control")]
struct CommandLineArguments {
    /// Robot description
    #[arg(long, default_value = "src/tests/data/lbr_arm.urdf")]
    urdf: PathBuf,

    /// YAML control configuration, defaults are used if not given
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pace the ticks with the wall clock instead of running as fast as possible
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rs_chain_control=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let args = CommandLineArguments::parse();
    let config = match &args.config {
        Some(path) => ControlConfig::from_yaml_file(path)?,
        None => ControlConfig::default(),
    };
    let chain = from_urdf_file(&args.urdf, &config.robot.base_link, &config.robot.tip_link)?;
    info!("Loaded {} joints: {:?}", chain.joint_names().len(), chain.joint_names());

    let initial = config.robot.initial_joints.clone();
    let mut driver = ControlLoopDriver::from_config(chain.clone(), &config, &initial)
        .map_err(|e| anyhow!("Cannot build the control loop: {}", e))?;
    let arm = SimulatedArm::new(chain, initial, config.model.gravity, config.period())
        .map_err(|e| anyhow!("Cannot build the simulated arm: {}", e))?;
    let (mut source, mut sink, arm) = simulated_backend(arm);

    let period = config.period();
    let report_every = (config.rate / 2.0).max(1.0) as u64;
    let started = Instant::now();
    let mut max_error: f64 = 0.0;
    let mut tick: u64 = 0;

    loop {
        let t = tick as f64 * period;
        match driver.tick(t, &mut source, &mut sink) {
            Ok(TickOutcome::Commanded(report)) => {
                max_error = max_error.max(report.position_error.norm());
                if tick % report_every == 0 {
                    let error = report.position_error_cm();
                    info!("t = {:6.3} s, s = {:.3}, error = [{:7.4} {:7.4} {:7.4}] cm",
                        t, report.progress.s, error.x, error.y, error.z);
                }
            }
            Ok(TickOutcome::Skipped) => {}
            Ok(TickOutcome::Finished) => break,
            Err(e) => warn!("Tick {} failed: {}", tick, e),
        }
        tick += 1;

        if args.realtime {
            let next = started + Duration::from_secs_f64(tick as f64 * period);
            if let Some(wait) = next.checked_duration_since(Instant::now()) {
                sleep(wait);
            }
        }
    }

    info!("Finished after {} ticks, max tracking error {:.4} cm", tick, max_error * 100.0);
    info!("Final joints (deg): {}", format_joints(arm.borrow().positions()));
    Ok(())
}
