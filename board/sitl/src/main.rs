use anyhow::{bail, Context};
use clap::Parser;
use log::info;

use ahrs::{utils, Ekf, EkfConfig};
use coprocessor::{Algorithm, Coprocessor, CoprocessorConfig};
use hal::Vector3d;

mod board;
mod link;
mod sim;

use board::SitlBoard;
use link::PeerScript;
use sim::SensorModel;

#[derive(Parser, Debug)]
#[command(name = "sitl")]
#[command(about = "AHRS coprocessor on the host, fed by simulated sensors and a scripted flight board", long_about = None)]
struct Args {
    /// Estimation cycles to run (0 = continuous)
    #[arg(value_name = "CYCLES", default_value = "800")]
    cycles: u64,

    /// Algorithm the flight board selects (full, simple)
    #[arg(long, default_value = "full")]
    algorithm: String,

    /// Ask for a stationary calibration once the link is up
    #[arg(long)]
    calibrate: bool,

    /// Send GPS fixes along with the baro updates
    #[arg(long)]
    gps: bool,

    /// Vehicle heading in degrees
    #[arg(long, default_value = "0")]
    heading: f32,

    /// Sensor noise amplitude in ADC ticks
    #[arg(long, default_value = "4")]
    noise: u16,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let algorithm = match args.algorithm.as_str() {
        "full" => Algorithm::Full,
        "simple" => Algorithm::Simple,
        other => bail!("Unknown algorithm '{}', expected full or simple", other),
    };

    let config = CoprocessorConfig {
        accel_calibration: sim::accel_calibration(),
        gyro_calibration: sim::gyro_calibration(),
        ..Default::default()
    };
    let north = Vector3d::new(210.0, 0.0, 430.0);
    let model = SensorModel::new(args.heading, north, args.noise);
    let script = PeerScript::new(model.north(), algorithm, args.calibrate, args.gps);

    let board = SitlBoard::new(&config, model, script);
    let estimator = Ekf::new(EkfConfig::default()).context("Failed to create estimator")?;
    let mut coprocessor =
        Coprocessor::new(board, estimator, config).context("Invalid coprocessor configuration")?;

    coprocessor.start();
    let mut cycles = 0u64;
    while args.cycles == 0 || cycles < args.cycles {
        let report = coprocessor.run_cycle();
        cycles += 1;
        if cycles % 80 == 0 {
            let (roll, pitch, yaw) = euler_deg(coprocessor.sensors().attitude.quaternion);
            info!(
                "Block {} ({:?}): roll {:.1} pitch {:.1} yaw {:.1}, load {:.1}%",
                report.sequence,
                report.algorithm,
                roll,
                pitch,
                yaw,
                coprocessor.load_report().load_percent
            );
        }
    }

    let stats = coprocessor.stats();
    let load = coprocessor.load_report();
    info!(
        "Finished {} cycles: {} full, {} mag-only, {} velocity/baro corrections, {} estimator faults",
        cycles,
        stats.full_corrections,
        stats.mag_corrections,
        stats.velocity_baro_corrections,
        stats.estimator_faults
    );
    info!(
        "Load {:.1}% (idle {:.1} ms, running {:.1} ms), {} dropped cycles",
        load.load_percent,
        report_units_to_ms(load.idle_time),
        report_units_to_ms(load.run_time),
        load.dropped_cycles
    );
    Ok(())
}

/// Load report times are in 100 us units
fn report_units_to_ms(units: u32) -> f32 {
    units as f32 / 10.0
}

fn euler_deg(q: [f32; 4]) -> (f32, f32, f32) {
    let (roll, pitch, yaw) = utils::quaternion_to_euler(q);
    (
        utils::rad_to_deg(roll),
        utils::rad_to_deg(pitch),
        utils::rad_to_deg(yaw),
    )
}
