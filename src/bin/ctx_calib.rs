//! Calibrate one CTX product with ISIS.
//!
//! Usage:
//!   ctx-calib P01_001472_1747_XI_05S146W
//!   ctx-calib P01_001472_1747 --source /data/ctx/edr --proc-root /scratch/ctx --overwrite

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use planetarypy::ctx::product::{Ctx, CtxOptions};
use planetarypy::planetary::Planetary;
use planetarypy::planetary_errors::PlanetaryError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ctx-calib")]
#[command(about = "Run the ISIS calibration pipeline on a CTX EDR")]
struct Cli {
    /// CTX product id, full or its first 15 characters.
    pid: String,
    /// Folder holding the EDR, if not stored by planetarypy.
    #[arg(long)]
    source: Option<Utf8PathBuf>,
    /// Folder for the processed cubes, if not the planetarypy one.
    #[arg(long)]
    proc_root: Option<Utf8PathBuf>,
    /// Calibrate again even if the calibrated cube exists.
    #[arg(long)]
    overwrite: bool,
}

fn run(cli: Cli) -> Result<Utf8PathBuf, PlanetaryError> {
    let mut planetary = Planetary::new()?;
    let index = planetary.ctx_edr_index(false, true)?;
    let options = CtxOptions {
        source_dir: cli.source,
        proc_root: cli.proc_root,
        ..Default::default()
    };
    let ctx = Ctx::new(&cli.pid, index, &planetary.ctx_config()?, options)?;
    ctx.calib_pipeline(cli.overwrite)?;
    Ok(ctx.cal_path())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(cal_path) => {
            println!("Produced\n{cal_path}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
