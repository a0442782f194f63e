//! Fetch a PDS index and show its first rows.
//!
//! Usage:
//!   pds-index cassini.iss index
//!   pds-index mro.hirise edr --refresh --rows 20
//!   pds-index mro.ctx.edr --no-check-update

use std::process::ExitCode;

use clap::Parser;
use planetarypy::planetary::Planetary;
use planetarypy::planetary_errors::PlanetaryError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pds-index")]
#[command(about = "Download, cache and preview a PDS index")]
struct Cli {
    /// Dotted instrument key, e.g. cassini.iss, optionally with the index name.
    instrument: String,
    /// Index name, e.g. index or edr.
    index: Option<String>,
    /// Download the index even if it is stored.
    #[arg(long)]
    refresh: bool,
    /// Do not go online to look for newer versions.
    #[arg(long)]
    no_check_update: bool,
    /// Number of rows to show.
    #[arg(long, default_value_t = 5)]
    rows: usize,
}

fn run(cli: Cli) -> Result<(), PlanetaryError> {
    let mut planetary = Planetary::new()?;
    let table = planetary.get_index(
        &cli.instrument,
        cli.index.as_deref().unwrap_or_default(),
        cli.refresh,
        !cli.no_check_update,
    )?;
    println!("{}", table.display_head(cli.rows));
    println!("{} rows x {} columns", table.n_rows(), table.n_columns());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
