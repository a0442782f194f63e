//! Repair of the HiRISE EDR cumulative index.
//!
//! Some rows of `EDRCUMINDEX.TAB` carry a `SCAN_EXPOSURE_DURATION` written as `F10.4`
//! (e.g. `20000.0000`) while the label declares `F9.4`, which shifts every following column
//! by one byte. Those values are cut to their first nine characters (`20000.000`).
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

use camino::Utf8Path;
use tracing::info;

use crate::planetary_errors::PlanetaryError;

/// Position of `SCAN_EXPOSURE_DURATION` among the comma separated fields of a row.
const SCAN_EXPOSURE_FIELD: usize = 21;

/// Largest value that fits the declared `F9.4` format.
const MAX_SCAN_EXPOSURE: f64 = 9999.999;

/// Fix one row, returning it unchanged when it is not affected.
pub fn fix_edrcumindex_line(line: &str) -> String {
    let Some(field) = line.split(',').nth(SCAN_EXPOSURE_FIELD) else {
        return line.to_string();
    };
    match field.trim().parse::<f64>() {
        Ok(value) if value > MAX_SCAN_EXPOSURE => {
            let fixed: String = field.chars().take(9).collect();
            line.replace(field, &fixed)
        }
        _ => line.to_string(),
    }
}

/// Write a repaired copy of a HiRISE `EDRCUMINDEX.TAB`.
///
/// Arguments
/// -----------------
/// * `infname`: the broken table.
/// * `outfname`: where to write the repaired table.
///
/// Return
/// ----------
/// * The number of rows that were changed.
pub fn fix_hirise_edrcumindex(infname: &Utf8Path, outfname: &Utf8Path) -> Result<usize, PlanetaryError> {
    let reader = BufReader::new(File::open(infname)?);
    let mut writer = BufWriter::new(File::create(outfname)?);
    let mut fixed = 0usize;

    for raw in reader.split(b'\n') {
        let raw = raw?;
        let line = String::from_utf8_lossy(&raw);
        let repaired = fix_edrcumindex_line(&line);
        if repaired != line {
            fixed += 1;
        }
        writer.write_all(repaired.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!(fixed, "repaired {} into {}", infname, outfname);
    Ok(fixed)
}
