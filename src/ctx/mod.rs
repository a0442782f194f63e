//! # MRO Context Camera (CTX)
//!
//! Access to CTX experiment data records (EDR) and their ISIS calibration:
//!
//! - [`EdrIndex`]: the CTX EDR cumulative index, with product id lookups,
//! - [`edr::CtxEdr`]: one raw product, its storage path, URL and download,
//! - [`product::Ctx`]: one product through the ISIS pipeline
//!   (`mroctx2isis` → `spiceinit` → `ctxcal` → `ctxevenodd`, then `cam2map`),
//! - [`collection::CtxCollection`]: sets of products, processed on a bounded worker pool.
//!
//! ## Storage
//! -----------------
//! ```text
//! <storage_root>/mro/ctx/edr/[<volume>/][<pid>/]<pid>.IMG
//! <storage_root>/mro/ctx/edr/[<volume>/][<pid>/]<pid>.cub | .cal.cub | .dst.cal.cub | .lev2.cub
//! ```
//!
//! The volume and product id folders, and alternative roots, come from the
//! `mro.ctx` section of the configuration, see [`CtxConfig`].
pub mod collection;
pub mod edr;
pub mod product;

use std::collections::HashMap;

use camino::Utf8PathBuf;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::constants::CTX_SHORT_PID_LEN;
use crate::planetary::Planetary;
use crate::pds::table::{Cell, IndexTable, TableRow};
use crate::planetary_errors::PlanetaryError;

// -------------------------------------------------------------------------------------------------
// Configuration
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct RawEdrLevel {
    #[serde(default)]
    url: String,
    #[serde(default)]
    root: String,
    #[serde(default = "yes")]
    with_pid_folder: bool,
    #[serde(default)]
    with_volume: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDatalevels {
    #[serde(default)]
    edr: RawEdrLevel,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCtxConfig {
    #[serde(default = "default_calib_extension")]
    calib_extension: String,
    #[serde(default)]
    preproc_root: String,
    #[serde(default)]
    preproc_with_pid_folder: bool,
    #[serde(default)]
    preproc_with_volume: bool,
    #[serde(default = "yes")]
    proc_with_pid_folder: bool,
    #[serde(default)]
    proc_with_volume: bool,
    #[serde(default)]
    datalevels: RawDatalevels,
}

fn yes() -> bool {
    true
}

impl Default for RawEdrLevel {
    fn default() -> Self {
        RawEdrLevel {
            url: String::new(),
            root: String::new(),
            with_pid_folder: true,
            with_volume: false,
        }
    }
}

impl Default for RawCtxConfig {
    fn default() -> Self {
        RawCtxConfig {
            calib_extension: default_calib_extension(),
            preproc_root: String::new(),
            preproc_with_pid_folder: false,
            preproc_with_volume: false,
            proc_with_pid_folder: true,
            proc_with_volume: false,
            datalevels: RawDatalevels::default(),
        }
    }
}

fn default_calib_extension() -> String {
    ".cal.cub".to_string()
}

fn non_empty(path: &str) -> Option<Utf8PathBuf> {
    (!path.is_empty()).then(|| Utf8PathBuf::from(path))
}

/// Resolved `mro.ctx` settings.
///
/// Empty roots in the configuration fall back to `<storage_root>/mro/ctx/edr`, both for the
/// raw EDR files and for the processed cubes.
#[derive(Debug, Clone, PartialEq)]
pub struct CtxConfig {
    /// Base URL of the CTX volumes on the PDS imaging node
    pub edr_url: String,
    pub edr_root: Utf8PathBuf,
    pub edr_with_volume: bool,
    pub edr_with_pid_folder: bool,
    pub proc_root: Utf8PathBuf,
    pub proc_with_volume: bool,
    pub proc_with_pid_folder: bool,
    /// Root of calibrated cubes produced elsewhere, if any
    pub preproc_root: Option<Utf8PathBuf>,
    pub preproc_with_volume: bool,
    pub preproc_with_pid_folder: bool,
    /// Extension of the pre-processed calibrated cubes, e.g. `.cal.cub`
    pub calib_extension: String,
}

impl CtxConfig {
    /// Read the `mro.ctx` section of the configuration.
    ///
    /// A missing section gives the defaults; a section with wrongly typed values is an error.
    pub fn from_config(config: &Config) -> Result<Self, PlanetaryError> {
        let raw: RawCtxConfig = match config.get_value("mro.ctx") {
            Ok(value) => value.clone().try_into()?,
            Err(PlanetaryError::KeyNotFound(_)) => RawCtxConfig::default(),
            Err(e) => return Err(e),
        };

        let default_root = config.storage_root().join("mro").join("ctx").join("edr");
        let edr = raw.datalevels.edr;
        Ok(CtxConfig {
            edr_url: edr.url.trim_end_matches('/').to_string(),
            edr_root: non_empty(&edr.root).unwrap_or_else(|| default_root.clone()),
            edr_with_volume: edr.with_volume,
            edr_with_pid_folder: edr.with_pid_folder,
            proc_root: default_root,
            proc_with_volume: raw.proc_with_volume,
            proc_with_pid_folder: raw.proc_with_pid_folder,
            preproc_root: non_empty(&raw.preproc_root),
            preproc_with_volume: raw.preproc_with_volume,
            preproc_with_pid_folder: raw.preproc_with_pid_folder,
            calib_extension: raw.calib_extension,
        })
    }
}

// -------------------------------------------------------------------------------------------------
// EDR index
// -------------------------------------------------------------------------------------------------

/// The CTX EDR cumulative index, indexed by product id.
#[derive(Debug, Clone)]
pub struct EdrIndex {
    table: IndexTable,
    pid_column: usize,
    rows_by_pid: HashMap<String, usize>,
}

/// Index metadata of one product.
#[derive(Debug, Clone, Copy)]
pub struct ProductMeta<'a> {
    table: &'a IndexTable,
    row: &'a TableRow,
}

impl<'a> ProductMeta<'a> {
    /// Value of a column, column names are matched ignoring case.
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        self.table
            .column_index(column)
            .and_then(|idx| self.row.get(idx))
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(self) -> impl Iterator<Item = (&'a str, &'a Cell)> + 'a {
        self.table
            .columns()
            .iter()
            .map(String::as_str)
            .zip(self.row.cells.iter())
    }

    pub fn row(&self) -> &'a TableRow {
        self.row
    }
}

impl EdrIndex {
    /// Wrap a decoded CTX EDR index.
    ///
    /// Return
    /// ----------
    /// * [`PlanetaryError::MissingColumn`] when `PRODUCT_ID` or `VOLUME_ID` is absent.
    pub fn new(table: IndexTable) -> Result<Self, PlanetaryError> {
        let pid_column = table
            .column_index("PRODUCT_ID")
            .ok_or_else(|| PlanetaryError::MissingColumn("PRODUCT_ID".into()))?;
        table
            .column_index("VOLUME_ID")
            .ok_or_else(|| PlanetaryError::MissingColumn("VOLUME_ID".into()))?;
        let mut rows_by_pid = HashMap::with_capacity(table.n_rows());
        for (idx, row) in table.rows().iter().enumerate() {
            rows_by_pid.entry(row.cells[pid_column].to_string()).or_insert(idx);
        }
        debug!(products = rows_by_pid.len(), "CTX EDR index ready");
        Ok(EdrIndex {
            table,
            pid_column,
            rows_by_pid,
        })
    }

    /// Fetch the `mro.ctx.edr` index through the index manager.
    pub fn load(
        planetary: &mut Planetary,
        refresh: bool,
        check_update: bool,
    ) -> Result<Self, PlanetaryError> {
        Self::new(planetary.get_index("mro.ctx", "edr", refresh, check_update)?)
    }

    pub fn table(&self) -> &IndexTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.n_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Product ids, in index order.
    pub fn product_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.table
            .rows()
            .iter()
            .map(|r| r.cells[self.pid_column].to_string())
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.rows_by_pid.contains_key(pid)
    }

    /// Full product id.
    ///
    /// A 15 character short id (e.g. `P01_001234_1234`) resolves to the first product id of
    /// the index starting with it; longer ids are returned as given.
    pub fn resolve_pid(&self, pid: &str) -> Result<String, PlanetaryError> {
        if pid.len() != CTX_SHORT_PID_LEN {
            return Ok(pid.to_string());
        }
        self.product_ids()
            .find(|full| full.starts_with(pid))
            .ok_or_else(|| PlanetaryError::ProductNotFound(pid.to_string()))
    }

    /// Index metadata of a product.
    pub fn meta(&self, pid: &str) -> Result<ProductMeta<'_>, PlanetaryError> {
        let idx = *self
            .rows_by_pid
            .get(pid)
            .ok_or_else(|| PlanetaryError::ProductNotFound(pid.to_string()))?;
        Ok(ProductMeta {
            table: &self.table,
            row: &self.table.rows()[idx],
        })
    }

    fn meta_value(&self, pid: &str, column: &str) -> Result<&Cell, PlanetaryError> {
        self.meta(pid)?
            .get(column)
            .ok_or_else(|| PlanetaryError::MissingColumn(column.to_string()))
    }

    /// PDS volume of a product, lower case (e.g. `mrox_0001`).
    pub fn volume(&self, pid: &str) -> Result<String, PlanetaryError> {
        Ok(self.meta_value(pid, "VOLUME_ID")?.to_string().to_lowercase())
    }

    /// `SPATIAL_SUMMING` of a product.
    pub fn spatial_summing(&self, pid: &str) -> Result<i64, PlanetaryError> {
        let cell = self.meta_value(pid, "SPATIAL_SUMMING")?;
        cell.as_i64()
            .ok_or_else(|| PlanetaryError::MissingColumn(format!("SPATIAL_SUMMING of {pid}: {cell}")))
    }

    /// `DATA_QUALITY_DESC` of a product, e.g. `OK` or `ERROR`.
    pub fn data_quality(&self, pid: &str) -> Result<String, PlanetaryError> {
        Ok(self.meta_value(pid, "DATA_QUALITY_DESC")?.to_string())
    }

    /// `LINE_SAMPLES` of a product, `None` when absent or not a number.
    pub fn line_samples(&self, pid: &str) -> Option<i64> {
        self.meta_value(pid, "LINE_SAMPLES").ok()?.as_i64()
    }
}
