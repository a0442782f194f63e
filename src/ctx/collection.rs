//! Sets of CTX products.
//!
//! A [`CtxCollection`] is a list of product ids with two optional constraints applied on
//! every read: full width images only (`LINE_SAMPLES == 5056`) and no products flagged
//! `ERROR` in `DATA_QUALITY_DESC`. Downloads and calibrations of a collection run on the
//! bounded worker pool, one product per job.
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::info;

use crate::constants::{CTX_FULL_WIDTH, DEFAULT_WORKERS};
use crate::ctx::product::{Ctx, CtxOptions};
use crate::ctx::{CtxConfig, EdrIndex};
use crate::pds::table::{Cell, IndexTable};
use crate::planetary_errors::PlanetaryError;
use crate::pool::run_bounded;

/// Prefix of CTX volume ids
const VOLUME_PREFIX: &str = "MROX_";

#[derive(Debug, Clone)]
pub struct CtxCollection {
    product_ids: Vec<String>,
    full_width: bool,
    filter_error: bool,
    index: Arc<EdrIndex>,
    config: CtxConfig,
}

impl CtxCollection {
    pub fn new(product_ids: Vec<String>, index: Arc<EdrIndex>, config: CtxConfig) -> Self {
        CtxCollection {
            product_ids,
            full_width: false,
            filter_error: false,
            index,
            config,
        }
    }

    /// Keep only full width images.
    pub fn with_full_width(mut self, full_width: bool) -> Self {
        self.full_width = full_width;
        self
    }

    /// Drop products flagged `ERROR` in the index.
    pub fn with_filter_error(mut self, filter_error: bool) -> Self {
        self.filter_error = filter_error;
        self
    }

    /// All products of a PDS volume.
    ///
    /// Arguments
    /// -----------------
    /// * `volume`: `MROX_0001`, or just the number part (`0001`).
    pub fn by_volume(volume: &str, index: Arc<EdrIndex>, config: CtxConfig) -> Self {
        let volume = if volume.to_uppercase().starts_with(VOLUME_PREFIX) {
            volume.to_uppercase()
        } else {
            format!("{VOLUME_PREFIX}{volume}")
        };
        let pids = Self::pids_where(&index, |pid| {
            index
                .volume(pid)
                .map(|v| v.eq_ignore_ascii_case(&volume))
                .unwrap_or(false)
        });
        Self::new(pids, index, config)
    }

    /// All products whose id starts with `month_letters` (the mission phase, e.g. `P01`).
    ///
    /// With `nth_volume`, the collection is instead the whole n-th volume holding such
    /// products.
    pub fn by_month(
        month_letters: &str,
        nth_volume: Option<usize>,
        index: Arc<EdrIndex>,
        config: CtxConfig,
    ) -> Result<Self, PlanetaryError> {
        let pids = Self::pids_where(&index, |pid| pid.starts_with(month_letters));
        let month = Self::new(pids, index.clone(), config.clone());
        match nth_volume {
            None => Ok(month),
            Some(n) => {
                let volumes = month.volumes_in_pids()?;
                let volume = volumes.get(n).ok_or_else(|| {
                    PlanetaryError::ProductNotFound(format!("volume {n} of {month_letters}"))
                })?;
                Ok(Self::by_volume(volume, index, config))
            }
        }
    }

    /// The whole volume holding a product.
    pub fn volume_from_pid(
        pid: &str,
        index: Arc<EdrIndex>,
        config: CtxConfig,
    ) -> Result<Self, PlanetaryError> {
        let volume = index.volume(pid)?;
        Ok(Self::by_volume(&volume, index, config))
    }

    fn pids_where<F: Fn(&str) -> bool>(index: &EdrIndex, keep: F) -> Vec<String> {
        index.product_ids().filter(|pid| keep(pid)).collect()
    }

    fn passes_constraints(&self, pid: &str) -> bool {
        if self.full_width && self.index.line_samples(pid) != Some(CTX_FULL_WIDTH) {
            return false;
        }
        if self.filter_error && self.index.data_quality(pid).is_ok_and(|q| q == "ERROR") {
            return false;
        }
        true
    }

    /// Product ids known to the index that satisfy the constraints, in index order.
    pub fn product_ids(&self) -> Vec<String> {
        let wanted: HashSet<&str> = self.product_ids.iter().map(String::as_str).collect();
        self.index
            .product_ids()
            .filter(|pid| wanted.contains(pid.as_str()))
            .filter(|pid| self.passes_constraints(pid))
            .unique()
            .collect()
    }

    /// Alias of [`CtxCollection::product_ids`].
    pub fn pids(&self) -> Vec<String> {
        self.product_ids()
    }

    pub fn n_items(&self) -> usize {
        self.product_ids().len()
    }

    pub fn get_pid_n(&self, n: usize) -> Option<String> {
        self.product_ids().into_iter().nth(n)
    }

    /// Processing handle of a product of the collection.
    pub fn ctx(&self, pid: &str) -> Result<Ctx, PlanetaryError> {
        Ctx::new(
            pid,
            self.index.clone(),
            &self.config,
            CtxOptions::default(),
        )
    }

    pub fn get_ctx_n(&self, n: usize) -> Result<Ctx, PlanetaryError> {
        let pid = self
            .get_pid_n(n)
            .ok_or_else(|| PlanetaryError::ProductNotFound(format!("item {n} of collection")))?;
        self.ctx(&pid)
    }

    /// Download URL of every product.
    pub fn get_urls(&self) -> Result<Vec<String>, PlanetaryError> {
        self.product_ids()
            .iter()
            .map(|pid| Ok(self.ctx(pid)?.url()))
            .collect()
    }

    /// Whether the raw EDR of each product is stored.
    pub fn edr_exist_check(&self) -> Result<Vec<(String, bool)>, PlanetaryError> {
        self.product_ids()
            .into_iter()
            .map(|pid| {
                let exists = self.ctx(&pid)?.source_path().exists();
                Ok((pid, exists))
            })
            .collect()
    }

    /// Whether the calibrated cube of each product exists.
    pub fn calib_exist_check(&self) -> Result<Vec<(String, bool)>, PlanetaryError> {
        self.product_ids()
            .into_iter()
            .map(|pid| {
                let exists = self.ctx(&pid)?.cal_path().exists();
                Ok((pid, exists))
            })
            .collect()
    }

    /// Index rows of the products.
    pub fn meta(&self) -> IndexTable {
        let wanted: HashSet<String> = self.product_ids().into_iter().collect();
        let pid_col = self.index.table().column_index("PRODUCT_ID");
        self.index.table().filter_rows(|row| {
            pid_col
                .and_then(|idx| row.get(idx))
                .is_some_and(|pid| wanted.contains(&pid.to_string()))
        })
    }

    /// `IMAGE_TIME` of the products.
    pub fn image_times(&self) -> Result<Vec<Cell>, PlanetaryError> {
        Ok(self
            .meta()
            .column("IMAGE_TIME")?
            .into_iter()
            .cloned()
            .collect())
    }

    /// Products flagged `ERROR` in `DATA_QUALITY_DESC`.
    pub fn get_corrupted(&self) -> Vec<String> {
        self.product_ids()
            .into_iter()
            .filter(|pid| self.index.data_quality(pid).is_ok_and(|q| q == "ERROR"))
            .collect()
    }

    /// Remove the products flagged `ERROR` from the list.
    pub fn retain_valid(&mut self) {
        let corrupted: HashSet<String> = self.get_corrupted().into_iter().collect();
        self.product_ids.retain(|pid| !corrupted.contains(pid));
    }

    /// Volumes holding the products, in order of first appearance.
    pub fn volumes_in_pids(&self) -> Result<Vec<String>, PlanetaryError> {
        self.meta().unique_values("VOLUME_ID")
    }

    /// Number of products in the whole index for each volume of the collection.
    pub fn count_per_volume(&self) -> Result<Vec<(String, usize)>, PlanetaryError> {
        let counts = self
            .index
            .table()
            .column("VOLUME_ID")?
            .into_iter()
            .map(|c| c.to_string())
            .counts();
        Ok(self
            .volumes_in_pids()?
            .into_iter()
            .map(|v| {
                let n = counts.get(&v).copied().unwrap_or(0);
                (v, n)
            })
            .collect())
    }

    /// `n` product ids drawn at random without replacement.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<String> {
        self.product_ids()
            .choose_multiple(rng, n)
            .cloned()
            .collect()
    }

    /// Download the raw EDRs, [`DEFAULT_WORKERS`] at a time.
    ///
    /// Return
    /// ----------
    /// * For each product, whether it was downloaded, or the error of its job.
    pub fn download_collection(
        &self,
        overwrite: bool,
    ) -> Result<Vec<(String, Result<bool, PlanetaryError>)>, PlanetaryError> {
        info!("Downloading collection...");
        let pids = self.product_ids();
        let (index, config) = (self.index.clone(), self.config.clone());
        let results = run_bounded(pids.clone(), DEFAULT_WORKERS, "download", move |pid| {
            Ctx::new(&pid, index.clone(), &config, CtxOptions::default())?.download(overwrite)
        })?;
        Ok(pids.into_iter().zip(results).collect())
    }

    /// Run the calibration pipeline on every product, [`DEFAULT_WORKERS`] at a time.
    pub fn calibrate_collection(
        &self,
        overwrite: bool,
    ) -> Result<Vec<(String, Result<(), PlanetaryError>)>, PlanetaryError> {
        info!("Launching parallel calibration...");
        let pids = self.product_ids();
        let (index, config) = (self.index.clone(), self.config.clone());
        let results = run_bounded(pids.clone(), DEFAULT_WORKERS, "calibrate", move |pid| {
            Ctx::new(&pid, index.clone(), &config, CtxOptions::default())?
                .calib_pipeline(overwrite)
        })?;
        Ok(pids.into_iter().zip(results).collect())
    }
}

impl fmt::Display for CtxCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# of product IDs: {}", self.n_items())?;
        writeln!(f, "Volumes contained in list of product_ids:")?;
        let volumes = self.volumes_in_pids().unwrap_or_default();
        writeln!(f, "{}", volumes.join(", "))
    }
}
