//! One CTX product through the ISIS processing chain.
//!
//! ```text
//! <pid>.IMG ──mroctx2isis──► <pid>.cub ──spiceinit──► <pid>.cub ──ctxcal──► <pid>.cal.cub
//!           ──ctxevenodd──► <pid>.dst.cal.cub (renamed over <pid>.cal.cub)
//!           ──cam2map──► <pid>.lev2.cub
//! ```
//!
//! Each step runs one ISIS tool; a failing tool stops the pipeline with its
//! [`IsisError`](crate::isis::IsisError).
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::constants::CTX_NO_DESTRIPE_SUMMING;
use crate::ctx::edr::{CtxEdr, EdrOptions};
use crate::ctx::{CtxConfig, EdrIndex, ProductMeta};
use crate::isis::IsisCommand;
use crate::planetary_errors::PlanetaryError;
use crate::utils::file_variations;

/// Steps of [`Ctx::calib_pipeline`], in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibStep {
    IsisImport,
    SpiceInit,
    Calibrate,
    Destripe,
}

impl CalibStep {
    pub const ALL: [CalibStep; 4] = [
        CalibStep::IsisImport,
        CalibStep::SpiceInit,
        CalibStep::Calibrate,
        CalibStep::Destripe,
    ];
}

impl fmt::Display for CalibStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibStep::IsisImport => "isis_import",
            CalibStep::SpiceInit => "spice_init",
            CalibStep::Calibrate => "calibrate",
            CalibStep::Destripe => "destripe",
        };
        f.write_str(name)
    }
}

/// Overrides for where a product is read from and processed to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CtxOptions {
    /// Where the raw EDR is stored, if not at the configured place
    pub source_dir: Option<Utf8PathBuf>,
    /// Where to store processed cubes, if not at the configured place
    pub proc_root: Option<Utf8PathBuf>,
    pub with_volume: Option<bool>,
    pub with_pid_folder: Option<bool>,
}

/// A CTX product and its processed files.
#[derive(Debug, Clone)]
pub struct Ctx {
    edr: CtxEdr,
    proc_root: Utf8PathBuf,
    with_volume: bool,
    with_pid_folder: bool,
    preproc_root: Option<Utf8PathBuf>,
    preproc_with_volume: bool,
    preproc_with_pid_folder: bool,
    preproc_calib_extension: String,
    cub_name: Utf8PathBuf,
    cal_name: Utf8PathBuf,
    destripe_name: Utf8PathBuf,
    map_name: Utf8PathBuf,
}

impl Ctx {
    /// Set up the processing of one product.
    ///
    /// Arguments
    /// -----------------
    /// * `pid`: full or short product id.
    /// * `index`: the CTX EDR index.
    /// * `config`: the `mro.ctx` settings.
    /// * `options`: source and processing overrides. `with_volume` applies to the raw EDR
    ///   path and to the processed path.
    pub fn new(
        pid: &str,
        index: Arc<EdrIndex>,
        config: &CtxConfig,
        options: CtxOptions,
    ) -> Result<Self, PlanetaryError> {
        let edr = CtxEdr::new(
            pid,
            index,
            config,
            EdrOptions {
                root: options.source_dir,
                with_volume: options.with_volume,
                with_pid_folder: None,
            },
        )?;

        let source_name = Utf8PathBuf::from(format!("{}.IMG", edr.pid()));
        let mut names = file_variations(
            &source_name,
            &[".cub", ".cal.cub", ".dst.cal.cub", ".lev2.cub"],
        )
        .into_iter();
        let mut next = || names.next().unwrap_or_default();
        let (cub_name, cal_name, destripe_name, map_name) = (next(), next(), next(), next());

        Ok(Ctx {
            edr,
            proc_root: options.proc_root.unwrap_or_else(|| config.proc_root.clone()),
            with_volume: options.with_volume.unwrap_or(config.proc_with_volume),
            with_pid_folder: options
                .with_pid_folder
                .unwrap_or(config.proc_with_pid_folder),
            preproc_root: config.preproc_root.clone(),
            preproc_with_volume: config.preproc_with_volume,
            preproc_with_pid_folder: config.preproc_with_pid_folder,
            preproc_calib_extension: config.calib_extension.clone(),
            cub_name,
            cal_name,
            destripe_name,
            map_name,
        })
    }

    pub fn edr(&self) -> &CtxEdr {
        &self.edr
    }

    pub fn pid(&self) -> &str {
        self.edr.pid()
    }

    pub fn short_pid(&self) -> &str {
        self.edr.short_pid()
    }

    pub fn volume(&self) -> &str {
        self.edr.volume()
    }

    pub fn meta(&self) -> Result<ProductMeta<'_>, PlanetaryError> {
        self.edr.meta()
    }

    pub fn source_path(&self) -> Utf8PathBuf {
        self.edr.source_path()
    }

    pub fn url(&self) -> String {
        self.edr.url()
    }

    pub fn download(&self, overwrite: bool) -> Result<bool, PlanetaryError> {
        self.edr.download(overwrite)
    }

    pub fn spatial_summing(&self) -> Result<i64, PlanetaryError> {
        self.edr.index().spatial_summing(self.pid())
    }

    pub fn data_quality(&self) -> Result<String, PlanetaryError> {
        self.edr.index().data_quality(self.pid())
    }

    fn folder(&self, root: &Utf8Path, with_volume: bool, with_pid_folder: bool) -> Utf8PathBuf {
        let mut path = root.to_path_buf();
        if with_volume {
            path.push(self.volume());
        }
        if with_pid_folder {
            path.push(self.pid());
        }
        path
    }

    /// Folder of the cubes produced here.
    pub fn proc_folder(&self) -> Utf8PathBuf {
        self.folder(&self.proc_root, self.with_volume, self.with_pid_folder)
    }

    /// Folder of calibrated cubes produced elsewhere, when configured.
    pub fn preproc_folder(&self) -> Option<Utf8PathBuf> {
        self.preproc_root.as_deref().map(|root| {
            self.folder(root, self.preproc_with_volume, self.preproc_with_pid_folder)
        })
    }

    /// Cube after import into ISIS.
    pub fn cub_path(&self) -> Utf8PathBuf {
        self.proc_folder().join(&self.cub_name)
    }

    /// Calibrated cube; the destriped cube replaces it.
    pub fn cal_path(&self) -> Utf8PathBuf {
        self.proc_folder().join(&self.cal_name)
    }

    pub fn destripe_path(&self) -> Utf8PathBuf {
        self.proc_folder().join(&self.destripe_name)
    }

    pub fn map_path(&self) -> Utf8PathBuf {
        self.proc_folder().join(&self.map_name)
    }

    /// Calibrated cube produced elsewhere, when a pre-processed root is configured.
    pub fn preproc_cal_path(&self) -> Option<Utf8PathBuf> {
        let source_name = Utf8PathBuf::from(format!("{}.IMG", self.pid()));
        let name = file_variations(&source_name, &[&self.preproc_calib_extension])
            .into_iter()
            .next()?;
        self.preproc_folder().map(|folder| folder.join(name))
    }

    /// Import the EDR into an ISIS cube (`mroctx2isis`).
    pub fn isis_import(&self) -> Result<(), PlanetaryError> {
        std::fs::create_dir_all(self.proc_folder())?;
        IsisCommand::new("mroctx2isis")
            .arg("from", self.source_path())
            .arg("to", self.cub_path())
            .run()?;
        Ok(())
    }

    /// Attach SPICE kernels to the cube (`spiceinit`), from the web service when `web`.
    pub fn spice_init(&self, web: bool) -> Result<(), PlanetaryError> {
        IsisCommand::new("spiceinit")
            .arg("from", self.cub_path())
            .arg("web", if web { "yes" } else { "no" })
            .run()?;
        Ok(())
    }

    /// Radiometric calibration (`ctxcal`).
    pub fn calibrate(&self) -> Result<(), PlanetaryError> {
        IsisCommand::new("ctxcal")
            .arg("from", self.cub_path())
            .arg("to", self.cal_path())
            .run()?;
        Ok(())
    }

    /// Even/odd destriping (`ctxevenodd`), skipped for products with spatial summing 2.
    ///
    /// With `do_rename` the destriped cube replaces the calibrated one.
    ///
    /// Return
    /// ----------
    /// * Whether the tool ran.
    pub fn destripe(&self, do_rename: bool) -> Result<bool, PlanetaryError> {
        if self.spatial_summing()? == CTX_NO_DESTRIPE_SUMMING {
            debug!(pid = self.pid(), "summing mode 2, no destriping");
            return Ok(false);
        }
        IsisCommand::new("ctxevenodd")
            .arg("from", self.cal_path())
            .arg("to", self.destripe_path())
            .run()?;
        if do_rename {
            std::fs::rename(self.destripe_path(), self.cal_path())?;
        }
        Ok(true)
    }

    /// Map projection of the calibrated cube (`cam2map`) at `mpp` meters per pixel,
    /// usually [`CTX_DEFAULT_MPP`](crate::constants::CTX_DEFAULT_MPP).
    pub fn map_project(&self, mpp: f64) -> Result<(), PlanetaryError> {
        IsisCommand::new("cam2map")
            .arg("from", self.cal_path())
            .arg("to", self.map_path())
            .arg("pixres", "mpp")
            .arg("resolution", mpp)
            .run()?;
        Ok(())
    }

    fn run_step(&self, step: CalibStep) -> Result<(), PlanetaryError> {
        match step {
            CalibStep::IsisImport => self.isis_import(),
            CalibStep::SpiceInit => self.spice_init(true),
            CalibStep::Calibrate => self.calibrate(),
            CalibStep::Destripe => self.destripe(true).map(|_| ()),
        }
    }

    /// Run import, SPICE initialization, calibration and destriping.
    ///
    /// Nothing is done when the calibrated cube exists, unless `overwrite`. The first
    /// failing step ends the pipeline with its error.
    pub fn calib_pipeline(&self, overwrite: bool) -> Result<(), PlanetaryError> {
        if self.cal_path().exists() && !overwrite {
            debug!("{} exists, skipping calibration", self.cal_path());
            return Ok(());
        }

        #[cfg(feature = "progress")]
        let pb = {
            let pb = ProgressBar::new(CalibStep::ALL.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("{prefix} {msg:12} {bar:20.green/white} {pos}/{len}")
                    .expect("indicatif template"),
            );
            pb.set_prefix(self.short_pid().to_string());
            pb
        };

        for step in CalibStep::ALL {
            #[cfg(feature = "progress")]
            pb.set_message(step.to_string());
            info!(pid = self.pid(), %step, "calibration step");
            self.run_step(step)?;
            #[cfg(feature = "progress")]
            pb.inc(1);
        }

        #[cfg(feature = "progress")]
        pb.finish_with_message("Done.");
        Ok(())
    }
}

impl fmt::Display for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.edr)?;
        if self.source_path().exists() {
            writeln!(f, "cal_path: {}", self.cal_path())
        } else {
            writeln!(f, "Not downloaded yet.")
        }
    }
}
