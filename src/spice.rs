//! # SPICE kernel subsets
//!
//! NAIF assembles, for one mission dataset and a time range, the list of SPICE kernels
//! covering that range plus a metakernel (`.tm`) loading them. The answer of the subset
//! service is a zip archive holding:
//!
//! ```text
//! urls_<dataset>_<start>_<stop>.txt   kernel URLs, whitespace separated
//! <mission>_<start>_<stop>.tm         metakernel with PATH_VALUES = ( './data' )
//! ```
//!
//! [`SubsetRequest`] builds the query, [`KernelSubset`] reads the archive, downloads the
//! kernels and writes the metakernel with its data path pointing to the local copies.
//!
//! Kernels are stored under `<storage_root>/spice_kernels/<mission>/<folder>/<name>`, where
//! `<folder>` is the kernel type folder of the URL (`ck`, `spk`, `lsk`, ...).
//!
//! ## See also
//! ------------
//! * [`get_metakernel_and_files`] – download everything for a time range.
//! * [`list_kernels_for_day`] – only list the kernel names.
use std::fmt;
use std::io::{Cursor, Read};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Duration, NaiveDateTime};
use tracing::info;
use zip::ZipArchive;

use crate::constants::{DEFAULT_WORKERS, NAIF_SUBSET_URL, SPICE_KERNEL_DIR};
use crate::download::url_retrieve;
use crate::env_state::PlanetaryEnv;
use crate::planetary_errors::PlanetaryError;
use crate::pool::run_bounded;
use crate::time::parse_table_time;

/// NAIF archived SPICE datasets, by mission shorthand.
pub const NAIF_DATASETS: [(&str, &str); 31] = [
    ("cassini", "co-s_j_e_v-spice-6-v1.0/cosp_1000"),
    ("clementine", "clem1-l-spice-6-v1.0/clsp_1000"),
    ("dawn", "dawn-m_a-spice-6-v1.0/dawnsp_1000"),
    ("di", "di-c-spice-6-v1.0/disp_1000"),
    ("ds1", "ds1-a_c-spice-6-v1.0/ds1sp_1000"),
    ("epoxi", "dif-c_e_x-spice-6-v1.0/epxsp_1000"),
    ("em16", "em16/em16_spice"),
    ("grail", "grail-l-spice-6-v1.0/grlsp_1000"),
    ("hayabusa", "hay-a-spice-6-v1.0/haysp_1000"),
    ("insight", "insight/insight_spice"),
    ("juno", "jno-j_e_ss-spice-6-v1.0/jnosp_1000"),
    ("ladee", "ladee/ladee_spice"),
    ("lro", "lro-l-spice-6-v1.0/lrosp_1000"),
    ("maven", "maven/maven_spice"),
    ("opportunity", "mer1-m-spice-6-v1.0/mer1sp_1000"),
    ("spirit", "mer2-m-spice-6-v1.0/mer2sp_1000"),
    ("messenger", "mess-e_v_h-spice-6-v1.0/messsp_1000"),
    ("mars2020", "mars2020/mars2020_spice"),
    ("mex", "mex-e_m-spice-6-v2.0/mexsp_2000"),
    ("mgs", "mgs-m-spice-6-v1.0/mgsp_1000"),
    ("ody", "ody-m-spice-6-v1.0/odsp_1000"),
    ("mro", "mro-m-spice-6-v1.0/mrosp_1000"),
    ("msl", "msl-m-spice-6-v1.0/mslsp_1000"),
    ("near", "near-a-spice-6-v1.0/nearsp_1000"),
    ("nh", "nh-j_p_ss-spice-6-v1.0/nhsp_1000"),
    ("orex", "orex/orex_spice"),
    ("rosetta", "ro_rl-e_m_a_c-spice-6-v1.0/rossp_1000"),
    ("stardust", "sdu-c-spice-6-v1.0/sdsp_1000"),
    ("venus_climate_orbiter", "vco/vco_spice"),
    ("vex", "vex-e_v-spice-6-v2.0/vexsp_2000"),
    ("vo", "vo1_vo2-m-spice-6-v1.0/vosp_1000"),
];

/// Metakernel data path written by NAIF, replaced by the local kernel folder.
const METAKERNEL_DATA_PATH: &str = "'./data'";

/// Dataset path of a mission shorthand, e.g. `mro`.
pub fn dataset_id(mission: &str) -> Result<&'static str, PlanetaryError> {
    NAIF_DATASETS
        .iter()
        .find(|(name, _)| *name == mission)
        .map(|(_, id)| *id)
        .ok_or_else(|| PlanetaryError::UnknownSpiceDataset(mission.to_string()))
}

/// Default kernel folder of a mission.
pub fn kernel_storage(storage_root: &Utf8Path, mission: &str) -> Utf8PathBuf {
    storage_root.join(SPICE_KERNEL_DIR).join(mission)
}

/// `<folder>/<name>` of a kernel URL, e.g. `spk/de430.bsp`.
pub fn kernel_name(url: &str) -> String {
    let mut parts = url.trim_end_matches('/').rsplit('/');
    let name = parts.next().unwrap_or_default();
    match parts.next() {
        Some(folder) if !folder.is_empty() => format!("{folder}/{name}"),
        _ => name.to_string(),
    }
}

fn parse_request_time(text: &str) -> Result<NaiveDateTime, PlanetaryError> {
    parse_table_time(text).ok_or_else(|| PlanetaryError::TimeParse(text.to_string()))
}

/// One query to the NAIF subset service.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetRequest {
    pub mission: String,
    pub dataset: &'static str,
    pub start: NaiveDateTime,
    pub stop: NaiveDateTime,
}

impl SubsetRequest {
    /// Prepare a query.
    ///
    /// Arguments
    /// -----------------
    /// * `mission`: shorthand of [`NAIF_DATASETS`], e.g. `mro`.
    /// * `start`: ISO (`2020-01-01`, `2020-01-01T12:00:00`) or NASA day-of-year
    ///   (`2020-001`) time.
    /// * `stop`: same formats; one day after `start` when `None` or empty.
    pub fn new(mission: &str, start: &str, stop: Option<&str>) -> Result<Self, PlanetaryError> {
        let dataset = dataset_id(mission)?;
        let start = parse_request_time(start)?;
        let stop = match stop.filter(|s| !s.trim().is_empty()) {
            Some(stop) => parse_request_time(stop)?,
            None => start + Duration::days(1),
        };
        Ok(SubsetRequest {
            mission: mission.to_string(),
            dataset,
            start,
            stop,
        })
    }

    /// Query parameters, times in the `YYYY-MM-DD hh:mm:ss.sss` form the service expects.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("dataset", self.dataset.to_string()),
            ("start", self.start.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
            ("stop", self.stop.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
            ("action", "Subset".to_string()),
        ]
    }

    pub fn url(&self) -> Result<String, PlanetaryError> {
        reqwest::Url::parse_with_params(NAIF_SUBSET_URL, self.params())
            .map(String::from)
            .map_err(|e| PlanetaryError::SpiceSubset(e.to_string()))
    }

    /// Ask NAIF for the subset archive and read it.
    pub fn fetch(&self, env: &PlanetaryEnv) -> Result<KernelSubset, PlanetaryError> {
        let url = self.url()?;
        info!(mission = %self.mission, "requesting SPICE subset {}", url);
        KernelSubset::from_zip(&env.get_bytes(&url)?)
    }
}

/// A kernel to download and where it goes.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelFile {
    pub url: String,
    pub path: Utf8PathBuf,
}

impl fmt::Display for KernelFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", kernel_name(&self.url))
    }
}

/// Content of a subset archive.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSubset {
    pub kernel_urls: Vec<String>,
    /// Name of the metakernel inside the archive
    pub metakernel_file: String,
    metakernel: String,
}

impl KernelSubset {
    /// Read a subset archive: its `urls_*` list and its `.tm` metakernel.
    pub fn from_zip(bytes: &[u8]) -> Result<Self, PlanetaryError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let names: Vec<String> = archive.file_names().map(String::from).collect();

        let urls_file = names
            .iter()
            .find(|n| n.starts_with("urls_"))
            .ok_or_else(|| PlanetaryError::SpiceSubset("no urls_ file".into()))?;
        let metakernel_file = names
            .iter()
            .find(|n| n.to_lowercase().ends_with(".tm"))
            .ok_or_else(|| PlanetaryError::SpiceSubset("no metakernel".into()))?
            .clone();

        let mut urls = String::new();
        archive.by_name(urls_file)?.read_to_string(&mut urls)?;
        let mut metakernel = String::new();
        archive
            .by_name(&metakernel_file)?
            .read_to_string(&mut metakernel)?;

        Ok(KernelSubset {
            kernel_urls: urls.split_whitespace().map(String::from).collect(),
            metakernel_file,
            metakernel,
        })
    }

    /// Kernel names as `<folder>/<name>`.
    pub fn kernel_names(&self) -> Vec<String> {
        self.kernel_urls.iter().map(|u| kernel_name(u)).collect()
    }

    /// Local path of a kernel below `base`.
    pub fn local_path(base: &Utf8Path, url: &str) -> Utf8PathBuf {
        base.join(kernel_name(url))
    }

    pub fn kernel_files(&self, base: &Utf8Path) -> Vec<KernelFile> {
        self.kernel_urls
            .iter()
            .map(|url| KernelFile {
                url: url.clone(),
                path: Self::local_path(base, url),
            })
            .collect()
    }

    /// Download the kernels into `base` with the bounded worker pool.
    ///
    /// Return
    /// ----------
    /// * Per kernel: `true` when downloaded, `false` when already present and kept.
    pub fn download_kernels(
        &self,
        base: &Utf8Path,
        overwrite: bool,
    ) -> Result<Vec<(String, Result<bool, PlanetaryError>)>, PlanetaryError> {
        let files = self.kernel_files(base);
        let names: Vec<String> = files.iter().map(|f| f.to_string()).collect();
        let results = run_bounded(files, DEFAULT_WORKERS, "Kernels downloaded", move |file| {
            if file.path.exists() && !overwrite {
                info!("{} locally available.", file);
                return Ok(false);
            }
            url_retrieve(&file.url, &file.path, None)?;
            Ok(true)
        })?;
        Ok(names.into_iter().zip(results).collect())
    }

    /// Metakernel text with its data path pointing to `base`.
    pub fn metakernel_for(&self, base: &Utf8Path) -> String {
        self.metakernel
            .replace(METAKERNEL_DATA_PATH, &format!("'{base}'"))
    }

    /// Write the metakernel into `base`.
    pub fn write_metakernel(&self, base: &Utf8Path) -> Result<Utf8PathBuf, PlanetaryError> {
        let path = base.join(&self.metakernel_file);
        let folder = path.parent().unwrap_or(base);
        std::fs::create_dir_all(folder)?;
        std::fs::write(&path, self.metakernel_for(folder))?;
        Ok(path)
    }
}

/// Download the kernels of a time range and write the matching metakernel.
///
/// Arguments
/// -----------------
/// * `env`: HTTP environment.
/// * `storage_root`: the planetarypy storage root.
/// * `mission`, `start`, `stop`: see [`SubsetRequest::new`].
/// * `save_location`: kernel folder replacing `<storage_root>/spice_kernels/<mission>`.
///
/// Return
/// ----------
/// * Path of the metakernel. A kernel that fails to download is an error.
pub fn get_metakernel_and_files(
    env: &PlanetaryEnv,
    storage_root: &Utf8Path,
    mission: &str,
    start: &str,
    stop: Option<&str>,
    save_location: Option<&Utf8Path>,
) -> Result<Utf8PathBuf, PlanetaryError> {
    let subset = SubsetRequest::new(mission, start, stop)?.fetch(env)?;
    let base = save_location
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|| kernel_storage(storage_root, mission));
    for (_, result) in subset.download_kernels(&base, false)? {
        result?;
    }
    subset.write_metakernel(&base)
}

/// Names of the kernels covering a time range (one day after `start` by default).
pub fn list_kernels_for_day(
    env: &PlanetaryEnv,
    mission: &str,
    start: &str,
    stop: Option<&str>,
) -> Result<Vec<String>, PlanetaryError> {
    Ok(SubsetRequest::new(mission, start, stop)?
        .fetch(env)?
        .kernel_names())
}
