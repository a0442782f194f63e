//! # PDS index manager
//!
//! An [`Index`] is one PDS index table of one instrument, identified by its dotted key
//! (e.g. `missions.mro.hirise.indexes.edr`). It knows:
//!
//! - where the index label lives remotely (configured, or resolved from the latest release
//!   for instruments with a [`LatestRelease`](crate::pds::dynamic_url::LatestRelease)
//!   strategy),
//! - where the label, the table and the columnar cache are stored locally,
//! - which version was last downloaded (`timestamp`), and whether a newer one exists.
//!
//! ## Local layout
//! -----------------
//! ```text
//! <storage_root>/<mission>/<instrument>/indexes/<name>/
//! ├── EDRCUMINDEX.LBL
//! ├── EDRCUMINDEX.TAB
//! └── EDRCUMINDEX.parq
//! ```
//!
//! All local paths are pure functions of the key, the storage root and the label file name.
//!
//! ## Configuration
//! -----------------
//! Methods that record a new timestamp take the [`Config`] explicitly; the timestamp is
//! written to disk right away.
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{Config, IndexConfig};
use crate::constants::CACHE_EXTENSION;
use crate::download::url_retrieve;
use crate::env_state::PlanetaryEnv;
use crate::pds::dynamic_url::dynamic_url_for;
use crate::pds::hirise::fix_hirise_edrcumindex;
use crate::pds::index_key::IndexKey;
use crate::pds::label::IndexLabel;
use crate::pds::parquet_cache::{read_parquet, write_parquet};
use crate::pds::table::IndexTable;
use crate::planetary_errors::PlanetaryError;
use crate::time::{isoformat, parse_stored_timestamp};

/// Where an index stands, derived from local files and known timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No URL and nothing on disk
    Unresolved,
    /// URL known, label or table not downloaded
    ResolvedNotDownloaded,
    /// On disk, remote version not checked (or no local timestamp)
    DownloadedStaleUnknown,
    /// On disk and at least as recent as the remote version
    DownloadedFresh,
    /// On disk, a newer remote version exists
    DownloadedStale,
}

/// Replace the extension of the last path segment of a file name or URL.
fn with_extension(name: &str, extension: &str) -> String {
    let segment_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[segment_start..].rfind('.') {
        Some(dot) => format!("{}.{extension}", &name[..segment_start + dot]),
        None => format!("{name}.{extension}"),
    }
}

fn first_local_label(dir: &Utf8Path) -> Option<String> {
    let mut labels: Vec<String> = dir
        .read_dir_utf8()
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string())
        .filter(|name| name.ends_with(".lbl") || name.ends_with(".LBL"))
        .collect();
    labels.sort();
    labels.into_iter().next()
}

fn file_mtime(path: &Utf8Path) -> Result<NaiveDateTime, PlanetaryError> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified).naive_utc())
}

#[derive(Debug, Clone)]
pub struct Index {
    key: IndexKey,
    url: Option<String>,
    check_update: bool,
    storage_root: Utf8PathBuf,
    label_filename: String,
    timestamp: Option<NaiveDateTime>,
    remote_timestamp: OnceCell<NaiveDateTime>,
    env: PlanetaryEnv,
}

impl Index {
    /// Set up the manager of one index.
    ///
    /// Arguments
    /// -----------------
    /// * `key`: dotted key with index name, e.g. `mro.hirise.edr` or
    ///   `missions.mro.hirise.indexes.edr`.
    /// * `url`: label URL overriding the configured one.
    /// * `check_update`: allow network lookups of the latest release when the configured
    ///   URL is empty.
    /// * `config`: the configuration; a timestamp derived from a local label is stored in it.
    /// * `env`: network access.
    ///
    /// Return
    /// ----------
    /// * The index, or
    ///   - [`PlanetaryError::KeyFormat`] for a key without index name,
    ///   - [`PlanetaryError::KeyNotFound`] for an unknown key and no `url`,
    ///   - [`PlanetaryError::NoDynamicUrl`] when the URL must be looked up but the
    ///     instrument has no lookup strategy,
    ///   - [`PlanetaryError::MissingLocalLabel`] when no URL is known and no label is on disk.
    pub fn new(
        key: &str,
        url: Option<&str>,
        check_update: bool,
        config: &mut Config,
        env: &PlanetaryEnv,
    ) -> Result<Self, PlanetaryError> {
        let key = IndexKey::parse(key)?;
        if key.name().is_none() {
            return Err(PlanetaryError::KeyFormat(key.canonical()));
        }

        let configured = match config.index_config(&key) {
            Ok(c) => c,
            Err(PlanetaryError::KeyNotFound(_)) if url.is_some() => IndexConfig::default(),
            Err(e) => return Err(e),
        };

        let url = match url {
            Some(u) => Some(u.to_string()),
            None if !configured.url.is_empty() => Some(configured.url.clone()),
            None if check_update => {
                let strategy = dynamic_url_for(&key.instrument_key())
                    .ok_or_else(|| PlanetaryError::NoDynamicUrl(key.instrument_key()))?;
                Some(strategy.latest_index_label_url(env)?)
            }
            None => None,
        };

        let storage_root = config.storage_root().to_path_buf();
        let local_dir = key.local_dir(&storage_root);
        let label_filename = match &url {
            Some(u) => u.rsplit('/').next().unwrap_or(u).to_string(),
            None => first_local_label(&local_dir)
                .ok_or_else(|| PlanetaryError::MissingLocalLabel(local_dir.to_string()))?,
        };

        let mut index = Index {
            key,
            url,
            check_update,
            storage_root,
            label_filename,
            timestamp: None,
            remote_timestamp: OnceCell::new(),
            env: env.clone(),
        };

        index.timestamp = configured
            .timestamp
            .as_deref()
            .and_then(parse_stored_timestamp);
        if index.timestamp.is_none() && index.local_label_path().exists() {
            index.timestamp = Some(file_mtime(&index.local_label_path())?);
            index.update_timestamp(config)?;
        }
        debug!(key = %index.key, url = ?index.url, timestamp = ?index.timestamp, "index ready");
        Ok(index)
    }

    pub fn key(&self) -> &IndexKey {
        &self.key
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn check_update(&self) -> bool {
        self.check_update
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    pub fn isotimestamp(&self) -> Option<String> {
        self.timestamp.as_ref().map(isoformat)
    }

    pub fn mission(&self) -> &str {
        self.key.mission()
    }

    pub fn instrument(&self) -> &str {
        self.key.instrument()
    }

    pub fn index_name(&self) -> &str {
        self.key.name().unwrap_or_default()
    }

    pub fn label_filename(&self) -> &str {
        &self.label_filename
    }

    /// Whether the label extension is upper case, which decides the table extension.
    pub fn is_upper(&self) -> bool {
        self.label_filename
            .rsplit('.')
            .next()
            .map(|ext| ext.chars().all(|c| !c.is_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn tab_extension(&self) -> &'static str {
        if self.is_upper() {
            "TAB"
        } else {
            "tab"
        }
    }

    pub fn table_filename(&self) -> String {
        with_extension(&self.label_filename, self.tab_extension())
    }

    /// Table URL, the label URL with the table extension.
    pub fn table_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(|u| with_extension(u, self.tab_extension()))
    }

    pub fn local_dir(&self) -> Utf8PathBuf {
        self.key.local_dir(&self.storage_root)
    }

    pub fn local_label_path(&self) -> Utf8PathBuf {
        self.local_dir().join(&self.label_filename)
    }

    pub fn local_table_path(&self) -> Utf8PathBuf {
        self.local_dir().join(self.table_filename())
    }

    pub fn local_parq_path(&self) -> Utf8PathBuf {
        self.local_dir()
            .join(with_extension(&self.table_filename(), CACHE_EXTENSION))
    }

    fn require_url(&self) -> Result<&str, PlanetaryError> {
        self.url
            .as_deref()
            .ok_or_else(|| PlanetaryError::KeyNotFound(self.key.field("url")))
    }

    /// Modification time of the remote label.
    ///
    /// One `HEAD` request is sent the first time; later calls reuse the answer. A failed
    /// request is not remembered.
    pub fn remote_timestamp(&self) -> Result<NaiveDateTime, PlanetaryError> {
        self.remote_timestamp
            .get_or_try_init(|| {
                let url = self.require_url()?;
                self.env.remote_timestamp(url)
            })
            .copied()
    }

    /// Whether a newer index exists remotely. An index never downloaded always needs one,
    /// and no request is made in that case.
    pub fn update_available(&self) -> Result<bool, PlanetaryError> {
        match self.timestamp {
            None => Ok(true),
            Some(local) => Ok(self.remote_timestamp()? > local),
        }
    }

    /// Current state, without network access.
    pub fn state(&self) -> IndexState {
        let on_disk = self.local_label_path().exists() && self.local_table_path().exists();
        if !on_disk {
            return if self.url.is_some() {
                IndexState::ResolvedNotDownloaded
            } else {
                IndexState::Unresolved
            };
        }
        match (self.timestamp, self.remote_timestamp.get()) {
            (Some(local), Some(remote)) if *remote > local => IndexState::DownloadedStale,
            (Some(_), Some(_)) => IndexState::DownloadedFresh,
            _ => IndexState::DownloadedStaleUnknown,
        }
    }

    /// Store the current timestamp under `<key>.timestamp` and write the configuration.
    pub fn update_timestamp(&self, config: &mut Config) -> Result<(), PlanetaryError> {
        if let Some(iso) = self.isotimestamp() {
            config.set_value(&self.key.field("timestamp"), iso, true)?;
        }
        Ok(())
    }

    /// Download the label and the table, then record the remote timestamp.
    ///
    /// The columnar cache is not rebuilt here, see [`Index::convert_to_parquet`]. Files
    /// already downloaded are left in place if a later step fails.
    pub fn download(&mut self, config: &mut Config) -> Result<(), PlanetaryError> {
        let label_url = self.require_url()?.to_string();
        let table_url = with_extension(&label_url, self.tab_extension());
        std::fs::create_dir_all(self.local_dir())?;

        info!("Downloading {}", label_url);
        url_retrieve(&label_url, &self.local_label_path(), None)?;
        info!("Downloading {}", table_url);
        url_retrieve(&table_url, &self.local_table_path(), None)?;
        if self.needs_hirise_repair() {
            self.repair_hirise_table()?;
        }
        info!(
            "Downloaded {} and {}",
            self.local_label_path(),
            self.local_table_path()
        );

        self.timestamp = Some(self.remote_timestamp()?);
        self.update_timestamp(config)
    }

    /// The HiRISE EDR cumulative index ships with rows that overflow their columns.
    fn needs_hirise_repair(&self) -> bool {
        self.key.mission() == "mro"
            && self.key.instrument() == "hirise"
            && self.key.name() == Some("edr")
    }

    /// Replace the downloaded table with its repaired copy.
    fn repair_hirise_table(&self) -> Result<(), PlanetaryError> {
        let table = self.local_table_path();
        let fixed = table.with_extension("fixed");
        fix_hirise_edrcumindex(&table, &fixed)?;
        std::fs::rename(&fixed, &table)?;
        Ok(())
    }

    pub fn label(&self) -> Result<IndexLabel, PlanetaryError> {
        IndexLabel::from_path(&self.local_label_path())
    }

    pub fn read_index_data(&self, convert_times: bool) -> Result<IndexTable, PlanetaryError> {
        self.label()?.read_index_data(convert_times)
    }

    /// Rebuild the columnar cache from the local label and table.
    pub fn convert_to_parquet(&self) -> Result<(), PlanetaryError> {
        info!("Reading index {} for conversion to parquet", self.key);
        let mut table = self.read_index_data(true)?;
        table.convert_dtypes();
        write_parquet(&table, &self.local_parq_path())
    }

    /// Whether the columnar cache is missing or older than the local label or table.
    pub fn parquet_is_stale(&self) -> Result<bool, PlanetaryError> {
        let parq = self.local_parq_path();
        if !parq.exists() {
            return Ok(true);
        }
        let cached = file_mtime(&parq)?;
        for source in [self.local_label_path(), self.local_table_path()] {
            if source.exists() && file_mtime(&source)? > cached {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Read the columnar cache.
    pub fn parquet(&self) -> Result<IndexTable, PlanetaryError> {
        read_parquet(&self.local_parq_path())
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Key: {}", self.key)?;
        writeln!(f, "URL: {}", self.url.as_deref().unwrap_or(""))?;
        match &self.timestamp {
            Some(t) => writeln!(f, "Timestamp: {}", isoformat(t)),
            None => writeln!(f, "Timestamp: None"),
        }
    }
}
