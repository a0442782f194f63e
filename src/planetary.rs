//! # Planetary: configuration, network environment and index access
//!
//! [`Planetary`] is the entry point of the crate. It owns the loaded [`Config`] and the
//! shared [`PlanetaryEnv`], and exposes the index workflows:
//!
//! - [`Planetary::get_index`]: make sure an index is downloaded and cached, then read it,
//! - [`Planetary::find_missions`], [`Planetary::find_instruments`],
//!   [`Planetary::find_indexes`]: what the configuration knows about,
//! - [`Planetary::ctx_edr_index`]: the CTX EDR index, read once and shared.
//!
//! ## Typical usage
//!
//! ```rust,no_run
//! use planetarypy::planetary::Planetary;
//!
//! let mut planetary = Planetary::new().unwrap();
//! let table = planetary.get_index("cassini.iss", "index", false, true).unwrap();
//! println!("{}", table.display_head(5));
//! ```
//!
//! ## See also
//! ------------
//! * [`Index`] – One managed index.
//! * [`Config`] – The configuration document.
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::constants::INDEXES_SEGMENT;
use crate::ctx::{CtxConfig, EdrIndex};
use crate::env_state::PlanetaryEnv;
use crate::pds::index::Index;
use crate::pds::table::IndexTable;
use crate::planetary_errors::PlanetaryError;

#[derive(Debug, Clone)]
pub struct Planetary {
    config: Config,
    env: PlanetaryEnv,
    ctx_edr_index: Option<Arc<EdrIndex>>,
}

impl Planetary {
    /// Load the user configuration, asking for the storage root on first use.
    pub fn new() -> Result<Self, PlanetaryError> {
        Ok(Self::with_config(Config::load_or_prompt()?))
    }

    /// Use an already loaded configuration.
    pub fn with_config(config: Config) -> Self {
        Planetary {
            config,
            env: PlanetaryEnv::new(),
            ctx_edr_index: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn env(&self) -> &PlanetaryEnv {
        &self.env
    }

    /// Set up the manager of one index, see [`Index::new`].
    pub fn index(
        &mut self,
        key: &str,
        url: Option<&str>,
        check_update: bool,
    ) -> Result<Index, PlanetaryError> {
        Index::new(key, url, check_update, &mut self.config, &self.env)
    }

    /// Get a PDS index as a table.
    ///
    /// The index is downloaded when its table is not on disk or when `refresh` is set, and
    /// the columnar cache is built when missing or after a download. With `check_update`, a
    /// newer remote version is reported in the log (a failed check is only a warning).
    ///
    /// Arguments
    /// -----------------
    /// * `instr`: dotted instrument key, e.g. `cassini.iss`; may carry the index name.
    /// * `index_name`: e.g. `index`; empty when `instr` already names the index.
    /// * `refresh`: download even if the index is on disk.
    /// * `check_update`: allow network requests for the latest release and remote timestamp.
    ///
    /// Return
    /// ----------
    /// * The index table read from the columnar cache.
    pub fn get_index(
        &mut self,
        instr: &str,
        index_name: &str,
        refresh: bool,
        check_update: bool,
    ) -> Result<IndexTable, PlanetaryError> {
        let key = if index_name.is_empty() {
            instr.to_string()
        } else {
            format!("{instr}.{INDEXES_SEGMENT}.{index_name}")
        };
        let mut index = self.index(&key, None, check_update)?;

        let downloaded = if refresh || !index.local_table_path().exists() {
            index.download(&mut self.config)?;
            true
        } else {
            false
        };

        if check_update {
            match index.update_available() {
                Ok(true) => warn!(
                    "An updated index is available for {}. Call `get_index` with refresh to get it.",
                    index.key()
                ),
                Ok(false) => {}
                Err(e) => warn!(key = %index.key(), error = %e, "could not check for index updates"),
            }
        }

        if downloaded || index.parquet_is_stale()? {
            index.convert_to_parquet()?;
        }
        info!("Reading {}", index.local_parq_path());
        index.parquet()
    }

    /// Configured missions.
    pub fn find_missions(&self) -> Vec<String> {
        self.config.list_missions()
    }

    /// Configured instruments of a mission, e.g. `cassini`.
    pub fn find_instruments(&self, mission: &str) -> Vec<String> {
        self.config.list_instruments(mission)
    }

    /// Configured indexes of an instrument, e.g. `cassini.iss`.
    pub fn find_indexes(&self, instrument: &str) -> Vec<String> {
        self.config.list_indexes(instrument)
    }

    /// The `mro.ctx` settings.
    pub fn ctx_config(&self) -> Result<CtxConfig, PlanetaryError> {
        CtxConfig::from_config(&self.config)
    }

    /// The CTX EDR index, read on first use and shared afterwards.
    ///
    /// With `refresh` the index is downloaded and read again. `check_update` is passed to
    /// [`Planetary::get_index`].
    pub fn ctx_edr_index(
        &mut self,
        refresh: bool,
        check_update: bool,
    ) -> Result<Arc<EdrIndex>, PlanetaryError> {
        if let (Some(index), false) = (&self.ctx_edr_index, refresh) {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(EdrIndex::load(self, refresh, check_update)?);
        self.ctx_edr_index = Some(Arc::clone(&index));
        Ok(index)
    }
}

#[cfg(test)]
mod planetary_test {
    use super::*;
    use crate::pds::table::Cell;
    use camino::Utf8Path;

    const LABEL: &str = r#"PDS_VERSION_ID = PDS3
^INDEX_TABLE = "CUMINDEX.TAB"
OBJECT = INDEX_TABLE
  OBJECT = COLUMN
    NAME = VOLUME_ID
    START_BYTE = 2
    BYTES = 9
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = PRODUCT_ID
    START_BYTE = 14
    BYTES = 26
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = IMAGE_TIME
    START_BYTE = 42
    BYTES = 23
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = LINE_SAMPLES
    START_BYTE = 66
    BYTES = 4
  END_OBJECT = COLUMN
END_OBJECT = INDEX_TABLE
END
"#;

    const TABLE: &str = "\"MROX_0001\",\"P01_001472_1747_XI_05S146W\",2006-11-08T04:49:13.952,5056\r\n\
\"MROX_0002\",\"P02_001920_1830_XI_03N104W\",2006-12-14T01:02:03.000,2528\r\n";

    fn planetary(root: &Utf8Path) -> Planetary {
        let text = format!(
            "storage_root = \"{}\"\n\n[missions.mro.ctx.indexes.edr]\nurl = \"\"\ntimestamp = \"2024-01-01T00:00:00\"\n\n[missions.cassini.iss.indexes.index]\nurl = \"https://host/ISS/INDEX.LBL\"\n",
            root.join("storage")
        );
        Planetary::with_config(Config::from_toml(&text, &root.join("config.toml")).unwrap())
    }

    fn place_local_index(root: &Utf8Path) {
        let dir = root.join("storage/mro/ctx/indexes/edr");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("CUMINDEX.LBL"), LABEL).unwrap();
        std::fs::write(dir.join("CUMINDEX.TAB"), TABLE).unwrap();
    }

    #[test]
    fn test_find() {
        let dir = tempfile::tempdir().unwrap();
        let p = planetary(Utf8Path::from_path(dir.path()).unwrap());
        assert_eq!(p.find_missions(), vec!["cassini", "mro"]);
        assert_eq!(p.find_instruments("mro"), vec!["ctx"]);
        assert_eq!(p.find_indexes("cassini.iss"), vec!["index"]);
        assert!(p.find_indexes("nope.nothing").is_empty());
    }

    #[test]
    fn test_get_local_index_offline() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        place_local_index(root);
        let mut p = planetary(root);

        let table = p.get_index("mro.ctx", "edr", false, false).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(
            table.columns(),
            ["VOLUME_ID", "PRODUCT_ID", "IMAGE_TIME", "LINE_SAMPLES"]
        );
        assert_eq!(table.get(1, "LINE_SAMPLES"), Some(&Cell::Integer(2528)));
        assert!(matches!(table.get(0, "IMAGE_TIME"), Some(Cell::Time(_))));
        assert!(root
            .join("storage/mro/ctx/indexes/edr/CUMINDEX.parq")
            .exists());

        let index = p.ctx_edr_index(false, false).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.volume("P02_001920_1830_XI_03N104W").unwrap(), "mrox_0002");
        assert!(Arc::ptr_eq(&index, &p.ctx_edr_index(false, false).unwrap()));
    }

    #[test]
    fn test_cache_rebuilt_when_table_changes() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        place_local_index(root);
        let mut p = planetary(root);
        assert_eq!(p.get_index("mro.ctx", "edr", false, false).unwrap().n_rows(), 2);

        let local = root.join("storage/mro/ctx/indexes/edr");
        let first_row = TABLE.lines().next().unwrap();
        std::fs::write(local.join("CUMINDEX.TAB"), format!("{first_row}\n")).unwrap();
        // age the cache so the rewritten table is newer
        let table_mtime = std::fs::metadata(local.join("CUMINDEX.TAB"))
            .unwrap()
            .modified()
            .unwrap();
        std::fs::File::options()
            .write(true)
            .open(local.join("CUMINDEX.parq"))
            .unwrap()
            .set_modified(table_mtime - std::time::Duration::from_secs(60))
            .unwrap();

        let table = p.get_index("mro.ctx", "edr", false, false).unwrap();
        assert_eq!(table.n_rows(), 1);
        assert_eq!(table.get(0, "LINE_SAMPLES"), Some(&Cell::Integer(5056)));

        // an up to date cache is read as is
        let index = p.index("mro.ctx.edr", None, false).unwrap();
        assert!(!index.parquet_is_stale().unwrap());
    }

    #[test]
    fn test_missing_index_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = planetary(Utf8Path::from_path(dir.path()).unwrap());
        assert!(matches!(
            p.get_index("mro.ctx", "edr", false, false),
            Err(PlanetaryError::MissingLocalLabel(_))
        ));
        assert!(matches!(
            p.get_index("cassini.iss", "", false, false),
            Err(PlanetaryError::KeyFormat(_))
        ));
    }
}
