//! # Configuration document
//!
//! planetarypy keeps its state in one TOML file:
//!
//! ```toml
//! storage_root = "/data/planetary"
//!
//! [missions.mro.hirise.indexes.edr]
//! url = "https://hirise-pds.lpl.arizona.edu/PDS/INDEX/EDRCUMINDEX.LBL"
//! timestamp = "2024-01-02T03:04:05"
//! ```
//!
//! The file lives at `$PLANETARYPY_CONFIG` or `~/.planetarypy_config.toml`. Values are
//! addressed with dotted keys; a key not found verbatim is retried below `missions.`, so
//! `mro.ctx.calib_extension` and `missions.mro.ctx.calib_extension` are the same entry.
//!
//! A set of known mission / instrument / index entries ships with the crate and is merged
//! into the user file on initialization, without overwriting user values.
//!
//! ## First run
//! -----------------
//! [`Config::load`] fails with [`PlanetaryError::ConfigurationMissing`] when the file or its
//! `storage_root` is missing. [`Config::load_or_prompt`] asks for the storage root on the
//! terminal instead, and [`Config::init`] does the same non-interactively.
use std::fs::File;
use std::io::{BufRead, Write};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Deserializer};
use toml::{Table, Value};
use tracing::{debug, info};

use crate::constants::{CONFIG_ENV_VAR, CONFIG_FILE_NAME, INDEXES_SEGMENT, MISSIONS_ROOT};
use crate::pds::index_key::IndexKey;
use crate::planetary_errors::PlanetaryError;

static DEFAULT_CONFIG: &str = include_str!("data/planetarypy_config.toml");

/// The `url` / `timestamp` pair stored for every index.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IndexConfig {
    /// Label URL; empty for indexes whose URL is looked up dynamically
    #[serde(default)]
    pub url: String,
    /// ISO timestamp of the downloaded version, quoted or as a native TOML datetime
    #[serde(default, deserialize_with = "timestamp_text")]
    pub timestamp: Option<String>,
}

fn timestamp_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Datetime(datetime)) => Ok(Some(datetime.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "timestamp must be a string or a datetime, found {}",
            other.type_str()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    path: Utf8PathBuf,
    doc: Table,
    storage_root: Utf8PathBuf,
}

fn lookup<'a>(table: &'a Table, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

/// Add the entries of `defaults` missing from `target`, recursively. Returns whether anything changed.
fn merge_missing(target: &mut Table, defaults: &Table) -> bool {
    let mut changed = false;
    for (key, value) in defaults {
        match (target.get_mut(key), value) {
            (None, _) => {
                target.insert(key.clone(), value.clone());
                changed = true;
            }
            (Some(Value::Table(t)), Value::Table(d)) => changed |= merge_missing(t, d),
            _ => {}
        }
    }
    changed
}

fn table_keys(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_table)
        .map(|t| t.keys().cloned().collect())
        .unwrap_or_default()
}

impl Config {
    /// Location of the configuration file: `$PLANETARYPY_CONFIG`, else `~/.planetarypy_config.toml`.
    pub fn default_path() -> Result<Utf8PathBuf, PlanetaryError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Ok(Utf8PathBuf::from(path));
            }
        }
        let dirs = BaseDirs::new().ok_or_else(|| {
            PlanetaryError::ConfigurationMissing("no home directory found".into())
        })?;
        let home = Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf())
            .map_err(|p| PlanetaryError::Utf8PathError(p.display().to_string()))?;
        Ok(home.join(CONFIG_FILE_NAME))
    }

    /// Build a configuration from TOML text, as if read from `path`.
    pub fn from_toml(text: &str, path: &Utf8Path) -> Result<Self, PlanetaryError> {
        let doc: Table = text.parse()?;
        let storage_root = doc
            .get("storage_root")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(Utf8PathBuf::from)
            .ok_or_else(|| {
                PlanetaryError::ConfigurationMissing(format!("storage_root in {path}"))
            })?;
        Ok(Config {
            path: path.to_path_buf(),
            doc,
            storage_root,
        })
    }

    /// Read the configuration file.
    ///
    /// Return
    /// ----------
    /// * [`PlanetaryError::ConfigurationMissing`] when the file does not exist or has no
    ///   `storage_root`, a TOML error when it is malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, PlanetaryError> {
        if !path.exists() {
            return Err(PlanetaryError::ConfigurationMissing(path.to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        debug!("loaded configuration from {}", path);
        Self::from_toml(&text, path)
    }

    /// Create or complete the configuration file with a storage root.
    ///
    /// Existing entries are kept, the shipped defaults are merged in, the file is written
    /// and the storage root directory is created.
    pub fn init(path: &Utf8Path, storage_root: &Utf8Path) -> Result<Self, PlanetaryError> {
        let mut doc: Table = if path.exists() {
            std::fs::read_to_string(path)?.parse()?
        } else {
            Table::new()
        };
        doc.insert(
            "storage_root".into(),
            Value::String(storage_root.to_string()),
        );
        let mut config = Config {
            path: path.to_path_buf(),
            doc,
            storage_root: storage_root.to_path_buf(),
        };
        config.merge_defaults()?;
        config.save()?;
        std::fs::create_dir_all(storage_root)?;
        info!("configuration written to {}", path);
        Ok(config)
    }

    /// Load the configuration at [`Config::default_path`], asking for the storage root on
    /// the terminal when it is missing.
    pub fn load_or_prompt() -> Result<Self, PlanetaryError> {
        let path = Self::default_path()?;
        match Self::load(&path) {
            Err(PlanetaryError::ConfigurationMissing(_)) => {
                print!("Provide the path where all planetarypy data will be stored: ");
                std::io::stdout().flush()?;
                let mut answer = String::new();
                std::io::stdin().lock().read_line(&mut answer)?;
                let root = answer.trim();
                if root.is_empty() {
                    return Err(PlanetaryError::ConfigurationMissing(
                        "no storage root provided".into(),
                    ));
                }
                Self::init(&path, Utf8Path::new(root))
            }
            other => other,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn storage_root(&self) -> &Utf8Path {
        &self.storage_root
    }

    /// Value at a dotted key.
    ///
    /// Arguments
    /// -----------------
    /// * `key`: e.g. `missions.mro.ctx.indexes.edr.url`, or the same without `missions.`.
    ///
    /// Return
    /// ----------
    /// * The value, or [`PlanetaryError::KeyNotFound`].
    pub fn get_value(&self, key: &str) -> Result<&Value, PlanetaryError> {
        lookup(&self.doc, key)
            .or_else(|| {
                if key.starts_with(MISSIONS_ROOT) {
                    None
                } else {
                    lookup(&self.doc, &format!("{MISSIONS_ROOT}.{key}"))
                }
            })
            .ok_or_else(|| PlanetaryError::KeyNotFound(key.to_string()))
    }

    /// String at a dotted key, `default` when absent or not a string.
    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.get_value(key)
            .ok()
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Boolean at a dotted key, `default` when absent or not a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_value(key)
            .ok()
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Set a value at a dotted key, creating the intermediate tables.
    ///
    /// Arguments
    /// -----------------
    /// * `key`: the full dotted key.
    /// * `value`: anything convertible to a TOML value.
    /// * `save`: write the file (and flush it to disk) before returning.
    ///
    /// Return
    /// ----------
    /// * [`PlanetaryError::KeyFormat`] for empty segments or when a segment is not a table.
    pub fn set_value(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        save: bool,
    ) -> Result<(), PlanetaryError> {
        let bad = || PlanetaryError::KeyFormat(key.to_string());
        let parts: Vec<&str> = key.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(bad());
        }
        let (last, parents) = parts.split_last().ok_or_else(bad)?;

        let mut table = &mut self.doc;
        for part in parents {
            table = table
                .entry(part.to_string())
                .or_insert_with(|| Value::Table(Table::new()))
                .as_table_mut()
                .ok_or_else(bad)?;
        }
        let value = value.into();
        if key == "storage_root" {
            if let Some(root) = value.as_str() {
                self.storage_root = Utf8PathBuf::from(root);
            }
        }
        table.insert(last.to_string(), value);

        if save {
            self.save()?;
        }
        Ok(())
    }

    /// Write the document to its file and flush it to disk.
    pub fn save(&self) -> Result<(), PlanetaryError> {
        let text = toml::to_string_pretty(&self.doc)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&self.path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        debug!("configuration saved to {}", self.path);
        Ok(())
    }

    /// Typed view of an index entry.
    pub fn index_config(&self, key: &IndexKey) -> Result<IndexConfig, PlanetaryError> {
        let value = self.get_value(&key.canonical())?;
        Ok(value.clone().try_into()?)
    }

    /// Add the shipped mission entries missing from this configuration.
    ///
    /// Return
    /// ----------
    /// * Whether the document changed. Nothing is written to disk.
    pub fn merge_defaults(&mut self) -> Result<bool, PlanetaryError> {
        let defaults: Table = DEFAULT_CONFIG.parse()?;
        Ok(merge_missing(&mut self.doc, &defaults))
    }

    /// Configured missions.
    pub fn list_missions(&self) -> Vec<String> {
        table_keys(self.doc.get(MISSIONS_ROOT))
    }

    /// Configured instruments of a mission.
    pub fn list_instruments(&self, mission: &str) -> Vec<String> {
        table_keys(lookup(&self.doc, &format!("{MISSIONS_ROOT}.{mission}")))
    }

    /// Configured index names of an instrument.
    ///
    /// Arguments
    /// -----------------
    /// * `instrument`: dotted `mission.instrument`, e.g. `cassini.iss`.
    pub fn list_indexes(&self, instrument: &str) -> Vec<String> {
        let instrument = instrument
            .strip_prefix(&format!("{MISSIONS_ROOT}."))
            .unwrap_or(instrument);
        table_keys(lookup(
            &self.doc,
            &format!("{MISSIONS_ROOT}.{instrument}.{INDEXES_SEGMENT}"),
        ))
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    const DOC: &str = r#"
storage_root = "/data/planetary"

[missions.mro.ctx]
calib_extension = ".cal.cub"
proc_with_volume = true

[missions.mro.ctx.indexes.edr]
url = ""

[missions.mro.hirise.indexes.edr]
url = "https://hirise-pds.lpl.arizona.edu/PDS/INDEX/EDRCUMINDEX.LBL"
timestamp = "2024-01-02T03:04:05"
"#;

    fn config() -> Config {
        Config::from_toml(DOC, Utf8Path::new("/tmp/none.toml")).unwrap()
    }

    #[test]
    fn test_get_value_with_and_without_root() {
        let config = config();
        assert_eq!(config.storage_root(), Utf8Path::new("/data/planetary"));
        assert_eq!(
            config.get_value("missions.mro.ctx.calib_extension").unwrap().as_str(),
            Some(".cal.cub")
        );
        assert_eq!(
            config.get_value("mro.ctx.calib_extension").unwrap().as_str(),
            Some(".cal.cub")
        );
        assert_eq!(
            config.get_value("mro.ctx.nothing"),
            Err(PlanetaryError::KeyNotFound("mro.ctx.nothing".into()))
        );
        assert!(config.get_bool("mro.ctx.proc_with_volume", false));
        assert!(!config.get_bool("mro.ctx.missing_flag", false));
        assert_eq!(config.get_str("mro.ctx.preproc_root", "none"), "none");
    }

    #[test]
    fn test_index_config() {
        let config = config();
        let hirise = config
            .index_config(&IndexKey::parse("mro.hirise.edr").unwrap())
            .unwrap();
        assert!(hirise.url.ends_with("EDRCUMINDEX.LBL"));
        assert_eq!(hirise.timestamp.as_deref(), Some("2024-01-02T03:04:05"));

        let ctx = config
            .index_config(&IndexKey::parse("mro.ctx.edr").unwrap())
            .unwrap();
        assert_eq!(ctx, IndexConfig::default());
    }

    #[test]
    fn test_native_datetime_timestamp() {
        let doc = "storage_root = \"/data\"\n\n[missions.mro.ctx.indexes.edr]\nurl = \"\"\ntimestamp = 2024-01-01T00:00:00\n\n\
[missions.mro.hirise.indexes.edr]\nurl = \"\"\ntimestamp = 2024-01-01T00:00:00Z\n\n\
[missions.cassini.iss.indexes.index]\nurl = \"\"\ntimestamp = 3\n";
        let config = Config::from_toml(doc, Utf8Path::new("/tmp/none.toml")).unwrap();
        let ctx = config
            .index_config(&IndexKey::parse("mro.ctx.edr").unwrap())
            .unwrap();
        assert_eq!(ctx.timestamp.as_deref(), Some("2024-01-01T00:00:00"));
        let hirise = config
            .index_config(&IndexKey::parse("mro.hirise.edr").unwrap())
            .unwrap();
        assert_eq!(hirise.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert!(matches!(
            config.index_config(&IndexKey::parse("cassini.iss.index").unwrap()),
            Err(PlanetaryError::TomlDeError(_))
        ));
    }

    #[test]
    fn test_listings() {
        let config = config();
        assert_eq!(config.list_missions(), vec!["mro"]);
        assert_eq!(config.list_instruments("mro"), vec!["ctx", "hirise"]);
        assert_eq!(config.list_indexes("mro.hirise"), vec!["edr"]);
        assert_eq!(config.list_indexes("missions.mro.hirise"), vec!["edr"]);
        assert!(config.list_indexes("cassini.iss").is_empty());
    }

    #[test]
    fn test_set_value_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("config.toml");
        let mut config = Config::from_toml(DOC, &path).unwrap();

        config
            .set_value("missions.cassini.iss.indexes.index.timestamp", "2020-01-01T00:00:00", true)
            .unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(
            reloaded.get_value("cassini.iss.indexes.index.timestamp").unwrap().as_str(),
            Some("2020-01-01T00:00:00")
        );

        assert_eq!(
            config.set_value("missions.mro.ctx.calib_extension.sub", 1i64, false),
            Err(PlanetaryError::KeyFormat("missions.mro.ctx.calib_extension.sub".into()))
        );
        assert_eq!(
            config.set_value("a..b", 1i64, false),
            Err(PlanetaryError::KeyFormat("a..b".into()))
        );
    }

    #[test]
    fn test_merge_defaults_keeps_user_values() {
        let mut config = config();
        assert!(config.merge_defaults().unwrap());
        assert!(!config.merge_defaults().unwrap());
        // user value untouched
        assert!(config.get_bool("mro.ctx.proc_with_volume", false));
        // shipped entries added
        assert!(config.list_instruments("cassini").contains(&"iss".to_string()));
        assert_eq!(
            config
                .index_config(&IndexKey::parse("mro.hirise.edr").unwrap())
                .unwrap()
                .timestamp
                .as_deref(),
            Some("2024-01-02T03:04:05")
        );
    }

    #[test]
    fn test_missing_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("absent.toml");
        assert!(matches!(
            Config::load(&path),
            Err(PlanetaryError::ConfigurationMissing(_))
        ));
        assert!(matches!(
            Config::from_toml("[missions]\n", &path),
            Err(PlanetaryError::ConfigurationMissing(_))
        ));

        let root = Utf8Path::from_path(dir.path()).unwrap().join("storage");
        let config = Config::init(&path, &root).unwrap();
        assert!(root.exists());
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
