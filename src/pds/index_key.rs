//! Dotted keys identifying PDS indexes.
//!
//! Users address an index with a short key such as `mro.ctx.edr`. Inside the
//! configuration document the same index lives under
//! `missions.mro.ctx.indexes.edr`. [`IndexKey`] accepts both spellings and produces the
//! canonical one:
//!
//! ```text
//! cassini.iss                      -> missions.cassini.iss.indexes
//! mro.ctx.edr                      -> missions.mro.ctx.indexes.edr
//! missions.mro.ctx.indexes.edr     -> missions.mro.ctx.indexes.edr
//! ```
use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};

use crate::constants::{INDEXES_SEGMENT, MISSIONS_ROOT};
use crate::planetary_errors::PlanetaryError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    mission: String,
    instrument: String,
    name: Option<String>,
}

impl IndexKey {
    /// Canonicalize a dotted key.
    ///
    /// Arguments
    /// -----------------
    /// * `key`: `mission.instrument[.name]`, optionally prefixed by `missions.` and with
    ///   `indexes` before the name.
    ///
    /// Return
    /// ----------
    /// * The parsed key, or [`PlanetaryError::KeyFormat`] for empty segments, fewer than two
    ///   meaningful segments, or more than five tokens overall.
    pub fn parse(key: &str) -> Result<Self, PlanetaryError> {
        let bad = || PlanetaryError::KeyFormat(key.to_string());

        let tokens: Vec<&str> = key.split('.').collect();
        if tokens.len() > 5 || tokens.iter().any(|t| t.trim().is_empty()) {
            return Err(bad());
        }

        let mut rest: &[&str] = &tokens;
        if rest.first() == Some(&MISSIONS_ROOT) {
            rest = &rest[1..];
        }
        let meaningful: Vec<&str> = match rest {
            [m, i, idx, tail @ ..] if *idx == INDEXES_SEGMENT => {
                [*m, *i].into_iter().chain(tail.iter().copied()).collect()
            }
            _ => rest.to_vec(),
        };

        match meaningful.as_slice() {
            [mission, instrument] => Ok(IndexKey {
                mission: mission.to_string(),
                instrument: instrument.to_string(),
                name: None,
            }),
            [mission, instrument, name] => Ok(IndexKey {
                mission: mission.to_string(),
                instrument: instrument.to_string(),
                name: Some(name.to_string()),
            }),
            _ => Err(bad()),
        }
    }

    pub fn mission(&self) -> &str {
        &self.mission
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Index name, e.g. `edr`, when the key designates a single index.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `mission.instrument`, the key used for dynamic URL lookups.
    pub fn instrument_key(&self) -> String {
        format!("{}.{}", self.mission, self.instrument)
    }

    /// Canonical dotted form, e.g. `missions.mro.ctx.indexes.edr`.
    pub fn canonical(&self) -> String {
        let base = format!(
            "{MISSIONS_ROOT}.{}.{}.{INDEXES_SEGMENT}",
            self.mission, self.instrument
        );
        match &self.name {
            Some(name) => format!("{base}.{name}"),
            None => base,
        }
    }

    /// Dotted key of one field below this key, e.g. `….indexes.edr.timestamp`.
    pub fn field(&self, field: &str) -> String {
        format!("{}.{field}", self.canonical())
    }

    /// Local storage directory: `<root>/<mission>/<instrument>/indexes[/<name>]`.
    pub fn local_dir(&self, storage_root: &Utf8Path) -> Utf8PathBuf {
        let dir = storage_root
            .join(&self.mission)
            .join(&self.instrument)
            .join(INDEXES_SEGMENT);
        match &self.name {
            Some(name) => dir.join(name),
            None => dir,
        }
    }
}

impl FromStr for IndexKey {
    type Err = PlanetaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexKey::parse(s)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}
