//! # Dynamic index URLs
//!
//! Some instruments publish a new cumulative index with every data release, each release in
//! its own volume folder. Their configured index URL is left empty and the current one is
//! looked up on the archive's volume listing instead.
//!
//! | instrument  | listing                               | label below the release folder |
//! |-------------|---------------------------------------|--------------------------------|
//! | `mro.ctx`   | [`CTX_VOLUMES_URL`]                   | `index/cumindex.lbl`           |
//! | `lro.lroc`  | [`LROC_VOLUMES_URL`]                  | `INDEX/CUMINDEX.LBL`           |
//!
//! Parsing the listing is kept separate from fetching it, so the release selection can be
//! checked on a saved page.
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::constants::{CTX_VOLUMES_URL, LROC_VOLUMES_URL};
use crate::env_state::PlanetaryEnv;
use crate::planetary_errors::PlanetaryError;

static HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)href\s*=\s*"([^"]+)""#).expect("valid href regex")
});

static LROC_VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^LROLRC_(\d{4})[A-Z]?/$").expect("valid LROC volume regex"));

/// Sub-folder links of an HTML directory listing, in page order, without duplicates.
///
/// Parent links, absolute links and sorting links (`?C=N;O=D`) are skipped.
pub fn listing_folders(html: &str) -> Vec<String> {
    let mut folders: Vec<String> = Vec::new();
    for cap in HREF.captures_iter(html) {
        let link = &cap[1];
        let skip = !link.ends_with('/')
            || link.starts_with('?')
            || link.starts_with('/')
            || link.starts_with("..")
            || link.contains("://");
        if !skip && !folders.iter().any(|f| f == link) {
            folders.push(link.to_string());
        }
    }
    folders
}

/// Lookup of the most recent release of an instrument's index.
pub trait LatestRelease: Send + Sync {
    /// Page listing the release volumes.
    fn volumes_url(&self) -> &str;

    /// Path of the index label inside a release folder.
    fn label_path(&self) -> &str;

    /// Pick the latest release folder (with trailing `/`) from the listing page.
    fn latest_release_folder(&self, listing: &str) -> Option<String>;

    /// URL of the latest index label.
    ///
    /// Arguments
    /// -----------------
    /// * `env`: network access.
    ///
    /// Return
    /// ----------
    /// * `<volumes_url>/<folder>/<label_path>`, or [`PlanetaryError::ReleaseNotFound`]
    ///   when the listing holds no release folder.
    fn latest_index_label_url(&self, env: &PlanetaryEnv) -> Result<String, PlanetaryError> {
        let listing = env.get_from_url(self.volumes_url())?;
        let folder = self
            .latest_release_folder(&listing)
            .ok_or_else(|| PlanetaryError::ReleaseNotFound(self.volumes_url().to_string()))?;
        let url = format!(
            "{}/{}{}",
            self.volumes_url().trim_end_matches('/'),
            folder,
            self.label_path()
        );
        debug!(url, "latest index label");
        Ok(url)
    }
}

/// CTX EDR releases on the PDS imaging node.
///
/// The most recent complete release is the second to last volume folder of the listing,
/// the last one being the volume still in preparation.
#[derive(Debug, Clone, Default)]
pub struct CtxIndex;

impl CtxIndex {
    /// Release number of a folder name, e.g. `mrox_4123/` gives `4123`.
    pub fn release_number(folder: &str) -> Option<&str> {
        folder.trim_end_matches('/').split('_').nth(1)
    }
}

impl LatestRelease for CtxIndex {
    fn volumes_url(&self) -> &str {
        CTX_VOLUMES_URL
    }

    fn label_path(&self) -> &str {
        "index/cumindex.lbl"
    }

    fn latest_release_folder(&self, listing: &str) -> Option<String> {
        let folders: Vec<String> = listing_folders(listing)
            .into_iter()
            .filter(|f| f.to_ascii_lowercase().starts_with("mrox_"))
            .collect();
        match folders.len() {
            0 => None,
            1 => folders.into_iter().next(),
            n => folders.into_iter().nth(n - 2),
        }
    }
}

/// LROC EDR releases at ASU, volumes `LROLRC_0001` … ; the highest number is the latest.
#[derive(Debug, Clone, Default)]
pub struct LrocIndex;

impl LatestRelease for LrocIndex {
    fn volumes_url(&self) -> &str {
        LROC_VOLUMES_URL
    }

    fn label_path(&self) -> &str {
        "INDEX/CUMINDEX.LBL"
    }

    fn latest_release_folder(&self, listing: &str) -> Option<String> {
        listing_folders(listing)
            .into_iter()
            .filter_map(|f| {
                let number = LROC_VOLUME.captures(&f)?[1].parse::<u32>().ok()?;
                Some((number, f))
            })
            .max_by_key(|(n, _)| *n)
            .map(|(_, f)| f)
    }
}

/// Dynamic URL strategy registered for a `mission.instrument` key.
pub fn dynamic_url_for(instrument_key: &str) -> Option<Box<dyn LatestRelease>> {
    match instrument_key {
        "mro.ctx" => Some(Box::new(CtxIndex)),
        "lro.lroc" => Some(Box::new(LrocIndex)),
        _ => None,
    }
}
