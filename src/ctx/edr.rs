//! One raw CTX product, with its local and remote locations.

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::constants::CTX_SHORT_PID_LEN;
use crate::ctx::{CtxConfig, EdrIndex, ProductMeta};
use crate::download::url_retrieve;
use crate::planetary_errors::PlanetaryError;

/// Storage overrides for one product; `None` keeps the configured value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdrOptions {
    /// Alternative root folder for the EDR files
    pub root: Option<Utf8PathBuf>,
    /// Whether the storage path includes the volume folder
    pub with_volume: Option<bool>,
    /// Whether each product is stored in its own folder
    pub with_pid_folder: Option<bool>,
}

/// One CTX experiment data record: where it is stored and where it comes from.
#[derive(Debug, Clone)]
pub struct CtxEdr {
    pid: String,
    volume: String,
    root: Utf8PathBuf,
    with_volume: bool,
    with_pid_folder: bool,
    base_url: String,
    index: Arc<EdrIndex>,
}

impl CtxEdr {
    /// Locate a product.
    ///
    /// Arguments
    /// -----------------
    /// * `pid`: full product id, or its 15 character short form.
    /// * `index`: the CTX EDR index.
    /// * `config`: the `mro.ctx` settings.
    /// * `options`: storage overrides.
    ///
    /// Return
    /// ----------
    /// * The product, or [`PlanetaryError::ProductNotFound`] when the index does not know it.
    pub fn new(
        pid: &str,
        index: Arc<EdrIndex>,
        config: &CtxConfig,
        options: EdrOptions,
    ) -> Result<Self, PlanetaryError> {
        let pid = index.resolve_pid(pid)?;
        let volume = index.volume(&pid)?;
        Ok(CtxEdr {
            pid,
            volume,
            root: options.root.unwrap_or_else(|| config.edr_root.clone()),
            with_volume: options.with_volume.unwrap_or(config.edr_with_volume),
            with_pid_folder: options.with_pid_folder.unwrap_or(config.edr_with_pid_folder),
            base_url: config.edr_url.clone(),
            index,
        })
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn short_pid(&self) -> &str {
        self.pid.get(..CTX_SHORT_PID_LEN).unwrap_or(&self.pid)
    }

    /// PDS volume, lower case.
    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn index(&self) -> &Arc<EdrIndex> {
        &self.index
    }

    /// Index metadata of this product.
    pub fn meta(&self) -> Result<ProductMeta<'_>, PlanetaryError> {
        self.index.meta(&self.pid)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// `<root>[/<volume>][/<pid>]`
    pub fn source_folder(&self) -> Utf8PathBuf {
        let mut base = self.root.clone();
        if self.with_volume {
            base.push(&self.volume);
        }
        if self.with_pid_folder {
            base.push(&self.pid);
        }
        base
    }

    pub fn source_path(&self) -> Utf8PathBuf {
        self.source_folder().join(format!("{}.IMG", self.pid))
    }

    /// `<base url>/<volume>/data/<pid>.IMG`
    pub fn url(&self) -> String {
        format!("{}/{}/data/{}.IMG", self.base_url, self.volume, self.pid)
    }

    /// Download the product unless it is already stored.
    ///
    /// Return
    /// ----------
    /// * Whether a download happened.
    pub fn download(&self, overwrite: bool) -> Result<bool, PlanetaryError> {
        let path = self.source_path();
        if path.exists() && !overwrite {
            info!("{} exists, use overwrite to download it again", path);
            return Ok(false);
        }
        std::fs::create_dir_all(self.source_folder())?;
        url_retrieve(&self.url(), &path, None)?;
        Ok(true)
    }
}

impl fmt::Display for CtxEdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PRODUCT_ID: {}", self.pid)?;
        writeln!(f, "URL: {}", self.url())?;
        writeln!(f, "source_path: {}", self.source_path())
    }
}
