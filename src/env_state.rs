//! # planetarypy environment state
//!
//! This module defines [`crate::env_state::PlanetaryEnv`], the **shared environment object** used
//! across the crate for small, blocking HTTP exchanges with the PDS archives:
//!
//! - fetching archive listing pages (used to discover the latest data release),
//! - checking the `Last-Modified` header of remote index labels,
//! - probing whether a URL exists.
//!
//! Large file transfers do not go through this object; they are streamed by
//! [`crate::download`].
//!
//! ## Structure
//!
//! ```text
//! PlanetaryEnv
//! └── http_client  (ureq::Agent, 10 s global timeout)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use planetarypy::env_state::PlanetaryEnv;
//!
//! let env = PlanetaryEnv::new();
//! let modified = env.remote_timestamp("https://hirise-pds.lpl.arizona.edu/PDS/INDEX/EDRCUMINDEX.LBL")?;
//! println!("{modified}");
//! ```
//!
//! ## Notes
//!
//! - The agent is cheap to clone and meant to be shared between all index objects.
//! - No retry is performed: every request either succeeds or its error is returned.
use chrono::NaiveDateTime;
use std::fmt::Debug;
use tracing::debug;
use ureq::Agent;

use crate::constants::HTTP_TIMEOUT;
use crate::planetary_errors::PlanetaryError;
use crate::time::parse_http_date;

/// This object is passed to the functions of the library that need network access
///
/// # Fields
///
/// * `http_client` - A ureq agent used for metadata requests and archive pages
#[derive(Debug, Clone)]
pub struct PlanetaryEnv {
    pub http_client: Agent,
}

impl Default for PlanetaryEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanetaryEnv {
    /// Create a new environment
    ///
    /// Return
    /// ------
    /// * A new PlanetaryEnv object
    ///     - The HTTP client uses a global timeout of 10 seconds per request
    pub fn new() -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(HTTP_TIMEOUT))
            .build();
        let agent: Agent = config.into();

        PlanetaryEnv { http_client: agent }
    }

    /// Fetch the body of a page as text.
    ///
    /// Arguments
    /// -----------------
    /// * `url`: the page to fetch.
    ///
    /// Return
    /// ----------
    /// * The response body, or a network error (status codes >= 400 are errors).
    pub fn get_from_url(&self, url: &str) -> Result<String, PlanetaryError> {
        debug!(url, "GET");
        let mut response = self
            .http_client
            .get(url)
            .call()
            .map_err(|e| http_error(url, e))?;
        Ok(response.body_mut().read_to_string()?)
    }

    /// Fetch the body of a small binary resource (up to ureq's 10 MB read limit).
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PlanetaryError> {
        debug!(url, "GET bytes");
        let mut response = self
            .http_client
            .get(url)
            .call()
            .map_err(|e| http_error(url, e))?;
        Ok(response.body_mut().read_to_vec()?)
    }

    /// Get the modification time of a remote file.
    ///
    /// A `HEAD` request is sent and its `Last-Modified` header parsed as an HTTP date.
    ///
    /// Arguments
    /// -----------------
    /// * `url`: the remote file.
    ///
    /// Return
    /// ----------
    /// * The UTC modification time, [`PlanetaryError::MissingHeader`] if the server does
    ///   not send the header, or the network error.
    pub fn remote_timestamp(&self, url: &str) -> Result<NaiveDateTime, PlanetaryError> {
        debug!(url, "HEAD for Last-Modified");
        let response = self
            .http_client
            .head(url)
            .call()
            .map_err(|e| http_error(url, e))?;

        let header = response
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PlanetaryError::MissingHeader {
                header: "Last-Modified".into(),
                url: url.to_string(),
            })?;
        parse_http_date(header)
    }

    /// Check if a URL answers with a status below 400.
    pub fn url_exists(&self, url: &str) -> bool {
        self.http_client.head(url).call().is_ok()
    }
}

/// Map ureq status errors to [`PlanetaryError::HttpStatus`], keeping the URL for context.
fn http_error(url: &str, err: ureq::Error) -> PlanetaryError {
    match err {
        ureq::Error::StatusCode(status) => PlanetaryError::HttpStatus {
            url: url.to_string(),
            status,
        },
        other => PlanetaryError::UreqHttpError(other),
    }
}
