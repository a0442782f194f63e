//! # Constants and type definitions for planetarypy
//!
//! This module centralizes the **archive endpoints**, **date formats** and **file-system
//! conventions** used throughout the crate.
//!
//! ## Overview
//!
//! - Configuration file location and environment override
//! - Network defaults (timeouts, worker pool width)
//! - NASA day-of-year and ISO date formats
//! - Archive pages scraped for dynamic index URLs
//! - CTX product conventions

use std::time::Duration;

// -------------------------------------------------------------------------------------------------
// Configuration
// -------------------------------------------------------------------------------------------------

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV_VAR: &str = "PLANETARYPY_CONFIG";

/// Default configuration file name, placed in the user's home directory
pub const CONFIG_FILE_NAME: &str = ".planetarypy_config.toml";

/// Root table of all mission entries inside the configuration document
pub const MISSIONS_ROOT: &str = "missions";

/// Sub-key inserted between instrument and index name
pub const INDEXES_SEGMENT: &str = "indexes";

// -------------------------------------------------------------------------------------------------
// Network and concurrency
// -------------------------------------------------------------------------------------------------

/// Timeout applied to metadata requests and download connections
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Width of the worker pool used for batch download / calibration
pub const DEFAULT_WORKERS: usize = 6;

// -------------------------------------------------------------------------------------------------
// Date formats
// -------------------------------------------------------------------------------------------------

/// NASA date with day of year, e.g. `2021-105`
pub const NASA_DATE_FORMAT: &str = "%Y-%j";

/// NASA datetime with day of year, e.g. `2021-105T12:30:00`
pub const NASA_DT_FORMAT: &str = "%Y-%jT%H:%M:%S";

/// NASA datetime with fractional seconds, e.g. `2021-105T12:30:00.123456`
pub const NASA_DT_FORMAT_WITH_MS: &str = "%Y-%jT%H:%M:%S%.f";

/// ISO calendar date
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// ISO datetime
pub const ISO_DT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// ISO datetime with fractional seconds
pub const ISO_DT_FORMAT_WITH_MS: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Columns with `TIME` in their name that hold durations or local solar time,
/// not calendar instants
pub const NON_CALENDAR_TIME_COLUMNS: [&str; 2] = ["LOCAL_TIME", "DWELL_TIME"];

// -------------------------------------------------------------------------------------------------
// Archives
// -------------------------------------------------------------------------------------------------

/// CTX volumes listing on the PDS imaging node
pub const CTX_VOLUMES_URL: &str =
    "https://planetarydata.jpl.nasa.gov/img/data/mro/mars_reconnaissance_orbiter/ctx/";

/// LROC EDR volumes listing at ASU
pub const LROC_VOLUMES_URL: &str = "https://pds.lroc.asu.edu/data/LRO-L-LROC-2-EDR-V1.0/";

/// Extension of the columnar index cache
pub const CACHE_EXTENSION: &str = "parq";

/// NAIF service assembling SPICE kernel subsets for a time range
pub const NAIF_SUBSET_URL: &str = "https://naif.jpl.nasa.gov/cgi-bin/subsetds.pl";

/// Folder under the storage root holding SPICE kernels, one sub-folder per mission
pub const SPICE_KERNEL_DIR: &str = "spice_kernels";

// -------------------------------------------------------------------------------------------------
// CTX conventions
// -------------------------------------------------------------------------------------------------

/// Length of a short CTX product id (e.g. `P01_001234_1234`)
pub const CTX_SHORT_PID_LEN: usize = 15;

/// Number of samples of a full width CTX image
pub const CTX_FULL_WIDTH: i64 = 5056;

/// Summing mode for which destriping is not applicable
pub const CTX_NO_DESTRIPE_SUMMING: i64 = 2;

/// Default map projection resolution, meters per pixel
pub const CTX_DEFAULT_MPP: f64 = 6.25;
