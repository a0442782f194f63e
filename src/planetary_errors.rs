use thiserror::Error;

use crate::isis::IsisError;
use crate::pds::label::LabelError;

#[derive(Error, Debug)]
pub enum PlanetaryError {
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Key not found in configuration: {0}")]
    KeyNotFound(String),

    #[error("Invalid dotted key format: {0}")]
    KeyFormat(String),

    #[error("HTTP request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("HTTP ureq error: {0}")]
    UreqHttpError(#[from] ureq::Error),

    #[error("HTTP reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Header {header} missing from response of {url}")]
    MissingHeader { header: String, url: String },

    #[error("Unable to parse PDS label: {0}")]
    LabelParseFailure(#[from] LabelError),

    #[error("Unable to parse time string: {0}")]
    TimeParse(String),

    #[error("Column not found in table: {0}")]
    MissingColumn(String),

    #[error("External tool failed: {0}")]
    ExternalTool(#[from] IsisError),

    #[error("No dynamic URL lookup registered for instrument: {0}")]
    NoDynamicUrl(String),

    #[error("Unable to scrape the latest release from {0}")]
    ReleaseNotFound(String),

    #[error("No URL configured and no local label found in: {0}")]
    MissingLocalLabel(String),

    #[error("Product not found in index: {0}")]
    ProductNotFound(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    #[error("Invalid configuration file: {0}")]
    TomlDeError(#[from] toml::de::Error),

    #[error("Unable to serialize configuration: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("UTF-8 Path error: {0}")]
    Utf8PathError(String),

    #[error("Worker failed while processing {0}")]
    WorkerFailure(String),

    #[error("No NAIF SPICE dataset known for mission: {0}")]
    UnknownSpiceDataset(String),

    #[error("Unexpected SPICE subset archive: {0}")]
    SpiceSubset(String),

    #[error("Zip archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),
}

impl PartialEq for PlanetaryError {
    fn eq(&self, other: &Self) -> bool {
        use PlanetaryError::*;
        match (self, other) {
            (ConfigurationMissing(a), ConfigurationMissing(b)) => a == b,
            (KeyNotFound(a), KeyNotFound(b)) => a == b,
            (KeyFormat(a), KeyFormat(b)) => a == b,
            (
                HttpStatus {
                    url: url_a,
                    status: status_a,
                },
                HttpStatus {
                    url: url_b,
                    status: status_b,
                },
            ) => url_a == url_b && status_a == status_b,
            (
                MissingHeader {
                    header: header_a,
                    url: url_a,
                },
                MissingHeader {
                    header: header_b,
                    url: url_b,
                },
            ) => header_a == header_b && url_a == url_b,
            (LabelParseFailure(a), LabelParseFailure(b)) => a == b,
            (TimeParse(a), TimeParse(b)) => a == b,
            (MissingColumn(a), MissingColumn(b)) => a == b,
            (ExternalTool(a), ExternalTool(b)) => a == b,
            (NoDynamicUrl(a), NoDynamicUrl(b)) => a == b,
            (ReleaseNotFound(a), ReleaseNotFound(b)) => a == b,
            (MissingLocalLabel(a), MissingLocalLabel(b)) => a == b,
            (ProductNotFound(a), ProductNotFound(b)) => a == b,
            (Utf8PathError(a), Utf8PathError(b)) => a == b,
            (WorkerFailure(a), WorkerFailure(b)) => a == b,
            (UnknownSpiceDataset(a), UnknownSpiceDataset(b)) => a == b,
            (SpiceSubset(a), SpiceSubset(b)) => a == b,

            // wrapped library errors are not comparable: same variant is enough
            (UreqHttpError(_), UreqHttpError(_)) => true,
            (ReqwestError(_), ReqwestError(_)) => true,
            (IoError(_), IoError(_)) => true,
            (ParquetError(_), ParquetError(_)) => true,
            (ArrowError(_), ArrowError(_)) => true,
            (TomlDeError(_), TomlDeError(_)) => true,
            (TomlSerError(_), TomlSerError(_)) => true,
            (ZipError(_), ZipError(_)) => true,

            _ => false,
        }
    }
}
