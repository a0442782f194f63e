//! # PDS index tools
//!
//! From the raw archive files up to the managed index:
//!
//! - [`pvl`]: the label language parser,
//! - [`label`]: index label → column byte spans,
//! - [`table`]: fixed-width table decoding,
//! - [`parquet_cache`]: columnar cache of decoded tables,
//! - [`index_key`]: dotted index keys,
//! - [`dynamic_url`]: latest release lookups for instruments with moving index URLs,
//! - [`index`]: one managed index (URLs, local paths, timestamps, download),
//! - [`hirise`]: repair of the HiRISE EDR cumulative index.
pub mod dynamic_url;
pub mod hirise;
pub mod index;
pub mod index_key;
pub mod label;
pub mod parquet_cache;
pub mod pvl;
pub mod table;
