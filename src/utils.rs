use camino::{Utf8Path, Utf8PathBuf};

/// Variations of a file name with other extensions.
///
/// Argument
/// --------
/// * `filename`: the base name, e.g. `P01_001234_1234_XN_00N01W.IMG`
/// * `extensions`: replacements for the last extension, with or without the leading dot,
///   e.g. `[".cub", ".cal.cub"]`
///
/// Return
/// ------
/// * one path per extension, e.g. `P01_001234_1234_XN_00N01W.cub`, `P01_001234_1234_XN_00N01W.cal.cub`
pub fn file_variations(filename: &Utf8Path, extensions: &[&str]) -> Vec<Utf8PathBuf> {
    extensions
        .iter()
        .map(|ext| filename.with_extension(ext.trim_start_matches('.')))
        .collect()
}

/// Height of an object from the length of its shadow.
///
/// Argument
/// --------
/// * `shadow_in_pixels`: measured shadow length, already corrected for binning
/// * `sun_elev`: sun elevation over the horizon, degrees
///
/// Return
/// ------
/// * the height in the unit of the shadow length
pub fn height_from_shadow(shadow_in_pixels: f64, sun_elev: f64) -> f64 {
    sun_elev.to_radians().tan() * shadow_in_pixels
}
