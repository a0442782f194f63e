use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};

use crate::constants::{
    ISO_DATE_FORMAT, ISO_DT_FORMAT, ISO_DT_FORMAT_WITH_MS, NASA_DATE_FORMAT, NASA_DT_FORMAT,
    NASA_DT_FORMAT_WITH_MS,
};
use crate::planetary_errors::PlanetaryError;

fn nasa_date_to_datetime(datestr: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(datestr, NASA_DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn nasa_datetime_to_datetime(datetimestr: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(datetimestr, NASA_DT_FORMAT).ok()
}

fn nasa_datetimems_to_datetime(datetimestr: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(datetimestr, NASA_DT_FORMAT_WITH_MS).ok()
}

/// Transformation from a NASA day-of-year date string to a datetime
///
/// Argument
/// --------
/// * `inputstr`: a string of format `YYYY-jjj`, `YYYY-jjjTHH:MM:SS` or `YYYY-jjjTHH:MM:SS.ffffff`
///
/// Return
/// ------
/// * the parsed datetime, or [`PlanetaryError::TimeParse`] if none of the formats match
pub fn nasa_time_to_datetime(inputstr: &str) -> Result<NaiveDateTime, PlanetaryError> {
    nasa_datetime_to_datetime(inputstr)
        .or_else(|| nasa_date_to_datetime(inputstr))
        .or_else(|| nasa_datetimems_to_datetime(inputstr))
        .ok_or_else(|| PlanetaryError::TimeParse(inputstr.to_string()))
}

/// Transformation from a NASA day-of-year date string to an ISO date string
///
/// Argument
/// --------
/// * `inputstr`: a NASA date string, see [`nasa_time_to_datetime`]
/// * `with_hours`: force the time part in the output even for a date-only input
///
/// Return
/// ------
/// * `YYYY-mm-dd` for date-only inputs, `YYYY-mm-ddTHH:MM:SS[.ffffff]` otherwise
pub fn nasa_time_to_iso(inputstr: &str, with_hours: bool) -> Result<String, PlanetaryError> {
    let has_hours = nasa_date_to_datetime(inputstr).is_none();
    let time = nasa_time_to_datetime(inputstr)?;
    if has_hours || with_hours {
        Ok(isoformat(&time))
    } else {
        Ok(time.format(ISO_DATE_FORMAT).to_string())
    }
}

/// Transformation from an ISO date or datetime string to the NASA day-of-year form
///
/// The output keeps the precision of the input: date only, seconds, or fractional seconds.
///
/// Argument
/// --------
/// * `inputstr`: a string of format `YYYY-mm-dd`, `YYYY-mm-ddTHH:MM:SS` or `YYYY-mm-ddTHH:MM:SS.ffffff`
///
/// Return
/// ------
/// * the NASA formatted string
pub fn iso_to_nasa_time(inputstr: &str) -> Result<String, PlanetaryError> {
    if let Ok(date) = NaiveDate::parse_from_str(inputstr, ISO_DATE_FORMAT) {
        return Ok(date.format(NASA_DATE_FORMAT).to_string());
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(inputstr, ISO_DT_FORMAT) {
        return Ok(date.format(NASA_DT_FORMAT).to_string());
    }
    NaiveDateTime::parse_from_str(inputstr, ISO_DT_FORMAT_WITH_MS)
        .map(|date| date.format("%Y-%jT%H:%M:%S%.6f").to_string())
        .map_err(|_| PlanetaryError::TimeParse(inputstr.to_string()))
}

/// Transformation from an ISO datetime string to the NASA day-of-year datetime
///
/// Argument
/// --------
/// * `dtimestr`: a string of format `YYYY-mm-ddTHH:MM:SS` with optional fractional seconds
///
/// Return
/// ------
/// * `YYYY-jjjTHH:MM:SS`, with the fraction kept when the input has one
pub fn iso_to_nasa_datetime(dtimestr: &str) -> Result<String, PlanetaryError> {
    let (source_format, target_format) = if dtimestr.contains('.') {
        (ISO_DT_FORMAT_WITH_MS, "%Y-%jT%H:%M:%S%.6f")
    } else {
        (ISO_DT_FORMAT, NASA_DT_FORMAT)
    };
    NaiveDateTime::parse_from_str(dtimestr, source_format)
        .map(|date| date.format(target_format).to_string())
        .map_err(|_| PlanetaryError::TimeParse(dtimestr.to_string()))
}

/// Parse one time cell of a PDS index table.
///
/// The NASA day-of-year formats are tried first (seconds, date only, then fractional
/// seconds as fallback), followed by their ISO calendar equivalents. A trailing `Z`
/// is ignored.
///
/// Argument
/// --------
/// * `cell`: the trimmed cell content
///
/// Return
/// ------
/// * `Some(datetime)` when one of the formats matches
pub fn parse_table_time(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim().trim_end_matches('Z');
    nasa_time_to_datetime(cell).ok().or_else(|| parse_iso(cell))
}

fn parse_iso(cell: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(cell, ISO_DT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(cell, ISO_DT_FORMAT_WITH_MS))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(cell, ISO_DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse an HTTP date header (e.g. `Last-Modified`) into a UTC datetime
///
/// Argument
/// --------
/// * `text`: a date in the RFC 2822 / HTTP-date form, e.g. `Wed, 21 Oct 2015 07:28:00 GMT`
///
/// Return
/// ------
/// * the UTC instant without offset information
pub fn parse_http_date(text: &str) -> Result<NaiveDateTime, PlanetaryError> {
    DateTime::parse_from_rfc2822(text.trim())
        .map(|d| d.naive_utc())
        .map_err(|_| PlanetaryError::TimeParse(text.to_string()))
}

/// Parse a timestamp stored in the configuration file.
///
/// Accepts ISO datetimes with `T` or space separator, with or without fraction,
/// and RFC 3339 strings with an offset (converted to UTC).
pub fn parse_stored_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    parse_iso(text)
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|d| d.naive_utc()))
}

/// ISO representation of a timestamp, with microseconds only when non-zero
pub fn isoformat(time: &NaiveDateTime) -> String {
    if time.nanosecond() == 0 {
        time.format(ISO_DT_FORMAT).to_string()
    } else {
        time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}
