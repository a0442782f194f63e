//! # Fixed-width index tables
//!
//! [`IndexTable`] holds the decoded content of a PDS index table: the column names of a
//! [`LabelSchema`] and one [`TableRow`] per line of the table file.
//!
//! ## Decoding
//! -----------------
//! Each cell is cut out of its line by byte offsets, no delimiter is interpreted. Cells are
//! trimmed of surrounding whitespace and empty cells become [`Cell::Null`]. A span that runs
//! past the end of a short line yields whatever bytes are available. Both `\n` and `\r\n`
//! line endings are accepted and empty lines are skipped. Quotes inside a span are kept.
//! Spans are cut from the raw bytes, so a non UTF-8 byte is replaced only within its own
//! cell and does not shift the following columns.
//!
//! ## Time columns
//! -----------------
//! [`IndexTable::convert_times`] parses calendar time columns into [`Cell::Time`]. With
//! [`TimeColumns::Auto`], every column with `TIME` in its name is converted except
//! `LOCAL_TIME` and `DWELL_TIME`, which are not calendar instants. A cell that does not
//! parse becomes [`Cell::InvalidTime`] with its raw text; the decode does not stop.
//!
//! ## Types
//! -----------------
//! [`IndexTable::convert_dtypes`] turns text columns made only of integers (or only of
//! numbers) into [`Cell::Integer`] (or [`Cell::Real`]) columns, before the table is stored
//! in the columnar cache.
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use chrono::NaiveDateTime;
use comfy_table::{presets::UTF8_FULL, Cell as TableCell, ContentArrangement, Table};
use itertools::Itertools;
use tracing::{debug, warn};

use crate::constants::NON_CALENDAR_TIME_COLUMNS;
use crate::pds::label::LabelSchema;
use crate::planetary_errors::PlanetaryError;
use crate::time::{isoformat, parse_table_time};

/// One decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Time(NaiveDateTime),
    /// A time cell that could not be parsed, with its raw text
    InvalidTime(String),
}

impl Cell {
    /// A cell from its raw text: surrounding whitespace is trimmed, quotes are kept.
    fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Null
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(i) => Some(*i),
            Cell::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(i) => Some(*i as f64),
            Cell::Real(f) => Some(*f),
            Cell::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) | Cell::InvalidTime(s) => write!(f, "{s}"),
            Cell::Integer(i) => write!(f, "{i}"),
            Cell::Real(r) => write!(f, "{r}"),
            Cell::Time(t) => write!(f, "{}", isoformat(t)),
        }
    }
}

/// One line of an index table, cells in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub cells: Vec<Cell>,
}

impl TableRow {
    pub fn new(cells: Vec<Cell>) -> Self {
        TableRow { cells }
    }

    pub fn get(&self, idx: usize) -> Option<&Cell> {
        self.cells.get(idx)
    }
}

/// Which columns [`IndexTable::convert_times`] should parse.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TimeColumns {
    None,
    /// Columns whose name contains `TIME`, except the non calendar ones
    #[default]
    Auto,
    /// Exactly these columns; a missing one is an error
    Named(Vec<String>),
}

/// Bytes `[start, stop)` of a raw line, clamped to the line.
pub fn slice_bytes(line: &[u8], start: usize, stop: usize) -> &[u8] {
    let start = start.min(line.len());
    let stop = stop.clamp(start, line.len());
    &line[start..stop]
}

/// Byte slice `[start, stop)` of a line, clamped to the line and to char boundaries.
pub fn slice_span(line: &str, start: usize, stop: usize) -> &str {
    let len = line.len();
    let mut start = start.min(len);
    let mut stop = stop.min(len);
    while !line.is_char_boundary(start) {
        start += 1;
    }
    while stop > start && !line.is_char_boundary(stop) {
        stop -= 1;
    }
    &line[start..stop.max(start)]
}

/// A decoded PDS index table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexTable {
    columns: Vec<String>,
    rows: Vec<TableRow>,
}

impl IndexTable {
    /// Build a table from column names and rows.
    ///
    /// Rows shorter than the header are padded with [`Cell::Null`].
    pub fn new(columns: Vec<String>, rows: Vec<TableRow>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.cells.resize(width, Cell::Null);
                r
            })
            .collect();
        IndexTable { columns, rows }
    }

    /// Decode a fixed-width table.
    ///
    /// Arguments
    /// -----------------
    /// * `reader`: the table content.
    /// * `schema`: the column spans from the label.
    /// * `start_record`: first line to decode, 1-based (lines before it are skipped).
    ///
    /// Return
    /// ----------
    /// * One row per non-empty line with one cell per schema column.
    pub fn decode<R: BufRead>(
        reader: R,
        schema: &LabelSchema,
        start_record: usize,
    ) -> Result<Self, PlanetaryError> {
        let mut rows = Vec::new();
        for raw in reader.split(b'\n').skip(start_record.saturating_sub(1)) {
            let raw = raw?;
            let line = raw.strip_suffix(b"\r").unwrap_or(&raw[..]);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            // spans are byte offsets: cut first, then decode each cell
            let cells = schema
                .columns
                .iter()
                .map(|c| {
                    let bytes = slice_bytes(line, c.start, c.stop);
                    Cell::from_raw(&String::from_utf8_lossy(bytes))
                })
                .collect();
            rows.push(TableRow { cells });
        }
        debug!(rows = rows.len(), columns = schema.len(), "decoded index table");
        Ok(IndexTable {
            columns: schema.colnames(),
            rows,
        })
    }

    /// Decode a fixed-width table file, see [`IndexTable::decode`].
    pub fn from_file(
        path: &Utf8Path,
        schema: &LabelSchema,
        start_record: usize,
    ) -> Result<Self, PlanetaryError> {
        let file = File::open(path)?;
        Self::decode(BufReader::new(file), schema, start_record)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, by exact name first and then ignoring case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    fn require_column(&self, name: &str) -> Result<usize, PlanetaryError> {
        self.column_index(name)
            .ok_or_else(|| PlanetaryError::MissingColumn(name.to_string()))
    }

    /// Cells of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Cell>, PlanetaryError> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| &r.cells[idx]).collect())
    }

    /// Cell of a row by column name.
    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// First row whose cell in `column` displays as `value`.
    pub fn find_row(&self, column: &str, value: &str) -> Result<Option<&TableRow>, PlanetaryError> {
        let idx = self.require_column(column)?;
        Ok(self
            .rows
            .iter()
            .find(|r| r.cells[idx].to_string() == value))
    }

    /// New table with the rows matching `predicate`.
    pub fn filter_rows<F>(&self, predicate: F) -> IndexTable
    where
        F: Fn(&TableRow) -> bool,
    {
        IndexTable {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// Distinct non-null values of a column, in order of first appearance.
    pub fn unique_values(&self, column: &str) -> Result<Vec<String>, PlanetaryError> {
        let idx = self.require_column(column)?;
        Ok(self
            .rows
            .iter()
            .map(|r| &r.cells[idx])
            .filter(|c| !c.is_null())
            .map(|c| c.to_string())
            .unique()
            .collect())
    }

    fn auto_time_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| {
                name.contains("TIME") && !NON_CALENDAR_TIME_COLUMNS.contains(&name.as_str())
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Parse the selected time columns in place.
    ///
    /// Arguments
    /// -----------------
    /// * `which`: the column selection.
    ///
    /// Return
    /// ----------
    /// * [`PlanetaryError::MissingColumn`] when a [`TimeColumns::Named`] column is absent.
    ///   Unparseable cells are kept as [`Cell::InvalidTime`].
    pub fn convert_times(&mut self, which: &TimeColumns) -> Result<(), PlanetaryError> {
        let indices = match which {
            TimeColumns::None => return Ok(()),
            TimeColumns::Auto => self.auto_time_columns(),
            TimeColumns::Named(names) => names
                .iter()
                .map(|n| self.require_column(n))
                .collect::<Result<Vec<_>, _>>()?,
        };

        for idx in indices {
            let mut invalid = 0usize;
            for row in self.rows.iter_mut() {
                let cell = &mut row.cells[idx];
                if let Cell::Text(raw) = cell {
                    *cell = match parse_table_time(raw) {
                        Some(t) => Cell::Time(t),
                        None => {
                            invalid += 1;
                            Cell::InvalidTime(std::mem::take(raw))
                        }
                    };
                }
            }
            if invalid > 0 {
                warn!(
                    column = %self.columns[idx],
                    invalid, "time cells could not be parsed"
                );
            }
        }
        Ok(())
    }

    /// Give integer or real types to the text columns that allow it.
    ///
    /// A column is converted only when every non-null cell is text and parses; columns
    /// holding times are left as they are.
    pub fn convert_dtypes(&mut self) {
        for idx in 0..self.columns.len() {
            let texts: Vec<&str> = self
                .rows
                .iter()
                .map(|r| &r.cells[idx])
                .filter(|c| !c.is_null())
                .map(|c| c.as_str())
                .collect::<Option<Vec<_>>>()
                .unwrap_or_default();
            if texts.is_empty() {
                continue;
            }

            let integers = texts.iter().all(|s| s.parse::<i64>().is_ok());
            let reals = integers || texts.iter().all(|s| s.parse::<f64>().is_ok());
            if !reals {
                continue;
            }

            for row in self.rows.iter_mut() {
                let cell = &mut row.cells[idx];
                if let Cell::Text(s) = cell {
                    *cell = if integers {
                        s.parse().map(Cell::Integer).unwrap_or(Cell::Null)
                    } else {
                        s.parse().map(Cell::Real).unwrap_or(Cell::Null)
                    };
                }
            }
        }
    }

    /// Render the first `n` rows.
    pub fn display_head(&self, n: usize) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(self.columns.iter().map(TableCell::new));
        for row in self.rows.iter().take(n) {
            table.add_row(row.cells.iter().map(|c| TableCell::new(c.to_string())));
        }
        table
    }
}

impl fmt::Display for IndexTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_head(10))?;
        if self.rows.len() > 10 {
            write!(f, "\n… {} more rows", self.rows.len() - 10)?;
        }
        Ok(())
    }
}
