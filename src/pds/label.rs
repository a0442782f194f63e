//! # PDS index label schema
//!
//! A PDS3 index table (`*.TAB`) is a fixed-width text file described by a detached
//! label (`*.LBL`). The label holds:
//!
//! - a **pointer** `^NAME = "FILE.TAB"` naming the table file, located next to the label,
//! - an `OBJECT = NAME` block holding one `OBJECT = COLUMN` block per column with
//!   `NAME`, `START_BYTE` (1-indexed), `BYTES` and optionally `ITEMS`, `ITEM_BYTES`,
//!   `ITEM_OFFSET` for array columns.
//!
//! [`IndexLabel`] turns such a label into a [`LabelSchema`], an ordered list of byte
//! spans, one per decoded column. Array columns are expanded into `NAME_1 … NAME_N`.
//!
//! ## Offsets
//! -----------------
//! ```text
//! start   = START_BYTE - 1
//! stop    = start + BYTES
//! item i  = [start + i * ITEM_OFFSET, start + i * ITEM_OFFSET + ITEM_BYTES)   i in 0..ITEMS
//! ```
//!
//! `ITEM_OFFSET` defaults to `ITEM_BYTES` (contiguous items) when absent.
//!
//! ## Example
//! -----------------
//! ```rust,ignore
//! use planetarypy::pds::label::IndexLabel;
//!
//! let label = IndexLabel::from_path("EDRCUMINDEX.LBL".into())?;
//! println!("{:?}", label.colnames());
//! let table = label.read_index_data(true)?;
//! ```
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::pds::pvl::{parse_label, BlockKind, PvlBlock, PvlEntries, PvlValue};
use crate::pds::table::{slice_span, IndexTable, TimeColumns};
use crate::planetary_errors::PlanetaryError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelError {
    #[error("Syntax error at line {line} near `{context}`")]
    Syntax { line: usize, context: String },

    #[error("No table pointer (^NAME) found in label {0}")]
    MissingPointer(String),

    #[error("No OBJECT = {0} block found in label")]
    MissingTableObject(String),

    #[error("Invalid column {column}: {reason}")]
    InvalidColumn { column: String, reason: String },

    #[error("Table file {0} not found next to its label")]
    MissingTableFile(String),

    #[error("Table {0} is attached to its label, only detached tables are supported")]
    AttachedTable(String),
}

/// One decoded column span: `[start, stop)` in bytes, 0-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

/// Ordered list of column spans, in label order with item expansion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSchema {
    pub columns: Vec<ColumnSpec>,
}

impl LabelSchema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        LabelSchema { columns }
    }

    pub fn colnames(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One `OBJECT = COLUMN` block of an index label.
#[derive(Debug, Clone, PartialEq)]
pub struct PvlColumn {
    pub name: String,
    pub start_byte: usize,
    pub bytes: usize,
    pub items: Option<usize>,
    pub item_bytes: Option<usize>,
    pub item_offset: Option<usize>,
}

fn positive(
    block: &PvlBlock,
    column: &str,
    key: &str,
    required: bool,
) -> Result<Option<usize>, LabelError> {
    let invalid = |reason: String| LabelError::InvalidColumn {
        column: column.to_string(),
        reason,
    };
    match block.get(key) {
        None if required => Err(invalid(format!("missing {key}"))),
        None => Ok(None),
        Some(v) => match v.as_i64() {
            Some(n) if n > 0 => Ok(Some(n as usize)),
            Some(n) => Err(invalid(format!("{key} = {n} must be positive"))),
            None => Err(invalid(format!("{key} is not an integer"))),
        },
    }
}

impl PvlColumn {
    /// Read a column description from its `OBJECT = COLUMN` block.
    ///
    /// `START_BYTE`, `BYTES` and, when present, `ITEMS` / `ITEM_BYTES` / `ITEM_OFFSET` must be
    /// positive integers so that every derived span has `start < stop`.
    pub fn from_block(block: &PvlBlock) -> Result<Self, LabelError> {
        let name = block
            .get("NAME")
            .and_then(PvlValue::as_str)
            .ok_or_else(|| LabelError::InvalidColumn {
                column: "<unnamed>".into(),
                reason: "missing NAME".into(),
            })?
            .to_string();

        let start_byte = positive(block, &name, "START_BYTE", true)?.unwrap_or(1);
        let bytes = positive(block, &name, "BYTES", true)?.unwrap_or(1);
        let items = positive(block, &name, "ITEMS", false)?;
        let item_bytes = positive(block, &name, "ITEM_BYTES", items.is_some())?;
        let item_offset = positive(block, &name, "ITEM_OFFSET", false)?;

        Ok(PvlColumn {
            name,
            start_byte,
            bytes,
            items,
            item_bytes,
            item_offset,
        })
    }

    pub fn start(&self) -> usize {
        self.start_byte - 1
    }

    pub fn stop(&self) -> usize {
        self.start() + self.bytes
    }

    /// Column names produced by this column, `NAME_1 … NAME_N` for array columns.
    pub fn name_as_list(&self) -> Vec<String> {
        match self.items {
            None => vec![self.name.clone()],
            Some(n) => (1..=n).map(|i| format!("{}_{}", self.name, i)).collect(),
        }
    }

    /// Byte spans of this column, one per item for array columns.
    pub fn colspecs(&self) -> Vec<(usize, usize)> {
        match (self.items, self.item_bytes) {
            (Some(n), Some(item_bytes)) => {
                let offset = self.item_offset.unwrap_or(item_bytes);
                (0..n)
                    .map(|i| {
                        let start = self.start() + i * offset;
                        (start, start + item_bytes)
                    })
                    .collect()
            }
            _ => vec![(self.start(), self.stop())],
        }
    }

    /// Raw substrings of one table line covered by this column.
    pub fn decode<'a>(&self, line: &'a str) -> Vec<&'a str> {
        self.colspecs()
            .into_iter()
            .map(|(start, stop)| slice_span(line, start, stop))
            .collect()
    }
}

/// A parsed index label.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLabel {
    /// Path of the label file
    pub path: Utf8PathBuf,
    /// Name of the table object (the pointer key without `^`)
    pub tablename: String,
    /// Table file name, as written in the label
    pub index_name: String,
    /// First record of the table inside the table file, 1-based
    pub start_record: usize,
    columns: Vec<PvlColumn>,
}

impl IndexLabel {
    /// Read and parse a label file.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: path to the `.LBL` file. The table is expected in the same directory.
    ///
    /// Return
    /// ----------
    /// * The label, or an I/O error, or a [`LabelError`] wrapped in
    ///   [`PlanetaryError::LabelParseFailure`].
    pub fn from_path(path: &Utf8Path) -> Result<Self, PlanetaryError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text, path)?)
    }

    /// Parse label text as if it had been read from `path`.
    pub fn parse(text: &str, path: &Utf8Path) -> Result<Self, LabelError> {
        let module = parse_label(text).map_err(|e| LabelError::Syntax {
            line: e.line,
            context: e.context,
        })?;

        let (pointer, value) = module
            .assignments()
            .find(|(k, _)| k.starts_with('^'))
            .ok_or_else(|| LabelError::MissingPointer(path.to_string()))?;
        let tablename = pointer.trim_start_matches('^').to_string();

        let (index_name, start_record) = match value {
            PvlValue::Text(f) | PvlValue::Symbol(f) => (f.clone(), 1),
            PvlValue::Sequence(items) => match items.as_slice() {
                [file] => (file_name(file, &tablename)?, 1),
                [file, record] => (
                    file_name(file, &tablename)?,
                    record.as_i64().filter(|r| *r > 0).unwrap_or(1) as usize,
                ),
                _ => return Err(LabelError::MissingPointer(path.to_string())),
            },
            _ => return Err(LabelError::AttachedTable(tablename)),
        };

        let table = module
            .blocks(&tablename)
            .find(|b| b.kind == BlockKind::Object)
            .ok_or_else(|| LabelError::MissingTableObject(tablename.clone()))?;

        let columns = table
            .blocks("COLUMN")
            .map(PvlColumn::from_block)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IndexLabel {
            path: path.to_path_buf(),
            tablename,
            index_name,
            start_record,
            columns,
        })
    }

    /// Location of the table file.
    ///
    /// The name from the label is tried first, then its lowercase spelling, since some
    /// archives store the files in lowercase while the labels keep uppercase names.
    pub fn table_path(&self) -> Result<Utf8PathBuf, LabelError> {
        let parent = self.path.parent().unwrap_or(Utf8Path::new(""));
        let exact = parent.join(&self.index_name);
        if exact.exists() {
            return Ok(exact);
        }
        let lower = parent.join(self.index_name.to_lowercase());
        if lower.exists() {
            return Ok(lower);
        }
        Err(LabelError::MissingTableFile(exact.to_string()))
    }

    pub fn columns(&self) -> &[PvlColumn] {
        &self.columns
    }

    /// Column description by its label name.
    pub fn column(&self, name: &str) -> Option<&PvlColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn colnames(&self) -> Vec<String> {
        self.columns.iter().flat_map(|c| c.name_as_list()).collect()
    }

    pub fn colspecs(&self) -> Vec<(usize, usize)> {
        self.columns.iter().flat_map(|c| c.colspecs()).collect()
    }

    pub fn schema(&self) -> LabelSchema {
        LabelSchema::new(
            self.colnames()
                .into_iter()
                .zip(self.colspecs())
                .map(|(name, (start, stop))| ColumnSpec { name, start, stop })
                .collect(),
        )
    }

    /// Split one table line into `(column name, raw substring)` pairs.
    ///
    /// Mostly useful to inspect a line that does not decode as expected.
    pub fn decode_line<'a>(&self, line: &'a str) -> Vec<(String, &'a str)> {
        self.columns
            .iter()
            .flat_map(|c| c.name_as_list().into_iter().zip(c.decode(line)))
            .collect()
    }

    /// Decode the table described by this label.
    ///
    /// Arguments
    /// -----------------
    /// * `convert_times`: parse the calendar time columns (see [`TimeColumns::Auto`]).
    ///
    /// Return
    /// ----------
    /// * The decoded table, or [`LabelError::MissingTableFile`] when the table is not next
    ///   to the label.
    pub fn read_index_data(&self, convert_times: bool) -> Result<IndexTable, PlanetaryError> {
        let times = if convert_times {
            TimeColumns::Auto
        } else {
            TimeColumns::None
        };
        self.read_index_data_with(&times)
    }

    /// Same as [`IndexLabel::read_index_data`] with an explicit time column selection.
    pub fn read_index_data_with(&self, times: &TimeColumns) -> Result<IndexTable, PlanetaryError> {
        let path = self.table_path()?;
        let mut table = IndexTable::from_file(&path, &self.schema(), self.start_record)?;
        table.convert_times(times)?;
        Ok(table)
    }
}

fn file_name(value: &PvlValue, tablename: &str) -> Result<String, LabelError> {
    match value {
        PvlValue::Text(f) | PvlValue::Symbol(f) => Ok(f.clone()),
        _ => Err(LabelError::AttachedTable(tablename.to_string())),
    }
}

#[cfg(test)]
mod label_test {
    use super::*;

    const LABEL: &str = r#"PDS_VERSION_ID = PDS3
RECORD_TYPE    = FIXED_LENGTH
RECORD_BYTES   = 60
^INDEX_TABLE   = "INDEX.TAB"
OBJECT         = INDEX_TABLE
  INTERCHANGE_FORMAT = ASCII
  ROWS               = 2
  COLUMNS            = 3
  OBJECT     = COLUMN
    NAME       = PRODUCT_ID
    DATA_TYPE  = CHARACTER
    START_BYTE = 1
    BYTES      = 20
  END_OBJECT = COLUMN
  OBJECT     = COLUMN
    NAME       = CORNER
    START_BYTE = 22
    BYTES      = 20
    ITEMS      = 4
    ITEM_BYTES = 4
    ITEM_OFFSET = 5
  END_OBJECT = COLUMN
  OBJECT     = COLUMN
    NAME       = FLAGS
    START_BYTE = 43
    BYTES      = 6
    ITEMS      = 3
    ITEM_BYTES = 2
  END_OBJECT = COLUMN
END_OBJECT     = INDEX_TABLE
END
"#;

    fn label() -> IndexLabel {
        IndexLabel::parse(LABEL, Utf8Path::new("/data/INDEX.LBL")).unwrap()
    }

    #[test]
    fn test_pointer_and_names() {
        let label = label();
        assert_eq!(label.tablename, "INDEX_TABLE");
        assert_eq!(label.index_name, "INDEX.TAB");
        assert_eq!(
            label.colnames(),
            vec![
                "PRODUCT_ID", "CORNER_1", "CORNER_2", "CORNER_3", "CORNER_4", "FLAGS_1", "FLAGS_2",
                "FLAGS_3"
            ]
        );
        let expected: usize = label
            .columns()
            .iter()
            .map(|c| c.items.unwrap_or(1))
            .sum();
        assert_eq!(label.colnames().len(), expected);
    }

    #[test]
    fn test_colspecs() {
        let label = label();
        assert_eq!(
            label.colspecs(),
            vec![
                (0, 20),
                (21, 25),
                (26, 30),
                (31, 35),
                (36, 40),
                (42, 44),
                (44, 46),
                (46, 48)
            ]
        );
        let product = label.column("PRODUCT_ID").unwrap();
        assert_eq!(product.stop() - product.start(), product.bytes);
    }

    #[test]
    fn test_decode_line() {
        let label = label();
        let decoded = label.decode_line("P01_001234_1234_XN_00N01W");
        assert_eq!(decoded[0], ("PRODUCT_ID".to_string(), "P01_001234_1234_XN_0"));
        assert_eq!(decoded[1], ("CORNER_1".to_string(), "N01W"));
        assert_eq!(decoded[2], ("CORNER_2".to_string(), ""));
    }

    #[test]
    fn test_pointer_with_record_offset() {
        let text = LABEL.replace(r#"^INDEX_TABLE   = "INDEX.TAB""#, r#"^INDEX_TABLE = ("INDEX.TAB", 3)"#);
        let label = IndexLabel::parse(&text, Utf8Path::new("INDEX.LBL")).unwrap();
        assert_eq!(label.index_name, "INDEX.TAB");
        assert_eq!(label.start_record, 3);
    }

    #[test]
    fn test_label_errors() {
        let no_pointer = LABEL.replace(r#"^INDEX_TABLE   = "INDEX.TAB""#, "");
        assert_eq!(
            IndexLabel::parse(&no_pointer, Utf8Path::new("X.LBL")),
            Err(LabelError::MissingPointer("X.LBL".into()))
        );

        let attached = LABEL.replace(r#"^INDEX_TABLE   = "INDEX.TAB""#, "^INDEX_TABLE = 12");
        assert_eq!(
            IndexLabel::parse(&attached, Utf8Path::new("X.LBL")),
            Err(LabelError::AttachedTable("INDEX_TABLE".into()))
        );

        let zero_bytes = LABEL.replace("BYTES      = 20\n    ITEMS", "BYTES      = 0\n    ITEMS");
        assert!(matches!(
            IndexLabel::parse(&zero_bytes, Utf8Path::new("X.LBL")),
            Err(LabelError::InvalidColumn { column, .. }) if column == "CORNER"
        ));

        let broken = "A = 1\nB 2\nEND\n";
        assert!(matches!(
            IndexLabel::parse(broken, Utf8Path::new("X.LBL")),
            Err(LabelError::Syntax { line: 2, .. })
        ));
    }

    #[test]
    fn test_table_path_lowercase_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let label = IndexLabel::parse(LABEL, &root.join("INDEX.LBL")).unwrap();
        assert_eq!(
            label.table_path(),
            Err(LabelError::MissingTableFile(root.join("INDEX.TAB").to_string()))
        );

        std::fs::write(root.join("index.tab"), "").unwrap();
        assert_eq!(label.table_path().unwrap(), root.join("index.tab"));
    }
}
