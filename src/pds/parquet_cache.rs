//! # Columnar cache of decoded index tables
//!
//! Decoding a large fixed-width index (several hundred MB for CTX or HiRISE) takes a while,
//! so the decoded [`IndexTable`] is stored next to the table as an Apache Parquet file.
//!
//! ## Column types
//! -----------------
//! The Arrow type of every column is inferred from its cells:
//!
//! | cells (ignoring nulls)           | Arrow type                     |
//! |----------------------------------|--------------------------------|
//! | only [`Cell::Integer`]           | `Int64`                        |
//! | integers and reals               | `Float64`                      |
//! | times and invalid times          | `Timestamp(Microsecond, None)` |
//! | anything else                    | `Utf8`                         |
//!
//! Invalid times are stored as nulls in timestamp columns, so they read back as
//! [`Cell::Null`].
//!
//! ## Atomicity
//! -----------------
//! The file is first written under a temporary name in the same directory and then renamed,
//! so a reader never sees a half-written cache. Writing the same table twice produces
//! byte-identical files.
use std::fs::File;
use std::sync::Arc;

use arrow_array::{
    cast::AsArray,
    types::{Float64Type, Int64Type, TimestampMicrosecondType},
    Array, ArrayRef, Float64Array, Int64Array, RecordBatch, RecordBatchOptions, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use camino::Utf8Path;
use chrono::DateTime;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use tracing::{debug, info};

use crate::pds::table::{Cell, IndexTable, TableRow};
use crate::planetary_errors::PlanetaryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Real,
    Time,
    Text,
}

fn column_kind<'a>(cells: impl Iterator<Item = &'a Cell>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for cell in cells {
        let this = match cell {
            Cell::Null => continue,
            Cell::Integer(_) => ColumnKind::Integer,
            Cell::Real(_) => ColumnKind::Real,
            Cell::Time(_) | Cell::InvalidTime(_) => ColumnKind::Time,
            Cell::Text(_) => return ColumnKind::Text,
        };
        kind = match (kind, this) {
            (None, k) => Some(k),
            (Some(a), b) if a == b => Some(a),
            (Some(ColumnKind::Integer), ColumnKind::Real)
            | (Some(ColumnKind::Real), ColumnKind::Integer) => Some(ColumnKind::Real),
            _ => return ColumnKind::Text,
        };
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn build_array(table: &IndexTable, idx: usize) -> (DataType, ArrayRef) {
    let cells = || table.rows().iter().map(move |r| &r.cells[idx]);
    match column_kind(cells()) {
        ColumnKind::Integer => (
            DataType::Int64,
            Arc::new(Int64Array::from(
                cells().map(Cell::as_i64).collect::<Vec<_>>(),
            )),
        ),
        ColumnKind::Real => (
            DataType::Float64,
            Arc::new(Float64Array::from(
                cells().map(Cell::as_f64).collect::<Vec<_>>(),
            )),
        ),
        ColumnKind::Time => (
            DataType::Timestamp(TimeUnit::Microsecond, None),
            Arc::new(TimestampMicrosecondArray::from(
                cells()
                    .map(|c| c.as_time().map(|t| t.and_utc().timestamp_micros()))
                    .collect::<Vec<_>>(),
            )),
        ),
        ColumnKind::Text => (
            DataType::Utf8,
            Arc::new(StringArray::from(
                cells()
                    .map(|c| (!c.is_null()).then(|| c.to_string()))
                    .collect::<Vec<_>>(),
            )),
        ),
    }
}

/// Store a table as a Parquet file.
///
/// Arguments
/// -----------------
/// * `table`: the decoded table, usually after [`IndexTable::convert_dtypes`].
/// * `path`: destination, replaced if it exists.
///
/// Return
/// ----------
/// * Nothing, or the I/O / Arrow / Parquet error. On error the destination is untouched.
pub fn write_parquet(table: &IndexTable, path: &Utf8Path) -> Result<(), PlanetaryError> {
    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let (dtype, array) = build_array(table, idx);
            (Field::new(name, dtype, true), array)
        })
        .unzip();

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new_with_options(
        schema.clone(),
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(table.n_rows())),
    )?;

    let tmp = path.with_extension("parq.tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
    }
    std::fs::rename(&tmp, path)?;
    info!(rows = table.n_rows(), "stored index cache {}", path);
    Ok(())
}

fn read_column(array: &dyn Array) -> Vec<Cell> {
    let len = array.len();
    match array.data_type() {
        DataType::Int64 => {
            let values = array.as_primitive::<Int64Type>();
            (0..len)
                .map(|i| {
                    if values.is_null(i) {
                        Cell::Null
                    } else {
                        Cell::Integer(values.value(i))
                    }
                })
                .collect()
        }
        DataType::Float64 => {
            let values = array.as_primitive::<Float64Type>();
            (0..len)
                .map(|i| {
                    if values.is_null(i) {
                        Cell::Null
                    } else {
                        Cell::Real(values.value(i))
                    }
                })
                .collect()
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let values = array.as_primitive::<TimestampMicrosecondType>();
            (0..len)
                .map(|i| {
                    if values.is_null(i) {
                        return Cell::Null;
                    }
                    DateTime::from_timestamp_micros(values.value(i))
                        .map(|d| Cell::Time(d.naive_utc()))
                        .unwrap_or(Cell::Null)
                })
                .collect()
        }
        DataType::Utf8 => {
            let values = array.as_string::<i32>();
            (0..len)
                .map(|i| {
                    if values.is_null(i) {
                        Cell::Null
                    } else {
                        Cell::Text(values.value(i).to_string())
                    }
                })
                .collect()
        }
        other => {
            debug!(?other, "unsupported column type in index cache, read as nulls");
            vec![Cell::Null; len]
        }
    }
}

/// Read a Parquet index cache back into an [`IndexTable`].
pub fn read_parquet(path: &Utf8Path) -> Result<IndexTable, PlanetaryError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let decoded: Vec<Vec<Cell>> = batch
            .columns()
            .iter()
            .map(|a| read_column(a.as_ref()))
            .collect();
        for i in 0..batch.num_rows() {
            rows.push(TableRow::new(
                decoded.iter().map(|col| col[i].clone()).collect(),
            ));
        }
    }
    Ok(IndexTable::new(columns, rows))
}

#[cfg(test)]
mod parquet_cache_test {
    use super::*;
    use crate::pds::table::TimeColumns;
    use crate::pds::label::{ColumnSpec, LabelSchema};

    fn table() -> IndexTable {
        let schema = LabelSchema::new(vec![
            ColumnSpec {
                name: "PRODUCT_ID".into(),
                start: 0,
                stop: 4,
            },
            ColumnSpec {
                name: "START_TIME".into(),
                start: 5,
                stop: 13,
            },
            ColumnSpec {
                name: "LINES".into(),
                start: 14,
                stop: 18,
            },
            ColumnSpec {
                name: "SCALE".into(),
                start: 19,
                stop: 23,
            },
        ]);
        let text = "AAAA 2010-110 1024  0.5\nBBBB UNK      2048    2\nCCCC 2011-001      1.25\n";
        let mut table = IndexTable::decode(text.as_bytes(), &schema, 1).unwrap();
        table.convert_times(&TimeColumns::Auto).unwrap();
        table.convert_dtypes();
        table
    }

    #[test]
    fn test_column_kinds() {
        let table = table();
        assert_eq!(column_kind(table.column("LINES").unwrap().into_iter()), ColumnKind::Integer);
        assert_eq!(column_kind(table.column("SCALE").unwrap().into_iter()), ColumnKind::Real);
        assert_eq!(column_kind(table.column("START_TIME").unwrap().into_iter()), ColumnKind::Time);
        assert_eq!(column_kind(table.column("PRODUCT_ID").unwrap().into_iter()), ColumnKind::Text);
        assert_eq!(column_kind([Cell::Null].iter()), ColumnKind::Text);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("index.parq");
        let table = table();
        write_parquet(&table, &path).unwrap();
        assert!(!path.with_extension("parq.tmp").exists());

        let back = read_parquet(&path).unwrap();
        assert_eq!(back.columns(), table.columns());
        assert_eq!(back.get(0, "LINES"), Some(&Cell::Integer(1024)));
        assert_eq!(back.get(2, "LINES"), Some(&Cell::Null));
        assert_eq!(back.get(1, "SCALE"), Some(&Cell::Real(2.0)));
        assert_eq!(back.get(0, "START_TIME"), table.get(0, "START_TIME"));
        // invalid times are stored as nulls
        assert_eq!(back.get(1, "START_TIME"), Some(&Cell::Null));
    }

    #[test]
    fn test_rebuild_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let table = table();
        write_parquet(&table, &root.join("a.parq")).unwrap();
        write_parquet(&table, &root.join("b.parq")).unwrap();
        assert_eq!(
            std::fs::read(root.join("a.parq")).unwrap(),
            std::fs::read(root.join("b.parq")).unwrap()
        );
    }
}
