//! Long tables as CSV or TSV files

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::data::{GeneSetDb, LongTable, Value, COLLECTION_COL, FEATURE_ID_COL, NAME_COL};
use crate::error::{GeneSetError, Result};
use crate::query::AddressMode;
use crate::results::NormalizedResult;

/// Tab if the header line has one, comma otherwise
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let mut header = String::new();
    BufReader::new(File::open(path)?).read_line(&mut header)?;
    if header.trim().is_empty() {
        return Err(GeneSetError::EmptyData {
            reason: "file has no header line".to_string(),
        });
    }
    Ok(if header.contains('\t') { b'\t' } else { b',' })
}

/// Read a delimited file with a header row
///
/// `collection`, `name` and `feature_id` are read verbatim as text, with
/// only empty cells null, so identifiers like `00123` or `NA` survive.
/// Other cells are typed with [`Value::parse`].
pub fn read_long_table<P: AsRef<Path>>(path: P) -> Result<LongTable> {
    let delimiter = detect_delimiter(&path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(&path)?;

    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let verbatim: Vec<bool> = names
        .iter()
        .map(|n| [COLLECTION_COL, NAME_COL, FEATURE_ID_COL].contains(&n.as_str()))
        .collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        for ((column, field), &raw) in columns.iter_mut().zip(record.iter()).zip(verbatim.iter()) {
            column.push(match field {
                "" => Value::Null,
                f if raw => Value::from(f),
                f => Value::parse(f),
            });
        }
    }
    LongTable::from_columns(names.into_iter().zip(columns))
}

/// Write a long table, tab separated when `delimiter` is `b'\t'`
pub fn write_long_table<P: AsRef<Path>>(table: &LongTable, path: P, delimiter: u8) -> Result<()> {
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_path(path)?;
    writer.write_record(table.column_names())?;
    for i in 0..table.n_rows() {
        let row = table.row(i).ok_or_else(|| GeneSetError::DimensionMismatch {
            expected: format!("{} rows", table.n_rows()),
            got: format!("no row {}", i),
        })?;
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read gene sets from a long table file
pub fn read_gene_sets<P: AsRef<Path>>(path: P, default_collection: Option<&str>) -> Result<GeneSetDb> {
    let table = read_long_table(&path)?;
    log::info!(
        "Read {} membership rows from {}",
        table.n_rows(),
        path.as_ref().display()
    );
    GeneSetDb::from_table(&table, default_collection)
}

/// Write the membership of a database, addressed by feature id
///
/// Set-level columns are repeated on every member row. Sets without
/// members have no row and are not written.
pub fn write_gene_sets<P: AsRef<Path>>(db: &GeneSetDb, path: P) -> Result<()> {
    let table = db.to_long_table(AddressMode::FeatureId, false)?;
    write_long_table(&table, path, b'\t')
}

/// Write one normalized enrichment result
pub fn write_result<P: AsRef<Path>>(result: &NormalizedResult, path: P) -> Result<()> {
    write_long_table(&result.to_long_table()?, path, b'\t')
}
