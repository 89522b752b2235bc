//! GMT gene set files
//!
//! One set per line: `name<TAB>description<TAB>feature_id...`. The
//! description column is ignored on read; on write it carries the set URL
//! when the collection has a URL template and the collection name otherwise.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::data::{GeneSetDb, GeneSetDbBuilder};
use crate::error::{GeneSetError, Result};
use crate::query::AddressMode;

/// Read a GMT file into a single collection
pub fn read_gmt<P: AsRef<Path>>(path: P, collection: &str) -> Result<GeneSetDb> {
    let reader = BufReader::new(File::open(&path)?);
    let mut builder = GeneSetDbBuilder::new();
    let mut n_sets = 0;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split('\t').map(str::trim);
        let name = match fields.next() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(GeneSetError::Construction {
                    reason: format!("line {} of GMT file has no set name", lineno + 1),
                });
            }
        };
        if fields.next().is_none() {
            log::warn!("Gene set '{}' on line {} has no members", name, lineno + 1);
        }
        builder.add_gene_set(collection, name);
        for feature in fields.filter(|f| !f.is_empty()) {
            builder.add_member(collection, name, feature);
        }
        n_sets += 1;
    }

    if n_sets == 0 {
        return Err(GeneSetError::EmptyData {
            reason: format!("no gene sets in {}", path.as_ref().display()),
        });
    }
    builder.build()
}

/// Write every set of the database, members as feature ids
pub fn write_gmt<P: AsRef<Path>>(db: &GeneSetDb, path: P) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for key in db.keys() {
        let members = db.gene_set(&key.collection, &key.name, AddressMode::FeatureId)?;
        let description = db
            .gene_set_url(&key.collection, &key.name)?
            .unwrap_or_else(|| key.collection.clone());
        write!(out, "{}\t{}", key.name, description)?;
        for id in members.as_ids().unwrap_or_default() {
            write!(out, "\t{}", id)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::UrlFunction;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_gmt() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "HALLMARK_A\thttp://x/A\tTP53\tMDM2\tTP53").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "HALLMARK_B\tna\tEGFR").unwrap();
        let db = read_gmt(file.path(), "H").unwrap();
        assert_eq!(db.n_sets(), 2);
        // repeated members are dropped
        assert_eq!(db.gene_set_info("H", "HALLMARK_A").unwrap().size, 2);
    }

    #[test]
    fn test_write_then_read_gmt() {
        let db = GeneSetDb::from_sets("H", vec![("A", vec!["g1", "g2"]), ("B", vec!["g3"])])
            .unwrap()
            .set_url_function("H", UrlFunction::template("https://db/{name}"))
            .unwrap();
        let file = NamedTempFile::new().unwrap();
        write_gmt(&db, file.path()).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("A\thttps://db/A\tg1\tg2\n"));
        let back = read_gmt(file.path(), "H").unwrap();
        assert_eq!(back.keys(), db.keys());
        assert_eq!(back.n_members(), 3);
    }

    #[test]
    fn test_empty_gmt_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        assert!(read_gmt(file.path(), "H").is_err());
    }
}
