//! Reading and writing gene sets and results

mod csv;
mod gmt;

pub use self::csv::{read_gene_sets, read_long_table, write_gene_sets, write_long_table, write_result};
pub use gmt::{read_gmt, write_gmt};
