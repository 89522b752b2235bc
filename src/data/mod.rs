//! Data structures for the gene set database

pub mod builder;
mod collection;
mod construct;
mod genesetdb;
mod table;
mod value;

pub use builder::GeneSetDbBuilder;
pub use collection::{
    CollectionMetadata, FeatureIdType, MetadataValue, UrlFunction, ID_TYPE_KEY, URL_FUNCTION_KEY,
};
pub use construct::{classify_column, ColumnLevel};
pub use genesetdb::{FeatureMapping, GeneSetDb, RESERVED_SET_COLUMNS};
pub use table::{LongTable, COLLECTION_COL, FEATURE_ID_COL, NAME_COL};
pub use value::Value;
