mod introspect;
mod versioned_schema;

pub use introspect::{
    find_column, has_unique_index, index_exists, table_columns, unique_index_columns, ColumnInfo,
};
pub use versioned_schema::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
};
