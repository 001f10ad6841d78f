mod connection;
mod transaction;
mod versioned_schema;

pub use connection::{configure_connection, SqliteConnectionManager};
pub use transaction::{
    TransactionContext, TransactionError, TransactionManager, TransactionType, ValidationError,
};
pub use versioned_schema::{
    apply_schemas, Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
};
