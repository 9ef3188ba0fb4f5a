mod connection;

pub use connection::{create_pool, schema_version};
