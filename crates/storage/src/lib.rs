pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use sqlite::{SqliteConnector, SqliteRowStore};
pub use traits::*;
