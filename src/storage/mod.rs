pub mod sqlite;

pub use sqlite::{RunInfo, SqliteStorage};
