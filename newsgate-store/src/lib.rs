pub mod sqlite;
pub mod traits;

#[cfg(feature = "test-support")]
pub mod memory;

pub use sqlite::SqliteStore;
pub use traits::{ItemQuery, NewItem, Store, TriageUpdate};

#[cfg(feature = "test-support")]
pub use memory::InMemoryStore;
