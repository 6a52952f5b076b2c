mod repository;

pub use repository::{SessionStorage, StorageConfig, StoredSession};
