mod storage;

pub use storage::{DiskMediaStore, MediaStorageError};
