//! Cache namespaces
//!
//! Each build tool sharing a source tree gets its own cache directory, and a
//! run holds an exclusive lock on that directory from start to finish.

pub mod lock;
pub mod namespace;

pub use lock::{CacheLock, LOCK_FILE_NAME};
pub use namespace::{CacheNamespace, CacheNamespaceManager};
