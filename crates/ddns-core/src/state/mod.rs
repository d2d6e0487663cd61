// # Record Stores
//
// Backends of the `StateStore` trait. Both keep the same table of
// `(domain, owner, ip, first_seen, last_seen, current)` rows, shared
// through `table`:
//
// - `file`: JSON document rewritten atomically on every change
// - `memory`: process-local, used by tests and ephemeral deployments

pub mod file;
pub mod memory;
mod table;

pub use file::{FileStateStore, FileStateStoreFactory};
pub use memory::{MemoryStateStore, MemoryStateStoreFactory};
