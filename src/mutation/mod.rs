//! Mutation path for sheetdb
//!
//! - `controller`: insert, update, delete and restore
//! - `lock`: the single-writer lock and its RAII guard
//! - `id`: id strategies for inserted rows

mod controller;
mod id;
mod lock;

pub use controller::{DeleteMode, MutationController, CREATED_AT, HASH, ID, UPDATED_AT};
pub use id::{IdGenerator, IdStrategy, UniqueIdSource, UuidSource, MAX_SEQUENTIAL_ID};
pub use lock::{FileLock, LockGuard, ProcessLock, WriterLock};
