//! Record storage.
//!
//! This module provides persistent storage for sessions of test case
//! records, supporting file-based and in-memory backends.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use traits::RecordStore;
