// # Document Store Implementations
//
// This module provides implementations of the DocumentStore trait that live
// alongside the core. The Firestore store has its own crate.

pub mod file;
pub mod memory;

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;
