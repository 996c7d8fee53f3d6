//! `batch-persistence`: a crash-recoverable [`batch_core::KvNamespaces`]
//! backend over an embedded [`sled`] database, laid out on disk per run
//! directory exactly as spec'd for `batch-core`'s checkpoint protocol.

mod error;
mod sled_store;

pub use error::StoreError;
pub use sled_store::SledPersistence;
