use thiserror::Error;

/// Storage-layer errors, kept distinct from [`batch_core::EngineError`] so
/// this crate doesn't need to know the engine's taxonomy to report a
/// failure; [`crate::sled_store::SledPersistence`] maps these into
/// `EngineError::Persistence` at the `KvNamespaces` boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("sled transaction error: {0}")]
    Transaction(String),

    #[error("serialization error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("serialization error: {0}")]
    Json(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
