#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("user id must not be empty")]
    EmptyUserId,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u32),
    #[error("store lock poisoned")]
    Poisoned,
}
