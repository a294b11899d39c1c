use kv_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("binding listen address: {0}")]
    Bind(#[source] std::io::Error),
    #[error("opening storage engine: {0}")]
    Storage(#[from] StorageError),
}
