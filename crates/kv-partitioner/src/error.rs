#[derive(Debug, thiserror::Error)]
pub enum PartitionerError {
    #[error("physical node {0} already registered")]
    AlreadyRegistered(String),
}
