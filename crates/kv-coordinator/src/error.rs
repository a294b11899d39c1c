#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("invalid response_protocol value: {0}")]
    InvalidQuorumPolicy(String),
}
