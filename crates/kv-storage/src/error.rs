use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed index line in {index_key}.ssif: {line:?}")]
    MalformedIndexLine { index_key: String, line: String },
    #[error("unsupported request op {op:?}")]
    UnsupportedOp { op: String },
    #[error("request missing key argument")]
    MissingKey,
    #[error("request missing value argument for put")]
    MissingValue,
}
