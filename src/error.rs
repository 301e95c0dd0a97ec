use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmberError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("no such entry point '{0}'")]
    UnknownEntryPoint(String),

    #[error("no such operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{name}' does not have the shape required by {operation}")]
    OperatorShape {
        name: String,
        operation: &'static str,
    },

    #[error("no partitions to dispatch to: {0}")]
    NoPartitions(String),

    #[error("all {0} partition calls failed")]
    AllPartitionsFailed(usize),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to rename table {from} to {to}")]
    RenameFailed { from: String, to: String },

    #[error("logic error: {0}")]
    Logic(String),

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("malformed logic payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EmberError>;
