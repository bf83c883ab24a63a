use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path traversal detected in '{0}'")]
    PathTraversal(String),
    #[error("'{0}' resolves outside the sandbox root")]
    OutsideRoot(String),
    #[error("source file '{name}' is {size} bytes, limit is {limit}")]
    SourceTooLarge { name: String, size: u64, limit: u64 },
    #[error("program '{0}' is not permitted in sandbox")]
    ProgramNotAllowed(String),
    #[error("process execution timed out after {0:?}")]
    Timeout(Duration),
    #[error("process produced {stream} output exceeding limit of {limit} bytes")]
    OutputTooLarge { stream: &'static str, limit: usize },
    #[error("process terminated by signal")]
    TerminatedBySignal,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
