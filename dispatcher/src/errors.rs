use thiserror::Error;

/// Failure to turn a raw POST body into a [`crate::payload::PostData`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed percent escape at byte {0}")]
    MalformedEscape(usize),
    #[error("decoded body is not valid utf-8")]
    InvalidUtf8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error("template '{name}' in '{parent}' not found")]
    TemplateNotFound { name: String, parent: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to read request body: {0}")]
    Read(String),
    #[error("request body already consumed")]
    BodyConsumed,
    #[error("failed to write response: {0}")]
    Write(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogFormatError {
    #[error("exception report has {found} fields, expected at least {expected}")]
    TooFewFields { found: usize, expected: usize },
    #[error("unterminated element '{0}' in exception report")]
    Unterminated(String),
}

/// Everything a handler can fail with. Only the router turns these into
/// HTTP statuses.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error(transparent)]
    LogFormat(#[from] LogFormatError),
    #[error("{collaborator} failed: {source}")]
    Upstream {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    pub fn upstream(collaborator: &'static str, source: anyhow::Error) -> Self {
        Self::Upstream {
            collaborator,
            source,
        }
    }

    pub fn is_body_read_failure(&self) -> bool {
        matches!(
            self,
            DispatchError::Transport(TransportError::Read(_) | TransportError::BodyConsumed)
        )
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
