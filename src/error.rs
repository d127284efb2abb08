use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// The connection handle could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store rejected or failed a command. The store's own error is kept
    /// as the source.
    #[error("store command {command} failed: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn connection(cause: impl Into<BoxError>) -> Self {
        Error::Connection(cause.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidArgument(reason.into())
    }

    pub fn command(command: &'static str, cause: impl Into<BoxError>) -> Self {
        Error::Command {
            command,
            source: cause.into(),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
