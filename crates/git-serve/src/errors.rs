use thiserror::Error;

/// Fatal conditions raised while serving a connection.
///
/// None of these are recoverable in place: the serve loop stops at the first
/// error and hands it to the transport for teardown.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("the remote end hung up in the middle of a request")]
    UnexpectedEof,

    #[error("invalid cmd '{0}'")]
    InvalidCommand(String),

    #[error("command already requested")]
    CommandAlreadyRequested,

    #[error("no command requested")]
    NoCommand,

    /// The repository contradicted itself (e.g. a symref that does not resolve).
    #[error("internal consistency failure: {0}")]
    Invariant(String),

    /// An outgoing line does not fit in one packet.
    #[error("packet payload of {0} bytes exceeds {max}", max = crate::pkt::MAX_PKT_DATA)]
    PacketTooLong(usize),

    #[error("reference store error: {0}")]
    Store(String),

    #[error("capability registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServeError {
    /// Whether the client caused the failure by violating request sequencing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServeError::Protocol(_)
                | ServeError::UnexpectedEof
                | ServeError::InvalidCommand(_)
                | ServeError::CommandAlreadyRequested
                | ServeError::NoCommand
        )
    }

    pub(crate) fn store(err: impl std::fmt::Display) -> Self {
        ServeError::Store(err.to_string())
    }
}
