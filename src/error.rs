use std::{fmt, io, net::AddrParseError};

use thiserror::Error;

/// Why a single question produced no answer. None of these reach the client directly; they are
/// logged and the question contributes nothing.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid name {0:?}: no domain separator")]
    InvalidName(String),

    #[error("container {id:?} not found: {cause}")]
    NotFound { id: String, cause: anyhow::Error },

    #[error("container {0:?} has no network settings")]
    NoNetworkInfo(String),

    #[error("cannot build a record for {name} from address {address:?}")]
    RecordConstruction {
        name: String,
        address: String,
        #[source]
        source: AddrParseError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

/// A listener could not start or stopped serving. Always fatal to the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{transport} listener failed: {source}")]
    Transport {
        transport: Transport,
        #[source]
        source: io::Error,
    },

    #[error("listener task ended abnormally: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServerError {
    pub fn transport(transport: Transport) -> impl FnOnce(io::Error) -> ServerError {
        move |source| ServerError::Transport { transport, source }
    }
}
