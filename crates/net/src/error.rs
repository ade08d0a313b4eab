use bytes::Bytes;

use tether_framer::ParserError;

/// Everything that can go wrong with a connection.
#[derive(Debug, derive_more::Display, thiserror::Error)]
#[non_exhaustive]
pub enum ConnectionError {
    #[display(fmt = "the peer closed the stream")]
    StreamEnded,

    #[display(fmt = "the read deadline expired")]
    ReadTimeout,

    #[display(fmt = "read failed: {}", _0)]
    ReadFailure(#[source] std::io::Error),

    /// The incoming data couldn't be framed, for example because a body was over the configured limit.
    #[display(fmt = "framing failed: {}", _0)]
    Framing(#[from] ParserError),

    #[display(fmt = "the write deadline expired")]
    WriteTimeout,

    #[display(fmt = "write failed: {}", _0)]
    WriteFailure(#[source] std::io::Error),

    /// [crate::Connection::start] was called before a delegate was bound.
    #[display(fmt = "no delegate was bound")]
    NoDelegate,

    #[display(fmt = "the connection was already started")]
    AlreadyStarted,

    /// The connection was closed before it was started.
    #[display(fmt = "the connection is closed")]
    Closed,
}

/// Returned by [crate::Connection::send] when a buffer can't be queued.  Hands the buffer back.
#[derive(Debug, derive_more::Display, thiserror::Error)]
pub enum SendError {
    #[display(fmt = "the send queue is full")]
    QueueFull(Bytes),

    #[display(fmt = "the connection is closing")]
    Closed(Bytes),
}

impl SendError {
    pub fn into_inner(self) -> Bytes {
        match self {
            SendError::QueueFull(b) | SendError::Closed(b) => b,
        }
    }
}

/// Fatal errors from the [crate::Acceptor].  Once one of these happens the acceptor stops.
#[derive(Debug, derive_more::Display, thiserror::Error)]
#[non_exhaustive]
pub enum AcceptError {
    #[display(fmt = "unable to listen: {}", _0)]
    Bind(#[source] std::io::Error),

    #[display(fmt = "unable to accept: {}", _0)]
    Accept(#[source] std::io::Error),
}
