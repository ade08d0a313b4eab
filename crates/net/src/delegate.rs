use std::sync::Arc;

use crate::ConnectionError;

/// The caller's half of a connection: receives events and works out how long bodies are.
///
/// All methods are called from the connection's tasks and should return quickly.  A delegate may call back into the
/// connection, for example to [crate::Connection::send] a reply or to [crate::Connection::close] it.
pub trait Delegate: Send + Sync + 'static {
    /// The read deadline expired while the connection wasn't closing.  The connection closes after this returns.
    fn on_timeout(&self);

    /// The peer closed its side of the stream.  Called at most once.
    fn on_stream_end(&self);

    /// A complete message arrived.  Messages arrive in stream order.
    fn on_message(&self, header: &[u8], body: &[u8]);

    /// Given a complete header, how many body bytes follow it?  May be 0.
    ///
    /// Called exactly once per message, right before the body is read.
    fn body_len(&self, header: &[u8]) -> usize;

    /// Writing a queued buffer failed.  The connection stays open; closing it is up to the delegate.
    fn on_write_error(&self, error: &ConnectionError);
}

impl<T: Delegate + ?Sized> Delegate for Arc<T> {
    fn on_timeout(&self) {
        (**self).on_timeout()
    }

    fn on_stream_end(&self) {
        (**self).on_stream_end()
    }

    fn on_message(&self, header: &[u8], body: &[u8]) {
        (**self).on_message(header, body)
    }

    fn body_len(&self, header: &[u8]) -> usize {
        (**self).body_len(header)
    }

    fn on_write_error(&self, error: &ConnectionError) {
        (**self).on_write_error(error)
    }
}
