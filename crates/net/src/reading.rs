use std::sync::Arc;

use log::*;
use tokio::io::AsyncReadExt;

use tether_framer::{FrameSink, Parser};

use crate::connection::{BoxedReader, Shared, TaskExitGuard};
use crate::ConnectionError;

/// Feeds parsed messages to whatever delegate is bound at the time.
struct DelegateSink<'a> {
    shared: &'a Shared,
}

impl FrameSink for DelegateSink<'_> {
    fn body_len(&mut self, header: &[u8]) -> usize {
        // Starting requires a delegate and only finishing unbinds it, so this always has one.
        self.shared
            .with_delegate(|d| d.body_len(header))
            .unwrap_or(0)
    }

    fn on_frame(&mut self, header: &[u8], body: &[u8]) {
        self.shared.with_delegate(|d| d.on_message(header, body));
    }
}

/// Read until something goes wrong, returning what did.
async fn read_loop(
    shared: &Shared,
    reader: &mut BoxedReader,
    parser: &mut Parser,
) -> ConnectionError {
    let mut scratch = vec![0u8; shared.config.read_buffer_size()];
    let mut deadline = shared.read_deadline.watch();
    let mut sink = DelegateSink { shared };

    loop {
        let got = match deadline.run(reader.read(&mut scratch[..])).await {
            None => return ConnectionError::ReadTimeout,
            Some(Ok(0)) => return ConnectionError::StreamEnded,
            Some(Ok(n)) => n,
            Some(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                return ConnectionError::ReadTimeout
            }
            Some(Err(e)) => return ConnectionError::ReadFailure(e),
        };

        if let Err(e) = parser.feed(&scratch[..got], &mut sink) {
            return e.into();
        }
    }
}

/// The read task: runs until the read side fails, tells the delegate why if it should hear about it, then closes.
pub(crate) async fn read_task(shared: Arc<Shared>, mut reader: BoxedReader, mut parser: Parser) {
    let _exit = TaskExitGuard(shared.clone());

    let reason = read_loop(&shared, &mut reader, &mut parser).await;
    let closing = shared.is_shutting_down();

    if parser.is_mid_frame() {
        debug!(
            "{}: discarding {} bytes of an incomplete message",
            shared,
            parser.pending_bytes()
        );
    }

    match reason {
        ConnectionError::StreamEnded => {
            debug!("{}: peer closed the stream", shared);
            shared.with_delegate(|d| d.on_stream_end());
        }
        ConnectionError::ReadTimeout if closing => {
            debug!("{}: read side stopped by close", shared);
        }
        ConnectionError::ReadTimeout => {
            debug!("{}: read deadline expired", shared);
            shared.with_delegate(|d| d.on_timeout());
        }
        e => {
            warn!("{}: closing after read error: {}", shared, e);
        }
    }

    shared.close();
    drop(reader);
    debug!("{}: read side finished", shared);
}
