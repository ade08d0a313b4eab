use std::sync::Arc;

use bytes::Bytes;
use log::*;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::connection::{BoxedWriter, Shared, TaskExitGuard};
use crate::deadline::DeadlineWatch;
use crate::ConnectionError;

async fn write_buffer(
    writer: &mut BoxedWriter,
    buffer: &[u8],
    deadline: &mut DeadlineWatch,
) -> Result<(), ConnectionError> {
    let write = async {
        writer.write_all(buffer).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    };

    match deadline.run(write).await {
        None => Err(ConnectionError::WriteTimeout),
        Some(Ok(())) => Ok(()),
        Some(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
            Err(ConnectionError::WriteTimeout)
        }
        Some(Err(e)) => Err(ConnectionError::WriteFailure(e)),
    }
}

/// The write task: writes queued buffers in order until the queue is closed or the connection starts closing.
///
/// Write failures go to the delegate.  They don't close anything; that's the delegate's call.
pub(crate) async fn write_task(
    shared: Arc<Shared>,
    mut writer: BoxedWriter,
    mut receiver: mpsc::Receiver<Bytes>,
) {
    let _exit = TaskExitGuard(shared.clone());
    let mut deadline = shared.write_deadline.watch();

    while let Some(buffer) = receiver.recv().await {
        if shared.is_shutting_down() {
            break;
        }

        let res = write_buffer(&mut writer, &buffer, &mut deadline).await;

        // Failures caused by the close itself aren't interesting.
        if shared.is_shutting_down() {
            break;
        }

        if let Err(e) = res {
            warn!("{}: writing {} bytes failed: {}", shared, buffer.len(), e);
            shared.with_delegate(|d| d.on_write_error(&e));
        }
    }

    // Anything still queued is abandoned.
    receiver.close();

    let grace = shared.config.close_grace();
    match tokio::time::timeout(grace, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("{}: shutting down the write side failed: {}", shared, e),
        Err(_) => debug!("{}: shutting down the write side timed out", shared),
    }

    drop(writer);
    debug!("{}: write side finished", shared);
}
