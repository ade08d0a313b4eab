use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use log::*;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use tether_framer::Parser;

use crate::deadline::Deadline;
use crate::{ConnectionConfig, ConnectionError, Delegate, SendError};

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A framed connection over a byte stream.
///
/// Cheap to clone; all clones refer to the same connection.  The usual life of a connection is:
///
/// 1. Create it with [Connection::new] (the [crate::Acceptor] does this for incoming TCP connections).
/// 2. Bind a delegate with [Connection::set_delegate] and optionally set deadlines.
/// 3. [Connection::start] it, which spawns the read and write tasks onto the current Tokio runtime.
/// 4. [Connection::send] buffers until either side gives up, then [Connection::close].
///
/// The connection also closes itself when the read side fails: the peer closes the stream, the read deadline expires,
/// the stream errors, or a header asks for a body over the configured limit.
#[derive(Clone, Debug)]
pub struct Connection {
    shared: Arc<Shared>,
}

/// The parts of a connection which only exist until it is started.
struct Unstarted {
    reader: BoxedReader,
    writer: BoxedWriter,
    receiver: mpsc::Receiver<Bytes>,
    parser: Parser,
}

/// State shared between the connection handles and its two tasks.
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub(crate) struct Shared {
    id: u64,
    peer_addr: Option<SocketAddr>,
    pub(crate) config: ConnectionConfig,

    #[derivative(Debug = "ignore")]
    delegate: ArcSwapOption<Box<dyn Delegate>>,

    /// Set exactly once, by whoever closes the connection first.
    shutting_down: AtomicBool,

    /// Set once nothing will call the delegate again.  Delegates bound after that are dropped at once.
    retired: AtomicBool,

    /// Taken on close, which is what closes the queue.
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,

    pub(crate) read_deadline: Deadline,
    pub(crate) write_deadline: Deadline,

    #[derivative(Debug = "ignore")]
    unstarted: Mutex<Option<Unstarted>>,

    /// Number of tasks which have yet to exit.  Starts at 2 and only counts down once the tasks are running.
    pending_tasks: watch::Sender<usize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl fmt::Display for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn={}", self.id)?;
        if let Some(p) = self.peer_addr {
            write!(f, " peer={}", p)?;
        }
        Ok(())
    }
}

impl Shared {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Run `f` against the current delegate, if one is bound.
    pub(crate) fn with_delegate<R>(&self, f: impl FnOnce(&dyn Delegate) -> R) -> Option<R> {
        let guard = self.delegate.load();
        match &*guard {
            Some(d) => Some(f(&***d)),
            None => None,
        }
    }

    /// The close protocol.  Only the first call does anything.
    pub(crate) fn close(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        // Dropping the only sender closes the queue; the write task sees that once it drains.
        lock(&self.sender).take();

        // If we never started, nothing else will ever release the stream or the delegate.
        if lock(&self.unstarted).take().is_some() {
            self.retire_delegate();
        }

        let grace = self.config.close_grace();
        let until = Instant::now() + grace;
        self.read_deadline.freeze(until);
        self.write_deadline.freeze(until);
        debug!("{}: closing with a grace period of {:?}", self, grace);
    }

    /// Called by each task as it exits.
    pub(crate) fn task_exited(&self) {
        let mut remaining = 0;
        self.pending_tasks.send_modify(|n| {
            *n = n.saturating_sub(1);
            remaining = *n;
        });

        if remaining == 0 {
            self.retire_delegate();
            debug!("{}: finished", self);
        }
    }

    /// Drop the delegate for good.  This breaks the cycle formed by delegates which hold their own connection.
    fn retire_delegate(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.delegate.store(None);
    }

    fn set_delegate(&self, delegate: Arc<Box<dyn Delegate>>) {
        self.delegate.store(Some(delegate));
        // Lost a race with retire_delegate, or came after it.
        if self.retired.load(Ordering::SeqCst) {
            self.delegate.store(None);
        }
    }
}

/// Closes the connection and marks the task as exited when dropped.
///
/// Tasks close the connection themselves on the way out; the close here covers a delegate callback panicking and
/// unwinding through the task, which would otherwise leave the other task waiting forever.
pub(crate) struct TaskExitGuard(pub(crate) Arc<Shared>);

impl Drop for TaskExitGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("{}: a task panicked, closing", self.0);
        }
        self.0.close();
        self.0.task_exited();
    }
}

impl Connection {
    /// Wrap a stream in a connection.  Nothing happens until the connection is started.
    pub fn new<S>(stream: S, config: ConnectionConfig) -> Result<Connection, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::build(stream, None, config)
    }

    /// Like [Connection::new], but records the peer's address for [Connection::peer_addr] and for logging.
    pub fn new_with_peer<S>(
        stream: S,
        peer_addr: SocketAddr,
        config: ConnectionConfig,
    ) -> Result<Connection, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::build(stream, Some(peer_addr), config)
    }

    fn build<S>(
        stream: S,
        peer_addr: Option<SocketAddr>,
        config: ConnectionConfig,
    ) -> Result<Connection, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let parser = Parser::new(config.header_len(), config.max_body_len())?;
        let (sender, receiver) = mpsc::channel(config.send_queue_capacity());
        let (reader, writer) = tokio::io::split(stream);
        let (pending_tasks, _) = watch::channel(2);

        let shared = Shared {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer_addr,
            config,
            delegate: ArcSwapOption::empty(),
            shutting_down: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
            read_deadline: Deadline::new(),
            write_deadline: Deadline::new(),
            unstarted: Mutex::new(Some(Unstarted {
                reader: Box::new(reader),
                writer: Box::new(writer),
                receiver,
                parser,
            })),
            pending_tasks,
        };

        Ok(Connection {
            shared: Arc::new(shared),
        })
    }

    /// Process-unique id of this connection, as shown in logs.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer_addr
    }

    pub fn header_len(&self) -> usize {
        self.shared.config.header_len()
    }

    /// Bind or replace the delegate.  May be called at any time; events after this call go to the new delegate.
    ///
    /// Once the connection has finished, or was closed before it started, the delegate is dropped straight away.
    pub fn set_delegate(&self, delegate: impl Delegate) {
        let delegate: Box<dyn Delegate> = Box::new(delegate);
        self.shared.set_delegate(Arc::new(delegate));
    }

    /// Set the point after which reads fail with a timeout.  `None` disables the deadline.
    ///
    /// Takes effect immediately, even for a read which is already waiting.  Ignored once the connection is closing,
    /// since the close has already set the deadline.
    pub fn set_read_deadline(&self, at: Option<Instant>) {
        self.shared.read_deadline.set(at);
    }

    /// Set the point after which writes fail with a timeout.  Same rules as [Connection::set_read_deadline].
    pub fn set_write_deadline(&self, at: Option<Instant>) {
        self.shared.write_deadline.set(at);
    }

    /// Set the read deadline to `timeout` from now.
    pub fn set_read_timeout(&self, timeout: Duration) {
        self.set_read_deadline(Some(Instant::now() + timeout));
    }

    /// Set the write deadline to `timeout` from now.
    pub fn set_write_timeout(&self, timeout: Duration) {
        self.set_write_deadline(Some(Instant::now() + timeout));
    }

    pub fn read_deadline(&self) -> Option<Instant> {
        self.shared.read_deadline.get()
    }

    pub fn write_deadline(&self) -> Option<Instant> {
        self.shared.write_deadline.get()
    }

    /// Spawn the read and write tasks onto the current Tokio runtime.
    ///
    /// A delegate must be bound first.  Panics if called outside a Tokio runtime.
    pub fn start(&self) -> Result<(), ConnectionError> {
        if self.is_closing() {
            return Err(ConnectionError::Closed);
        }

        if self.shared.delegate.load().is_none() {
            return Err(ConnectionError::NoDelegate);
        }

        let unstarted = match lock(&self.shared.unstarted).take() {
            Some(u) => u,
            // A close which lands after the check above takes the halves too.
            None if self.is_closing() => return Err(ConnectionError::Closed),
            None => return Err(ConnectionError::AlreadyStarted),
        };

        tokio::spawn(crate::reading::read_task(
            self.shared.clone(),
            unstarted.reader,
            unstarted.parser,
        ));
        tokio::spawn(crate::writing::write_task(
            self.shared.clone(),
            unstarted.writer,
            unstarted.receiver,
        ));

        debug!("{}: started", self.shared);
        Ok(())
    }

    /// Queue a buffer to be written, without waiting.
    ///
    /// Fails immediately if the queue is full or the connection is closing, handing the buffer back.  Buffers which
    /// are accepted are written in the order they were accepted.
    pub fn send(&self, buffer: impl Into<Bytes>) -> Result<(), SendError> {
        let buffer = buffer.into();
        let guard = lock(&self.shared.sender);

        let sender = match guard.as_ref() {
            Some(s) => s,
            None => return Err(SendError::Closed(buffer)),
        };

        sender.try_send(buffer).map_err(|e| match e {
            mpsc::error::TrySendError::Full(b) => SendError::QueueFull(b),
            mpsc::error::TrySendError::Closed(b) => SendError::Closed(b),
        })
    }

    /// Close the connection.
    ///
    /// Stops accepting sends and gives outstanding reads and writes the configured grace period to finish.  Buffers
    /// still queued are discarded.  Safe to call any number of times from anywhere; only the first call does anything.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Has the connection started closing?
    pub fn is_closing(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Wait until both tasks have exited.  Never resolves for a connection which was not started.
    pub async fn finished(&self) {
        let mut receiver = self.shared.pending_tasks.subscribe();
        loop {
            let remaining = *receiver.borrow_and_update();
            if remaining == 0 {
                return;
            }
            // Can't fail: the sender lives as long as `self`.
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}
