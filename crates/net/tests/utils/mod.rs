#![allow(dead_code)]
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use tether_framer::TypeLengthHeader;
use tether_net::*;

/// How long any single wait in a test may take before the test is considered hung.
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Timeout,
    StreamEnd,
    Message { header: Vec<u8>, body: Vec<u8> },
    WriteError(String),
}

impl Event {
    pub fn message(kind: u8, body: &[u8]) -> Event {
        let framed = frame(kind, body);
        Event::Message {
            header: framed[..TypeLengthHeader::SIZE].to_vec(),
            body: body.to_vec(),
        }
    }
}

/// A delegate which speaks [TypeLengthHeader] and records everything that happens to it.
pub struct Recorder {
    sender: mpsc::UnboundedSender<Event>,
}

pub struct Events {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl Recorder {
    pub fn new() -> (Recorder, Events) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Recorder { sender }, Events { receiver })
    }

    fn record(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Delegate for Recorder {
    fn on_timeout(&self) {
        self.record(Event::Timeout);
    }

    fn on_stream_end(&self) {
        self.record(Event::StreamEnd);
    }

    fn on_message(&self, header: &[u8], body: &[u8]) {
        self.record(Event::Message {
            header: header.to_vec(),
            body: body.to_vec(),
        });
    }

    fn body_len(&self, header: &[u8]) -> usize {
        TypeLengthHeader::body_len_of(header).expect("Connections only hand out complete headers")
    }

    fn on_write_error(&self, error: &ConnectionError) {
        self.record(Event::WriteError(error.to_string()));
    }
}

impl Events {
    pub async fn next(&mut self) -> Result<Event> {
        timeout(WAIT, self.receiver.recv())
            .await?
            .ok_or_else(|| anyhow!("The delegate was dropped"))
    }

    /// Everything recorded from now until the delegate is dropped, which happens once the connection finishes.
    pub async fn rest(&mut self) -> Result<Vec<Event>> {
        let mut out = vec![];
        while let Some(e) = timeout(WAIT, self.receiver.recv()).await? {
            out.push(e);
        }
        Ok(out)
    }
}

pub fn frame(kind: u8, body: &[u8]) -> Vec<u8> {
    TypeLengthHeader::frame(kind, body).expect("Test bodies are small")
}

pub fn test_config() -> ConnectionConfigBuilder {
    let mut builder = ConnectionConfigBuilder::default();
    builder
        .header_len(TypeLengthHeader::SIZE)
        .close_grace(Duration::from_millis(200));
    builder
}

/// A connection as handed to the test by the acceptor's configuration hook.
pub struct Accepted {
    pub conn: Connection,
    pub events: Events,
}

/// Start an acceptor on a free local port which binds a [Recorder] to every connection, lets `setup` do anything
/// else, and hands the result to the test.
pub async fn start_acceptor(
    config: ConnectionConfig,
    setup: impl Fn(&Connection) + Send + Sync + 'static,
) -> Result<(SocketAddr, mpsc::UnboundedReceiver<Accepted>)> {
    let (sender, receiver) = mpsc::unbounded_channel();

    let acceptor_config = AcceptorConfigBuilder::default()
        .listen_addr("127.0.0.1:0".parse()?)
        .connection(config)
        .build()?;
    let acceptor = Acceptor::bind(
        acceptor_config,
        |_: &TcpStream, _: SocketAddr| true,
        move |conn: &Connection| {
            let (recorder, events) = Recorder::new();
            conn.set_delegate(recorder);
            setup(conn);
            let _ = sender.send(Accepted {
                conn: conn.clone(),
                events,
            });
        },
    )
    .await?;

    let addr = acceptor.local_addr()?;
    tokio::spawn(acceptor.serve());
    Ok((addr, receiver))
}

pub async fn next_accepted(receiver: &mut mpsc::UnboundedReceiver<Accepted>) -> Result<Accepted> {
    timeout(WAIT, receiver.recv())
        .await?
        .ok_or_else(|| anyhow!("The acceptor stopped"))
}

/// Read until the other side closes its half, returning everything read.
pub async fn read_to_eof(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut out = vec![];
    timeout(WAIT, stream.read_to_end(&mut out)).await??;
    Ok(out)
}

/// Wait for the server to go away, without it having sent us anything.
///
/// Closing a socket which still has unread data makes the kernel reset it rather than close it cleanly, so a reset
/// counts too.
pub async fn expect_closed(stream: &mut TcpStream) -> Result<()> {
    let mut out = vec![];
    match timeout(WAIT, stream.read_to_end(&mut out)).await? {
        Ok(_) => {
            anyhow::ensure!(out.is_empty(), "Unexpected data: {:?}", out);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Run a test body under a timeout, logging to stderr.
pub async fn run_test(body: impl Future<Output = Result<()>>) {
    tether_logging::log_to_stderr();
    let res = timeout(Duration::from_secs(20), body).await;
    assert!(res.is_ok(), "{:?}", res);
    let inner_res = res.unwrap();
    assert!(inner_res.is_ok(), "{:?}", inner_res);
}
