//! Echo every [TypeLengthHeader] message back to whoever sent it.
//!
//! Try it with something like `printf '\x01\x00\x00\x00\x05hello' | nc 127.0.0.1 8210 | xxd`.
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use log::*;
use structopt::StructOpt;
use tokio::net::TcpStream;

use tether_framer::TypeLengthHeader;
use tether_net::*;

#[derive(StructOpt)]
struct Params {
    #[structopt(long = "--listen", default_value = "127.0.0.1:8210")]
    listen: SocketAddr,

    /// Close connections which have been quiet for this many seconds.
    #[structopt(long = "--idle-secs", default_value = "60")]
    idle_secs: u64,

    #[structopt(long = "--queue", default_value = "5")]
    queue: usize,

    /// Refuse bodies longer than this.
    #[structopt(long = "--max-body", default_value = "65536")]
    max_body: usize,
}

struct Echo {
    conn: Connection,
    idle: Duration,
}

impl Delegate for Echo {
    fn on_timeout(&self) {
        info!("Connection {} went idle", self.conn.id());
    }

    fn on_stream_end(&self) {
        info!("Connection {} hung up", self.conn.id());
    }

    fn on_message(&self, header: &[u8], body: &[u8]) {
        self.conn.set_read_timeout(self.idle);

        let mut reply = Vec::with_capacity(header.len() + body.len());
        reply.extend_from_slice(header);
        reply.extend_from_slice(body);
        if let Err(e) = self.conn.send(reply) {
            warn!("Dropping reply on connection {}: {}", self.conn.id(), e);
        }
    }

    fn body_len(&self, header: &[u8]) -> usize {
        // Connections only hand out complete headers, so this can't fail.
        TypeLengthHeader::body_len_of(header).unwrap_or(0)
    }

    fn on_write_error(&self, error: &ConnectionError) {
        warn!("Closing connection {}: {}", self.conn.id(), error);
        self.conn.close();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tether_logging::log_to_stderr();

    let params = Params::from_args();
    let idle = Duration::from_secs(params.idle_secs);

    let config = AcceptorConfigBuilder::default()
        .listen_addr(params.listen)
        .connection(
            ConnectionConfigBuilder::default()
                .header_len(TypeLengthHeader::SIZE)
                .send_queue_capacity(params.queue)
                .max_body_len(params.max_body)
                .build()?,
        )
        .build()?;

    serve(
        config,
        |_: &TcpStream, peer: SocketAddr| {
            debug!("Incoming connection from {}", peer);
            true
        },
        move |conn: &Connection| {
            conn.set_delegate(Echo {
                conn: conn.clone(),
                idle,
            });
            conn.set_read_timeout(idle);
        },
    )
    .await?;

    Ok(())
}
