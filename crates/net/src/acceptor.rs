use std::net::SocketAddr;

use log::*;
use tokio::net::{TcpListener, TcpStream};

use crate::{AcceptError, Connection, ConnectionConfig};

/// Decides whether to accept an incoming connection.  Rejected connections are dropped without further notice.
///
/// Implemented for any `Fn(&TcpStream, SocketAddr) -> bool`.
pub trait AcceptPolicy: Send + Sync + 'static {
    fn should_accept(&self, stream: &TcpStream, peer: SocketAddr) -> bool;
}

impl<F> AcceptPolicy for F
where
    F: Fn(&TcpStream, SocketAddr) -> bool + Send + Sync + 'static,
{
    fn should_accept(&self, stream: &TcpStream, peer: SocketAddr) -> bool {
        self(stream, peer)
    }
}

/// Configures a newly accepted connection before it starts.
///
/// This is where to bind a delegate and set the initial deadlines.  It runs synchronously on the accept loop, so no
/// bytes are read or written until it returns.  A connection which comes out of this without a delegate is dropped.
///
/// Implemented for any `Fn(&Connection)`.
pub trait ConnectionConfigurer: Send + Sync + 'static {
    fn configure(&self, connection: &Connection);
}

impl<F> ConnectionConfigurer for F
where
    F: Fn(&Connection) + Send + Sync + 'static,
{
    fn configure(&self, connection: &Connection) {
        self(connection)
    }
}

#[derive(Clone, Debug, derive_builder::Builder)]
pub struct AcceptorConfig {
    /// Where to listen.  Port 0 picks a free port; see [Acceptor::local_addr].
    listen_addr: SocketAddr,

    /// Used for every accepted connection.  Each gets its own queue of the configured capacity.
    connection: ConnectionConfig,
}

/// Accepts TCP connections and turns them into started [Connection]s.
///
/// We don't support clean shutdown of the acceptor itself: drop the future returned by [Acceptor::serve] to stop
/// accepting.  Connections which were already started keep running.
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub struct Acceptor {
    config: AcceptorConfig,
    listener: TcpListener,
    #[derivative(Debug = "ignore")]
    policy: Box<dyn AcceptPolicy>,
    #[derivative(Debug = "ignore")]
    configurer: Box<dyn ConnectionConfigurer>,
}

impl Acceptor {
    /// Bind the listening socket.
    pub async fn bind(
        config: AcceptorConfig,
        policy: impl AcceptPolicy,
        configurer: impl ConnectionConfigurer,
    ) -> Result<Acceptor, AcceptError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(AcceptError::Bind)?;

        Ok(Acceptor {
            config,
            listener,
            policy: Box::new(policy),
            configurer: Box::new(configurer),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AcceptError> {
        self.listener.local_addr().map_err(AcceptError::Bind)
    }

    /// Run the accept loop.
    ///
    /// Only returns if accepting fails, which is fatal: the listener is closed and the error handed back.  Restarting
    /// is up to the caller.
    pub async fn serve(self) -> Result<(), AcceptError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Accepting connections on {}", addr);
        }

        loop {
            let (stream, peer) = self.listener.accept().await.map_err(|e| {
                error!("Accept failed, no longer accepting connections: {}", e);
                AcceptError::Accept(e)
            })?;
            self.admit(stream, peer);
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if !self.policy.should_accept(&stream, peer) {
            debug!("Rejected connection from {}", peer);
            return;
        }

        let conn = match Connection::new_with_peer(stream, peer, self.config.connection.clone()) {
            Ok(c) => c,
            Err(e) => {
                warn!("Unable to set up connection from {}: {}", peer, e);
                return;
            }
        };

        self.configurer.configure(&conn);

        if let Err(e) = conn.start() {
            warn!("Dropping connection {} from {}: {}", conn.id(), peer, e);
            conn.close();
        }
    }
}

/// Bind and serve in one go.
pub async fn serve(
    config: AcceptorConfig,
    policy: impl AcceptPolicy,
    configurer: impl ConnectionConfigurer,
) -> Result<(), AcceptError> {
    Acceptor::bind(config, policy, configurer).await?.serve().await
}
