use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// A bound TCP listening socket for one configured port.
///
/// Owns the listener; dropping the endpoint closes the listening socket.
#[derive(Debug)]
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
    backlog: u32,
}

impl TcpEndpoint {
    /// Bind and listen on `addr` with a bounded pending-connection backlog.
    ///
    /// Port `0` picks an ephemeral port; see [`TcpEndpoint::local_addr`].
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self> {
        if backlog == 0 {
            return Err(TransportError::InvalidBacklog(backlog));
        }

        let bind_err = |source| TransportError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;

        // Allow rebinding while old sockets sit in TIME_WAIT.
        #[cfg(unix)]
        socket.set_reuseaddr(true).map_err(bind_err)?;

        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(backlog).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!(%local_addr, backlog, "listening for tracker connections");

        Ok(Self {
            listener,
            local_addr,
            backlog,
        })
    }

    /// Accept the next connection and disable Nagle buffering on it.
    ///
    /// A failure to set `TCP_NODELAY` is logged and the stream is still returned.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer, error = %err, "failed to disable nagle on accepted stream");
        }
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The configured pending-connection backlog.
    pub fn backlog(&self) -> u32 {
        self.backlog
    }
}
