//! Message Bus Entry Point
//!
//! Single responsibility: Own the lifetime of one [`AuthorizedSocket`].
//!
//! The bus abstraction itself (topics, routing, framing) lives above this
//! crate; here the `Bus` is only the collaborator that obtains the socket.

use crate::error::SocketError;
use crate::socket::{AuthorizedSocket, WsTransport};

/// A message bus handle owning exactly one authorized socket.
pub struct Bus {
    socket: AuthorizedSocket<WsTransport>,
}

impl Bus {
    /// Connect the bus to its endpoint.
    ///
    /// Blocks until the underlying socket is connected and authenticated.
    ///
    /// # Errors
    /// Returns [`SocketError::Connection`] if the initial connection attempt
    /// fails.
    pub async fn connect(url: &str, id: &str, secret: &str) -> Result<Self, SocketError> {
        let socket = AuthorizedSocket::connect(WsTransport, url, id, secret).await?;
        Ok(Self { socket })
    }

    /// The socket this bus owns.
    pub fn socket(&self) -> &AuthorizedSocket<WsTransport> {
        &self.socket
    }
}
