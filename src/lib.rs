//! bus-socket - Resilient authenticated WebSocket transport for a message bus
//!
//! Maintains one durable connection to a remote endpoint: it authenticates
//! with an `id:secret` credential pair, reconnects automatically on a fixed
//! delay when the transport drops, and recovers a failed send with exactly
//! one eager close-and-reconnect cycle.
//!
//! ## Architecture
//!
//! | Component          | Responsibility                                  |
//! |--------------------|-------------------------------------------------|
//! | [`Bus`]            | Owns the lifetime of one authorized socket      |
//! | [`AuthorizedSocket`] | Connection lifecycle state machine            |
//! | `socket::transport`  | Raw connection open/send/close seam           |
//!
//! ## Usage
//!
//! ```ignore
//! use bus_socket::Bus;
//!
//! // Connect - blocks until the socket is open and authenticated
//! let bus = Bus::connect("wss://host/bus", "svc", "sek").await?;
//!
//! // Send on the underlying socket; one transient failure is recovered
//! bus.socket().send(b"payload".to_vec()).await?;
//!
//! // Explicit close is terminal: no further reconnection attempts
//! bus.socket().close().await;
//! ```

pub mod bus;
pub mod error;
pub mod socket;

// Re-exports
pub use bus::Bus;
pub use error::SocketError;
pub use socket::{AuthorizedSocket, SocketState};
