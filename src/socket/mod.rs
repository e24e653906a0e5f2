//! Authorized Socket Module
//!
//! A resilient, authenticated, persistent socket connection to a single
//! remote endpoint — the transport foundation the message bus sits on.
//!
//! # Architecture
//!
//! The module is organized by concern, with each submodule having a single
//! responsibility:
//!
//! | Module      | Responsibility                                       |
//! |-------------|------------------------------------------------------|
//! | `transport` | Transport seam: open/send/close on a raw connection  |
//! | `client`    | Lifecycle state machine with automatic reconnection  |
//!
//! # Key Design Principles
//!
//! ## 1. Make Invalid States Unrepresentable
//!
//! The connection is a tagged state (`Connecting`, `Connected`,
//! `ReconnectPending`, `Closed`), not a pair of nullable fields. A pending
//! reconnect cannot coexist with a live handle, and a live handle always
//! has a close-detector armed for it.
//!
//! ## 2. Reconnection Is Not Retry
//!
//! The initial connect makes exactly one attempt and surfaces its failure.
//! The reconnect loop exists only after a successful connect, retries
//! forever on a fixed delay, and surfaces nothing — no caller is awaiting
//! it. Send recovery is bounded at exactly one extra attempt.
//!
//! ## 3. Exclusive Ownership
//!
//! The transport handle and the pending reconnect are owned by the socket's
//! single state value. External collaborators never mutate them.

use std::time::Duration;

mod client;
mod transport;

/// Fixed delay between a transport-initiated close and the next connection
/// attempt. No backoff, no jitter: this link is a single long-lived peer,
/// not a fan-in server, so bounded worst-case reconnect latency wins.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1002);

pub use client::{AuthorizedSocket, SocketState};
pub use transport::{DialEvent, Transport, TransportError, TransportHandle, WsHandle, WsTransport};
