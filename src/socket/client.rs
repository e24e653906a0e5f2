//! Authorized Socket
//!
//! Single responsibility: Maintain one durable, authenticated connection to
//! a remote endpoint, reconnecting as needed.
//!
//! # Lifecycle
//!
//! ```text
//!            connect()
//!                │
//!                ▼
//!          ┌───────────┐   transport open    ┌───────────┐
//!          │Connecting │────────────────────▶│ Connected │
//!          └───────────┘                     └───────────┘
//!                ▲                             │       │
//!                │ delay elapsed,              │       │ close()
//!                │ dial                        │       ▼
//!          ┌─────┴──────────┐  transport close │  ┌─────────┐
//!          │ReconnectPending│◀─────────────────┘  │ Closed  │
//!          └────────────────┘                     └─────────┘
//! ```
//!
//! `Closed` is terminal and reachable only via explicit [`AuthorizedSocket::close`];
//! every transport-initiated close feeds the reconnect loop instead.
//!
//! # Key Design Points
//!
//! - The connection is a tagged state, not a nullable field. Holding a
//!   `Connected` value means exactly one live handle exists with a
//!   close-detector armed for it.
//! - Each installed handle gets a generation number. A close-detector only
//!   acts when the socket still holds *its* handle, never a later one.
//! - Send recovery is a bounded two-attempt function: one resend after one
//!   eager close-and-reconnect, never more.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::transport::{DialEvent, Transport, TransportHandle};
use super::RECONNECT_DELAY;
use crate::error::SocketError;

/// Observable lifecycle state of an [`AuthorizedSocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// A connection attempt is in flight.
    Connecting,
    /// A transport handle is live.
    Connected,
    /// No handle; a reconnect attempt is scheduled.
    ReconnectPending,
    /// Explicitly closed. Terminal.
    Closed,
}

/// Internal connection state. One value, one owner, mutated only at
/// transition points while the lock is held.
enum ConnState<H> {
    Connecting,
    Connected { handle: Arc<H>, generation: u64 },
    ReconnectPending { reconnect: AbortHandle },
    Closed,
}

/// A durable, authenticated connection to a single remote endpoint.
///
/// # Guarantees
///
/// - `connect()` only returns once the transport has signalled open.
/// - A transport-initiated close triggers reconnection after a fixed delay,
///   retrying forever until it succeeds or the socket is explicitly closed.
/// - `send()` recovers from at most one transient send failure per call by
///   eagerly closing, reconnecting once, and resending.
/// - `close()` is idempotent and cancels any pending reconnect.
///
/// # Non-Guarantees
///
/// - The connection can die between calls.
/// - Reconnect-loop failures are never surfaced; no caller is awaiting them.
pub struct AuthorizedSocket<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> std::fmt::Debug for AuthorizedSocket<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedSocket")
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

struct Inner<T: Transport> {
    transport: T,
    url: String,
    id: String,
    secret: String,
    state: Mutex<ConnState<T::Handle>>,
    /// Ties each close-detector to the specific handle it was armed for.
    generation: AtomicU64,
}

impl<T: Transport> AuthorizedSocket<T> {
    /// Connect to the endpoint, authenticating with the `id:secret` pair.
    ///
    /// Makes exactly one connection attempt. Retrying is the reconnect
    /// loop's job, which only exists after a successful initial connect.
    ///
    /// # Errors
    /// Returns [`SocketError::Connection`] if the transport closes before
    /// ever opening, carrying the close code and the last transport error
    /// observed during the attempt.
    pub async fn connect(
        transport: T,
        url: impl Into<String>,
        id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, SocketError> {
        let inner = Arc::new(Inner {
            transport,
            url: url.into(),
            id: id.into(),
            secret: secret.into(),
            state: Mutex::new(ConnState::Connecting),
            generation: AtomicU64::new(0),
        });

        info!(url = %inner.url, id = %inner.id, "connecting authorized socket");

        let handle = inner.dial_once().await?;
        Inner::install(&inner, handle).await?;

        info!(url = %inner.url, "authorized socket connected");

        Ok(Self { inner })
    }

    /// Send a binary payload on the current connection.
    ///
    /// If the first attempt fails on a live handle, performs exactly one
    /// recovery cycle: close the handle, reconnect immediately (bypassing
    /// the reconnect delay), and resend.
    ///
    /// # Errors
    /// - [`SocketError::Disconnected`] if no transport handle exists; no
    ///   connection attempt is made in that case.
    /// - [`SocketError::Connection`] if the recovery connect fails.
    /// - [`SocketError::Send`] if the recovery resend fails.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), SocketError> {
        let handle = {
            let state = self.inner.state.lock().await;
            match &*state {
                ConnState::Connected { handle, .. } => Arc::clone(handle),
                _ => return Err(SocketError::Disconnected),
            }
        };

        match handle.send(payload.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Most commonly the transport died without a close event yet.
                warn!(error = %err, "send failed, recovering with a fresh connection");
                self.recover_and_resend(payload).await
            }
        }
    }

    /// Close the socket. Idempotent; the sole path to terminal `Closed`.
    ///
    /// Cancels any pending reconnect, then, if a handle was live, requests
    /// the transport to close and resolves once it confirms.
    pub async fn close(&self) {
        let previous = {
            let mut state = self.inner.state.lock().await;
            std::mem::replace(&mut *state, ConnState::Closed)
        };

        match previous {
            ConnState::Connected { handle, .. } => {
                info!(url = %self.inner.url, "closing authorized socket");
                handle.close().await;
            }
            ConnState::ReconnectPending { reconnect } => {
                info!(url = %self.inner.url, "closing authorized socket, cancelling pending reconnect");
                reconnect.abort();
            }
            ConnState::Connecting => {
                info!(url = %self.inner.url, "closing authorized socket");
            }
            ConnState::Closed => {
                debug!("close called on already-closed socket");
            }
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SocketState {
        match &*self.inner.state.lock().await {
            ConnState::Connecting => SocketState::Connecting,
            ConnState::Connected { .. } => SocketState::Connected,
            ConnState::ReconnectPending { .. } => SocketState::ReconnectPending,
            ConnState::Closed => SocketState::Closed,
        }
    }

    /// Check if a transport handle is currently live.
    pub async fn is_connected(&self) -> bool {
        matches!(self.state().await, SocketState::Connected)
    }

    /// The endpoint URL this socket targets.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// The bounded recovery cycle: tear down the current handle without
    /// waiting for the reconnect delay, dial once, resend once.
    async fn recover_and_resend(&self, payload: Vec<u8>) -> Result<(), SocketError> {
        let previous = {
            let mut state = self.inner.state.lock().await;
            if let ConnState::Closed = *state {
                return Err(SocketError::Disconnected);
            }
            std::mem::replace(&mut *state, ConnState::Connecting)
        };

        match previous {
            ConnState::Connected { handle, .. } => handle.close().await,
            // The close-detector beat us to it; take over from the delayed loop.
            ConnState::ReconnectPending { reconnect } => reconnect.abort(),
            ConnState::Connecting | ConnState::Closed => {}
        }

        // A recovery-connect failure propagates the connection error, not
        // the original send error.
        let handle = self.inner.dial_once().await?;
        let handle = Inner::install(&self.inner, handle).await?;

        handle.send(payload).await.map_err(SocketError::Send)
    }
}

impl<T: Transport> Inner<T> {
    /// One connection attempt: consume dial events until open or close.
    ///
    /// Transport errors observed along the way are recorded last-wins,
    /// purely to enrich the failure if the attempt ends in a close.
    async fn dial_once(&self) -> Result<T::Handle, SocketError> {
        let credentials = format!("{}:{}", self.id, self.secret);
        let mut events = self.transport.dial(&self.url, &credentials);

        let mut last_error: Option<String> = None;
        while let Some(event) = events.recv().await {
            match event {
                DialEvent::Error(err) => last_error = Some(err.to_string()),
                DialEvent::Closed { code } => {
                    return Err(SocketError::Connection {
                        code,
                        detail: last_error,
                    });
                }
                DialEvent::Open(handle) => return Ok(handle),
            }
        }

        // The transport dropped the attempt without open or close.
        Err(SocketError::Connection {
            code: 1006,
            detail: last_error,
        })
    }

    /// Store a freshly opened handle and arm its close-detector.
    ///
    /// If the socket was explicitly closed while the dial was in flight,
    /// the fresh handle is closed instead of stored.
    async fn install(inner: &Arc<Self>, handle: T::Handle) -> Result<Arc<T::Handle>, SocketError> {
        let handle = Arc::new(handle);
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut state = inner.state.lock().await;
            if let ConnState::Closed = *state {
                drop(state);
                debug!("socket closed during connection attempt, discarding fresh handle");
                handle.close().await;
                return Err(SocketError::Disconnected);
            }
            *state = ConnState::Connected {
                handle: Arc::clone(&handle),
                generation,
            };
        }

        Self::arm_close_detector(inner, Arc::clone(&handle), generation);
        Ok(handle)
    }

    /// Arm the close-detector for one specific handle.
    ///
    /// Fires only for that handle's close event. If the socket no longer
    /// holds the handle (explicit close, or replacement during send
    /// recovery), the detector is a no-op.
    fn arm_close_detector(inner: &Arc<Self>, handle: Arc<T::Handle>, generation: u64) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let code = handle.closed().await;

            let mut state = inner.state.lock().await;
            let still_armed = matches!(
                &*state,
                ConnState::Connected { generation: armed, .. } if *armed == generation
            );
            if still_armed {
                warn!(
                    url = %inner.url,
                    code = code,
                    delay_ms = RECONNECT_DELAY.as_millis() as u64,
                    "transport closed, scheduling reconnect"
                );
                *state = ConnState::ReconnectPending {
                    reconnect: Self::schedule_reconnect(&inner),
                };
            } else {
                debug!(code = code, "transport closed after handle was released");
            }
        });
    }

    /// Spawn the reconnect loop and return its abort handle, which doubles
    /// as the pending reconnect timer.
    ///
    /// The loop sleeps the fixed delay, dials, and on failure retries
    /// forever, silently; only a successful connection or an explicit close
    /// ends it.
    ///
    /// Only the delay is cancellable. Each dial runs in its own task so an
    /// abort that lands mid-attempt leaves the attempt to complete and
    /// settle against the state, where [`Inner::install_reconnected`]
    /// discards the fresh handle if the socket has moved on.
    fn schedule_reconnect(inner: &Arc<Self>) -> AbortHandle {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            loop {
                sleep(RECONNECT_DELAY).await;

                if !inner.reconnect_still_pending().await {
                    return;
                }

                let attempt = {
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        match inner.dial_once().await {
                            Ok(handle) => Inner::install_reconnected(&inner, handle).await,
                            Err(err) => {
                                debug!(url = %inner.url, error = %err, "reconnect attempt failed, retrying");
                                false
                            }
                        }
                    })
                };

                match attempt.await {
                    Ok(true) => return,
                    Ok(false) => {
                        if !inner.reconnect_still_pending().await {
                            return;
                        }
                    }
                    // The attempt task panicked; nothing left to settle.
                    Err(_) => return,
                }
            }
        })
        .abort_handle()
    }

    /// Install for the reconnect loop, whose attempt was started from
    /// `ReconnectPending`. If the socket moved on in the meantime (explicit
    /// close, or a send recovery that took over), the fresh handle is
    /// closed instead of stored. Returns whether the handle was stored.
    async fn install_reconnected(inner: &Arc<Self>, handle: T::Handle) -> bool {
        let handle = Arc::new(handle);
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut state = inner.state.lock().await;
            if !matches!(*state, ConnState::ReconnectPending { .. }) {
                drop(state);
                debug!("socket moved on during reconnect attempt, discarding fresh handle");
                handle.close().await;
                return false;
            }
            *state = ConnState::Connected {
                handle: Arc::clone(&handle),
                generation,
            };
        }

        Self::arm_close_detector(inner, Arc::clone(&handle), generation);
        info!(url = %inner.url, "reconnected");
        true
    }

    async fn reconnect_still_pending(&self) -> bool {
        matches!(*self.state.lock().await, ConnState::ReconnectPending { .. })
    }
}
