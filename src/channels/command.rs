//! Request/response control channel.
//!
//! The control protocol carries no request identifier: whatever datagram
//! arrives while a command is outstanding is taken as its reply. The channel
//! therefore allows exactly one [`PendingRequest`] at a time. Callers of
//! [`CommandChannel::send`] queue for their turn; [`CommandChannel::try_send`]
//! refuses instead of queueing.
//!
//! A background task owns the receive side of the socket. It resolves the
//! pending request by taking it out of its slot, so resolution and clearing
//! are one atomic step under the slot lock. The sender's deadline clears the
//! slot the same way, and whichever side takes the request first decides the
//! outcome.
//!
//! Replies that were already queued on the socket when a command is issued
//! belong to an earlier command. They are drained and discarded before the
//! new request is registered, and the reader refuses any datagram it received
//! before the request was issued.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::bind_socket;
use crate::config::LinkConfig;
use crate::driver::receive_backoff;
use crate::error::ChannelKind;
use crate::types::{Command, CommandOutcome, CommandReply};
use crate::{LinkError, Result};

const MAX_REPLY: usize = 1024;

/// Upper bound on stale datagrams discarded before one command.
const MAX_DRAIN: usize = 64;

/// Backoff step cap for the reply reader; keeps retries inside a deadline.
const MAX_READER_BACKOFF_STEP: u32 = 3;

/// The single in-flight command and the means to resolve it.
#[derive(Debug)]
struct PendingRequest {
    command: Command,
    issued: Instant,
    deadline: Instant,
    resolver: oneshot::Sender<CommandReply>,
}

struct Inner {
    socket: Arc<UdpSocket>,
    /// Non-blocking handle on the same socket. Reads through it hit the
    /// kernel queue directly, independent of the reactor's readiness state.
    drain: std::net::UdpSocket,
    target: SocketAddr,
    timeout: Duration,
    /// Submission queue; held for the whole request/response exchange
    turn: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingRequest>>,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owned control socket plus its reply correlation state.
///
/// Cloning is cheap and yields another handle to the same channel.
#[derive(Clone)]
pub struct CommandChannel {
    inner: Arc<Inner>,
}

impl CommandChannel {
    /// Bind the control socket and start the reply reader.
    ///
    /// The reader stops when `cancel` fires or [`close`](Self::close) is called.
    pub async fn bind(config: &LinkConfig, cancel: CancellationToken) -> Result<Self> {
        let socket = bind_socket(ChannelKind::Command, config.command.bind).await?.into_std()?;
        let drain = socket.try_clone()?;
        let socket = Arc::new(UdpSocket::from_std(socket)?);
        let inner = Arc::new(Inner {
            socket,
            drain,
            target: config.command_target(),
            timeout: config.command_timeout(),
            turn: tokio::sync::Mutex::new(()),
            pending: Mutex::new(None),
            cancel,
            reader: Mutex::new(None),
        });

        let reader = tokio::spawn(reply_reader(Arc::clone(&inner)));
        *inner.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);

        info!(target = %inner.target, timeout = ?inner.timeout, "Command channel ready");
        Ok(Self { inner })
    }

    /// Send a command and wait for its reply.
    ///
    /// Waits for any earlier command to resolve first. Resolves exactly once:
    /// with the trimmed reply, with [`LinkError::Timeout`] when the deadline
    /// passes, or with [`LinkError::Transport`] if the datagram cannot be sent.
    pub async fn send(&self, command: Command) -> CommandOutcome {
        let _turn = tokio::select! {
            turn = self.inner.turn.lock() => turn,
            _ = self.inner.cancel.cancelled() => {
                return Err(LinkError::ChannelClosed { command: command.to_string() });
            }
        };
        self.exchange(command).await
    }

    /// Like [`send`](Self::send), but fails with [`LinkError::Busy`] instead of
    /// queueing behind an outstanding command.
    pub async fn try_send(&self, command: Command) -> CommandOutcome {
        let Ok(_turn) = self.inner.turn.try_lock() else {
            let pending = self
                .pending_command()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "<queued>".to_string());
            return Err(LinkError::Busy { pending });
        };
        self.exchange(command).await
    }

    /// The command currently awaiting a reply, if any.
    pub fn pending_command(&self) -> Option<Command> {
        self.inner.slot().as_ref().map(|request| request.command.clone())
    }

    pub fn is_busy(&self) -> bool {
        self.inner.slot().is_some()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.socket.local_addr()?)
    }

    pub fn target(&self) -> SocketAddr {
        self.inner.target
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Stop the reply reader and fail any outstanding command with
    /// [`LinkError::ChannelClosed`]. Safe to call more than once.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        drop(self.inner.slot().take());

        let reader = self.inner.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                warn!("Reply reader ended abnormally: {}", e);
            }
        }
    }

    /// Drop every datagram already waiting on the control socket.
    fn discard_stale_replies(&self) {
        let mut buf = [0u8; MAX_REPLY];
        for _ in 0..MAX_DRAIN {
            match self.inner.drain.recv_from(&mut buf) {
                Ok((len, from)) => {
                    let reply = CommandReply::from_datagram(&buf[..len]);
                    debug!(%from, %reply, "Discarding stale reply");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                // Pending ICMP errors are reported once; keep draining
                Err(e) => debug!("Control socket error while draining: {}", e),
            }
        }
        warn!(limit = MAX_DRAIN, "Control socket still busy after draining");
    }

    /// One request/response cycle. The caller holds the turn.
    #[instrument(skip_all, fields(command = %command))]
    async fn exchange(&self, command: Command) -> CommandOutcome {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(LinkError::ChannelClosed { command: command.to_string() });
        }

        self.discard_stale_replies();

        let (resolver, mut reply) = oneshot::channel();
        let issued = Instant::now();
        let deadline = issued + inner.timeout;
        {
            let mut slot = inner.slot();
            if let Some(stale) = slot.take() {
                warn!(stale = %stale.command, "Replacing unresolved request");
            }
            *slot = Some(PendingRequest { command: command.clone(), issued, deadline, resolver });
        }
        // The reader clears the slot on shutdown; catch a shutdown that raced the insert
        if inner.cancel.is_cancelled() {
            inner.slot().take();
            return Err(LinkError::ChannelClosed { command: command.to_string() });
        }

        debug!("Sending command");
        if let Err(e) = inner.socket.send_to(command.as_bytes(), inner.target).await {
            inner.slot().take();
            warn!("Send failed: {}", e);
            return Err(LinkError::transport(format!("sending '{command}' to {}", inner.target), e));
        }

        let waited = tokio::time::timeout_at(deadline, &mut reply).await;
        match waited {
            Ok(Ok(reply)) => {
                debug!(%reply, "Command resolved");
                Ok(reply)
            }
            Ok(Err(_)) => Err(LinkError::ChannelClosed { command: command.to_string() }),
            Err(_) => {
                if inner.slot().take().is_some() {
                    debug!("Command timed out");
                    return Err(LinkError::timeout(command.as_str(), inner.timeout));
                }
                // The reader took the request just before we could; its reply wins
                reply.await.map_err(|_| LinkError::ChannelClosed { command: command.to_string() })
            }
        }
    }
}

/// Receives control datagrams and resolves the pending request with them.
async fn reply_reader(inner: Arc<Inner>) {
    let mut buf = vec![0u8; MAX_REPLY];
    let mut error_count = 0u32;
    loop {
        let received = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            received = inner.socket.recv_from(&mut buf) => received,
        };
        let received_at = Instant::now();

        let (len, from) = match received {
            Ok(received) => {
                error_count = 0;
                received
            }
            Err(e) => {
                // e.g. ICMP port unreachable from an earlier send
                error_count = error_count.saturating_add(1);
                debug!(error_count, "Control socket receive error: {}", e);
                let backoff = receive_backoff(error_count.min(MAX_READER_BACKOFF_STEP));
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => continue,
                }
            }
        };

        let reply = CommandReply::from_datagram(&buf[..len]);
        let request = {
            let mut slot = inner.slot();
            let live = slot.as_ref().is_some_and(|request| {
                request.issued <= received_at && received_at < request.deadline
            });
            if live { slot.take() } else { None }
        };

        match request {
            Some(request) => {
                if request.resolver.send(reply).is_err() {
                    debug!(command = %request.command, "Reply arrived after caller went away");
                }
            }
            None => debug!(%from, %reply, "Discarding reply with no pending command"),
        }
    }
    // Dropping the resolver fails the outstanding command
    inner.slot().take();
    debug!("Reply reader stopped");
}
