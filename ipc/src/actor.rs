//! The per-connection runtime (§4.4): a read loop, a write loop, bounded
//! mailboxes, and the blocking/timed read API built on top of them.
//!
//! The source this is modeled on keeps a back-reference from the Actor to
//! its owning Client/Server so the read loop can call role-specific hooks.
//! We invert that: the Actor holds a `RoleHooks` capability instead, so
//! Client and Server depend on Actor but Actor never depends on them.

use crate::config::DEFAULT_MAX_MSG_SIZE;
use crate::error::{Error, Result};
use crate::types::{Message, Status};
use ipc_codec::{decode_body, encode_body, read_frame, write_frame, CONTROL_TYPE};
use ipc_crypto::Session;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, Mutex};
use tracing::Span;

const MAILBOX_CAPACITY: usize = 1;
const SERVER_LISTENING_RETRY: Duration = Duration::from_millis(2);
const CLIENT_CONNECTING_RETRY: Duration = Duration::from_millis(100);
const WRITE_RETRY_BUDGET: Duration = Duration::from_secs(5);

struct Outbound {
    msg_type: i32,
    payload: Vec<u8>,
}

/// Role-specific behavior the Actor needs but doesn't own: whether `Write`
/// should spin-retry under the caller's current status, and what to do once
/// the read loop has exited.
pub trait RoleHooks: Send + Sync + 'static {
    /// `true` if a `Write` issued while the actor reports `status` should be
    /// retried after a short sleep rather than fail immediately.
    fn should_retry_write(&self, status: Status) -> bool;

    /// Called once, after the read loop has exited and the terminal status
    /// has been recorded. Implementations that need to do further async work
    /// (e.g. the client's reconnect) spawn their own task.
    fn on_read_loop_exit(&self, status: Status);

    fn describe(&self) -> &str;
}

/// A capability-free hook set for roles (tests, one-shot tools) that don't
/// need retry-on-Write or reconnect behavior.
pub struct NoRetryHooks(pub &'static str);

impl RoleHooks for NoRetryHooks {
    fn should_retry_write(&self, _status: Status) -> bool {
        false
    }

    fn on_read_loop_exit(&self, _status: Status) {}

    fn describe(&self) -> &str {
        self.0
    }
}

struct Stash {
    messages: VecDeque<Message>,
}

/// The per-connection runtime described in §4.4. Always used behind an
/// `Arc` so `ReadTimed` can let the inner read keep running in the
/// background after its deadline passes.
pub struct Actor<H: RoleHooks> {
    status: Mutex<Status>,
    recv_tx: mpsc::Sender<Message>,
    recv_rx: Mutex<mpsc::Receiver<Message>>,
    stash: Mutex<Stash>,
    write_tx: StdMutex<Option<mpsc::Sender<Outbound>>>,
    read_handle: StdMutex<Option<tokio::task::JoinHandle<()>>>,
    max_msg_size: std::sync::atomic::AtomicU32,
    hooks: H,
    logger: Span,
}

impl<H: RoleHooks> Actor<H> {
    pub fn new(hooks: H, initial_status: Status, max_msg_size: u32, logger: Span) -> Arc<Self> {
        let (recv_tx, recv_rx) = mpsc::channel(MAILBOX_CAPACITY);
        Arc::new(Actor {
            status: Mutex::new(initial_status),
            recv_tx,
            recv_rx: Mutex::new(recv_rx),
            stash: Mutex::new(Stash {
                messages: VecDeque::new(),
            }),
            write_tx: StdMutex::new(None),
            read_handle: StdMutex::new(None),
            max_msg_size: std::sync::atomic::AtomicU32::new(if max_msg_size == 0 {
                DEFAULT_MAX_MSG_SIZE
            } else {
                max_msg_size
            }),
            hooks,
            logger,
        })
    }

    /// Updates the negotiated maximum message size after a handshake, e.g.
    /// the client adopting the server's advertised limit as its own.
    pub(crate) fn set_max_msg_size(&self, max_msg_size: u32) {
        self.max_msg_size
            .store(max_msg_size, std::sync::atomic::Ordering::Relaxed);
    }

    pub async fn status(&self) -> Status {
        *self.status.lock().await
    }

    async fn set_status(&self, status: Status) {
        let mut guard = self.status.lock().await;
        if *guard == Status::Closed {
            return;
        }
        tracing::event!(parent: &self.logger, tracing::Level::DEBUG, from = ?*guard, to = ?status, "status transition");
        *guard = status;
    }

    /// Forces a status transition from outside the read/write loops — used
    /// by the client's dial/reconnect state machine and the server's accept
    /// loop, both of which own an `Actor` but live in a different module.
    pub(crate) async fn transition(&self, status: Status) {
        self.set_status(status).await;
    }

    /// Marks the receive queue closed so further `read()` calls observe
    /// `the received channel has been closed`, without requiring an error
    /// Message to have been the one that triggered it (reconnect timeout).
    pub(crate) async fn close_receive_queue_external(&self) {
        self.close_receive_queue().await;
    }

    pub(crate) fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Pushes a status/error notification onto the receive queue. Used both
    /// synchronously from the handshake path and fire-and-forget from the
    /// read/write loops (§4.4's status/error dispatch).
    pub async fn dispatch(&self, msg: Message) {
        let _ = self.recv_tx.send(msg).await;
    }

    pub fn dispatch_detached(self: &Arc<Self>, msg: Message) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.dispatch(msg).await;
        });
    }

    /// Wires a freshly-handshaken stream into the actor: spawns the read and
    /// write loops and flips status to `Connected`.
    pub fn attach<S>(self: &Arc<Self>, stream: S, session: Option<Arc<dyn Session + Send + Sync>>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = split(stream);

        let (write_tx, write_rx) = mpsc::channel(MAILBOX_CAPACITY);
        *self.write_tx.lock().unwrap() = Some(write_tx);

        let this = Arc::clone(self);
        let read_session = session.clone();
        let read_handle = tokio::spawn(async move {
            this.run_read_loop(read_half, read_session).await;
        });
        *self.read_handle.lock().unwrap() = Some(read_handle);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_write_loop(write_half, write_rx, session).await;
        });
    }

    async fn run_read_loop<R: AsyncRead + Unpin>(
        self: Arc<Self>,
        mut reader: R,
        session: Option<Arc<dyn Session + Send + Sync>>,
    ) {
        loop {
            let max_payload = self.max_msg_size.load(std::sync::atomic::Ordering::Relaxed);
            let mut max_body = max_payload + ipc_codec::TYPE_TAG_LEN as u32;
            if session.is_some() {
                max_body += ipc_crypto::AEAD_OVERHEAD as u32;
            }
            match read_frame(&mut reader, max_body).await {
                Ok(Some(body)) => {
                    let plain = match &session {
                        Some(s) => match s.open(&body) {
                            Ok(plain) => plain,
                            Err(e) => {
                                self.dispatch(Message::error(e)).await;
                                continue;
                            }
                        },
                        None => body,
                    };

                    let (msg_type, payload) = match decode_body(&plain) {
                        Ok(v) => v,
                        Err(e) => {
                            self.dispatch(Message::error(e)).await;
                            continue;
                        }
                    };

                    if msg_type == CONTROL_TYPE {
                        tracing::trace!(parent: &self.logger, "dropped control frame");
                        continue;
                    }

                    self.dispatch(Message::data(msg_type as i32, payload.to_vec()))
                        .await;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(parent: &self.logger, error = %e, "read loop error");
                    self.dispatch(Message::error(e)).await;
                    break;
                }
            }
        }

        let was_closing = self.status().await == Status::Closing;
        let terminal = if was_closing {
            Status::Closed
        } else {
            Status::Disconnected
        };
        self.set_status(terminal).await;
        *self.write_tx.lock().unwrap() = None;
        self.hooks.on_read_loop_exit(terminal);
    }

    async fn run_write_loop<W: AsyncWrite + Unpin>(
        self: Arc<Self>,
        writer: W,
        mut write_rx: mpsc::Receiver<Outbound>,
        session: Option<Arc<dyn Session + Send + Sync>>,
    ) {
        let mut writer = BufWriter::new(writer);
        while let Some(item) = write_rx.recv().await {
            let body = encode_body(item.msg_type as u32, &item.payload);
            let body = match &session {
                Some(s) => match s.seal(&body) {
                    Ok(sealed) => sealed,
                    Err(e) => {
                        tracing::warn!(parent: &self.logger, error = %e, "seal failed");
                        continue;
                    }
                },
                None => body,
            };

            if let Err(e) = write_frame(&mut writer, &body).await {
                tracing::warn!(parent: &self.logger, error = %e, "write loop error");
                continue;
            }
            if let Err(e) = writer.flush().await {
                tracing::warn!(parent: &self.logger, error = %e, "flush error");
            }
        }
    }

    /// Blocks until the next inbound item is available (§4.4).
    pub async fn read(&self) -> Result<Message> {
        if let Some(msg) = self.stash.lock().await.messages.pop_front() {
            return Ok(msg);
        }

        let mut rx = self.recv_rx.lock().await;
        let msg = rx.recv().await.ok_or(Error::ChannelClosed)?;
        if msg.is_error() {
            drop(rx);
            self.close_receive_queue().await;
        }
        Ok(msg)
    }

    async fn close_receive_queue(&self) {
        // Closing our own sender makes future `recv()` calls observe `None`
        // once any buffered items drain, matching "further Reads fail with
        // the received channel has been closed".
        let mut rx = self.recv_rx.lock().await;
        rx.close();
    }

    /// Non-destructive timed read (§4.4). If the inner read doesn't land
    /// within `duration`, returns `on_timeout` immediately and lets the
    /// inner read keep running; its eventual result is requeued unless the
    /// actor has moved past `Connected`/`ReConnecting` in the meantime.
    pub async fn read_timed(self: &Arc<Self>, duration: Duration, on_timeout: Message) -> Result<Message> {
        let this = Arc::clone(self);
        let mut handle = tokio::spawn(async move { this.read().await });

        tokio::select! {
            res = &mut handle => {
                return res.map_err(|_| Error::ChannelClosed)?;
            }
            _ = tokio::time::sleep(duration) => {}
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(Ok(msg)) = handle.await {
                if this.status().await.accepts_requeue() {
                    this.stash.lock().await.messages.push_back(msg);
                }
            }
        });

        Ok(on_timeout)
    }

    /// Writes `msg_type`/`payload` to the peer (§4.4). Retries under a
    /// bounded spin when the role hooks say the current status is worth
    /// waiting out (replacing the source's unbounded recursion, per the
    /// open design question).
    pub async fn write(&self, msg_type: i32, payload: Vec<u8>) -> Result<()> {
        if msg_type == 0 {
            return Err(Error::ReservedMessageType);
        }
        if payload.len() as u32 > self.max_msg_size.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(Error::MessageTooLarge);
        }

        let deadline = tokio::time::Instant::now() + WRITE_RETRY_BUDGET;
        loop {
            let status = self.status().await;
            if status == Status::Connected {
                let tx = self.write_tx.lock().unwrap().clone();
                return match tx {
                    Some(tx) => tx
                        .send(Outbound { msg_type, payload })
                        .await
                        .map_err(|_| Error::ChannelClosed),
                    None => Err(Error::CannotWriteUnderStatus(status)),
                };
            }

            if !self.hooks.should_retry_write(status) || tokio::time::Instant::now() >= deadline {
                return Err(Error::CannotWriteUnderStatus(status));
            }

            let sleep = match status {
                Status::Listening => SERVER_LISTENING_RETRY,
                Status::Connecting => CLIENT_CONNECTING_RETRY,
                _ => CLIENT_CONNECTING_RETRY,
            };
            tokio::time::sleep(sleep).await;
        }
    }

    /// Sets status to `Closing`, stops the read/write loops and marks the
    /// connection `Closed`. A second call is a no-op (§8 idempotence).
    pub async fn close(&self) {
        let mut guard = self.status.lock().await;
        if *guard == Status::Closed || *guard == Status::Closing {
            return;
        }
        *guard = Status::Closing;
        drop(guard);

        *self.write_tx.lock().unwrap() = None;
        if let Some(handle) = self.read_handle.lock().unwrap().take() {
            handle.abort();
        }

        *self.status.lock().await = Status::Closed;
    }

    pub fn describe(&self) -> &str {
        self.hooks.describe()
    }

    pub fn max_msg_size(&self) -> u32 {
        self.max_msg_size.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    fn test_actor() -> Arc<Actor<NoRetryHooks>> {
        Actor::new(NoRetryHooks("test"), Status::Connected, DEFAULT_MAX_MSG_SIZE, Span::none())
    }

    #[tokio::test]
    async fn reserved_message_type_is_rejected_without_touching_the_wire() {
        let actor = test_actor();
        let err = actor.write(0, vec![1]).await.unwrap_err();
        assert_eq!(err.to_string(), "message type 0 is reserved");
    }

    #[tokio::test]
    async fn oversize_payload_is_rejected() {
        let actor = Actor::new(NoRetryHooks("test"), Status::Connected, 8, Span::none());
        let err = actor.write(2, vec![0u8; 9]).await.unwrap_err();
        assert_eq!(err.to_string(), "message exceeds maximum message length");
    }

    #[tokio::test]
    async fn write_while_not_connected_fails_fast_without_retry_hooks() {
        let actor = Actor::new(NoRetryHooks("test"), Status::Listening, DEFAULT_MAX_MSG_SIZE, Span::none());
        let err = actor.write(5, vec![1, 2, 3]).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot write under current status: Listening");
    }

    #[tokio::test]
    async fn read_timed_returns_the_sentinel_when_nothing_arrives() {
        let actor = test_actor();
        let sentinel = Message::data(-1, b"timeout".to_vec());
        let got = actor
            .read_timed(Duration::from_millis(10), sentinel.clone())
            .await
            .unwrap();
        assert_eq!(got.data, sentinel.data);
    }

    #[tokio::test]
    async fn read_observes_a_dispatched_message() {
        let actor = test_actor();
        actor.dispatch(Message::data(7, b"hi".to_vec())).await;
        let got = actor.read().await.unwrap();
        assert_eq!(got.msg_type, 7);
        assert_eq!(got.data, b"hi");
    }

    #[tokio::test]
    async fn closing_twice_is_a_no_op() {
        let actor = test_actor();
        actor.close().await;
        assert_eq!(actor.status().await, Status::Closed);
        actor.close().await;
        assert_eq!(actor.status().await, Status::Closed);
    }
}
