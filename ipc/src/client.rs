//! Dial + auto-reconnect state machine on top of an [`Actor`] (§4.5).

use crate::actor::{Actor, RoleHooks};
use crate::config::{ClientConfig, DEFAULT_MAX_MSG_SIZE};
use crate::error::{Error, Result};
use crate::handshake;
use crate::stream;
use crate::types::{Message, Status, CLIENT_CONNECT_MSGTYPE, INTERNAL_TIMEOUT_MSG_TYPE};
use ipc_crypto::Session;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// A connected (or connecting/reconnecting) client endpoint. Cheap to
/// clone-by-reference: the handle just wraps the shared `Actor`.
pub struct Client {
    actor: Arc<Actor<ClientHooks>>,
    client_id: u32,
}

impl Client {
    pub async fn read(&self) -> Result<Message> {
        self.actor.read().await
    }

    pub async fn read_timed(&self, duration: Duration, on_timeout: Message) -> Result<Message> {
        self.actor.read_timed(duration, on_timeout).await
    }

    pub async fn write(&self, msg_type: i32, payload: Vec<u8>) -> Result<()> {
        self.actor.write(msg_type, payload).await
    }

    pub async fn close(&self) {
        self.actor.close().await
    }

    pub async fn status(&self) -> Status {
        self.actor.status().await
    }

    /// `0` in single-client mode; the id the manager assigned otherwise.
    pub fn client_id(&self) -> u32 {
        self.client_id
    }
}

struct ClientHooks {
    self_ref: StdMutex<Option<Weak<Actor<ClientHooks>>>>,
    base_name: String,
    id: u32,
    encryption: bool,
    timeout: Duration,
    timeout_is_infinite: bool,
    retry_timer: Duration,
}

impl ClientHooks {
    fn set_self(&self, actor: &Arc<Actor<ClientHooks>>) {
        *self.self_ref.lock().unwrap() = Some(Arc::downgrade(actor));
    }

    fn endpoint_label(&self) -> String {
        if self.id == 0 {
            self.base_name.clone()
        } else {
            format!("{}{}", self.base_name, self.id)
        }
    }
}

impl RoleHooks for ClientHooks {
    fn should_retry_write(&self, status: Status) -> bool {
        matches!(status, Status::Connecting)
    }

    fn on_read_loop_exit(&self, status: Status) {
        if status != Status::Disconnected {
            return;
        }
        let actor = match self.self_ref.lock().unwrap().as_ref().and_then(Weak::upgrade) {
            Some(a) => a,
            None => return,
        };

        let base_name = self.base_name.clone();
        let id = self.id;
        let encryption = self.encryption;
        let timeout = self.timeout;
        let timeout_is_infinite = self.timeout_is_infinite;
        let retry_timer = self.retry_timer;

        tokio::spawn(async move {
            let _ = dial_loop(
                &actor,
                &base_name,
                id,
                encryption,
                timeout,
                timeout_is_infinite,
                retry_timer,
                true,
            )
            .await;
        });
    }

    fn describe(&self) -> &str {
        &self.base_name
    }
}

fn new_client_actor(
    base_name: String,
    id: u32,
    timeout: Duration,
    timeout_is_infinite: bool,
    retry_timer: Duration,
    encryption: bool,
) -> Arc<Actor<ClientHooks>> {
    let span = tracing::info_span!("ipc_client", name = %base_name, id);
    let hooks = ClientHooks {
        self_ref: StdMutex::new(None),
        base_name,
        id,
        encryption,
        timeout,
        timeout_is_infinite,
        retry_timer,
    };
    let actor = Actor::new(hooks, Status::NotConnected, DEFAULT_MAX_MSG_SIZE, span);
    actor.hooks().set_self(&actor);
    actor
}

/// A dial error matching Go's "connect: no such file or directory" /
/// "connect: connection refused" substrings — expected during startup races,
/// not surfaced to the caller.
fn is_expected_dial_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
    )
}

/// Dials `base_name`/`id` until connected or `timeout` elapses (§4.5's Dial
/// algorithm and Reconnect). Shared by the initial connect and every
/// subsequent reconnect; `is_reconnect` only changes the status sequence and
/// which timeout error is reported.
///
/// `id` is the client id the caller observes (§4.7: worker 1 has client id
/// `1`); the endpoint it dials uses `socket_id`, which collapses `1` to `0`
/// to match the no-suffix endpoint the first worker is bound on
/// (`server::bind_and_run`'s own `socket_id == 0` convention).
async fn dial_loop(
    actor: &Arc<Actor<ClientHooks>>,
    base_name: &str,
    id: u32,
    encryption: bool,
    timeout: Duration,
    timeout_is_infinite: bool,
    retry_timer: Duration,
    is_reconnect: bool,
) -> Result<()> {
    if is_reconnect {
        actor.transition(Status::ReConnecting).await;
        actor.dispatch(Message::status(Status::ReConnecting)).await;
        tokio::time::sleep(retry_timer).await;
    } else {
        actor.transition(Status::Connecting).await;
    }

    let deadline = if timeout_is_infinite {
        None
    } else {
        Some(Instant::now() + timeout)
    };

    let socket_id = if id == 1 { 0 } else { id };

    loop {
        match stream::dial(base_name, socket_id).await {
            Ok(conn) => {
                actor.transition(Status::Connecting).await;
                let mut io = conn.into_stream();
                match handshake::run_responder(&mut io, DEFAULT_MAX_MSG_SIZE, encryption).await {
                    Ok(outcome) => {
                        let session: Option<Arc<dyn Session + Send + Sync>> =
                            outcome.session.map(Arc::from);
                        actor.set_max_msg_size(outcome.max_msg_size);
                        actor.attach(io, session);
                        actor.transition(Status::Connected).await;
                        actor.dispatch(Message::status(Status::Connected)).await;
                        return Ok(());
                    }
                    Err(e) => {
                        actor.dispatch(Message::error(e.to_string())).await;
                    }
                }
            }
            Err(e) if is_expected_dial_error(&e) => {}
            Err(e) => {
                actor.dispatch(Message::error(Error::Io(e).to_string())).await;
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                actor.transition(Status::Timeout).await;
                actor.dispatch(Message::status(Status::Timeout)).await;
                let err = if is_reconnect {
                    Error::TimedOutReconnecting
                } else {
                    Error::TimedOutConnecting
                };
                actor.dispatch(Message::error(err.to_string())).await;
                actor.close_receive_queue_external().await;
                return Err(err);
            }
        }

        tokio::time::sleep(retry_timer).await;
    }
}

async fn start_only_client(config: ClientConfig, id: u32) -> Client {
    let actor = new_client_actor(
        config.name.clone(),
        id,
        config.timeout,
        config.timeout_is_infinite,
        config.retry_timer,
        config.encryption,
    );

    let dial_actor = Arc::clone(&actor);
    let base_name = config.name.clone();
    let encryption = config.encryption;
    let timeout = config.timeout;
    let timeout_is_infinite = config.timeout_is_infinite;
    let retry_timer = config.retry_timer;
    tokio::spawn(async move {
        let _ = dial_loop(
            &dial_actor,
            &base_name,
            id,
            encryption,
            timeout,
            timeout_is_infinite,
            retry_timer,
            false,
        )
        .await;
    });

    Client { actor, client_id: id }
}

/// Connects to the manager endpoint, requests a client id, and once one is
/// assigned starts the real (worker) client under that id (§4.5's Multi-client
/// flow).
async fn start_multi_client(config: ClientConfig) -> Result<Client> {
    let manager_name = format!("{}_manager", config.name);
    let manager_actor = new_client_actor(
        manager_name.clone(),
        0,
        config.timeout,
        config.timeout_is_infinite,
        config.retry_timer,
        config.encryption,
    );

    dial_loop(
        &manager_actor,
        &manager_name,
        0,
        config.encryption,
        config.timeout,
        config.timeout_is_infinite,
        config.retry_timer,
        false,
    )
    .await?;

    manager_actor
        .write(CLIENT_CONNECT_MSGTYPE, b"client_id_request".to_vec())
        .await?;

    let deadline = if config.timeout_is_infinite {
        None
    } else {
        Some(Instant::now() + config.timeout)
    };

    let id = loop {
        let sentinel = Message::data(INTERNAL_TIMEOUT_MSG_TYPE, Vec::new());
        let msg = manager_actor
            .read_timed(Duration::from_secs(5), sentinel)
            .await?;

        if msg.is_error() {
            manager_actor.close().await;
            return Err(Error::TimedOutConnecting);
        }

        if msg.msg_type == CLIENT_CONNECT_MSGTYPE && msg.data.len() == 4 {
            let candidate = u32::from_be_bytes(msg.data.clone().try_into().unwrap());
            if candidate > 0 {
                break candidate;
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                manager_actor.close().await;
                return Err(Error::TimedOutConnecting);
            }
        }
    };

    manager_actor.close().await;
    Ok(start_only_client(config, id).await)
}

/// Entry point (§4.5): dispatches to the single-client or multi-client flow
/// depending on `config.multi_client`.
pub async fn start_client(config: ClientConfig) -> Result<Client> {
    if config.multi_client {
        start_multi_client(config).await
    } else {
        Ok(start_only_client(config, 0).await)
    }
}
