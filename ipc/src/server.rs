//! Listen + accept server endpoint on top of an [`Actor`] (§4.6), plus the
//! multi-client manager entry point (§4.7) built on top of it.

use crate::actor::{Actor, RoleHooks};
use crate::config::{manager_name, ServerConfig};
use crate::error::Result;
use crate::handshake;
use crate::manager::ServerManager;
use crate::stream::{self, Listener};
use crate::types::{Message, Status};
use ipc_crypto::Session;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A listening endpoint accepting one connected peer at a time (§4.6). In
/// multi-client mode, the handle returned to the caller is the first worker
/// and carries a [`ServerManager`] covering the whole manager/worker set;
/// handles held internally by the manager (fan-out operations, the worker
/// list) never carry one, so closing the set doesn't recurse through it.
#[derive(Clone)]
pub struct Server {
    actor: Arc<Actor<ServerHooks>>,
    listener: Arc<Listener>,
    accept_handle: Arc<StdMutex<Option<JoinHandle<()>>>>,
    client_id: u32,
    manager: Option<ServerManager>,
}

impl Server {
    pub async fn read(&self) -> Result<Message> {
        self.actor.read().await
    }

    pub async fn read_timed(&self, duration: Duration, on_timeout: Message) -> Result<Message> {
        self.actor.read_timed(duration, on_timeout).await
    }

    pub async fn write(&self, msg_type: i32, payload: Vec<u8>) -> Result<()> {
        self.actor.write(msg_type, payload).await
    }

    /// Closes this one endpoint: its actor and its listener. In multi-client
    /// mode, prefer [`Server::manager`]'s `close` to tear down the whole
    /// manager/worker set with the ordering §4.7 specifies.
    pub async fn close(&self) {
        self.actor.close().await;
        if let Some(handle) = self.accept_handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub async fn status(&self) -> Status {
        self.actor.status().await
    }

    /// `0` for the manager endpoint, `1` for the first worker and upward in
    /// multi-client mode; `0` for a single-client server.
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// `Some` only on the handle returned by [`start_server`]/
    /// [`start_multi_server`] in multi-client mode.
    pub fn manager(&self) -> Option<&ServerManager> {
        self.manager.as_ref()
    }

    fn without_manager(&self) -> Server {
        Server {
            actor: Arc::clone(&self.actor),
            listener: Arc::clone(&self.listener),
            accept_handle: Arc::clone(&self.accept_handle),
            client_id: self.client_id,
            manager: None,
        }
    }
}

struct ServerHooks {
    endpoint_label: String,
}

impl RoleHooks for ServerHooks {
    fn should_retry_write(&self, status: Status) -> bool {
        matches!(status, Status::Listening)
    }

    fn on_read_loop_exit(&self, _status: Status) {
        // The accept loop is already running independently and will accept
        // again once it observes Disconnected (§4.6); nothing to resume.
    }

    fn describe(&self) -> &str {
        &self.endpoint_label
    }
}

/// Binds a listener and spawns the accept loop (§4.6). `socket_id` is the
/// suffix used for the endpoint path (`0` = no suffix); `client_id` is what
/// callers observe, which differs from `socket_id` only for the first
/// worker in multi-client mode (client_id `1`, no socket suffix — §4.7).
pub(crate) fn bind_and_run(name: &str, socket_id: u32, client_id: u32, config: &ServerConfig) -> Result<Server> {
    let listener = Arc::new(stream::bind(name, socket_id, config.unmask_permissions)?);
    let label = if socket_id == 0 {
        name.to_string()
    } else {
        format!("{}{}", name, socket_id)
    };
    let span = tracing::info_span!("ipc_server", name = %label);
    let hooks = ServerHooks {
        endpoint_label: label,
    };
    let actor = Actor::new(hooks, Status::Listening, config.max_msg_size, span);

    let accept_actor = Arc::clone(&actor);
    let accept_listener = Arc::clone(&listener);
    let max_msg_size = config.max_msg_size;
    let encryption = config.encryption;
    let accept_handle = tokio::spawn(async move {
        run_accept_loop(accept_actor, accept_listener, max_msg_size, encryption).await;
    });

    Ok(Server {
        actor,
        listener,
        accept_handle: Arc::new(StdMutex::new(Some(accept_handle))),
        client_id,
        manager: None,
    })
}

async fn run_accept_loop(
    actor: Arc<Actor<ServerHooks>>,
    listener: Arc<Listener>,
    max_msg_size: u32,
    encryption: bool,
) {
    loop {
        let conn = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(error = %e, "accept loop ended");
                return;
            }
        };

        let status = actor.status().await;
        if !matches!(status, Status::Listening | Status::Disconnected) {
            continue;
        }

        let mut io = conn.into_stream();
        match handshake::run_initiator(&mut io, max_msg_size, encryption).await {
            Ok(outcome) => {
                let session: Option<Arc<dyn Session + Send + Sync>> = outcome.session.map(Arc::from);
                actor.attach(io, session);
                actor.transition(Status::Connected).await;
                actor.dispatch(Message::status(Status::Connected)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Server.acceptLoop handshake err");
                actor.dispatch(Message::error(e.to_string())).await;
                actor.transition(Status::Error).await;
                // Matches the original: a handshake failure closes the
                // listener and ends the accept loop for this endpoint.
                return;
            }
        }
    }
}

async fn start_only_server(config: ServerConfig) -> Result<Server> {
    bind_and_run(&config.name, 0, 0, &config)
}

async fn start_multi_server(config: ServerConfig) -> Result<Server> {
    let mgr_name = manager_name(&config.name);
    let manager = bind_and_run(&mgr_name, 0, 0, &config)?;
    let worker_one = bind_and_run(&config.name, 0, 1, &config)?;

    let servers = crate::manager::new_server_list(vec![manager.without_manager(), worker_one.without_manager()]);
    let server_manager = ServerManager::new(servers);

    server_manager.spawn_dispatcher(manager.without_manager(), config);

    Ok(Server {
        manager: Some(server_manager),
        ..worker_one
    })
}

/// Entry point (§4.6): dispatches to the single-client or multi-client flow
/// depending on `config.multi_client`.
pub async fn start_server(config: ServerConfig) -> Result<Server> {
    if config.multi_client {
        start_multi_server(config).await
    } else {
        start_only_server(config).await
    }
}
