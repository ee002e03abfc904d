//! The multi-client dispatcher (§4.7): one manager endpoint that assigns
//! client identifiers and fans reads across the workers it spawns.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::server::{self, Server};
use crate::types::{Message, CLIENT_CONNECT_MSGTYPE};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// `servers[0]` is the manager endpoint; `servers[1..]` are workers in
/// assignment order (§3's `ServerManager` invariant). Fan-out operations
/// snapshot this list under the mutex before iterating, so expansion during
/// a `map_exec` never races with the iteration itself (§9).
#[derive(Clone)]
pub struct ServerManager {
    servers: Arc<Mutex<Vec<Server>>>,
}

pub(crate) fn new_server_list(servers: Vec<Server>) -> Arc<Mutex<Vec<Server>>> {
    Arc::new(Mutex::new(servers))
}

impl ServerManager {
    pub(crate) fn new(servers: Arc<Mutex<Vec<Server>>>) -> ServerManager {
        ServerManager { servers }
    }

    async fn snapshot(&self) -> Vec<Server> {
        self.servers.lock().await.clone()
    }

    /// Runs `f` concurrently over every worker (every entry but index 0, the
    /// manager) and waits for all of them to finish.
    pub async fn map_exec<F, Fut>(&self, f: F)
    where
        F: Fn(Server) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let snapshot = self.snapshot().await;
        let mut handles = Vec::with_capacity(snapshot.len());
        for (i, worker) in snapshot.into_iter().enumerate() {
            if i == 0 {
                continue;
            }
            handles.push(tokio::spawn(f(worker)));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Blocking read fanned out across every worker; `callback` is invoked
    /// once per worker with its read result.
    pub async fn read<F>(&self, callback: F)
    where
        F: Fn(Server, Result<Message>) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        self.map_exec(move |worker| {
            let callback = Arc::clone(&callback);
            async move {
                let result = worker.read().await;
                callback(worker, result);
            }
        })
        .await;
    }

    /// Timed read fanned out across every worker; see [`ServerManager::read`].
    pub async fn read_timed<F>(&self, duration: Duration, on_timeout: Message, callback: F)
    where
        F: Fn(Server, Result<Message>) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        self.map_exec(move |worker| {
            let callback = Arc::clone(&callback);
            let on_timeout = on_timeout.clone();
            async move {
                let result = worker.read_timed(duration, on_timeout).await;
                callback(worker, result);
            }
        })
        .await;
    }

    /// Closes every endpoint in the set: the manager and every worker but
    /// the first are closed concurrently, then the first worker (index 1)
    /// is closed last. This ordering is asymmetric in the source this is
    /// modeled on and its motivation isn't documented; preserved here per
    /// §9 until a regression justifies changing it.
    pub async fn close(&self) {
        let snapshot = self.snapshot().await;
        let mut primary = None;
        let mut handles = Vec::with_capacity(snapshot.len());
        for (i, server) in snapshot.into_iter().enumerate() {
            if i == 1 {
                primary = Some(server);
                continue;
            }
            handles.push(tokio::spawn(async move { server.close().await }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        if let Some(primary) = primary {
            primary.close().await;
        }
    }

    /// Spawns the manager dispatcher task: reads `client_id_request` frames
    /// off `manager`, assigns the next id, and spawns a fresh worker server
    /// for every id past the pre-provisioned first one (§4.7).
    pub(crate) fn spawn_dispatcher(&self, manager: Server, config: ServerConfig) {
        let servers = Arc::clone(&self.servers);
        tokio::spawn(async move {
            run_dispatcher(manager, servers, config).await;
        });
    }
}

async fn run_dispatcher(manager: Server, servers: Arc<Mutex<Vec<Server>>>, config: ServerConfig) {
    let mut client_count: u32 = 0;

    loop {
        let message = match manager.read().await {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "ServerManager dispatcher stopped: manager channel closed");
                return;
            }
        };

        if message.msg_type != CLIENT_CONNECT_MSGTYPE || message.data != b"client_id_request".to_vec() {
            continue;
        }

        client_count += 1;
        tracing::info!(client_count, "received a request to create a new client server");

        if let Err(e) = manager.write(CLIENT_CONNECT_MSGTYPE, client_count.to_be_bytes().to_vec()).await {
            tracing::error!(error = %e, client_count, "failed to acknowledge client id request");
            continue;
        }

        if client_count == 1 {
            // The first worker was already pre-provisioned by
            // `start_multi_server`; nothing more to do.
            continue;
        }

        match server::bind_and_run(&config.name, client_count, client_count, &config) {
            Ok(worker) => {
                servers.lock().await.push(worker);
            }
            Err(e) => {
                tracing::error!(error = %e, client_count, "encountered an error attempting to create a client server");
            }
        }
    }
}
