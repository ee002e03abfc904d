//! Cross-platform local stream transport: Unix domain sockets on POSIX,
//! named pipes on Windows (§1, §6). Exposes one endpoint abstraction so the
//! rest of the crate never matches on `cfg(unix)`/`cfg(windows)` itself.

use crate::config::endpoint_path;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// An endpoint connection: a Unix stream on POSIX, a named pipe (server or
/// client handle) on Windows. Unified so the handshake and Actor never have
/// to know which.
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin + ?Sized> AsyncDuplex for T {}

#[cfg(unix)]
mod imp {
    use super::*;
    use tokio::net::{UnixListener, UnixStream};

    pub struct Listener(UnixListener);
    pub struct Conn(UnixStream);

    impl Listener {
        pub fn bind(path: &str, unmask_permissions: bool) -> io::Result<Listener> {
            let _ = std::fs::remove_file(path);

            #[cfg(target_os = "linux")]
            let listener = if unmask_permissions {
                // SAFETY: umask is process-global; briefly widening it around
                // bind and restoring it immediately keeps the window small.
                unsafe {
                    let old = libc::umask(0);
                    let result = UnixListener::bind(path);
                    libc::umask(old);
                    result?
                }
            } else {
                UnixListener::bind(path)?
            };

            #[cfg(not(target_os = "linux"))]
            let listener = {
                let _ = unmask_permissions;
                UnixListener::bind(path)?
            };

            Ok(Listener(listener))
        }

        pub async fn accept(&self) -> io::Result<Conn> {
            let (stream, _addr) = self.0.accept().await?;
            Ok(Conn(stream))
        }
    }

    impl Conn {
        pub async fn dial(path: &str) -> io::Result<Conn> {
            UnixStream::connect(path).await.map(Conn)
        }

        pub fn into_stream(self) -> impl AsyncDuplex + 'static {
            self.0
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, ServerOptions};

    pub struct Listener {
        path: String,
        server: tokio::sync::Mutex<Option<NamedPipeServer>>,
    }
    pub struct Conn(NamedPipeServerOrClient);

    enum NamedPipeServerOrClient {
        Server(NamedPipeServer),
        Client(tokio::net::windows::named_pipe::NamedPipeClient),
    }

    impl Listener {
        pub fn bind(path: &str, _unmask_permissions: bool) -> io::Result<Listener> {
            let server = ServerOptions::new().first_pipe_instance(true).create(path)?;
            Ok(Listener {
                path: path.to_string(),
                server: tokio::sync::Mutex::new(Some(server)),
            })
        }

        pub async fn accept(&self) -> io::Result<Conn> {
            let mut guard = self.server.lock().await;
            let server = guard.take().expect("listener reused concurrently");
            let next = ServerOptions::new().create(&self.path)?;
            server.connect().await?;
            *guard = Some(next);
            Ok(Conn(NamedPipeServerOrClient::Server(server)))
        }
    }

    impl Conn {
        pub async fn dial(path: &str) -> io::Result<Conn> {
            let client = ClientOptions::new().open(path)?;
            Ok(Conn(NamedPipeServerOrClient::Client(client)))
        }

        pub fn into_stream(self) -> Box<dyn AsyncDuplex> {
            match self.0 {
                NamedPipeServerOrClient::Server(s) => Box::new(s),
                NamedPipeServerOrClient::Client(c) => Box::new(c),
            }
        }
    }
}

pub use imp::{Conn, Listener};

/// Resolves and binds the endpoint for `name`/`id`, per §4.6's "remove any
/// stale endpoint file before binding".
pub fn bind(name: &str, id: u32, unmask_permissions: bool) -> io::Result<Listener> {
    Listener::bind(&endpoint_path(name, id), unmask_permissions)
}

/// Dials the endpoint for `name`/`id`.
pub async fn dial(name: &str, id: u32) -> io::Result<Conn> {
    Conn::dial(&endpoint_path(name, id)).await
}
