//! A local inter-process communication library: a symmetric, bidirectional,
//! message-oriented channel between two peers (or, in multi-client mode,
//! between one server and N independently-connected peers) over a local
//! stream transport — a Unix domain socket on POSIX, a named pipe on
//! Windows.
//!
//! See [`client::start_client`] and [`server::start_server`] for the two
//! entry points; both return an [`actor::Actor`]-backed handle whose
//! `read`/`read_timed`/`write`/`close` methods are the whole surface an
//! application needs.

mod actor;
mod client;
mod config;
mod error;
mod handshake;
mod manager;
mod server;
mod stream;
mod types;

pub use actor::Actor;
pub use config::{client_connect_wait, ClientConfig, LogLevel, ServerConfig, DEFAULT_MAX_MSG_SIZE};
pub use error::{Error, Result};
pub use types::{Message, Status, CLIENT_CONNECT_MSGTYPE, CONTROL_MSG_TYPE};

pub use client::{start_client, Client};
pub use manager::ServerManager;
pub use server::{start_server, Server};
