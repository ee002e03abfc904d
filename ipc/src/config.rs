use crate::error::{Error, Result};
use std::time::Duration;

/// Default maximum payload size: 3 MiB. Values below 1024 bytes configured
/// by a caller are replaced with this default (§6).
pub const DEFAULT_MAX_MSG_SIZE: u32 = 3 * 1024 * 1024;

const MIN_MAX_MSG_SIZE: u32 = 1024;

/// Default inter-attempt sleep for a dialing/reconnecting client.
pub const DEFAULT_RETRY_TIMER: Duration = Duration::from_secs(1);

/// `debug`/`info`/`warn`/`error`, mapped onto `tracing::Level`. Defaults to
/// `Error`; `IPC_DEBUG=true` forces `Debug` regardless of the configured
/// level (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Error
    }
}

impl LogLevel {
    pub fn parse(s: &str) -> LogLevel {
        match s.to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    /// Resolves the effective level, honoring the `IPC_DEBUG` override.
    pub fn effective(self) -> LogLevel {
        if ipc_debug_env() {
            LogLevel::Debug
        } else {
            self
        }
    }

    pub fn to_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

fn ipc_debug_env() -> bool {
    std::env::var("IPC_DEBUG")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// How long, after a disconnect, the client's reader sleeps before redialing
/// — long enough for the server to re-arm its accept loop. Consumed by
/// tests and by `Client::reconnect`; tunable via `IPC_CLIENT_CONNECT_WAIT`
/// (seconds, default 2), matching the original library's test helper.
pub fn client_connect_wait() -> Duration {
    let secs = std::env::var("IPC_CLIENT_CONNECT_WAIT")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(2);
    Duration::from_secs(secs)
}

/// Configuration for a `Server` / `ServerManager`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub max_msg_size: u32,
    pub unmask_permissions: bool,
    pub multi_client: bool,
    pub encryption: bool,
    pub log_level: LogLevel,
}

impl ServerConfig {
    pub fn new<T: Into<String>>(name: T) -> Result<ServerConfig> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        Ok(ServerConfig {
            name,
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
            unmask_permissions: false,
            multi_client: false,
            encryption: false,
            log_level: LogLevel::default(),
        })
    }

    pub fn max_msg_size(mut self, size: u32) -> Self {
        self.max_msg_size = if size < MIN_MAX_MSG_SIZE {
            DEFAULT_MAX_MSG_SIZE
        } else {
            size
        };
        self
    }

    pub fn unmask_permissions(mut self, v: bool) -> Self {
        self.unmask_permissions = v;
        self
    }

    pub fn multi_client(mut self, v: bool) -> Self {
        self.multi_client = v;
        self
    }

    pub fn encryption(mut self, v: bool) -> Self {
        self.encryption = v;
        self
    }

    pub fn log_level(mut self, v: LogLevel) -> Self {
        self.log_level = v;
        self
    }
}

/// Configuration for a `Client`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub name: String,
    pub multi_client: bool,
    pub encryption: bool,
    pub log_level: LogLevel,
    pub timeout: Duration,
    /// `None` means retry indefinitely (§6: `Timeout <= 0` means infinite).
    pub timeout_is_infinite: bool,
    pub retry_timer: Duration,
}

impl ClientConfig {
    pub fn new<T: Into<String>>(name: T) -> Result<ClientConfig> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        Ok(ClientConfig {
            name,
            multi_client: false,
            encryption: false,
            log_level: LogLevel::default(),
            timeout: Duration::ZERO,
            timeout_is_infinite: true,
            retry_timer: DEFAULT_RETRY_TIMER,
        })
    }

    /// `timeout_secs < 0` is treated as 0 (infinite retries), per §6.
    pub fn timeout_secs(mut self, timeout_secs: i64) -> Self {
        if timeout_secs <= 0 {
            self.timeout = Duration::ZERO;
            self.timeout_is_infinite = true;
        } else {
            self.timeout = Duration::from_secs(timeout_secs as u64);
            self.timeout_is_infinite = false;
        }
        self
    }

    /// `retry_timer_secs <= 0` defaults to one second, per §6.
    pub fn retry_timer_secs(mut self, retry_timer_secs: i64) -> Self {
        self.retry_timer = if retry_timer_secs <= 0 {
            DEFAULT_RETRY_TIMER
        } else {
            Duration::from_secs(retry_timer_secs as u64)
        };
        self
    }

    pub fn multi_client(mut self, v: bool) -> Self {
        self.multi_client = v;
        self
    }

    pub fn encryption(mut self, v: bool) -> Self {
        self.encryption = v;
        self
    }

    pub fn log_level(mut self, v: LogLevel) -> Self {
        self.log_level = v;
        self
    }
}

/// Resolves the on-disk/named-pipe path for an endpoint. `id == 0` means the
/// base name with no suffix (the manager endpoint, or a single-client
/// endpoint); `id > 0` appends the id before the platform suffix (workers in
/// multi-client mode).
#[cfg(unix)]
pub fn endpoint_path(name: &str, id: u32) -> String {
    if id == 0 {
        format!("/tmp/{}.sock", name)
    } else {
        format!("/tmp/{}{}.sock", name, id)
    }
}

#[cfg(windows)]
pub fn endpoint_path(name: &str, id: u32) -> String {
    if id == 0 {
        format!(r"\\.\pipe\{}", name)
    } else {
        format!(r"\\.\pipe\{}{}", name, id)
    }
}

/// Endpoint name for the manager in multi-client mode.
pub fn manager_name(base_name: &str) -> String {
    format!("{}_manager", base_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_server_name_is_rejected() {
        let err = ServerConfig::new("").unwrap_err();
        assert_eq!(err.to_string(), "ipcName cannot be an empty string");
    }

    #[test]
    fn undersized_max_msg_size_falls_back_to_default() {
        let cfg = ServerConfig::new("test").unwrap().max_msg_size(10);
        assert_eq!(cfg.max_msg_size, DEFAULT_MAX_MSG_SIZE);
    }

    #[test]
    fn negative_client_timeout_means_infinite() {
        let cfg = ClientConfig::new("test").unwrap().timeout_secs(-5);
        assert!(cfg.timeout_is_infinite);
        assert_eq!(cfg.timeout, Duration::ZERO);
    }

    #[test]
    fn non_positive_retry_timer_defaults_to_one_second() {
        let cfg = ClientConfig::new("test").unwrap().retry_timer_secs(0);
        assert_eq!(cfg.retry_timer, DEFAULT_RETRY_TIMER);
    }

    #[cfg(unix)]
    #[test]
    fn endpoint_paths_follow_the_posix_convention() {
        assert_eq!(endpoint_path("ex", 0), "/tmp/ex.sock");
        assert_eq!(endpoint_path("ex", 2), "/tmp/ex2.sock");
    }
}
