use std::fmt;

/// Connection status. An actor is in exactly one of these at any time;
/// transitions are serialized by a single mutex (§3).
///
/// The ordering here is declaration order and has no behavioral meaning of
/// its own beyond `Closed` being a terminal state that §8's monotonicity
/// property checks against (once `Closed`, no further transitions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    NotConnected,
    Listening,
    Connecting,
    Connected,
    ReConnecting,
    Closed,
    Closing,
    Error,
    Timeout,
    Disconnected,
}

impl Status {
    /// The string carried on the wire inside a status notification Message,
    /// per §6's observable message stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotConnected => "Not Connected",
            Status::Listening => "Listening",
            Status::Connecting => "Connecting",
            Status::Connected => "Connected",
            Status::ReConnecting => "Reconnecting",
            Status::Closed => "Closed",
            Status::Closing => "Closing",
            Status::Error => "Error",
            Status::Timeout => "Timeout",
            Status::Disconnected => "Disconnected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Status {
    /// Whether a message that timed out under `ReadTimed` while the actor
    /// was in this status should still be requeued once it lands (§4.4).
    /// False once the actor has started tearing down.
    pub fn accepts_requeue(&self) -> bool {
        !matches!(
            self,
            Status::Closing | Status::Closed | Status::Error | Status::Timeout | Status::Disconnected
        )
    }
}

/// Reserved for on-wire control frames; callers must never use it as a
/// message type.
pub const CONTROL_MSG_TYPE: i32 = 0;

/// Internal message type used for status notifications pushed onto the
/// receive queue.
pub const STATUS_MSG_TYPE: i32 = -1;

/// Internal message type used for error notifications pushed onto the
/// receive queue.
pub const ERROR_MSG_TYPE: i32 = -2;

/// Internal message type used as a timed-read sentinel by code that needs
/// one but has no caller-supplied sentinel to hand (the multi-client id
/// handshake). Never dispatched onto an application-visible receive queue.
pub const INTERNAL_TIMEOUT_MSG_TYPE: i32 = -3;

/// Message type used by the multi-client manager handshake (§4.5/§4.7) to
/// request and assign a client id. Reserved by the library; application
/// messages should avoid it to keep manager traffic unambiguous, though
/// nothing currently enforces that on worker connections.
pub const CLIENT_CONNECT_MSGTYPE: i32 = 12;

/// A single item observed on an Actor's receive queue: an application
/// message from the wire, a status transition, or an internal error.
#[derive(Debug, Clone)]
pub struct Message {
    pub msg_type: i32,
    pub data: Vec<u8>,
    pub status: Option<String>,
    pub err: Option<String>,
}

impl Message {
    /// An application-level message received from the wire.
    pub fn data(msg_type: i32, data: Vec<u8>) -> Self {
        Message {
            msg_type,
            data,
            status: None,
            err: None,
        }
    }

    /// A status notification.
    pub fn status(status: Status) -> Self {
        Message {
            msg_type: STATUS_MSG_TYPE,
            data: Vec::new(),
            status: Some(status.as_str().to_string()),
            err: None,
        }
    }

    /// An error notification.
    pub fn error<E: ToString>(err: E) -> Self {
        Message {
            msg_type: ERROR_MSG_TYPE,
            data: Vec::new(),
            status: None,
            err: Some(err.to_string()),
        }
    }

    pub fn is_status(&self) -> bool {
        self.msg_type == STATUS_MSG_TYPE
    }

    pub fn is_error(&self) -> bool {
        self.msg_type == ERROR_MSG_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_the_observable_message_stream_contract() {
        assert_eq!(Status::ReConnecting.as_str(), "Reconnecting");
        assert_eq!(Status::NotConnected.as_str(), "Not Connected");
    }

    #[test]
    fn closed_is_greater_than_connecting_under_declaration_order() {
        // Declaration order only; exercised so a future reorder is noticed.
        assert!(Status::Connecting < Status::Closed);
    }
}
