//! The opening exchange run once per accepted connection, before any
//! application data flows (§4.2). The server is always the initiator; the
//! client is always the responder.

use crate::error::{Error, Result};
use ipc_codec::{read_frame, write_frame};
use ipc_crypto::{parse_remote_public_key, AeadSession, EphemeralKeyPair, Session};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Current protocol version. A peer advertising any other version fails the
/// handshake for both sides.
pub const VERSION: u8 = 2;

const ACCEPT: u8 = 0;
const REJECT: u8 = 1;

/// Result of a completed handshake: the peer's negotiated outbound limit and,
/// if both sides required encryption, the established AEAD session.
pub struct HandshakeOutcome {
    pub max_msg_size: u32,
    pub session: Option<Box<dyn Session + Send + Sync>>,
}

/// Runs the handshake as the initiator (server side of an accepted
/// connection).
pub async fn run_initiator<S>(
    stream: &mut S,
    local_max_msg_size: u32,
    want_encryption: bool,
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_u8(VERSION).await?;
    let ack = stream.read_u8().await?;
    if ack == REJECT {
        return Err(Error::VersionMismatch);
    }

    write_frame(stream, &local_max_msg_size.to_be_bytes()).await?;
    let max_ack = stream.read_u8().await?;
    if max_ack == REJECT {
        return Err(Error::VersionMismatch);
    }

    stream.write_u8(want_encryption as u8).await?;
    let peer_wants = stream.read_u8().await? != 0;

    if peer_wants != want_encryption {
        return Err(Error::EncryptionEnforcedByPeer);
    }

    let session = if want_encryption {
        Some(negotiate_encryption(stream).await?)
    } else {
        None
    };

    Ok(HandshakeOutcome {
        max_msg_size: local_max_msg_size,
        session,
    })
}

/// Runs the handshake as the responder (client side of a fresh dial).
pub async fn run_responder<S>(
    stream: &mut S,
    local_max_msg_size: u32,
    want_encryption: bool,
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer_version = stream.read_u8().await?;
    if peer_version != VERSION {
        stream.write_u8(REJECT).await?;
        return Err(Error::VersionMismatch);
    }
    stream.write_u8(ACCEPT).await?;

    let body = read_frame(stream, 4)
        .await?
        .ok_or(Error::VersionMismatch)?;
    if body.len() != 4 {
        stream.write_u8(REJECT).await?;
        return Err(Error::VersionMismatch);
    }
    let peer_max_msg_size = u32::from_be_bytes(body.try_into().unwrap());
    stream.write_u8(ACCEPT).await?;

    let peer_wants = stream.read_u8().await? != 0;
    stream.write_u8(want_encryption as u8).await?;

    if peer_wants != want_encryption {
        return Err(Error::EncryptionRefusedByPeer);
    }

    let session = if want_encryption {
        Some(negotiate_encryption(stream).await?)
    } else {
        None
    };

    Ok(HandshakeOutcome {
        max_msg_size: peer_max_msg_size,
        session,
    })
}

/// Ephemeral P-384 key exchange, run identically by both sides once they've
/// agreed encryption is required (§4.2's third step, §4.3).
async fn negotiate_encryption<S>(stream: &mut S) -> Result<Box<dyn Session + Send + Sync>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let local = EphemeralKeyPair::generate();
    write_frame(stream, &local.public_key_bytes()).await?;

    let peer_key_bytes = read_frame(stream, ipc_crypto::PUBLIC_KEY_LEN as u32)
        .await?
        .ok_or(Error::Crypto(ipc_crypto::Error::InvalidPublicKeyLength(0)))?;
    let peer_public = parse_remote_public_key(&peer_key_bytes)?;

    let session = AeadSession::derive(local, &peer_public)?;
    Ok(Box::new(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn matching_versions_and_no_encryption_completes() {
        let (mut a, mut b) = duplex(4096);

        let (init, resp) = tokio::join!(
            run_initiator(&mut a, 1024, false),
            run_responder(&mut b, 1024, false)
        );

        let init = init.unwrap();
        let resp = resp.unwrap();
        assert!(init.session.is_none());
        assert!(resp.session.is_none());
        assert_eq!(resp.max_msg_size, 1024);
    }

    #[tokio::test]
    async fn mismatched_version_fails_both_sides() {
        let (mut a, mut b) = duplex(4096);

        let initiator = async {
            a.write_u8(99).await.unwrap();
            let ack = a.read_u8().await.unwrap();
            ack
        };
        let responder = run_responder(&mut b, 1024, false);

        let (ack, resp) = tokio::join!(initiator, responder);
        assert_eq!(ack, REJECT);
        assert!(matches!(resp.unwrap_err(), Error::VersionMismatch));
    }

    #[tokio::test]
    async fn encryption_mismatch_is_reported_on_both_sides() {
        let (mut a, mut b) = duplex(4096);

        let (init, resp) = tokio::join!(
            run_initiator(&mut a, 1024, true),
            run_responder(&mut b, 1024, false)
        );

        assert!(matches!(
            init.unwrap_err(),
            Error::EncryptionEnforcedByPeer
        ));
        assert!(matches!(
            resp.unwrap_err(),
            Error::EncryptionRefusedByPeer
        ));
    }

    #[tokio::test]
    async fn mutual_encryption_establishes_matching_sessions() {
        let (mut a, mut b) = duplex(8192);

        let (init, resp) = tokio::join!(
            run_initiator(&mut a, 1024, true),
            run_responder(&mut b, 1024, true)
        );

        let init = init.unwrap();
        let resp = resp.unwrap();

        let sealed = init.session.unwrap().seal(b"ping").unwrap();
        let opened = resp.session.unwrap().open(&sealed).unwrap();
        assert_eq!(opened, b"ping");
    }
}
