use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reserved frame type consumed by the codec layer. Callers may never
/// construct a frame with this type; frames carrying it are dropped by
/// whoever reads them and never delivered to the application.
pub const CONTROL_TYPE: u32 = 0;

/// Length in bytes of a frame body's leading type tag (the `[type:4]` in
/// `[type:4][payload]`). Callers sizing a read-side frame bound from a
/// maximum payload size need to add this on top of it.
pub const TYPE_TAG_LEN: usize = 4;

/// Reads one length-prefixed frame body off `reader`.
///
/// Wire shape: `[len:4][body:len]`. `body` is opaque to this function — when
/// encryption is active it is ciphertext, otherwise it is `[type:4][payload]`
/// as produced by [`encode_body`]. Returns `Ok(None)` on a clean EOF before
/// any byte of the length prefix is read; any other short read is an error.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_body_len: u32,
) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > max_body_len {
        return Err(Error::FrameTooLarge(len, max_body_len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    Ok(Some(body))
}

/// Writes one length-prefixed frame body to `writer`. Does not flush —
/// callers that need the bytes to hit the wire immediately must flush
/// themselves, as the Actor write loop does after each message (§4.4).
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    Ok(())
}

/// Builds a frame body `[type:4][payload]` from a type tag and payload.
pub fn encode_body(msg_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(TYPE_TAG_LEN + payload.len());
    body.extend_from_slice(&msg_type.to_be_bytes());
    body.extend_from_slice(payload);
    body
}

/// Splits a frame body `[type:4][payload]` into its type tag and payload.
pub fn decode_body(body: &[u8]) -> Result<(u32, &[u8])> {
    if body.len() < TYPE_TAG_LEN {
        return Err(Error::ShortBody(body.len()));
    }

    let (type_bytes, payload) = body.split_at(TYPE_TAG_LEN);
    let msg_type = u32::from_be_bytes(type_bytes.try_into().unwrap());
    Ok((msg_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let body = encode_body(5, b"hello");
        let mut wire = Vec::new();
        write_frame(&mut wire, &body).await.unwrap();

        let mut cursor = std::io::Cursor::new(wire);
        let read_back = read_frame(&mut cursor, 1024).await.unwrap().unwrap();
        assert_eq!(read_back, body);

        let (msg_type, payload) = decode_body(&read_back).unwrap();
        assert_eq!(msg_type, 5);
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn clean_eof_before_length_prefix_is_not_an_error() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let frame = read_frame(&mut cursor, 1024).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn oversize_length_prefix_is_rejected_before_allocating() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&10_000u32.to_be_bytes());
        let mut cursor = std::io::Cursor::new(wire);

        let err = read_frame(&mut cursor, 1024).await.unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(10_000, 1024)));
    }

    #[test]
    fn decode_body_rejects_truncated_type_tag() {
        let err = decode_body(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(err, Error::ShortBody(2)));
    }

    #[test]
    fn control_type_round_trips_like_any_other() {
        let body = encode_body(CONTROL_TYPE, b"");
        let (msg_type, payload) = decode_body(&body).unwrap();
        assert_eq!(msg_type, CONTROL_TYPE);
        assert!(payload.is_empty());
    }
}
