use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::{Atom, AtomCodec, MAX_ATOM_SIZE};
use crate::error::Result;
use crate::message::Message;

/// Reads complete atoms from any `AsyncRead` channel.
///
/// Handles partial reads internally; callers always get complete atoms, in
/// arrival order, even when several arrive in one read.
pub struct AtomReader<R> {
    inner: FramedRead<R, AtomCodec>,
}

impl<R: AsyncRead + Unpin> AtomReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: FramedRead::with_capacity(inner, AtomCodec, MAX_ATOM_SIZE),
        }
    }

    /// Read the next complete atom.
    ///
    /// Returns `Ok(None)` when the channel ends cleanly on an atom boundary
    /// and `Err(FrameError::Truncated)` when it ends mid-atom.
    pub async fn read_atom(&mut self) -> Result<Option<Atom>> {
        self.inner.next().await.transpose()
    }

    /// Read the next atom and decode its JSON payload.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        let Some(atom) = self.read_atom().await? else {
            return Ok(None);
        };
        tracing::trace!(
            payload = %String::from_utf8_lossy(&atom.payload),
            "received message"
        );
        Message::from_json(&atom.payload).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::{BufMut, BytesMut};
    use tokio::io::{AsyncWriteExt, ReadBuf};

    use super::*;
    use crate::codec::{encode_atom, ATOM_TYPE, HEADER_SIZE};
    use crate::error::FrameError;

    fn wire(messages: &[Message]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for msg in messages {
            msg.encode_atom(&mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[tokio::test]
    async fn read_single_message() {
        let bytes = wire(&[Message::debug(500_000)]);
        let mut reader = AtomReader::new(bytes.as_slice());

        let msg = reader.read_message().await.unwrap().unwrap();
        assert_eq!(msg, Message::debug(500_000));
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn back_to_back_atoms_in_one_read() {
        let bytes = wire(&[Message::debug(1), Message::init("video"), Message::debug(2)]);
        let mut reader = AtomReader::new(bytes.as_slice());

        assert_eq!(reader.read_message().await.unwrap(), Some(Message::debug(1)));
        assert_eq!(
            reader.read_message().await.unwrap(),
            Some(Message::init("video"))
        );
        assert_eq!(reader.read_message().await.unwrap(), Some(Message::debug(2)));
        assert_eq!(reader.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_channel_is_clean_end() {
        let mut reader = AtomReader::new(&b""[..]);
        assert!(reader.read_atom().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_header_is_truncation() {
        for len in 1..HEADER_SIZE {
            let bytes = vec![0u8; len];
            let mut reader = AtomReader::new(bytes.as_slice());
            let err = reader.read_atom().await.unwrap_err();
            assert!(matches!(err, FrameError::Truncated(n) if n == len));
        }
    }

    #[tokio::test]
    async fn partial_payload_is_truncation() {
        let mut bytes = wire(&[Message::init("video")]);
        bytes.truncate(bytes.len() - 3);

        let mut reader = AtomReader::new(bytes.as_slice());
        let err = reader.read_atom().await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated(_)));
    }

    #[tokio::test]
    async fn oversized_header_fails_before_payload() {
        let mut bytes = BytesMut::new();
        bytes.put_u32(MAX_ATOM_SIZE as u32 + 1);
        bytes.put_slice(&ATOM_TYPE);

        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(&bytes).await.unwrap();
        // `tx` stays open: the reader must fail without waiting for payload.
        let mut reader = AtomReader::new(rx);
        let err = reader.read_atom().await.unwrap_err();
        assert!(matches!(err, FrameError::AtomTooLarge { .. }));
        drop(tx);
    }

    #[tokio::test]
    async fn wrong_type_fails_before_payload() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(&[0, 0, 0, 32, b'f', b't', b'y', b'p']).await.unwrap();

        let mut reader = AtomReader::new(rx);
        let err = reader.read_atom().await.unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedType(ref t) if t == "ftyp"));
        drop(tx);
    }

    #[tokio::test]
    async fn malformed_json_fails() {
        let mut bytes = BytesMut::new();
        encode_atom(ATOM_TYPE, b"not json", &mut bytes).unwrap();

        let mut reader = AtomReader::new(&bytes[..]);
        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::Json(_)));
    }

    #[tokio::test]
    async fn partial_read_handling() {
        let bytes = wire(&[Message::init("audio"), Message::debug(9)]);
        let mut reader = AtomReader::new(ByteByByteReader { bytes, pos: 0 });

        assert_eq!(
            reader.read_message().await.unwrap(),
            Some(Message::init("audio"))
        );
        assert_eq!(reader.read_message().await.unwrap(), Some(Message::debug(9)));
        assert_eq!(reader.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_error_propagates() {
        let mut reader = AtomReader::new(FailingReader);
        let err = reader.read_atom().await.unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for ByteByByteReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.pos < self.bytes.len() && buf.remaining() > 0 {
                let byte = self.bytes[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::ConnectionReset)))
        }
    }
}
