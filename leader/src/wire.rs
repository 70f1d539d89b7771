//! Length-delimited framing for `Packet`s over a learner connection.
//! Reused by `LearnerSession`'s reader/writer task split and by its tests.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use leader_types::{Packet, SessionError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub struct PacketReader<R> {
    inner: FramedRead<R, LengthDelimitedCodec>,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(read_half: R) -> Self {
        PacketReader {
            inner: FramedRead::new(read_half, LengthDelimitedCodec::new()),
        }
    }

    /// `Ok(None)` on a clean EOF; any I/O error or malformed frame is
    /// reported through `SessionError`.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, SessionError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => Ok(Some(Packet::decode(&bytes)?)),
            Some(Err(err)) => Err(SessionError::Io(err)),
            None => Ok(None),
        }
    }
}

pub struct PacketWriter<W> {
    inner: FramedWrite<W, LengthDelimitedCodec>,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    pub fn new(write_half: W) -> Self {
        PacketWriter {
            inner: FramedWrite::new(write_half, LengthDelimitedCodec::new()),
        }
    }

    pub async fn write_packet(&mut self, packet: &Packet) -> Result<(), SessionError> {
        let bytes = packet.encode().map_err(SessionError::Decode)?;
        self.inner
            .send(Bytes::from(bytes))
            .await
            .map_err(SessionError::Io)
    }
}
