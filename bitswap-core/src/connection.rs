//! Transport seam for outgoing messages
//!
//! The codec never opens connections. It hands encoded messages to a
//! [`Connection`] supplied per exchange through a [`SendContext`].

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

use crate::protocol::ProtocolVersion;

/// Largest frame accepted by [`read_frame`].
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// A peer connection able to carry one encoded message at a time.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, encoded: Vec<u8>) -> io::Result<()>;
}

/// Per-exchange state needed to transmit a message.
pub struct SendContext<'a, C: ?Sized> {
    pub protocol: ProtocolVersion,
    pub connection: &'a C,
}

impl<'a, C: Connection + ?Sized> SendContext<'a, C> {
    pub fn new(protocol: ProtocolVersion, connection: &'a C) -> Self {
        Self {
            protocol,
            connection,
        }
    }
}

/// Writes each message as an unsigned-varint length-prefixed frame.
pub struct StreamConnection<W> {
    writer: Mutex<W>,
}

impl<W> StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> Connection for StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, encoded: Vec<u8>) -> io::Result<()> {
        let mut len_buf = unsigned_varint::encode::usize_buffer();
        let len = unsigned_varint::encode::usize(encoded.len(), &mut len_buf);

        let mut writer = self.writer.lock().await;
        writer.write_all(len).await?;
        writer.write_all(&encoded).await?;
        writer.flush().await?;

        trace!("Wrote frame of {} bytes", encoded.len());
        Ok(())
    }
}

/// Read one length-prefixed frame. Returns `None` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = unsigned_varint::encode::usize_buffer();
    let mut read = 0;

    loop {
        if read == len_buf.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame length overflow"));
        }

        match reader.read_u8().await {
            Ok(byte) => len_buf[read] = byte,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && read == 0 => return Ok(None),
            Err(e) => return Err(e),
        }
        read += 1;

        if len_buf[read - 1] & 0x80 == 0 {
            break;
        }
    }

    let (len, _) = unsigned_varint::decode::usize(&len_buf[..read])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    if len > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit of {}", len, max_size),
        ));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}
