//! Heartbeat wire protocol between the directory and storage servers
//!
//! Frame format: [LENGTH:4 BE, covers TYPE+PAYLOAD][TYPE:1][PAYLOAD]

use crate::common::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on LENGTH; heartbeat payloads are addresses and status strings
pub const MAX_FRAME_LEN: u32 = 64 * 1024;

/// Status text carried by a healthy `Success` reply
pub const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Payload: the server's serving address
    Register = 1,
    /// Empty payload
    Ping = 2,
    /// Payload: status text
    Success = 3,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::Register),
            2 => Ok(MessageType::Ping),
            3 => Ok(MessageType::Success),
            other => Err(Error::InvalidFormat(format!(
                "unknown message type {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageType,
    pub payload: Bytes,
}

impl Frame {
    pub fn register(address: &str) -> Self {
        Self {
            kind: MessageType::Register,
            payload: Bytes::copy_from_slice(address.as_bytes()),
        }
    }

    pub fn ping() -> Self {
        Self {
            kind: MessageType::Ping,
            payload: Bytes::new(),
        }
    }

    pub fn success(status: &str) -> Self {
        Self {
            kind: MessageType::Success,
            payload: Bytes::copy_from_slice(status.as_bytes()),
        }
    }

    /// True for `Success("OK")`
    pub fn is_ok(&self) -> bool {
        self.kind == MessageType::Success && self.payload.as_ref() == STATUS_OK.as_bytes()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5 + self.payload.len());
        buf.put_u32(1 + self.payload.len() as u32);
        buf.put_u8(self.kind as u8);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. A clean EOF before the length prefix surfaces as `Io(UnexpectedEof)`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(Error::InvalidFormat(format!("bad frame length {}", len)));
    }

    let kind = MessageType::try_from(reader.read_u8().await?)?;

    let mut payload = vec![0u8; len as usize - 1];
    reader.read_exact(&mut payload).await?;

    Ok(Frame {
        kind,
        payload: Bytes::from(payload),
    })
}
