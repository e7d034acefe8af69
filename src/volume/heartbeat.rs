//! Storage-server side of the heartbeat protocol
//!
//! The directory dials in, sends `Register`, then `Ping` at a fixed interval
//! on the same connection. Both are answered with `Success("OK")`.

use crate::common::protocol::{read_frame, write_frame, Frame, MessageType, STATUS_OK};
use crate::common::{Error, Result};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Accept heartbeat connections forever, one task per connection
pub async fn serve_heartbeats(listener: TcpListener) -> Result<()> {
    tracing::info!("Heartbeat listener on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            match handle_connection(stream, peer).await {
                Ok(()) => tracing::debug!("Heartbeat connection from {} closed", peer),
                Err(e) => tracing::warn!("Heartbeat connection from {} dropped: {}", peer, e),
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        match frame.kind {
            MessageType::Register => {
                tracing::info!(
                    "Registered by directory {} as {}",
                    peer,
                    String::from_utf8_lossy(&frame.payload)
                );
            }
            MessageType::Ping => tracing::trace!("Ping from {}", peer),
            MessageType::Success => {
                return Err(Error::InvalidFormat(
                    "unexpected Success frame from directory".into(),
                ))
            }
        }

        write_frame(&mut stream, &Frame::success(STATUS_OK)).await?;
    }
}
