//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian body length followed by the protobuf
//! encoded message. The reader knows where a message ends without waiting
//! for the peer to close the connection.

use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};

/// Default upper bound on a frame body.
///
/// A chunk costs roughly 11 bytes per rating, so this covers about 24M
/// ratings per node. A single node holding all of MovieLens-25M needs a
/// larger limit on both ends, or more nodes.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Fail with [`ProtocolError::FrameTooLarge`] if `message` would not fit in
/// a frame of at most `max_len` bytes
pub fn check_frame_len<M: Message>(message: &M, max_len: usize) -> Result<usize> {
    let len = message.encoded_len();
    let max = max_len.min(u32::MAX as usize);
    if len > max {
        return Err(ProtocolError::FrameTooLarge { len, max });
    }
    Ok(len)
}

/// Encode `message` and write it as one frame, refusing bodies above `max_len`
pub async fn write_frame<W, M>(writer: &mut W, message: &M, max_len: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let len = check_frame_len(message, max_len)?;
    let body = message.encode_to_vec();

    writer.write_u32(len as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it as `M`.
///
/// The length is checked against `max_len` before the body buffer is
/// allocated. A stream that ends mid-frame yields
/// [`ProtocolError::ConnectionClosed`].
pub async fn read_frame<R, M>(reader: &mut R, max_len: usize) -> Result<M>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let len = reader.read_u32().await.map_err(eof_as_closed)? as usize;
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(eof_as_closed)?;
    Ok(M::decode(body.as_slice())?)
}

fn eof_as_closed(err: std::io::Error) -> ProtocolError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(err)
    }
}
