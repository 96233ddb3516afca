//! Length-prefixed frame codec.
//!
//! Every message in either direction is a 4-byte big-endian length followed
//! by exactly that many payload bytes.

use crate::base::neterror::NetError;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Initial read buffer cap; larger payloads grow as bytes arrive.
const INITIAL_READ_CAPACITY: usize = 64 * 1024;

/// Prefix `payload` with its length.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, NetError> {
    let len = u32::try_from(payload.len()).map_err(|_| NetError::MalformedFrame)?;
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.put_u32(len);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Split one complete frame held in memory into its payload.
///
/// The prefix must match the remaining length exactly.
pub fn decode_frame(frame: &[u8]) -> Result<&[u8], NetError> {
    if frame.len() < LENGTH_PREFIX_LEN {
        return Err(NetError::MalformedFrame);
    }
    let (prefix, payload) = frame.split_at(LENGTH_PREFIX_LEN);
    let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if len != payload.len() {
        return Err(NetError::MalformedFrame);
    }
    Ok(payload)
}

/// Read the next frame's payload, suspending across partial reads.
///
/// End of stream anywhere, at a frame boundary or mid-frame, is
/// `TransportClosed`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, NetError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    if let Err(e) = reader.read_exact(&mut prefix).await {
        tracing::debug!(error = %e, "engine stream ended at frame boundary");
        return Err(NetError::TransportClosed);
    }
    let len = u32::from_be_bytes(prefix) as u64;

    let mut payload = Vec::with_capacity((len as usize).min(INITIAL_READ_CAPACITY));
    let read = (&mut *reader)
        .take(len)
        .read_to_end(&mut payload)
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, "engine stream failed mid-frame");
            NetError::TransportClosed
        })?;

    if (read as u64) < len {
        tracing::warn!(expected = len, received = read, "engine stream closed mid-frame");
        return Err(NetError::TransportClosed);
    }
    Ok(Bytes::from(payload))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(payload)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|_| NetError::TransportClosed)?;
    writer.flush().await.map_err(|_| NetError::TransportClosed)
}
