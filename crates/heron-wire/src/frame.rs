// Frame codec: every protocol message is a self-delimiting little-endian
// frame of magic, type tag, message id, payload length, payload bytes.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::msg_type::MsgType;
use crate::{Error, Result};

/// Introductory value at the start of every frame, used to detect corrupted
/// or misaligned streams.
pub const MAGIC: u32 = 0xB0AD_1CEA;

/// Fixed size of the frame header: magic (4), type tag (1), message id (4),
/// payload length (2).
pub const HEADER_LEN: usize = 11;

/// Maximum allowed payload size; the length field on the wire is a u16.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Per-client monotonically increasing identifier correlating server
/// responses to client requests.
pub type MsgId = u32;

/// One protocol message between a pub/sub client and broker.
///
/// ```
/// use bytes::Bytes;
/// use heron_wire::{Message, MsgType};
///
/// let msg = Message::new(MsgType::Publish, 7, Bytes::from_static(b"hi"));
/// let encoded = msg.encode().expect("encode");
/// let decoded = Message::decode(encoded).expect("decode");
/// assert_eq!(decoded.msg_id, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub mt: MsgType,
    pub msg_id: MsgId,
    pub payload: Bytes,
}

impl Message {
    pub fn new(mt: MsgType, msg_id: MsgId, payload: Bytes) -> Self {
        Self {
            mt,
            msg_id,
            payload,
        }
    }

    /// Encodes the whole frame into a single buffer. Fails before producing
    /// any bytes if the payload exceeds [`MAX_PAYLOAD`] or the message type
    /// is a sentinel.
    pub fn encode(&self) -> Result<Bytes> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                size: self.payload.len(),
            });
        }
        self.mt.check()?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32_le(MAGIC);
        buf.put_u8(self.mt as u8);
        buf.put_u32_le(self.msg_id);
        buf.put_u16_le(self.payload.len() as u16);
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Decodes one frame from a buffer. After any failure the buffer should
    /// be considered unusable; framing is lost.
    pub fn decode(mut input: Bytes) -> Result<Self> {
        if input.len() < HEADER_LEN {
            return Err(Error::ShortRead {
                reading: "message header",
            });
        }

        let magic = input.get_u32_le();
        if magic != MAGIC {
            return Err(Error::MagicMismatch {
                expected: MAGIC,
                actual: magic,
            });
        }

        let mt = MsgType::from_tag(input.get_u8())?;
        let msg_id = input.get_u32_le();
        let payload_len = input.get_u16_le() as usize;

        if input.remaining() < payload_len {
            return Err(Error::ShortRead {
                reading: "message payload",
            });
        }

        Ok(Self {
            mt,
            msg_id,
            payload: input.slice(0..payload_len),
        })
    }
}

/// Writes one message to the stream. The header and payload go out in a
/// single write so frames from other writers can never interleave with it.
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = msg.encode()?;
    writer.write_all(&frame).await?;
    Ok(())
}

/// Reads the next message from the stream. Returns `Ok(None)` on a clean
/// end-of-stream at a frame boundary; a partial header or payload is a
/// [`Error::ShortRead`]. After any error the stream is no longer usable.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::ShortRead {
                reading: "message header",
            });
        }
        filled += n;
    }

    let mut buf = &header[..];
    let magic = buf.get_u32_le();
    if magic != MAGIC {
        return Err(Error::MagicMismatch {
            expected: MAGIC,
            actual: magic,
        });
    }

    let mt = MsgType::from_tag(buf.get_u8())?;
    let msg_id = buf.get_u32_le();
    let payload_len = buf.get_u16_le() as usize;

    let mut payload = BytesMut::zeroed(payload_len);
    if payload_len > 0 {
        reader
            .read_exact(&mut payload[..])
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::ShortRead {
                    reading: "message payload",
                },
                _ => Error::Io(err),
            })?;
    }

    Ok(Some(Message {
        mt,
        msg_id,
        payload: payload.freeze(),
    }))
}
