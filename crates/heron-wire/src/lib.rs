// Wire format for the heron publish/subscribe protocol: framed messages on
// a byte stream plus the typed payload records they carry.
mod frame;
mod msg_type;
mod payload;
mod record;

pub use frame::{HEADER_LEN, MAGIC, MAX_PAYLOAD, Message, MsgId, read_message, write_message};
pub use msg_type::MsgType;
pub use payload::{ErrorPayload, PingPayload, PublishPayload, StartPayload, Sub, SubscriptionPayload};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad message type: {0}")]
    BadMsgType(u8),
    #[error("bad payload, too big: {size} (max: {MAX_PAYLOAD})")]
    PayloadTooLarge { size: usize },
    #[error("bad message start, should be: 0x{expected:08X}, is: 0x{actual:08X}")]
    MagicMismatch { expected: u32, actual: u32 },
    #[error("short read while reading the {reading}")]
    ShortRead { reading: &'static str },
    #[error("could not marshal the {record} record: {reason}")]
    Marshal {
        record: &'static str,
        reason: String,
    },
    #[error("could not unmarshal the {record} record: {reason}")]
    Unmarshal {
        record: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
