use std::fmt;

use crate::{Error, Result};

/// The type tag of a protocol message.
///
/// Tag values are protocol-stable. `Invalid` and `MaxMsgType` bracket the
/// valid range and never appear on the wire; [`MsgType::check`] rejects
/// them, and the frame codec refuses to write or read a message carrying
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Sentinel below every valid message type.
    Invalid = 0,
    /// First message on a connection; identifies the client and registers
    /// the namespace in which its topics live.
    Start = 1,
    /// A publication, forwarded by the broker to every subscriber of the
    /// publication topic.
    Publish = 2,
    /// A collection of topic subscriptions.
    Subscribe = 3,
    /// Cancels a collection of subscriptions.
    Unsubscribe = 4,
    /// Proof-of-life probe; the broker echoes the payload verbatim.
    Ping = 5,
    /// A server-reported error for a previously sent message.
    Error = 6,
    /// Acknowledges that a message was received and processed. Every
    /// message except Ping is answered with either an Ack or an Error.
    Ack = 7,
    /// Sentinel above every valid message type.
    MaxMsgType = 8,
}

impl MsgType {
    /// Returns an error if the message type is one of the sentinels.
    pub fn check(self) -> Result<()> {
        if self == MsgType::Invalid || self >= MsgType::MaxMsgType {
            return Err(Error::BadMsgType(self as u8));
        }

        Ok(())
    }

    /// Validates a raw tag read off the wire.
    pub fn from_tag(tag: u8) -> Result<Self> {
        let mt = match tag {
            1 => MsgType::Start,
            2 => MsgType::Publish,
            3 => MsgType::Subscribe,
            4 => MsgType::Unsubscribe,
            5 => MsgType::Ping,
            6 => MsgType::Error,
            7 => MsgType::Ack,
            other => return Err(Error::BadMsgType(other)),
        };

        Ok(mt)
    }

    /// Standard rendering for the `pubsub.msg_type` log attribute: `"N(Name)"`.
    pub fn attr(self) -> String {
        format!("{}({})", self as u8, self)
    }
}

impl PartialOrd for MsgType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MsgType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgType::Invalid => "Invalid",
            MsgType::Start => "Start",
            MsgType::Publish => "Publish",
            MsgType::Subscribe => "Subscribe",
            MsgType::Unsubscribe => "Unsubscribe",
            MsgType::Ping => "Ping",
            MsgType::Error => "Error",
            MsgType::Ack => "Ack",
            MsgType::MaxMsgType => "MaxMsgType",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_values_are_protocol_stable() {
        assert_eq!(MsgType::Invalid as u8, 0);
        assert_eq!(MsgType::Start as u8, 1);
        assert_eq!(MsgType::Publish as u8, 2);
        assert_eq!(MsgType::Subscribe as u8, 3);
        assert_eq!(MsgType::Unsubscribe as u8, 4);
        assert_eq!(MsgType::Ping as u8, 5);
        assert_eq!(MsgType::Error as u8, 6);
        assert_eq!(MsgType::Ack as u8, 7);
        assert_eq!(MsgType::MaxMsgType as u8, 8);
    }

    #[test]
    fn check_rejects_the_sentinels() {
        assert!(MsgType::Invalid.check().is_err());
        assert!(MsgType::MaxMsgType.check().is_err());
        for mt in [
            MsgType::Start,
            MsgType::Publish,
            MsgType::Subscribe,
            MsgType::Unsubscribe,
            MsgType::Ping,
            MsgType::Error,
            MsgType::Ack,
        ] {
            assert!(mt.check().is_ok(), "{mt} should be valid");
        }
    }

    #[test]
    fn from_tag_round_trips_the_valid_range() {
        for tag in 1..8u8 {
            let mt = MsgType::from_tag(tag).expect("valid tag");
            assert_eq!(mt as u8, tag);
        }
        assert!(MsgType::from_tag(0).is_err());
        assert!(MsgType::from_tag(8).is_err());
        assert!(MsgType::from_tag(200).is_err());
    }

    #[test]
    fn attr_renders_tag_and_name() {
        assert_eq!(MsgType::Publish.attr(), "2(Publish)");
    }
}
