// Typed payload records carried inside frames, one per message type that
// has a body. Field numbers are protocol-stable; see each record.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};

use crate::record::{FieldCursor, FieldValue, put_bytes, put_fixed32, put_fixed64};
use crate::{Error, Result};

/// Payload of the `Start` message: identifies the connecting client and
/// registers the namespace its topics live in.
///
/// Fields: 1 protocol version, 2 client id, 3 namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartPayload {
    pub protocol_version: i32,
    pub client_id: String,
    pub namespace: String,
}

impl StartPayload {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        put_fixed32(&mut buf, 1, self.protocol_version as u32);
        put_bytes(&mut buf, 2, "Start", self.client_id.as_bytes())?;
        put_bytes(&mut buf, 3, "Start", self.namespace.as_bytes())?;
        Ok(buf.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut decoded = Self::default();
        let mut cursor = FieldCursor::new("Start", payload);
        while let Some((field, value)) = cursor.next_field()? {
            match (field, value) {
                (1, FieldValue::Fixed32(v)) => decoded.protocol_version = v as i32,
                (2, FieldValue::Bytes(raw)) => decoded.client_id = cursor.utf8(2, raw)?,
                (3, FieldValue::Bytes(raw)) => decoded.namespace = cursor.utf8(3, raw)?,
                _ => {}
            }
        }
        Ok(decoded)
    }
}

/// Payload of a `Publish` message.
///
/// Fields: 1 topic, 2 payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishPayload {
    pub topic: String,
    pub payload: Bytes,
}

impl PublishPayload {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, 1, "Publish", self.topic.as_bytes())?;
        put_bytes(&mut buf, 2, "Publish", &self.payload)?;
        Ok(buf.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut decoded = Self::default();
        let mut cursor = FieldCursor::new("Publish", payload);
        while let Some((field, value)) = cursor.next_field()? {
            match (field, value) {
                (1, FieldValue::Bytes(raw)) => decoded.topic = cursor.utf8(1, raw)?,
                (2, FieldValue::Bytes(raw)) => decoded.payload = Bytes::copy_from_slice(raw),
                _ => {}
            }
        }
        Ok(decoded)
    }
}

/// One subscription inside a [`SubscriptionPayload`].
///
/// Fields: 1 topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sub {
    pub topic: String,
}

/// Payload shared by `Subscribe` and `Unsubscribe` messages: the list of
/// topics being (un)subscribed.
///
/// Fields: repeated 1, each a nested [`Sub`] record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionPayload {
    pub subs: Vec<Sub>,
}

impl SubscriptionPayload {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        for sub in &self.subs {
            let mut nested = BytesMut::new();
            put_bytes(&mut nested, 1, "Sub", sub.topic.as_bytes())?;
            put_bytes(&mut buf, 1, "Subscription", &nested)?;
        }
        Ok(buf.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut decoded = Self::default();
        let mut cursor = FieldCursor::new("Subscription", payload);
        while let Some((field, value)) = cursor.next_field()? {
            if let (1, FieldValue::Bytes(raw)) = (field, value) {
                decoded.subs.push(decode_sub(raw)?);
            }
        }
        Ok(decoded)
    }
}

fn decode_sub(raw: &[u8]) -> Result<Sub> {
    let mut sub = Sub::default();
    let mut cursor = FieldCursor::new("Sub", raw);
    while let Some((field, value)) = cursor.next_field()? {
        if let (1, FieldValue::Bytes(topic)) = (field, value) {
            sub.topic = cursor.utf8(1, topic)?;
        }
    }
    Ok(sub)
}

/// Payload of a `Ping` message: the sender's wall-clock send time, echoed
/// verbatim by the broker so the sender can compute the round trip.
///
/// Fields: 1 seconds since the Unix epoch, 2 subsecond nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingPayload {
    pub unix_secs: u64,
    pub nanos: u32,
}

impl PingPayload {
    /// Captures the current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            unix_secs: since_epoch.as_secs(),
            nanos: since_epoch.subsec_nanos(),
        }
    }

    /// Wall-clock time elapsed since this payload was stamped; zero if the
    /// clock went backwards in between.
    pub fn elapsed(&self) -> Duration {
        let stamped = UNIX_EPOCH + Duration::new(self.unix_secs, self.nanos);
        SystemTime::now()
            .duration_since(stamped)
            .unwrap_or_default()
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        put_fixed64(&mut buf, 1, self.unix_secs);
        put_fixed32(&mut buf, 2, self.nanos);
        Ok(buf.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut decoded = Self::default();
        let mut cursor = FieldCursor::new("Ping", payload);
        while let Some((field, value)) = cursor.next_field()? {
            match (field, value) {
                (1, FieldValue::Fixed64(v)) => decoded.unix_secs = v,
                (2, FieldValue::Fixed32(v)) => decoded.nanos = v,
                _ => {}
            }
        }
        Ok(decoded)
    }
}

/// Payload of an `Error` message from the broker.
///
/// Fields: 1 error text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, 1, "Error", self.error.as_bytes())?;
        Ok(buf.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::Unmarshal {
                record: "Error",
                reason: "nothing to unmarshal".to_string(),
            });
        }

        let mut decoded = Self::default();
        let mut cursor = FieldCursor::new("Error", payload);
        while let Some((field, value)) = cursor.next_field()? {
            if let (1, FieldValue::Bytes(raw)) = (field, value) {
                decoded.error = cursor.utf8(1, raw)?;
            }
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_round_trip() {
        let payload = StartPayload {
            protocol_version: 1,
            client_id: "program: app;host: h;user: ;pid: 42".to_string(),
            namespace: "ns1".to_string(),
        };
        let encoded = payload.encode().expect("encode");
        assert_eq!(StartPayload::decode(&encoded).expect("decode"), payload);
    }

    #[test]
    fn publish_round_trip() {
        let payload = PublishPayload {
            topic: "/a/b".to_string(),
            payload: Bytes::from_static(b"hello"),
        };
        let encoded = payload.encode().expect("encode");
        assert_eq!(PublishPayload::decode(&encoded).expect("decode"), payload);
    }

    #[test]
    fn subscription_preserves_topic_order() {
        let payload = SubscriptionPayload {
            subs: vec![
                Sub {
                    topic: "/a".to_string(),
                },
                Sub {
                    topic: "/b/c".to_string(),
                },
            ],
        };
        let encoded = payload.encode().expect("encode");
        let decoded = SubscriptionPayload::decode(&encoded).expect("decode");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn empty_subscription_encodes_to_nothing() {
        let encoded = SubscriptionPayload::default().encode().expect("encode");
        assert!(encoded.is_empty());
        assert!(
            SubscriptionPayload::decode(&encoded)
                .expect("decode")
                .subs
                .is_empty()
        );
    }

    #[test]
    fn ping_round_trip_and_elapsed() {
        let payload = PingPayload::now();
        let encoded = payload.encode().expect("encode");
        let decoded = PingPayload::decode(&encoded).expect("decode");
        assert_eq!(decoded, payload);
        // The stamp is in the past, so elapsed never under-flows.
        assert!(decoded.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn error_round_trip() {
        let payload = ErrorPayload {
            error: "denied".to_string(),
        };
        let encoded = payload.encode().expect("encode");
        assert_eq!(ErrorPayload::decode(&encoded).expect("decode"), payload);
    }

    #[test]
    fn empty_error_payload_is_rejected() {
        assert!(ErrorPayload::decode(b"").is_err());
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, 1, "Publish", b"/t").expect("topic");
        // A field number this reader does not know about.
        put_fixed64(&mut buf, 7, 0xFEED);
        put_bytes(&mut buf, 2, "Publish", b"body").expect("payload");

        let decoded = PublishPayload::decode(&buf.freeze()).expect("decode");
        assert_eq!(decoded.topic, "/t");
        assert_eq!(decoded.payload, Bytes::from_static(b"body"));
    }

    #[test]
    fn non_utf8_topic_is_an_unmarshal_error() {
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, 1, "Publish", &[0xFF, 0xFE]).expect("bytes");
        let err = PublishPayload::decode(&buf.freeze()).expect_err("bad utf8");
        assert!(err.to_string().contains("not valid UTF-8"), "{err}");
    }
}
