//! Stable tracing field keys used when reporting to the logging port.
//!
//! Operator tooling greps structured logs by these keys, so they are part of
//! the observable surface and must not be renamed casually. Call sites spell
//! the keys out as dotted tracing fields (`pubsub.topic = %topic`); the
//! constants here document them and pin them in tests.

/// Prefix applied to every pub/sub-related field key.
pub const ATTR_PREFIX: &str = "pubsub.";

/// Network address of the broker the client talks to.
pub const ATTR_NET_ADDR: &str = "pubsub.net_addr";
/// Namespace the client registered at construction.
pub const ATTR_NAMESPACE: &str = "pubsub.namespace";
/// Topic of a publication or (un)subscription.
pub const ATTR_TOPIC: &str = "pubsub.topic";
/// Message type, rendered as `"N(Name)"`.
pub const ATTR_MSG_TYPE: &str = "pubsub.msg_type";
/// Protocol version carried in the Start message.
pub const ATTR_PROTO_VSN: &str = "pubsub.proto_vsn";
/// Message id a log line refers to.
pub const ATTR_MSG_ID: &str = "pubsub.msg_id";
/// Name of a PEM file the certificate utility failed to use.
pub const ATTR_PEM_FILE: &str = "pubsub.pem_file";

/// Key used when an operation completed with an error.
pub const ATTR_ERROR: &str = "error";
/// Key used when an operation completed without an error; the value is
/// always [`NO_ERROR_VALUE`].
pub const ATTR_NO_ERROR: &str = "no_error";
/// Placeholder value logged under [`ATTR_NO_ERROR`].
pub const NO_ERROR_VALUE: &str = "-";
