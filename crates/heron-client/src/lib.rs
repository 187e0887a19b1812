//! Client library for the heron TLS publish/subscribe protocol.
//!
//! A [`Client`] connects to a broker over mutually-authenticated TLS 1.3,
//! identifies itself inside a namespace, and then publishes payloads on
//! topics, subscribes handler functions to topics, and receives
//! publications from peers in the same namespace. Every server-acknowledged
//! operation takes an optional completion [`Callback`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use heron_client::{Client, ConnInfo, MsgHandler, PemCertFiles, TopicHandler};
//!
//! # async fn run() -> heron_client::Result<()> {
//! let certs = Arc::new(PemCertFiles {
//!     ca_cert_file: "ca.pem".into(),
//!     cert_file: "client.pem".into(),
//!     key_file: "client.key".into(),
//! });
//! let client = Client::new("weather", "forecaster", ConnInfo::new("broker:4040", certs));
//! client.connect().await?;
//!
//! let handler = MsgHandler::new(|topic, payload| {
//!     println!("{topic}: {} bytes", payload.len());
//! });
//! client
//!     .subscribe(None, [TopicHandler::new("/reports/uk", handler)])
//!     .await?;
//! client.publish(None, "/reports/uk", &b"raining"[..]).await?;
//! # Ok(())
//! # }
//! ```
mod callback;
mod certs;
mod client;
mod config;
mod error;
mod handler;
mod identity;

pub use callback::{Callback, notify_on_ack};
pub use certs::{CertSource, PemCertFiles};
pub use client::Client;
pub use config::{ConnInfo, PingObserver};
pub use error::{Error, Result};
pub use handler::{MsgHandler, TopicHandler};
pub use identity::client_id;

// The shared protocol types callers need to talk to this API.
pub use heron_common::{Namespace, Topic};
