use std::path::PathBuf;

use heron_wire::MsgType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("the client is not connected to the server")]
    NotConnected,
    #[error("the client has already been connected; create a new client to reconnect")]
    AlreadyConnected,
    #[error("the client startup timed out")]
    StartTimedOut,
    #[error("client startup failed: {0}")]
    Startup(#[source] Box<Error>),
    #[error("could not build the TLS configuration: {0}")]
    TlsSetup(#[source] rustls::Error),
    #[error("bad server name {name:?} for TLS verification")]
    BadServerName { name: String },
    #[error("couldn't connect to the pub/sub server ({addr:?}): {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("the handler has already been added")]
    HandlerAlreadyAdded,
    #[error("the handler is not in the handler set")]
    HandlerNotInSet,
    #[error("there is no existing subscription for topic {topic:?} ({index})")]
    NoSubscription { topic: String, index: usize },
    #[error("cannot add the handler for topic {topic:?} ({index}): {source}")]
    AddHandler {
        topic: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },
    #[error("cannot remove the handler for topic {topic:?} ({index}): {source}")]
    RemoveHandler {
        topic: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },
    #[error("server error: {0}")]
    Server(String),
    #[error("protocol error: unexpected {} message", .0.attr())]
    Protocol(MsgType),
    #[error("could not load the client config {path:?}: {reason}")]
    Config { path: String, reason: String },
    #[error("couldn't read the {what} PEM file {path:?}: {source}")]
    CertRead {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {what} PEM file {path:?}: {reason}")]
    CertParse {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error(transparent)]
    Topic(#[from] heron_common::Error),
    #[error(transparent)]
    Wire(#[from] heron_wire::Error),
}
