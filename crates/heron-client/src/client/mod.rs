//! Client runtime: owns the TLS connection, the writer and reader worker
//! tasks, and the public Subscribe / Unsubscribe / Publish / Disconnect
//! surface.
//!
//! # Design notes
//! One connection, two workers. The writer task is the sole writer of the
//! TLS stream and also owns the ping timer; the reader task is the sole
//! reader and dispatches incoming messages by type. Callers hand outgoing
//! frames to the writer over a small send channel, and the client mutex
//! guards the connected flag, the handler registry, the callback table and
//! the message-id counter. The mutex is held across the send-channel
//! suspension point so the connected/closed transition can never race a
//! send against a closed channel.
mod reader;
mod writer;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use bytes::Bytes;
use heron_common::attrs::NO_ERROR_VALUE;
use heron_common::{CURRENT_PROTO_VSN, Namespace, Topic};
use heron_wire::{Message, MsgId, MsgType, PublishPayload, StartPayload, Sub, SubscriptionPayload};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{Instrument, Span, error, info, info_span};

use crate::callback::Callback;
use crate::config::{ConnInfo, SEND_QUEUE_DEPTH};
use crate::handler::{HandlerSet, TopicHandler};
use crate::identity;
use crate::{Error, Result};

/// A client connection to a publish/subscribe broker.
///
/// A client is created unconnected, connected exactly once with
/// [`Client::connect`], and torn down with [`Client::disconnect`]. A
/// disconnected client is terminal: every further call fails with
/// [`Error::NotConnected`] and a new client must be constructed to talk to
/// the broker again.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) info: ConnInfo,
    pub(crate) namespace: Namespace,
    pub(crate) client_id: String,
    // Seeded with the server address and namespace; both worker tasks and
    // the one-off client logs run inside it.
    pub(crate) span: Span,
    pub(crate) state: Mutex<ClientState>,
}

pub(crate) struct ClientState {
    started: bool,
    connected: bool,
    closed: bool,
    send_tx: Option<mpsc::Sender<Message>>,
    stop_tx: Option<mpsc::Sender<()>>,
    // Held so the close path can abort a reader still parked in a read;
    // shutting down the write half alone is only a local half-close.
    reader_task: Option<JoinHandle<()>>,
    pub(crate) handlers: HashMap<Topic, HandlerSet>,
    callbacks: HashMap<MsgId, Callback>,
    msg_id: MsgId,
}

impl ClientInner {
    pub(crate) async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

impl ClientState {
    fn next_msg_id(&mut self) -> MsgId {
        self.msg_id = self.msg_id.wrapping_add(1);
        self.msg_id
    }

    fn add_callback(&mut self, msg_id: MsgId, callback: Option<Callback>) {
        if let Some(callback) = callback
            && self.callbacks.insert(msg_id, callback).is_some()
        {
            // Ids only repeat after the counter wraps with a callback still
            // outstanding, which is a programming error somewhere.
            error!(pubsub.msg_id = msg_id, "message id reused with a pending callback");
        }
    }

    pub(crate) fn take_callback(&mut self, msg_id: MsgId) -> Option<Callback> {
        self.callbacks.remove(&msg_id)
    }

    // Marks the client as logically disconnected so the public API starts
    // failing; the writer's close path does the physical teardown.
    pub(crate) fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    // One-shot guard for the physical teardown.
    pub(crate) fn begin_close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.connected = false;
        self.send_tx = None;
        self.stop_tx = None;
        true
    }

    // The close path stops the reader itself once the stream is down.
    pub(crate) fn take_reader_task(&mut self) -> Option<JoinHandle<()>> {
        self.reader_task.take()
    }

    // Registers the handler for its topic, reporting whether this topic had
    // no handlers before (i.e. the broker needs a new subscription).
    fn add_handler(&mut self, th: &TopicHandler) -> Result<bool> {
        th.check()?;

        let set = self.handlers.entry(th.topic.clone()).or_default();
        let was_empty = set.count() == 0;
        set.add(th.handler.clone())?;
        Ok(was_empty)
    }
}

impl Client {
    /// Creates an unconnected client. All topics published, subscribed or
    /// unsubscribed through this client belong to `namespace`; cooperating
    /// programs must use the same namespace, as the broker only exchanges
    /// messages within one. `prog_name` goes into the client-id string the
    /// broker sees.
    pub fn new(namespace: impl Into<Namespace>, prog_name: &str, info: ConnInfo) -> Self {
        let namespace = namespace.into();
        let span = info_span!(
            "pubsub_client",
            pubsub.net_addr = %info.svr_address,
            pubsub.namespace = %namespace,
        );

        Self {
            inner: Arc::new(ClientInner {
                info,
                client_id: identity::client_id(prog_name),
                namespace,
                span,
                state: Mutex::new(ClientState {
                    started: false,
                    connected: false,
                    closed: false,
                    send_tx: None,
                    stop_tx: None,
                    reader_task: None,
                    handlers: HashMap::new(),
                    callbacks: HashMap::new(),
                    msg_id: 0,
                }),
            }),
        }
    }

    /// Connects to the broker: TLS 1.3 with the client certificate and CA
    /// pool from the certificate port, then the `Start` handshake. Any
    /// failure tears the half-open connection down and is returned as a
    /// single wrapped error; the client is then terminal.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            if state.started {
                return Err(Error::AlreadyConnected);
            }
            state.started = true;
        }

        let result = self.connect_inner().await;
        self.inner.span.in_scope(|| match &result {
            Ok(()) => info!(no_error = NO_ERROR_VALUE, "connected"),
            Err(err) => error!(error = %err, "connect failed"),
        });
        result
    }

    async fn connect_inner(&self) -> Result<()> {
        let inner = &self.inner;
        inner.span.in_scope(|| info!("connecting"));

        // Certificate material comes from the external certificate port;
        // the core never reads PEM files itself.
        let (cert_chain, key) = inner.info.certs.client_key_pair()?;
        let ca_pool = inner.info.certs.ca_pool()?;

        let tls_config =
            rustls::ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
                .with_root_certificates(ca_pool)
                .with_client_auth_cert(cert_chain, key)
                .map_err(Error::TlsSetup)?;
        let server_name = inner.info.tls_server_name()?;
        let connector = TlsConnector::from(Arc::new(tls_config));

        let addr = inner.info.svr_address.clone();
        let dialled = timeout(inner.info.conn_timeout, async {
            let tcp = TcpStream::connect(&addr).await?;
            connector.connect(server_name, tcp).await
        })
        .await;
        let stream = match dialled {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(Error::Dial { addr, source }),
            Err(_) => {
                return Err(Error::Dial {
                    addr,
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connect timed out",
                    ),
                });
            }
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let reader_task = tokio::spawn(
            reader::run_reader(read_half, Arc::clone(inner), stop_tx.clone())
                .instrument(inner.span.clone()),
        );

        {
            let mut state = inner.state.lock().await;
            state.connected = true;
            state.send_tx = Some(send_tx);
            state.stop_tx = Some(stop_tx);
            state.reader_task = Some(reader_task);
        }

        tokio::spawn(
            writer::run_writer(write_half, send_rx, stop_rx, Arc::clone(inner))
                .instrument(inner.span.clone()),
        );

        match self.start_handshake().await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Tear the half-open connection down before reporting.
                self.shut_down().await;
                Err(Error::Startup(Box::new(err)))
            }
        }
    }

    // Sends the Start message (always message id 1) and waits for the
    // broker's Ack or Error, bounded by the start timeout. The reader task
    // is already running and routes the answer to the callback registered
    // here.
    async fn start_handshake(&self) -> Result<()> {
        let inner = &self.inner;
        inner.span.in_scope(|| {
            info!(pubsub.proto_vsn = CURRENT_PROTO_VSN, "sending the start message");
        });

        let payload = StartPayload {
            protocol_version: CURRENT_PROTO_VSN,
            client_id: inner.client_id.clone(),
            namespace: inner.namespace.as_str().to_string(),
        }
        .encode()?;

        let (ack_tx, ack_rx) = oneshot::channel();
        let msg_id = {
            let mut state = inner.state.lock().await;
            send_with_callback(
                &mut state,
                MsgType::Start,
                payload,
                Some(Box::new(move |result| {
                    let _ = ack_tx.send(result);
                })),
            )
            .await?
        };

        match timeout(inner.info.start_timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            // The callback was dropped un-invoked: the connection died.
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => {
                inner.state.lock().await.take_callback(msg_id);
                Err(Error::StartTimedOut)
            }
        }
    }

    /// Subscribes each handler to its topic. A wire-level Subscribe is sent
    /// only for topics that had no handler before; adding further handlers
    /// to an already-subscribed topic is purely local, in which case the
    /// callback is not registered either (the subscription is already in
    /// effect). The optional callback fires when the broker answers the
    /// Subscribe message.
    pub async fn subscribe(
        &self,
        callback: Option<Callback>,
        handlers: impl IntoIterator<Item = TopicHandler>,
    ) -> Result<()> {
        let handlers: Vec<TopicHandler> = handlers.into_iter().collect();
        if handlers.is_empty() {
            return Ok(());
        }

        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        if !state.connected {
            return Err(Error::NotConnected);
        }

        let mut new_subs = Vec::new();
        for (index, th) in handlers.iter().enumerate() {
            match state.add_handler(th) {
                Ok(true) => new_subs.push(Sub {
                    topic: th.topic.as_str().to_string(),
                }),
                Ok(false) => {}
                Err(err) => {
                    return Err(Error::AddHandler {
                        topic: th.topic.as_str().to_string(),
                        index,
                        source: Box::new(err),
                    });
                }
            }
        }

        if new_subs.is_empty() {
            // Every topic already had a subscription at the broker.
            return Ok(());
        }

        let payload = self.encode_subs(new_subs, "Subscribe")?;
        send_with_callback(&mut state, MsgType::Subscribe, payload, callback).await?;
        Ok(())
    }

    /// Removes each handler from its topic. Topics whose last handler goes
    /// are dropped locally and collected into one wire-level Unsubscribe;
    /// if no topic empties, nothing is sent. The whole batch is validated
    /// before anything is mutated, so a bad entry leaves every
    /// registration in place.
    pub async fn unsubscribe(
        &self,
        callback: Option<Callback>,
        handlers: impl IntoIterator<Item = TopicHandler>,
    ) -> Result<()> {
        let handlers: Vec<TopicHandler> = handlers.into_iter().collect();
        if handlers.is_empty() {
            return Ok(());
        }

        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        if !state.connected {
            return Err(Error::NotConnected);
        }

        // Validation pass against scratch copies of the affected sets; this
        // also catches a duplicate entry within the batch.
        let mut scratch: HashMap<Topic, HandlerSet> = HashMap::new();
        for (index, th) in handlers.iter().enumerate() {
            let set = match scratch.entry(th.topic.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let Some(set) = state.handlers.get(&th.topic) else {
                        return Err(Error::NoSubscription {
                            topic: th.topic.as_str().to_string(),
                            index,
                        });
                    };
                    entry.insert(set.clone())
                }
            };
            if let Err(err) = set.remove(&th.handler) {
                return Err(Error::RemoveHandler {
                    topic: th.topic.as_str().to_string(),
                    index,
                    source: Box::new(err),
                });
            }
        }

        // Commit pass: the same removals against the real sets.
        let mut unsubs = Vec::new();
        for th in &handlers {
            let Some(set) = state.handlers.get_mut(&th.topic) else {
                continue;
            };
            set.remove(&th.handler)?;
            if set.count() == 0 {
                state.handlers.remove(&th.topic);
                unsubs.push(Sub {
                    topic: th.topic.as_str().to_string(),
                });
            }
        }

        if unsubs.is_empty() {
            // Some handler remains on every touched topic, so the broker
            // subscriptions all stay.
            return Ok(());
        }

        let payload = self.encode_subs(unsubs, "Unsubscribe")?;
        send_with_callback(&mut state, MsgType::Unsubscribe, payload, callback).await?;
        Ok(())
    }

    /// Publishes `payload` on `topic`. The optional callback fires when the
    /// broker acknowledges (or rejects) the publication.
    pub async fn publish(
        &self,
        callback: Option<Callback>,
        topic: impl Into<Topic>,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let topic = topic.into();
        topic.check()?;

        // Marshal before taking the lock to keep the critical section short.
        let msg_payload = PublishPayload {
            topic: topic.as_str().to_string(),
            payload: payload.into(),
        }
        .encode()
        .inspect_err(|err| {
            self.inner
                .span
                .in_scope(|| error!(error = %err, "could not marshal the Publish message"));
        })?;

        let mut state = self.inner.state.lock().await;
        if !state.connected {
            return Err(Error::NotConnected);
        }

        send_with_callback(&mut state, MsgType::Publish, msg_payload, callback).await?;
        Ok(())
    }

    /// Disconnects from the broker by signalling the writer task, which
    /// runs the shutdown path. It is not possible to reconnect; create a
    /// new client instead.
    pub async fn disconnect(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if !state.connected {
            return Err(Error::NotConnected);
        }

        // Fail the public API immediately; the writer does the teardown.
        state.mark_disconnected();
        let Some(stop_tx) = state.stop_tx.clone() else {
            return Err(Error::NotConnected);
        };
        let _ = stop_tx.send(()).await;
        Ok(())
    }

    // Best-effort teardown used when connect fails after the workers have
    // already started.
    async fn shut_down(&self) {
        let stop_tx = {
            let mut state = self.inner.state.lock().await;
            state.mark_disconnected();
            state.stop_tx.clone()
        };
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.try_send(());
        }
    }

    fn encode_subs(&self, subs: Vec<Sub>, what: &'static str) -> Result<Bytes> {
        SubscriptionPayload { subs }.encode().inspect_err(|err| {
            self.inner.span.in_scope(
                || error!(error = %err, "could not marshal the {what} message"),
            );
        })
        .map_err(Error::from)
    }
}

// Allocates a message id, registers the optional callback under it, and
// hands the frame to the writer. Must be called with the state lock held;
// the suspension on a full send channel is deliberate (see the concurrency
// notes at the top of this module).
async fn send_with_callback(
    state: &mut ClientState,
    mt: MsgType,
    payload: Bytes,
    callback: Option<Callback>,
) -> Result<MsgId> {
    let msg_id = state.next_msg_id();
    state.add_callback(msg_id, callback);
    if let Err(err) = send_locked(state, Message::new(mt, msg_id, payload)).await {
        state.take_callback(msg_id);
        return Err(err);
    }
    Ok(msg_id)
}

async fn send_locked(state: &mut ClientState, msg: Message) -> Result<()> {
    let Some(send_tx) = state.send_tx.clone() else {
        return Err(Error::NotConnected);
    };
    // The writer dropped its receiver: the connection is gone.
    send_tx.send(msg).await.map_err(|_| Error::NotConnected)
}
