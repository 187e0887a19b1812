// Reader task: sole reader of the TLS stream. It blocks in a read loop and
// dispatches each message by type: callbacks for Ack/Error, handler
// delivery for Publish, round-trip accounting for Ping echoes.
use std::sync::Arc;

use heron_common::Topic;
use heron_wire::{
    ErrorPayload, Message, MsgId, MsgType, PingPayload, PublishPayload, read_message,
};
use tokio::io::ReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tracing::{debug, error, info};

use super::ClientInner;
use crate::{Error, Result};

pub(crate) type TlsReadHalf = ReadHalf<TlsStream<TcpStream>>;

pub(crate) async fn run_reader(
    mut conn: TlsReadHalf,
    inner: Arc<ClientInner>,
    stop_tx: mpsc::Sender<()>,
) {
    info!("connection reading started");

    loop {
        let msg = match read_message(&mut conn).await {
            Ok(Some(msg)) => msg,
            // Clean end of stream; also the normal exit after our own
            // writer shut the connection down.
            Ok(None) => break,
            Err(err) => {
                if inner.is_closed().await {
                    debug!(error = %err, "read after close");
                } else {
                    error!(error = %err, "read failure on the connection");
                }
                break;
            }
        };

        info!(pubsub.msg_type = %msg.mt.attr(), "received");

        if let Err(err) = handle_message(&inner, msg).await {
            error!(error = %err, "message handling error");
            break;
        }
    }

    // A reader-side exit must also drive the connection to closed; the
    // nudge is harmless if the writer got there first.
    let _ = stop_tx.try_send(());
    info!("connection reading finished");
}

// An Err return terminates the connection: unreadable payloads and
// unexpected message types are protocol violations.
async fn handle_message(inner: &Arc<ClientInner>, msg: Message) -> Result<()> {
    match msg.mt {
        MsgType::Ack => {
            invoke_callback(inner, msg.msg_id, Ok(())).await;
            Ok(())
        }
        MsgType::Error => handle_error(inner, msg).await,
        MsgType::Publish => handle_publish(inner, msg).await,
        MsgType::Ping => handle_ping(inner, &msg),
        other => Err(Error::Protocol(other)),
    }
}

async fn handle_error(inner: &Arc<ClientInner>, msg: Message) -> Result<()> {
    let decoded = ErrorPayload::decode(&msg.payload)?;
    let err = Error::Server(decoded.error);
    error!(pubsub.msg_id = msg.msg_id, error = %err, "a server error was received");
    invoke_callback(inner, msg.msg_id, Err(err)).await;

    // The error is the caller's problem, not the connection's: the broker
    // rejected one message and the session carries on.
    Ok(())
}

async fn handle_publish(inner: &Arc<ClientInner>, msg: Message) -> Result<()> {
    let decoded = PublishPayload::decode(&msg.payload)?;
    let topic = Topic::new(decoded.topic);

    let state = inner.state.lock().await;
    if let Some(set) = state.handlers.get(&topic) {
        // Handlers run here, on the reading task, in subscription order.
        for handler in set.iter_in_order() {
            handler.call(&topic, &decoded.payload);
        }
    }
    // A publication with no registered handler is silently dropped.
    Ok(())
}

fn handle_ping(inner: &Arc<ClientInner>, msg: &Message) -> Result<()> {
    let Some(observer) = inner.info.ping_observer.clone() else {
        error!("unexpected ping message received");
        return Ok(());
    };

    let decoded = PingPayload::decode(&msg.payload)?;
    let rtt = decoded.elapsed();
    tokio::spawn(async move { observer(rtt) });
    Ok(())
}

async fn invoke_callback(
    inner: &Arc<ClientInner>,
    msg_id: MsgId,
    result: std::result::Result<(), Error>,
) {
    let callback = { inner.state.lock().await.take_callback(msg_id) };
    if let Some(callback) = callback {
        // Callbacks get their own task so user code can never stall reads,
        // which also means they carry no ordering guarantee.
        tokio::spawn(async move { callback(result) });
    }
}
