// Writer task: sole writer of the TLS stream. It serialises outgoing
// frames in send-channel order, owns the ping timer, and runs the one and
// only shutdown path for the connection.
use std::sync::Arc;

use heron_wire::{Message, MsgType, PingPayload, write_message};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_rustls::client::TlsStream;
use tracing::{error, info};

use super::ClientInner;

pub(crate) type TlsWriteHalf = WriteHalf<TlsStream<TcpStream>>;

pub(crate) async fn run_writer(
    mut conn: TlsWriteHalf,
    mut send_rx: mpsc::Receiver<Message>,
    mut stop_rx: mpsc::Receiver<()>,
    inner: Arc<ClientInner>,
) {
    info!("connection running");

    let mut ping = ping_timer(&inner);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!("disconnecting");
                break;
            }
            msg = send_rx.recv() => {
                // A closed send channel means every sender is gone.
                let Some(msg) = msg else { break };
                if let Err(err) = write_message(&mut conn, &msg).await {
                    error!(
                        pubsub.msg_type = %msg.mt.attr(),
                        error = %err,
                        "couldn't write the message to the pub/sub server",
                    );
                    break;
                }
            }
            _ = tick(&mut ping) => {
                if let Err(err) = write_ping(&mut conn).await {
                    error!(error = %err, "couldn't ping the pub/sub server");
                    break;
                }
            }
        }
    }

    close(conn, send_rx, stop_rx, inner).await;
}

// Pings run only when the client was configured with an observer and a
// positive interval; the first ping goes out one full interval after
// connect, not immediately.
fn ping_timer(inner: &ClientInner) -> Option<Interval> {
    if !inner.info.is_pingable() {
        return None;
    }

    let period = inner.info.ping_interval;
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn write_ping(conn: &mut TlsWriteHalf) -> heron_wire::Result<()> {
    let payload = PingPayload::now().encode()?;
    // Pings are fire-and-forget: no message id, no callback, no Ack.
    write_message(conn, &Message::new(MsgType::Ping, 0, payload)).await
}

async fn close(
    mut conn: TlsWriteHalf,
    send_rx: mpsc::Receiver<Message>,
    stop_rx: mpsc::Receiver<()>,
    inner: Arc<ClientInner>,
) {
    // Drop the channel receivers before taking the state lock: a caller
    // can be suspended on a full send channel while holding that lock, and
    // its send can only fail out once the receivers are gone.
    drop(send_rx);
    drop(stop_rx);

    let reader_task = {
        let mut state = inner.state.lock().await;
        if !state.begin_close() {
            error!("cannot close connection: already closed");
            return;
        }
        // Outstanding callbacks are deliberately not drained here; doing
        // so could block the teardown behind user code.
        state.take_reader_task()
    };

    info!("closing the pub/sub server connection");
    if let Err(err) = conn.shutdown().await {
        error!(error = %err, "problem closing the pub/sub server connection");
    } else {
        info!("pub/sub server connection closed");
    }

    // Shutting down the write half is only a local half-close; a reader
    // still parked in a read would otherwise wait on the broker forever.
    if let Some(reader_task) = reader_task {
        reader_task.abort();
    }
}
