// Completion notifiers for server-acknowledged messages.
use tokio::sync::mpsc;

use crate::Error;

/// A single-shot notifier invoked when the broker answers the message it
/// was registered against: `Ok(())` for an `Ack`, the server error for an
/// `Error`. Callbacks always run on a fresh task, so there is no ordering
/// guarantee between them.
pub type Callback = Box<dyn FnOnce(std::result::Result<(), Error>) + Send + 'static>;

/// Builds a [`Callback`] that forwards `value` on the channel when the
/// message is acknowledged; a server error is swallowed. The caller is
/// responsible for keeping a receiver alive.
pub fn notify_on_ack<T: Send + 'static>(tx: mpsc::UnboundedSender<T>, value: T) -> Callback {
    Box::new(move |result| {
        if result.is_ok() {
            let _ = tx.send(value);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_on_ack_forwards_only_on_success() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        notify_on_ack(tx.clone(), "acked")(Ok(()));
        assert_eq!(rx.try_recv().expect("value"), "acked");

        notify_on_ack(tx, "errored")(Err(Error::Server("denied".to_string())));
        assert!(rx.try_recv().is_err());
    }
}
