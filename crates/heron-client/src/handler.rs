// Per-topic delivery handlers and the ordered set that holds them.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use heron_common::Topic;

use crate::{Error, Result};

/// A function called with `(topic, payload)` for every publication
/// delivered on a subscribed topic.
///
/// Handlers run synchronously on the connection's reading task, so they are
/// advised to hand real work off to another task as soon as feasible.
///
/// A `MsgHandler` has a stable identity: clones of the same handler compare
/// as the same registration, which is what subscribe/unsubscribe use to
/// pair additions with removals.
#[derive(Clone)]
pub struct MsgHandler {
    func: Arc<dyn Fn(&Topic, &[u8]) + Send + Sync + 'static>,
}

// Identity of a handler: the address of the shared function value.
pub(crate) type HandlerId = usize;

impl MsgHandler {
    pub fn new(func: impl Fn(&Topic, &[u8]) + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
        }
    }

    pub(crate) fn id(&self) -> HandlerId {
        Arc::as_ptr(&self.func) as *const () as usize
    }

    pub(crate) fn call(&self, topic: &Topic, payload: &[u8]) {
        (self.func)(topic, payload)
    }
}

impl fmt::Debug for MsgHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgHandler(0x{:x})", self.id())
    }
}

/// An association between a topic and a handler for the messages received
/// on it.
#[derive(Debug, Clone)]
pub struct TopicHandler {
    pub topic: Topic,
    pub handler: MsgHandler,
}

impl TopicHandler {
    pub fn new(topic: impl Into<Topic>, handler: MsgHandler) -> Self {
        Self {
            topic: topic.into(),
            handler,
        }
    }

    // A TopicHandler is usable only if its topic passes the topic checks.
    pub(crate) fn check(&self) -> Result<()> {
        self.topic.check()?;
        Ok(())
    }
}

/// The collection of handlers registered for one topic.
///
/// Handlers are kept in subscription order with stable slot indices:
/// removing a handler nils its slot rather than renumbering, so the
/// delivery path never has to translate identities to positions. Trailing
/// nil slots are trimmed straight away; interior nils stay until the
/// handlers after them go too.
#[derive(Default, Clone)]
pub(crate) struct HandlerSet {
    in_order: Vec<Option<MsgHandler>>,
    index: HashMap<HandlerId, usize>,
}

impl HandlerSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends the handler, failing if this identity is already present.
    pub(crate) fn add(&mut self, handler: MsgHandler) -> Result<()> {
        let id = handler.id();
        if self.index.contains_key(&id) {
            return Err(Error::HandlerAlreadyAdded);
        }

        self.index.insert(id, self.in_order.len());
        self.in_order.push(Some(handler));
        Ok(())
    }

    /// Nils the handler's slot and forgets its identity, failing if the
    /// identity is not present.
    pub(crate) fn remove(&mut self, handler: &MsgHandler) -> Result<()> {
        let Some(slot) = self.index.remove(&handler.id()) else {
            return Err(Error::HandlerNotInSet);
        };

        self.in_order[slot] = None;
        self.trim_trailing_nils();
        Ok(())
    }

    pub(crate) fn contains(&self, handler: &MsgHandler) -> bool {
        self.index.contains_key(&handler.id())
    }

    /// Number of live handlers (not slots).
    pub(crate) fn count(&self) -> usize {
        self.index.len()
    }

    /// Visits every live handler in subscription order.
    pub(crate) fn iter_in_order(&self) -> impl Iterator<Item = &MsgHandler> {
        self.in_order.iter().filter_map(Option::as_ref)
    }

    // Interior nils cannot be removed without re-indexing every handler
    // after them, but trailing nils can go as soon as they appear.
    fn trim_trailing_nils(&mut self) {
        while self.in_order.last().is_some_and(Option::is_none) {
            self.in_order.pop();
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.in_order.len()
    }
}
