//! StackSender — one logical Sender over a fallback chain of backends.
//!
//! Backends are tried most-recently-added first. A backend whose send
//! fails is removed for good and the message is offered to the next one.
//! When no backend accepts it the message is dropped and the send still
//! succeeds: delivery through a stack is best-effort.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::endpoint::{Endpoints, Sender};
use crate::error::BeamResult;
use crate::message::{Message, Mode};
use crate::nop::{NopReceiver, NopSender};

/// Ordered, self-pruning fallback chain.
#[derive(Default)]
pub struct StackSender {
    /// Front is the most recently added backend.
    stack: RwLock<VecDeque<Arc<dyn Sender>>>,
}

impl StackSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `backend` to the front of the order.
    ///
    /// Returns a snapshot of the order as it was just before the push, so
    /// the new backend can fall back to everything registered earlier.
    pub fn add(&self, backend: Arc<dyn Sender>) -> StackSender {
        let mut stack = self.stack.write().expect("stack lock");
        let previous = stack.clone();
        stack.push_front(backend);
        debug!(backends = stack.len(), "backend added");
        StackSender {
            stack: RwLock::new(previous),
        }
    }

    /// Independent copy of the current order.
    pub fn snapshot(&self) -> StackSender {
        StackSender {
            stack: RwLock::new(self.stack.read().expect("stack lock").clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.stack.read().expect("stack lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, backend: &Arc<dyn Sender>) {
        let mut stack = self.stack.write().expect("stack lock");
        stack.retain(|b| !Arc::ptr_eq(b, backend));
        debug!(backends = stack.len(), "failed backend removed");
    }
}

#[async_trait]
impl Sender for StackSender {
    async fn send(&self, msg: Message, mode: Mode) -> BeamResult<Endpoints> {
        // Deliver outside the lock so a slow backend never holds up `add`.
        let backends: Vec<Arc<dyn Sender>> =
            self.stack.read().expect("stack lock").iter().cloned().collect();

        for backend in backends {
            match backend.send(msg.clone(), mode).await {
                Ok(endpoints) => return Ok(endpoints),
                Err(err) => {
                    debug!(verb = %msg.verb, error = %err, "backend rejected message");
                    self.remove(&backend);
                }
            }
        }

        debug!(verb = %msg.verb, "no backend accepted message, dropping");
        Ok((Box::new(NopReceiver), Box::new(NopSender)))
    }

    /// Closes every backend and empties the chain.
    fn close(&self) -> BeamResult<()> {
        let backends: Vec<Arc<dyn Sender>> =
            self.stack.write().expect("stack lock").drain(..).collect();
        for backend in backends {
            backend.close()?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
