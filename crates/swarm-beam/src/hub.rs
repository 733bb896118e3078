//! Hub — lets handlers join a running system at any time.
//!
//! Ordinary messages go to the underlying [`StackSender`]. A `register`
//! message (sent with [`Mode::RECEIVER`]) attaches a new handler on top of
//! the chain and hands it two endpoints:
//!
//! - a Receiver on which it gets every message sent to the hub from now on;
//! - a Sender on which it passes along whatever it does not consume. A
//!   relay task carries that traffic into the chain as it was before the
//!   handler registered.
//!
//! ```text
//! hub.send(m) ──► H3 ──pass──► H2 ──pass──► H1
//! ```

use std::any::Any;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::copy::copy_nested;
use crate::endpoint::{Endpoints, Sender};
use crate::error::{BeamError, BeamResult};
use crate::message::{Message, Mode, Verb};
use crate::pipe::pipe;
use crate::stack::StackSender;

/// Dynamic handler registration over a fallback chain.
#[derive(Default)]
pub struct Hub {
    stack: StackSender,
    relays: Arc<RelayTracker>,
}

/// Counts live pass-through relays. The tasks themselves are detached, so
/// waiting on them never owns or cancels them.
#[derive(Default)]
struct RelayTracker {
    active: AtomicUsize,
    /// Signalled when `active` drops to zero.
    idle: Notify,
}

/// Held by a relay task for its whole lifetime, including unwinding and
/// runtime shutdown.
struct RelayGuard(Arc<RelayTracker>);

impl RelayGuard {
    fn new(tracker: &Arc<RelayTracker>) -> Self {
        tracker.active.fetch_add(1, Ordering::SeqCst);
        Self(tracker.clone())
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend directly, without the register handshake.
    pub fn add(&self, backend: Arc<dyn Sender>) {
        self.stack.add(backend);
    }

    /// Number of backends currently in the chain.
    pub fn backends(&self) -> usize {
        self.stack.len()
    }

    /// Number of pass-through relays still running.
    pub fn relays(&self) -> usize {
        self.relays.active.load(Ordering::SeqCst)
    }

    /// Wait until every pass-through relay has drained.
    ///
    /// Any number of callers may wait at once, and dropping a pending wait
    /// leaves the relays running.
    pub async fn wait(&self) {
        loop {
            let mut idle = pin!(self.relays.idle.notified());
            idle.as_mut().enable();
            if self.relays() == 0 {
                return;
            }
            idle.await;
        }
    }

    fn register(&self, msg: &Message) -> Endpoints {
        let name = msg.args.first().map(String::as_str).unwrap_or("anonymous");
        let (inbound_tx, inbound_rx) = pipe();
        let (passthrough_tx, passthrough_rx) = pipe();

        let previous = self.stack.add(Arc::new(inbound_tx));
        info!(handler = name, fallbacks = previous.len(), "handler registered");

        let handler = name.to_string();
        let guard = RelayGuard::new(&self.relays);
        tokio::spawn(async move {
            let _guard = guard;
            match copy_nested(&previous, &passthrough_rx).await {
                Ok(copied) => debug!(%handler, copied, "pass-through relay finished"),
                Err(err) => warn!(%handler, error = %err, "pass-through relay aborted"),
            }
        });

        (Box::new(inbound_rx), Box::new(passthrough_tx))
    }
}

#[async_trait]
impl Sender for Hub {
    async fn send(&self, msg: Message, mode: Mode) -> BeamResult<Endpoints> {
        if msg.verb != Verb::Register {
            return self.stack.send(msg, mode).await;
        }
        if !mode.contains(Mode::RECEIVER) {
            return Err(BeamError::MalformedRegister(
                "register requires a reply receiver".to_string(),
            ));
        }
        Ok(self.register(&msg))
    }

    /// Closes every handler's inbound endpoint; their relays end once the
    /// handlers release their pass-through senders.
    fn close(&self) -> BeamResult<()> {
        self.stack.close()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::buffer::Buffer;
    use crate::endpoint::Receiver;

    const BLOCKED: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn register_without_reply_mode_is_rejected() {
        let hub = Hub::new();
        let err = hub
            .send(Message::new(Verb::Register), Mode::empty())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BeamError::MalformedRegister(_)));
        assert_eq!(hub.backends(), 0);
    }

    #[tokio::test]
    async fn ordinary_messages_reach_direct_backends() {
        let hub = Hub::new();
        let sink = Arc::new(Buffer::new());
        hub.add(sink.clone());
        hub.send(Message::new(Verb::Ls), Mode::empty()).await.unwrap();
        assert_eq!(sink.messages(), vec![Message::new(Verb::Ls)]);
    }

    #[tokio::test]
    async fn registered_handler_receives_and_passes_through() {
        let hub = Arc::new(Hub::new());
        let older = Arc::new(Buffer::new());
        hub.add(older.clone());

        let (inbound, passthrough) = hub
            .send(Message::new(Verb::Register).with_arg("filter"), Mode::RECEIVER)
            .await
            .unwrap();
        assert_eq!(hub.backends(), 2);

        let sending = {
            let hub = hub.clone();
            tokio::spawn(async move {
                hub.send(Message::new(Verb::Stop).with_arg("web"), Mode::empty())
                    .await
                    .map(|_| ())
            })
        };
        let (msg, _, _) = inbound.receive(Mode::empty()).await.unwrap();
        sending.await.unwrap().unwrap();
        assert_eq!(msg, Message::new(Verb::Stop).with_arg("web"));
        assert!(older.is_empty());

        passthrough.send(msg.clone(), Mode::empty()).await.unwrap();
        passthrough.close().unwrap();
        hub.wait().await;
        assert_eq!(older.messages(), vec![msg]);
    }

    #[tokio::test]
    async fn close_ends_registered_handlers() {
        let hub = Hub::new();
        let (inbound, passthrough) = hub
            .send(Message::new(Verb::Register), Mode::RECEIVER)
            .await
            .unwrap();
        hub.close().unwrap();
        assert!(inbound.receive(Mode::empty()).await.err().unwrap().is_end_of_stream());
        drop(passthrough);
        hub.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_leaves_relays_running() {
        let hub = Hub::new();
        let older = Arc::new(Buffer::new());
        hub.add(older.clone());
        let (_inbound, passthrough) = hub
            .send(Message::new(Verb::Register).with_arg("filter"), Mode::RECEIVER)
            .await
            .unwrap();

        assert!(tokio::time::timeout(BLOCKED, hub.wait()).await.is_err());
        assert_eq!(hub.relays(), 1);

        passthrough.send(Message::new(Verb::Ls), Mode::empty()).await.unwrap();
        passthrough.close().unwrap();
        hub.wait().await;
        assert_eq!(older.messages(), vec![Message::new(Verb::Ls)]);
        assert_eq!(hub.relays(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waits_block_until_relays_finish() {
        let hub = Arc::new(Hub::new());
        let (_inbound, passthrough) = hub
            .send(Message::new(Verb::Register), Mode::RECEIVER)
            .await
            .unwrap();

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move { hub.wait().await })
            })
            .collect();
        tokio::time::sleep(BLOCKED).await;
        assert!(waiters.iter().all(|w| !w.is_finished()));

        drop(passthrough);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(hub.relays(), 0);
    }

    #[tokio::test]
    async fn wait_without_registrations_returns() {
        let hub = Hub::new();
        assert_eq!(hub.relays(), 0);
        hub.wait().await;
    }
}
