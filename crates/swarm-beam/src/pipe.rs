//! Pipe — single-slot rendezvous between one sender and one receiver.
//!
//! A send publishes an envelope into the slot and waits until the receiver
//! drains it. Concurrent senders (and receivers) on the same pipe are
//! serialized by a writer (reader) lock, so messages arrive in the order
//! their sends were issued.
//!
//! Either side may close. Closing the reader fails pending and future
//! sends with [`BeamError::ReaderClosed`] (or the supplied reason);
//! closing the writer ends the stream for the receiver with
//! [`BeamError::EndOfStream`] (or the supplied reason). Dropping an
//! endpoint closes its side.

use std::any::Any;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::trace;

use crate::endpoint::{Delivery, Endpoints, Receiver, Sender};
use crate::error::{BeamError, BeamResult, RelayError, RelayResult};
use crate::message::{Message, Mode};
use crate::nop::{NopReceiver, NopSender};

/// Create a connected sender/receiver pair.
pub fn pipe() -> (PipeSender, PipeReceiver) {
    let pipe = Arc::new(Pipe::new());
    (
        PipeSender { pipe: pipe.clone() },
        PipeReceiver { pipe },
    )
}

/// What actually travels through the slot: the message plus any
/// continuation endpoints the sender embedded.
pub(crate) struct Envelope {
    msg: Message,
    /// Reply path, embedded when the sender asked for a Receiver back.
    sender: Option<PipeSender>,
    /// Forward stream, embedded when the sender asked for a Sender back.
    receiver: Option<PipeReceiver>,
}

#[derive(Default)]
struct PipeState {
    slot: Option<Envelope>,
    reader_err: Option<BeamError>,
    writer_err: Option<BeamError>,
}

pub(crate) struct Pipe {
    state: Mutex<PipeState>,
    writer_lock: tokio::sync::Mutex<()>,
    reader_lock: tokio::sync::Mutex<()>,
    /// Signalled when the slot fills or the pipe closes.
    readable: Notify,
    /// Signalled when the slot drains or the pipe closes.
    writable: Notify,
}

impl Pipe {
    fn new() -> Self {
        Self {
            state: Mutex::new(PipeState::default()),
            writer_lock: tokio::sync::Mutex::new(()),
            reader_lock: tokio::sync::Mutex::new(()),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().expect("pipe state lock")
    }

    async fn send_envelope(&self, envelope: Envelope) -> BeamResult<()> {
        let _writer = self.writer_lock.lock().await;
        // Declared after the writer guard so it runs first on drop: a send
        // that fails or is cancelled never leaves its envelope behind.
        let _unpublish = Unpublish { pipe: self };

        {
            let mut state = self.lock_state();
            if state.writer_err.is_some() {
                return Err(BeamError::ClosedPipe);
            }
            if let Some(err) = &state.reader_err {
                return Err(err.clone());
            }
            state.slot = Some(envelope);
        }
        self.readable.notify_waiters();

        loop {
            let mut drained = pin!(self.writable.notified());
            drained.as_mut().enable();
            {
                let state = self.lock_state();
                if state.slot.is_none() {
                    return Ok(());
                }
                if state.writer_err.is_some() {
                    return Err(BeamError::ClosedPipe);
                }
                if let Some(err) = &state.reader_err {
                    return Err(err.clone());
                }
            }
            drained.await;
        }
    }

    async fn receive_envelope(&self) -> BeamResult<Envelope> {
        let _reader = self.reader_lock.lock().await;
        loop {
            let mut published = pin!(self.readable.notified());
            published.as_mut().enable();
            {
                let mut state = self.lock_state();
                if state.reader_err.is_some() {
                    return Err(BeamError::ClosedPipe);
                }
                if let Some(envelope) = state.slot.take() {
                    drop(state);
                    self.writable.notify_waiters();
                    return Ok(envelope);
                }
                if let Some(err) = &state.writer_err {
                    return Err(err.clone());
                }
            }
            published.await;
        }
    }

    /// The first close wins; later closes keep the original reason.
    fn close_reader(&self, err: BeamError) {
        {
            let mut state = self.lock_state();
            if state.reader_err.is_some() {
                return;
            }
            trace!(reason = %err, "pipe reader closed");
            state.reader_err = Some(err);
        }
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    fn close_writer(&self, err: BeamError) {
        {
            let mut state = self.lock_state();
            if state.writer_err.is_some() {
                return;
            }
            trace!(reason = %err, "pipe writer closed");
            state.writer_err = Some(err);
        }
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }
}

struct Unpublish<'a> {
    pipe: &'a Pipe,
}

impl Drop for Unpublish<'_> {
    fn drop(&mut self) {
        let stale = self.pipe.lock_state().slot.take();
        // Dropping the envelope closes whatever endpoints it carried.
        drop(stale);
    }
}

/// Move envelopes from one pipe to another until the source ends.
///
/// Embedded endpoints travel along untouched, so nested continuations
/// survive a pipe-to-pipe relay.
async fn pump(from: &Pipe, to: &Pipe) -> RelayResult {
    let mut copied = 0;
    loop {
        let envelope = match from.receive_envelope().await {
            Ok(envelope) => envelope,
            Err(err) if err.is_end_of_stream() => return Ok(copied),
            Err(err) => return Err(RelayError::new(copied, err)),
        };
        to.send_envelope(envelope)
            .await
            .map_err(|err| RelayError::new(copied, err))?;
        copied += 1;
    }
}

/// Sending half of a [`pipe`].
pub struct PipeSender {
    pipe: Arc<Pipe>,
}

impl PipeSender {
    /// Close with a specific reason reported to the receiver.
    pub fn close_with_error(&self, err: BeamError) {
        self.pipe.close_writer(err);
    }
}

#[async_trait]
impl Sender for PipeSender {
    async fn send(&self, msg: Message, mode: Mode) -> BeamResult<Endpoints> {
        let mut envelope = Envelope {
            msg,
            sender: None,
            receiver: None,
        };
        let mut reply: Box<dyn Receiver> = Box::new(NopReceiver);
        let mut stream: Box<dyn Sender> = Box::new(NopSender);

        if mode.contains(Mode::RECEIVER) {
            let (tx, rx) = pipe();
            envelope.sender = Some(tx);
            reply = Box::new(rx);
        }
        if mode.contains(Mode::SENDER) {
            let (tx, rx) = pipe();
            envelope.receiver = Some(rx);
            stream = Box::new(tx);
        }

        // On failure our halves drop here, closing the embedded pipes too.
        self.pipe.send_envelope(envelope).await?;
        Ok((reply, stream))
    }

    async fn send_from(&self, src: &dyn Receiver) -> RelayResult {
        match src.as_any().downcast_ref::<PipeReceiver>() {
            Some(source) => pump(&source.pipe, &self.pipe).await,
            None => Err(RelayError::new(0, BeamError::IncompatibleReceiver)),
        }
    }

    fn close(&self) -> BeamResult<()> {
        self.pipe.close_writer(BeamError::EndOfStream);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for PipeSender {
    fn drop(&mut self) {
        self.pipe.close_writer(BeamError::EndOfStream);
    }
}

/// Receiving half of a [`pipe`].
pub struct PipeReceiver {
    pipe: Arc<Pipe>,
}

impl PipeReceiver {
    /// Close with a specific reason reported to the sender.
    pub fn close_with_error(&self, err: BeamError) {
        self.pipe.close_reader(err);
    }
}

#[async_trait]
impl Receiver for PipeReceiver {
    async fn receive(&self, mode: Mode) -> BeamResult<Delivery> {
        let Envelope {
            msg,
            sender,
            receiver,
        } = self.pipe.receive_envelope().await?;

        let reply: Box<dyn Sender> = match sender {
            Some(tx) if mode.contains(Mode::SENDER) => Box::new(tx),
            Some(tx) => {
                trace!(verb = %msg.verb, "closing unrequested reply sender");
                tx.close()?;
                Box::new(NopSender)
            }
            None => Box::new(NopSender),
        };
        let stream: Box<dyn Receiver> = match receiver {
            Some(rx) if mode.contains(Mode::RECEIVER) => Box::new(rx),
            Some(rx) => {
                trace!(verb = %msg.verb, "closing unrequested stream receiver");
                rx.close()?;
                Box::new(NopReceiver)
            }
            None => Box::new(NopReceiver),
        };

        Ok((msg, stream, reply))
    }

    async fn receive_to(&self, dst: &dyn Sender) -> RelayResult {
        match dst.as_any().downcast_ref::<PipeSender>() {
            Some(target) => pump(&self.pipe, &target.pipe).await,
            None => Err(RelayError::new(0, BeamError::IncompatibleSender)),
        }
    }

    fn close(&self) -> BeamResult<()> {
        self.pipe.close_reader(BeamError::ReaderClosed);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for PipeReceiver {
    fn drop(&mut self) {
        self.pipe.close_reader(BeamError::ReaderClosed);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::Verb;

    const BLOCKED: Duration = Duration::from_millis(50);

    #[tokio::test(start_paused = true)]
    async fn send_blocks_until_received() {
        let (tx, rx) = pipe();

        let sending = tokio::spawn(async move {
            tx.send(Message::new("hello"), Mode::empty()).await.map(|_| ())
        });
        tokio::time::sleep(BLOCKED).await;
        assert!(!sending.is_finished(), "send completed with nobody receiving");

        let (msg, _, _) = rx.receive(Mode::empty()).await.unwrap();
        assert_eq!(msg.verb, Verb::Other("hello".into()));
        sending.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn receive_blocks_until_sent() {
        let (tx, rx) = pipe();
        let pending = tokio::time::timeout(BLOCKED, rx.receive(Mode::empty())).await;
        assert!(pending.is_err(), "receive completed on an empty pipe");

        let sending = tokio::spawn(async move {
            tx.send(Message::ack(), Mode::empty()).await.map(|_| ())
        });
        let (msg, _, _) = rx.receive(Mode::empty()).await.unwrap();
        assert_eq!(msg, Message::ack());
        sending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn close_writer_ends_stream() {
        let (tx, rx) = pipe();
        tx.close().unwrap();
        let err = rx.receive(Mode::empty()).await.err().unwrap();
        assert!(err.is_end_of_stream());
    }

    #[tokio::test]
    async fn close_reader_fails_send() {
        let (tx, rx) = pipe();
        rx.close().unwrap();
        let err = tx.send(Message::ack(), Mode::empty()).await.err().unwrap();
        assert_eq!(err, BeamError::ReaderClosed);
    }

    #[tokio::test]
    async fn close_with_error_reports_reason() {
        let (tx, rx) = pipe();
        tx.close_with_error(BeamError::custom("driver crashed"));
        let err = rx.receive(Mode::empty()).await.err().unwrap();
        assert_eq!(err, BeamError::custom("driver crashed"));

        let (tx, rx) = pipe();
        rx.close_with_error(BeamError::custom("quota exceeded"));
        let err = tx.send(Message::ack(), Mode::empty()).await.err().unwrap();
        assert_eq!(err, BeamError::custom("quota exceeded"));
    }

    #[tokio::test]
    async fn first_close_reason_wins() {
        let (tx, rx) = pipe();
        tx.close_with_error(BeamError::custom("first"));
        tx.close().unwrap();
        drop(tx);
        let err = rx.receive(Mode::empty()).await.err().unwrap();
        assert_eq!(err, BeamError::custom("first"));
    }

    #[tokio::test]
    async fn operations_on_own_closed_side_fail() {
        let (tx, rx) = pipe();
        tx.close().unwrap();
        let err = tx.send(Message::ack(), Mode::empty()).await.err().unwrap();
        assert_eq!(err, BeamError::ClosedPipe);

        rx.close().unwrap();
        let err = rx.receive(Mode::empty()).await.err().unwrap();
        assert_eq!(err, BeamError::ClosedPipe);
    }

    #[tokio::test]
    async fn dropping_sender_ends_stream() {
        let (tx, rx) = pipe();
        drop(tx);
        let err = rx.receive(Mode::empty()).await.err().unwrap();
        assert!(err.is_end_of_stream());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_send_leaves_slot_empty() {
        let (tx, rx) = pipe();
        let cancelled =
            tokio::time::timeout(BLOCKED, tx.send(Message::new("stale"), Mode::empty())).await;
        assert!(cancelled.is_err());

        let sending = tokio::spawn(async move {
            tx.send(Message::new("fresh"), Mode::empty()).await.map(|_| ())
        });
        let (msg, _, _) = rx.receive(Mode::empty()).await.unwrap();
        assert_eq!(msg.verb.as_str(), "fresh");
        sending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn requested_stream_endpoint_carries_messages_forward() {
        let (tx, rx) = pipe();

        let sending = tokio::spawn(async move {
            let (_, stream) = tx.send(Message::new(Verb::Attach), Mode::SENDER).await?;
            stream.send(Message::log("line 1"), Mode::empty()).await?;
            stream.close()
        });

        let (msg, stream, _) = rx.receive(Mode::RECEIVER).await.unwrap();
        assert_eq!(msg.verb, Verb::Attach);
        let (line, _, _) = stream.receive(Mode::empty()).await.unwrap();
        assert_eq!(line, Message::log("line 1"));
        assert!(stream.receive(Mode::empty()).await.err().unwrap().is_end_of_stream());
        sending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unrequested_stream_endpoint_is_closed() {
        let (tx, rx) = pipe();

        let sending = tokio::spawn(async move {
            let (_, stream) = tx.send(Message::new(Verb::Attach), Mode::SENDER).await?;
            stream.send(Message::log("ignored"), Mode::empty()).await.map(|_| ())
        });

        let (_, stream, reply) = rx.receive(Mode::empty()).await.unwrap();
        assert!(stream.as_any().is::<NopReceiver>());
        assert!(reply.as_any().is::<NopSender>());
        let err = sending.await.unwrap().err().unwrap();
        assert_eq!(err, BeamError::ReaderClosed);
    }
}
