//! Relays — move messages from any Receiver into any Sender.
//!
//! Both relays first offer the work to the endpoints themselves
//! ([`Receiver::receive_to`], then [`Sender::send_from`]); a pipe relaying
//! into a pipe moves whole envelopes. When neither recognizes the other,
//! a generic receive/send loop runs instead.
//!
//! The two relays differ only in what that generic loop does with a
//! message that carries embedded endpoints:
//!
//! - [`copy`] refuses it: the endpoints are closed and the relay stops
//!   with [`BeamError::Unsupported`].
//! - [`copy_nested`] re-creates the endpoints on the destination side and
//!   spawns one extra relay per endpoint to shuttle its traffic, recursing
//!   for deeper nesting. It returns once the source ended and every
//!   nested relay drained.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, trace};

use crate::endpoint::{Receiver, Sender};
use crate::error::{BeamError, RelayError, RelayResult};
use crate::message::Mode;
use crate::nop::{NopReceiver, NopSender};

/// Relay plain messages from `src` to `dst` until `src` ends.
///
/// Returns the number of messages relayed when the source reaches end of
/// stream; any other error aborts the relay and is returned along with the
/// count so far.
pub async fn copy(dst: &dyn Sender, src: &dyn Receiver) -> RelayResult {
    if let Some(result) = fast_path(dst, src).await {
        return result;
    }

    let mut copied = 0;
    loop {
        let (msg, stream, reply) = match src.receive(Mode::RECEIVER | Mode::SENDER).await {
            Ok(delivery) => delivery,
            Err(err) if err.is_end_of_stream() => return Ok(copied),
            Err(err) => return Err(RelayError::new(copied, err)),
        };

        if !is_nop_receiver(&*stream) || !is_nop_sender(&*reply) {
            stream.close().ok();
            reply.close().ok();
            return Err(RelayError::new(
                copied,
                BeamError::Unsupported(format!("relaying nested endpoints of '{}'", msg.verb)),
            ));
        }

        dst.send(msg, Mode::empty())
            .await
            .map_err(|err| RelayError::new(copied, err))?;
        copied += 1;
    }
}

/// Relay messages from `src` to `dst`, nested endpoints included.
pub async fn copy_nested(dst: &dyn Sender, src: &dyn Receiver) -> RelayResult {
    if let Some(result) = fast_path(dst, src).await {
        return result;
    }

    let mut nested = JoinSet::new();
    let mut copied = 0;
    let result = loop {
        let (msg, stream, reply) = match src.receive(Mode::RECEIVER | Mode::SENDER).await {
            Ok(delivery) => delivery,
            Err(err) if err.is_end_of_stream() => break Ok(copied),
            Err(err) => break Err(RelayError::new(copied, err)),
        };

        let has_reply = !is_nop_sender(&*reply);
        let has_stream = !is_nop_receiver(&*stream);
        let mut mode = Mode::empty();
        if has_reply {
            mode |= Mode::RECEIVER;
        }
        if has_stream {
            mode |= Mode::SENDER;
        }

        let (replies, forward) = match dst.send(msg, mode).await {
            Ok(endpoints) => endpoints,
            Err(err) => break Err(RelayError::new(copied, err)),
        };
        if has_reply {
            trace!("spawning reply relay");
            nested.spawn(relay(reply, replies));
        }
        if has_stream {
            trace!("spawning stream relay");
            nested.spawn(relay(forward, stream));
        }
        reap(&mut nested);
        copied += 1;
    };

    match &result {
        Ok(_) => {
            while let Some(joined) = nested.join_next().await {
                log_nested(joined);
            }
        }
        Err(_) => nested.detach_all(),
    }
    result
}

/// Collect nested relays that already finished, so a long-lived relay
/// only holds the ones still running. Returns how many were collected.
fn reap(nested: &mut JoinSet<RelayResult>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = nested.try_join_next() {
        log_nested(joined);
        reaped += 1;
    }
    reaped
}

fn log_nested(joined: Result<RelayResult, JoinError>) {
    match joined {
        Ok(Err(err)) => debug!(error = %err, "nested relay stopped early"),
        Err(err) => debug!(error = %err, "nested relay task failed"),
        Ok(Ok(_)) => {}
    }
}

/// One nested relay: owns both endpoints and closes them when done.
fn relay(
    dst: Box<dyn Sender>,
    src: Box<dyn Receiver>,
) -> Pin<Box<dyn Future<Output = RelayResult> + Send>> {
    Box::pin(async move {
        let result = copy_nested(&*dst, &*src).await;
        dst.close().ok();
        src.close().ok();
        result
    })
}

async fn fast_path(dst: &dyn Sender, src: &dyn Receiver) -> Option<RelayResult> {
    match src.receive_to(dst).await {
        Err(err) if err.is_incompatible() => {}
        other => return Some(other),
    }
    match dst.send_from(src).await {
        Err(err) if err.is_incompatible() => None,
        other => Some(other),
    }
}

fn is_nop_sender(sender: &dyn Sender) -> bool {
    sender.as_any().is::<NopSender>()
}

fn is_nop_receiver(receiver: &dyn Receiver) -> bool {
    receiver.as_any().is::<NopReceiver>()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::Buffer;
    use crate::message::{Message, Verb};
    use crate::pipe::pipe;
    use crate::stack::StackSender;

    #[tokio::test]
    async fn copies_plain_messages_until_end_of_stream() {
        let (tx, rx) = pipe();
        let producer = tokio::spawn(async move {
            for i in 0..3 {
                tx.send(Message::new(Verb::Set).with_arg(format!("n={i}")), Mode::empty())
                    .await?;
            }
            tx.close()
        });

        let buf = Buffer::new();
        assert_eq!(copy(&buf, &rx).await.unwrap(), 3);
        producer.await.unwrap().unwrap();

        let ns: Vec<String> = buf
            .messages()
            .iter()
            .map(|m| m.get("n").unwrap().to_string())
            .collect();
        assert_eq!(ns, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn refuses_nested_endpoints() {
        let (tx, rx) = pipe();
        let producer = tokio::spawn(async move {
            tx.send(Message::new("plain"), Mode::empty()).await?;
            let (reply, _) = tx.send(Message::new("with-reply"), Mode::RECEIVER).await?;
            // The relay closed the embedded reply path.
            Ok::<_, BeamError>(reply.receive(Mode::empty()).await.err())
        });

        let buf = Buffer::new();
        let err = copy(&buf, &rx).await.err().unwrap();
        assert_eq!(err.copied, 1);
        assert!(matches!(err.source, BeamError::Unsupported(_)));
        assert_eq!(buf.len(), 1);

        let reply_err = producer.await.unwrap().unwrap().unwrap();
        assert!(reply_err.is_end_of_stream());
    }

    #[tokio::test]
    async fn destination_failure_aborts_with_count() {
        let (tx, rx) = pipe();
        let producer = tokio::spawn(async move {
            tx.send(Message::ack(), Mode::empty()).await.map(|_| ())
        });

        let (dead_tx, dead_rx) = pipe();
        drop(dead_rx);
        let err = copy(&dead_tx, &rx).await.err().unwrap();
        assert_eq!(err, RelayError::new(0, BeamError::ReaderClosed));
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn pipe_to_pipe_keeps_reply_paths() {
        let (client_tx, relay_rx) = pipe();
        let (relay_tx, server_rx) = pipe();

        let relaying = tokio::spawn(async move { copy(&relay_tx, &relay_rx).await });
        let server = tokio::spawn(async move {
            let (msg, _, ret) = server_rx.receive(Mode::SENDER).await?;
            ret.send(Message::new("pong").with_args(msg.args), Mode::empty())
                .await?;
            ret.close()
        });

        let (replies, _) = client_tx
            .send(Message::new("ping").with_arg("seq=1"), Mode::RECEIVER)
            .await
            .unwrap();
        let (pong, _, _) = replies.receive(Mode::empty()).await.unwrap();
        assert_eq!(pong, Message::new("pong").with_arg("seq=1"));
        server.await.unwrap().unwrap();

        client_tx.close().unwrap();
        assert_eq!(relaying.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn nested_copy_relays_replies_through_generic_loop() {
        let (backend_tx, backend_rx) = pipe();
        let stack = StackSender::new();
        stack.add(Arc::new(backend_tx));

        let (client_tx, client_rx) = pipe();
        let relaying = tokio::spawn(async move { copy_nested(&stack, &client_rx).await });
        let server = tokio::spawn(async move {
            let (msg, _, ret) = backend_rx.receive(Mode::SENDER).await?;
            assert_eq!(msg.verb, Verb::Get);
            ret.send(Message::ack(), Mode::empty()).await?;
            ret.close()
        });

        let (replies, _) = client_tx
            .send(Message::new(Verb::Get), Mode::RECEIVER)
            .await
            .unwrap();
        let (ack, _, _) = replies.receive(Mode::empty()).await.unwrap();
        assert_eq!(ack, Message::ack());
        assert!(replies.receive(Mode::empty()).await.err().unwrap().is_end_of_stream());
        server.await.unwrap().unwrap();

        client_tx.close().unwrap();
        assert_eq!(relaying.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn nested_copy_relays_forward_streams() {
        let (backend_tx, backend_rx) = pipe();
        let stack = StackSender::new();
        stack.add(Arc::new(backend_tx));

        let (client_tx, client_rx) = pipe();
        let relaying = tokio::spawn(async move { copy_nested(&stack, &client_rx).await });
        let server = tokio::spawn(async move {
            let (msg, stream, _) = backend_rx.receive(Mode::RECEIVER).await?;
            assert_eq!(msg.verb, Verb::Attach);
            let mut lines = Vec::new();
            loop {
                match stream.receive(Mode::empty()).await {
                    Ok((line, _, _)) => lines.push(line),
                    Err(err) if err.is_end_of_stream() => return Ok(lines),
                    Err(err) => return Err(err),
                }
            }
        });

        let (_, stream) = client_tx
            .send(Message::new(Verb::Attach).with_arg("name=web"), Mode::SENDER)
            .await
            .unwrap();
        stream.send(Message::log("line 1"), Mode::empty()).await.unwrap();
        stream.send(Message::log("line 2"), Mode::empty()).await.unwrap();
        stream.close().unwrap();

        let lines = server.await.unwrap().unwrap();
        assert_eq!(lines, vec![Message::log("line 1"), Message::log("line 2")]);

        client_tx.close().unwrap();
        assert_eq!(relaying.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn finished_nested_relays_are_reaped() {
        let mut nested = JoinSet::new();
        for _ in 0..3 {
            nested.spawn(async { Ok::<usize, RelayError>(0) });
        }
        let running = nested.spawn(std::future::pending::<RelayResult>());

        while nested.len() > 1 {
            reap(&mut nested);
            tokio::task::yield_now().await;
        }
        assert_eq!(nested.len(), 1);
        assert_eq!(reap(&mut nested), 0);
        running.abort();
    }
}
