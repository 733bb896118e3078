//! Request/reply conventions on top of the raw capabilities.
//!
//! A request is sent with [`Mode::RECEIVER`]; the server answers on the
//! embedded reply path with zero or more messages (conventionally `ack` or
//! `error`) and closes it.

use std::future::Future;

use tracing::trace;

use crate::endpoint::{Receiver, Sender};
use crate::error::BeamResult;
use crate::message::{Message, Mode};

/// Send `msg` and collect every reply until the server closes the path.
pub async fn call(dst: &dyn Sender, msg: Message) -> BeamResult<Vec<Message>> {
    let (replies, stream) = dst.send(msg, Mode::RECEIVER).await?;
    stream.close()?;

    let mut collected = Vec::new();
    let result = loop {
        match replies.receive(Mode::empty()).await {
            Ok((reply, _, _)) => collected.push(reply),
            Err(err) if err.is_end_of_stream() => break Ok(collected),
            Err(err) => break Err(err),
        }
    };
    replies.close()?;
    result
}

/// Answer `ack` and close the reply path.
pub async fn reply_ack(ret: &dyn Sender) -> BeamResult<()> {
    ret.send(Message::ack(), Mode::empty()).await?;
    ret.close()
}

/// Answer `error <reason>` and close the reply path.
pub async fn reply_error(ret: &dyn Sender, reason: &str) -> BeamResult<()> {
    ret.send(Message::error(reason), Mode::empty()).await?;
    ret.close()
}

/// Serve requests from `src` until it ends, handing each message and its
/// reply path to `handler`. Returns the number of requests served.
pub async fn serve<F, Fut>(src: &dyn Receiver, mut handler: F) -> BeamResult<usize>
where
    F: FnMut(Message, Box<dyn Sender>) -> Fut,
    Fut: Future<Output = BeamResult<()>>,
{
    let mut served = 0;
    loop {
        let (msg, _, ret) = match src.receive(Mode::SENDER).await {
            Ok(delivery) => delivery,
            Err(err) if err.is_end_of_stream() => return Ok(served),
            Err(err) => return Err(err),
        };
        trace!(verb = %msg.verb, "serving request");
        handler(msg, ret).await?;
        served += 1;
    }
}
