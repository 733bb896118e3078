//! Handler — a unit of behavior that joins a hub.
//!
//! [`attach`] performs the hub's `register` handshake and spawns a task
//! that feeds every inbound message to the handler. Messages the handler
//! does not consume are passed on to the handlers registered before it,
//! and their replies are relayed back to the original caller.

use std::sync::Arc;

use async_trait::async_trait;
use swarm_beam::client::reply_error;
use swarm_beam::{Message, Mode, Receiver, Sender, Verb, copy};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CoreResult;

/// What a handler did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Consumed; any replies were sent on the reply path.
    Handled,
    /// Not for this handler: pass it on to the previous chain.
    Forward(Message),
}

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Process one message. `ret` is the caller's reply path; it is closed
    /// for the handler once this returns.
    async fn handle(&self, msg: Message, ret: &dyn Sender) -> CoreResult<Outcome>;
}

/// Register `handler` on `hub` and start serving it.
///
/// The returned task finishes once the hub closes the handler's inbound
/// endpoint.
pub async fn attach(hub: &dyn Sender, handler: Arc<dyn Handler>) -> CoreResult<JoinHandle<()>> {
    let register = Message::new(Verb::Register).with_arg(handler.name());
    let (inbound, passthrough) = hub.send(register, Mode::RECEIVER).await?;
    info!(handler = handler.name(), "handler attached");
    Ok(tokio::spawn(run(handler, inbound, passthrough)))
}

async fn run(handler: Arc<dyn Handler>, inbound: Box<dyn Receiver>, passthrough: Box<dyn Sender>) {
    let name = handler.name().to_string();
    let mut served = 0usize;
    loop {
        let (msg, _, ret) = match inbound.receive(Mode::SENDER).await {
            Ok(delivery) => delivery,
            Err(err) if err.is_end_of_stream() => break,
            Err(err) => {
                warn!(handler = %name, error = %err, "inbound receive failed");
                break;
            }
        };

        let verb = msg.verb.clone();
        match handler.handle(msg, &*ret).await {
            Ok(Outcome::Handled) => debug!(handler = %name, %verb, "handled"),
            Ok(Outcome::Forward(msg)) => match forward(&*passthrough, msg, &*ret).await {
                Ok(replies) => debug!(handler = %name, %verb, replies, "forwarded"),
                Err(err) => warn!(handler = %name, %verb, error = %err, "forward failed"),
            },
            Err(err) => {
                warn!(handler = %name, %verb, error = %err, "handler failed");
                reply_error(&*ret, &err.to_string()).await.ok();
            }
        }
        ret.close().ok();
        served += 1;
    }

    passthrough.close().ok();
    debug!(handler = %name, served, "handler stopped");
}

/// Pass `msg` down the chain and relay its replies back on `ret`.
async fn forward(passthrough: &dyn Sender, msg: Message, ret: &dyn Sender) -> CoreResult<usize> {
    let (replies, _) = passthrough.send(msg, Mode::RECEIVER).await?;
    let relayed = copy(ret, &*replies).await.map_err(|err| err.source)?;
    Ok(relayed)
}
