//! Built-in handlers.
//!
//! `echo` is a catch-all that answers every message with itself; `log`
//! consumes `log` messages; `auth-pass` and `auth-fail` are identity
//! provider doubles that accept or deny every `auth` request.

use async_trait::async_trait;
use swarm_beam::client::{reply_ack, reply_error};
use swarm_beam::message::lookup_arg;
use swarm_beam::{Message, Mode, Sender, Verb};
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::handler::{Handler, Outcome};

pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    async fn handle(&self, msg: Message, ret: &dyn Sender) -> CoreResult<Outcome> {
        ret.send(msg, Mode::empty()).await?;
        Ok(Outcome::Handled)
    }
}

/// Writes `log` messages through tracing under a configurable prefix.
pub struct LogHandler {
    prefix: String,
}

impl LogHandler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Accepts `prefix=<name>`; defaults to `swarm`.
    pub fn from_args(args: &[String]) -> CoreResult<Self> {
        validate_args(args, &["prefix"])?;
        Ok(Self::new(lookup_arg(args, "prefix").unwrap_or("swarm")))
    }
}

#[async_trait]
impl Handler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, msg: Message, ret: &dyn Sender) -> CoreResult<Outcome> {
        if msg.verb != Verb::Log {
            return Ok(Outcome::Forward(msg));
        }
        info!(prefix = %self.prefix, "{}", msg.args.join(" "));
        reply_ack(ret).await?;
        Ok(Outcome::Handled)
    }
}

/// Identity provider double with a fixed verdict.
pub struct AuthHandler {
    allow: bool,
}

impl AuthHandler {
    pub fn pass() -> Self {
        Self { allow: true }
    }

    pub fn fail() -> Self {
        Self { allow: false }
    }
}

#[async_trait]
impl Handler for AuthHandler {
    fn name(&self) -> &str {
        if self.allow { "auth-pass" } else { "auth-fail" }
    }

    async fn handle(&self, msg: Message, ret: &dyn Sender) -> CoreResult<Outcome> {
        if msg.verb != Verb::Auth {
            return Ok(Outcome::Forward(msg));
        }
        let user = msg.get("user").unwrap_or("anonymous");
        info!(provider = self.name(), user, allowed = self.allow, "auth request");
        if self.allow {
            reply_ack(ret).await?;
        } else {
            reply_error(ret, "access denied").await?;
        }
        Ok(Outcome::Handled)
    }
}

/// Reject arguments that are not `key=value` or use an unknown key.
fn validate_args(args: &[String], known: &[&str]) -> CoreResult<()> {
    for arg in args {
        match arg.split_once('=') {
            Some((key, _)) if known.contains(&key) => {}
            _ => return Err(CoreError::InvalidArgument(arg.clone())),
        }
    }
    Ok(())
}
