//! Swarm — a hub plus the handlers attached to it.
//!
//! Shutdown order matters: closing the hub ends every handler's inbound
//! stream, each handler then releases its pass-through sender, and only
//! then do the hub's pass-through relays drain.

use std::sync::Arc;

use swarm_beam::client::call;
use swarm_beam::{Hub, Message, Sender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SwarmConfig;
use crate::error::CoreResult;
use crate::handler::{Handler, attach};
use crate::registry::HandlerRegistry;

pub struct Swarm {
    name: String,
    hub: Arc<Hub>,
    workers: Vec<JoinHandle<()>>,
}

impl Swarm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hub: Arc::new(Hub::new()),
            workers: Vec::new(),
        }
    }

    /// Build every configured handler, then attach them in file order.
    pub async fn from_config(config: &SwarmConfig, registry: &HandlerRegistry) -> CoreResult<Self> {
        let handlers = config
            .handlers
            .iter()
            .map(|entry| registry.build(&entry.name, &entry.args))
            .collect::<CoreResult<Vec<_>>>()?;

        let mut swarm = Swarm::new(&config.swarm.name);
        for handler in handlers {
            swarm.attach(handler).await?;
        }
        info!(swarm = %swarm.name, handlers = swarm.workers.len(), "swarm assembled");
        Ok(swarm)
    }

    pub async fn attach(&mut self, handler: Arc<dyn Handler>) -> CoreResult<()> {
        let worker = attach(&*self.hub, handler).await?;
        self.workers.push(worker);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hub(&self) -> Arc<Hub> {
        self.hub.clone()
    }

    /// Send `msg` into the swarm and collect its replies.
    pub async fn call(&self, msg: Message) -> CoreResult<Vec<Message>> {
        Ok(call(&*self.hub, msg).await?)
    }

    /// Close the hub and wait for every handler and relay to finish.
    pub async fn shutdown(self) -> CoreResult<()> {
        self.hub.close()?;
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(swarm = %self.name, error = %err, "handler task failed");
            }
        }
        self.hub.wait().await;
        info!(swarm = %self.name, "swarm stopped");
        Ok(())
    }
}
