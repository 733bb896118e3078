//! HandlerRegistry — named handler factories.
//!
//! The registry is an ordinary value: build one, register factories on it,
//! and pass it to whatever assembles the swarm.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::builtins::{AuthHandler, EchoHandler, LogHandler};
use crate::error::{CoreError, CoreResult};
use crate::handler::Handler;

/// Builds a handler from its configured `key=value` arguments.
pub type HandlerFactory = Box<dyn Fn(&[String]) -> CoreResult<Arc<dyn Handler>> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `echo`, `log`, `auth-pass`, and `auth-fail`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", |_| Ok(shared(EchoHandler)));
        registry.register("log", |args| Ok(shared(LogHandler::from_args(args)?)));
        registry.register("auth-pass", |_| Ok(shared(AuthHandler::pass())));
        registry.register("auth-fail", |_| Ok(shared(AuthHandler::fail())));
        registry
    }

    /// Register (or replace) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&[String]) -> CoreResult<Arc<dyn Handler>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(%name, "handler factory registered");
        self.factories.insert(name, Box::new(factory));
    }

    pub fn build(&self, name: &str, args: &[String]) -> CoreResult<Arc<dyn Handler>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CoreError::UnknownHandler(name.to_string()))?;
        factory(args)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

fn shared(handler: impl Handler) -> Arc<dyn Handler> {
    Arc::new(handler)
}
