//! swarm-core — everything the swarm wires around the beam substrate.
//!
//! - [`SwarmConfig`]: `swarm.toml` parsing and scaffolding
//! - [`HandlerRegistry`]: named handler factories, constructed and passed
//!   in explicitly (there is no global registry)
//! - [`Handler`] and the built-in handlers (echo, log, auth test doubles)
//! - [`Swarm`]: a hub with its attached handlers and their serving tasks

pub mod builtins;
pub mod config;
pub mod error;
pub mod handler;
pub mod registry;
pub mod swarm;

pub use config::SwarmConfig;
pub use error::{CoreError, CoreResult};
pub use handler::{Handler, Outcome, attach};
pub use registry::HandlerRegistry;
pub use swarm::Swarm;
