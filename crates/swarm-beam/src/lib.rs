//! swarm-beam — the in-process messaging substrate of the swarm.
//!
//! Every swarm subsystem (discovery, state, drivers, auth) talks through
//! the same two capabilities: a [`Sender`] that delivers a [`Message`] and
//! a [`Receiver`] that yields one. Pipes pair them up, and the composition
//! layers let several independent handlers share one logical endpoint.
//!
//! # Architecture
//!
//! ```text
//! Hub ──────────── "register" ──► new handler pipes + relay task
//!  └── StackSender (most recent backend first, prunes on failure)
//!        ├── PipeSender ─┐
//!        ├── PipeSender  │ Pipe: single-slot rendezvous, two-sided close
//!        └── ...         └──► PipeReceiver ──► handler loop
//!
//! copy(dst, src): pipe→pipe fast path, generic receive/send loop otherwise
//! ```
//!
//! A send with [`Mode::RECEIVER`] embeds a reply path in the envelope; the
//! other side obtains it by receiving with [`Mode::SENDER`]. Endpoints the
//! receiving side did not ask for are closed on its behalf.

pub mod buffer;
pub mod client;
pub mod copy;
pub mod endpoint;
pub mod error;
pub mod hub;
pub mod message;
pub mod nop;
pub mod pipe;
pub mod stack;

pub use buffer::Buffer;
pub use copy::{copy, copy_nested};
pub use endpoint::{Delivery, Endpoints, Receiver, Sender};
pub use error::{BeamError, BeamResult, RelayError, RelayResult};
pub use hub::Hub;
pub use message::{Message, Mode, Verb};
pub use nop::{NopReceiver, NopSender};
pub use pipe::{PipeReceiver, PipeSender, pipe};
pub use stack::StackSender;
