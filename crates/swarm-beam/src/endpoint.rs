//! Sender and Receiver — the capability contracts every subsystem speaks.

use std::any::Any;

use async_trait::async_trait;

use crate::error::{BeamError, BeamResult, RelayError, RelayResult};
use crate::message::{Message, Mode};

/// Continuation endpoints handed back by [`Sender::send`].
///
/// Endpoints not requested by the mode are Nop objects, so callers can
/// always close both without checking.
pub type Endpoints = (Box<dyn Receiver>, Box<dyn Sender>);

/// A received message plus the embedded endpoints the mode asked for.
pub type Delivery = (Message, Box<dyn Receiver>, Box<dyn Sender>);

/// Delivers messages.
#[async_trait]
pub trait Sender: Send + Sync + 'static {
    /// Deliver `msg`, waiting until the other side has taken it.
    async fn send(&self, msg: Message, mode: Mode) -> BeamResult<Endpoints>;

    /// Relay everything from `src` through an implementation-specific
    /// fast path. Declines with [`BeamError::IncompatibleReceiver`] when
    /// the source is not one it recognizes.
    async fn send_from(&self, _src: &dyn Receiver) -> RelayResult {
        Err(RelayError::new(0, BeamError::IncompatibleReceiver))
    }

    fn close(&self) -> BeamResult<()>;

    /// Runtime type access for fast-path recognition.
    fn as_any(&self) -> &dyn Any;
}

/// Yields messages.
#[async_trait]
pub trait Receiver: Send + Sync + 'static {
    /// Wait for the next message. End of stream is reported as
    /// [`BeamError::EndOfStream`].
    async fn receive(&self, mode: Mode) -> BeamResult<Delivery>;

    /// Relay everything into `dst` through an implementation-specific
    /// fast path. Declines with [`BeamError::IncompatibleSender`] when the
    /// destination is not one it recognizes.
    async fn receive_to(&self, _dst: &dyn Sender) -> RelayResult {
        Err(RelayError::new(0, BeamError::IncompatibleSender))
    }

    fn close(&self) -> BeamResult<()>;

    fn as_any(&self) -> &dyn Any;
}
