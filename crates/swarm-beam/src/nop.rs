//! Nop endpoints — stand-ins for endpoints nobody asked for.

use std::any::Any;

use async_trait::async_trait;

use crate::endpoint::{Delivery, Endpoints, Receiver, Sender};
use crate::error::{BeamError, BeamResult};
use crate::message::{Message, Mode};

/// Accepts and discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopSender;

#[async_trait]
impl Sender for NopSender {
    async fn send(&self, _msg: Message, _mode: Mode) -> BeamResult<Endpoints> {
        Ok((Box::new(NopReceiver), Box::new(NopSender)))
    }

    fn close(&self) -> BeamResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Always at end of stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopReceiver;

#[async_trait]
impl Receiver for NopReceiver {
    async fn receive(&self, _mode: Mode) -> BeamResult<Delivery> {
        Err(BeamError::EndOfStream)
    }

    fn close(&self) -> BeamResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
