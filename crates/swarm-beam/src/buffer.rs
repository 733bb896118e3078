//! Buffer — a Sender that records what it is sent.

use std::any::Any;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::endpoint::{Endpoints, Sender};
use crate::error::BeamResult;
use crate::message::{Message, Mode};
use crate::nop::{NopReceiver, NopSender};

/// Capture sink: appends every delivered message, in delivery order.
///
/// Continuation endpoints are never allocated; a send asking for them
/// gets Nop objects back. Closing clears the recording.
#[derive(Debug, Default)]
pub struct Buffer {
    messages: Mutex<Vec<Message>>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded messages.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().expect("buffer lock").clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("buffer lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sender for Buffer {
    async fn send(&self, msg: Message, _mode: Mode) -> BeamResult<Endpoints> {
        self.messages.lock().expect("buffer lock").push(msg);
        Ok((Box::new(NopReceiver), Box::new(NopSender)))
    }

    fn close(&self) -> BeamResult<()> {
        self.messages.lock().expect("buffer lock").clear();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
