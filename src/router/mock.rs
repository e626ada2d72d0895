//! Mock implementations of various router components.
//!
//! Each implementation keeps sufficient internal state as to ensure
//! self-consistency across its component's API.

use std::sync::Mutex;

use super::types::{InboundMessageHandler, Transport, TransportError};
use crate::data::Hash;
use crate::i2np::Message;

/// A transport that records every message instead of sending it.
pub struct MockTransport {
    sent: Mutex<Vec<(Hash, Message)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            sent: Mutex::new(Vec::new()),
        }
    }

    /// The messages sent so far, draining the record.
    pub fn take_sent(&self) -> Vec<(Hash, Message)> {
        self.sent.lock().unwrap().split_off(0)
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport::new()
    }
}

impl Transport for MockTransport {
    fn send(&self, peer: Hash, msg: Message) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((peer, msg));
        Ok(())
    }
}

/// An inbound message handler that collects everything delivered to it.
pub struct MockHandler {
    received: Mutex<Vec<Message>>,
}

impl MockHandler {
    pub fn new() -> Self {
        MockHandler {
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn take_received(&self) -> Vec<Message> {
        self.received.lock().unwrap().split_off(0)
    }
}

impl Default for MockHandler {
    fn default() -> Self {
        MockHandler::new()
    }
}

impl InboundMessageHandler for MockHandler {
    fn handle(&self, msg: Message) {
        self.received.lock().unwrap().push(msg);
    }
}
