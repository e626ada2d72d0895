//! The inbound endpoint: recovers messages from fully-peeled frames.

use std::sync::Arc;

use super::frame::tunnel_message;
use super::{TunnelMessageDeliveryInstructions, TunnelMessageDeliveryType};
use crate::i2np::{frame as i2np_frame, TunnelData};
use crate::router::types::InboundMessageHandler;

/// Parses cleartext tunnel frames and hands the recovered messages to the
/// router's inbound handler.
pub struct InboundEndpoint {
    handler: Arc<dyn InboundMessageHandler>,
}

impl InboundEndpoint {
    pub(super) fn new(handler: Arc<dyn InboundMessageHandler>) -> Self {
        InboundEndpoint { handler }
    }

    /// Deliver every message in a decrypted frame.
    pub(super) fn handle_decrypted(&self, td: &TunnelData) {
        let tm = match tunnel_message(&td.data) {
            Ok((_, tm)) => tm,
            Err(_) => {
                warn!("Dropping malformed frame on tunnel {}", td.tid);
                return;
            }
        };

        for (tmdi, frag) in &tm.0 {
            match tmdi {
                TunnelMessageDeliveryInstructions::First(di) if di.msg_id.is_none() => {
                    match di.delivery_type {
                        TunnelMessageDeliveryType::Local => match i2np_frame::message(frag) {
                            Ok((_, msg)) => self.handler.handle(msg),
                            Err(_) => {
                                warn!("Dropping malformed message on tunnel {}", td.tid);
                            }
                        },
                        _ => {
                            // Router and tunnel delivery would make us an
                            // exit for other routers' traffic
                            warn!(
                                "Dropping message with unsupported delivery on tunnel {}",
                                td.tid
                            );
                        }
                    }
                }
                // TODO: reassemble fragmented messages
                _ => warn!("Dropping message fragment on tunnel {}", td.tid),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::TunnelId;
    use crate::i2np::{Message, MessagePayload};
    use crate::router::mock::MockHandler;
    use crate::tunnel::gateway::TunnelGateway;
    use crate::tunnel::TunnelMessageDeliveryType;

    #[test]
    fn gateway_to_endpoint() {
        let handler = Arc::new(MockHandler::new());
        let endpoint = InboundEndpoint::new(handler.clone());

        let gateway = TunnelGateway::new(TunnelId(5));
        let msg = Message::from_payload(MessagePayload::Data(vec![42; 100]));
        let td = gateway
            .prepare(TunnelMessageDeliveryType::Local, &msg)
            .unwrap();

        endpoint.handle_decrypted(&td);
        let received = handler.take_received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], msg);
        match &received[0].payload {
            MessagePayload::Data(d) => assert_eq!(d, &vec![42; 100]),
            p => panic!("Unexpected payload: {:?}", p),
        }
    }

    #[test]
    fn malformed_frame_dropped() {
        let handler = Arc::new(MockHandler::new());
        let endpoint = InboundEndpoint::new(handler.clone());

        let td = crate::i2np::TunnelData {
            tid: TunnelId(5),
            data: [0xff; 1024],
        };
        endpoint.handle_decrypted(&td);
        assert!(handler.take_received().is_empty());
    }
}
