//! The outbound gateway: turns application messages into tunnel frames.

use rand::{rngs::OsRng, Rng};
use std::fmt;

use super::frame::gen_tunnel_message;
use super::{
    FirstFragmentDeliveryInstructions, TunnelMessage, TunnelMessageDeliveryInstructions,
    TunnelMessageDeliveryType,
};
use crate::data::TunnelId;
use crate::i2np::{Message, TunnelData};
use crate::router::types::TransportError;
use crate::util;

/// The most message bytes one frame can carry, after the IV, checksum and
/// zero delimiter.
const MAX_FRAME_CONTENT: usize = 1003;

#[derive(Debug, PartialEq)]
pub enum GatewayError {
    /// The message does not fit in a single tunnel frame.
    Oversized(usize),
    Transport(TransportError),
}

#[cfg_attr(tarpaulin, skip)]
impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Oversized(sz) => {
                write!(f, "Message of {} bytes does not fit in one frame", sz)
            }
            GatewayError::Transport(e) => e.fmt(f),
        }
    }
}

/// Serializes messages into cleartext [`TunnelData`] frames addressed to the
/// tunnel's first hop.
///
/// Not re-entrant: the owning tunnel serializes access with its send mutex.
pub struct TunnelGateway {
    next_tunnel_id: TunnelId,
}

impl TunnelGateway {
    pub(super) fn new(next_tunnel_id: TunnelId) -> Self {
        TunnelGateway { next_tunnel_id }
    }

    /// Wrap `msg` into a single frame carrying the given delivery
    /// instructions.
    // TODO: fragment messages larger than one frame across several.
    pub(super) fn prepare(
        &self,
        delivery_type: TunnelMessageDeliveryType,
        msg: &Message,
    ) -> Result<TunnelData, GatewayError> {
        let bytes = msg.to_bytes();
        let tm = TunnelMessage(vec![(
            TunnelMessageDeliveryInstructions::First(FirstFragmentDeliveryInstructions {
                delivery_type,
                msg_id: None,
            }),
            &bytes[..],
        )]);
        if tm.byte_len() > MAX_FRAME_CONTENT {
            return Err(GatewayError::Oversized(tm.byte_len()));
        }

        let mut iv = [0u8; 16];
        OsRng.fill(&mut iv[..]);
        let frame = util::serialize(gen_tunnel_message(&iv, &tm));
        debug_assert_eq!(frame.len(), 1024);
        Ok(TunnelData::from(
            self.next_tunnel_id,
            array_ref![frame, 0, 1024],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2np::MessagePayload;

    #[test]
    fn frame_addressed_to_first_hop() {
        let gateway = TunnelGateway::new(TunnelId(77));
        let msg = Message::from_payload(MessagePayload::Data(vec![1, 2, 3]));
        let td = gateway
            .prepare(TunnelMessageDeliveryType::Local, &msg)
            .unwrap();
        assert_eq!(td.tid, TunnelId(77));

        let (_, tm) = super::super::frame::tunnel_message(&td.data).unwrap();
        assert_eq!(tm.0.len(), 1);
        let (_, parsed) = crate::i2np::frame::message(tm.0[0].1).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn oversized_message_rejected() {
        let gateway = TunnelGateway::new(TunnelId(1));
        let msg = Message::from_payload(MessagePayload::Data(vec![0; 1100]));
        match gateway.prepare(TunnelMessageDeliveryType::Local, &msg) {
            Err(GatewayError::Oversized(_)) => {}
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(_) => panic!("Oversized message should have been rejected"),
        }
    }
}
