//! Tunnels built by other routers in which we are a participant.
//!
//! Acceptance of transit build requests happens outside the engine; what
//! lives here is the dispatch entry the manager's transit table holds: the
//! layer cipher and the next hop to forward to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::encryption::LayerCipher;
use super::{TUNNEL_DATA_LEN, TUNNEL_LIFETIME};
use crate::crypto::SessionKey;
use crate::data::{Hash, TunnelId};
use crate::i2np::{Message, MessagePayload, TunnelData};
use crate::router::types::Transport;
use crate::util;

/// One hop of some other router's tunnel.
pub struct TransitTunnel {
    tunnel_id: TunnelId,
    next_router: Hash,
    next_tunnel_id: TunnelId,
    layer_cipher: LayerCipher,
    creation_time: u64,
    transferred: AtomicU64,
    transport: Arc<dyn Transport>,
}

impl TransitTunnel {
    pub fn new(
        tunnel_id: TunnelId,
        next_router: Hash,
        next_tunnel_id: TunnelId,
        layer_key: SessionKey,
        iv_key: &SessionKey,
        transport: Arc<dyn Transport>,
    ) -> Self {
        TransitTunnel {
            tunnel_id,
            next_router,
            next_tunnel_id,
            layer_cipher: LayerCipher::new(iv_key, layer_key),
            creation_time: util::seconds_since_epoch(),
            transferred: AtomicU64::new(0),
            transport,
        }
    }

    pub fn tunnel_id(&self) -> TunnelId {
        self.tunnel_id
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.creation_time + TUNNEL_LIFETIME
    }

    /// Add our layer and pass the frame to the next hop.
    pub(super) fn handle_tunnel_data(&self, mut td: TunnelData) {
        self.transferred.fetch_add(TUNNEL_DATA_LEN, Ordering::Relaxed);
        self.layer_cipher.encrypt_layer(&mut td);
        td.tid = self.next_tunnel_id;
        if let Err(e) = self.transport.send(
            self.next_router.clone(),
            Message::from_payload(MessagePayload::TunnelData(td)),
        ) {
            error!(
                "Could not forward transit tunnel {} message: {}",
                self.tunnel_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::router::mock::MockTransport;

    #[test]
    fn forwards_with_new_layer() {
        let transport = Arc::new(MockTransport::new());
        let layer_key = SessionKey::generate();
        let iv_key = SessionKey::generate();
        let next_router = Hash([3; 32]);
        let tunnel = TransitTunnel::new(
            TunnelId(1),
            next_router.clone(),
            TunnelId(2),
            layer_key.clone(),
            &iv_key,
            transport.clone(),
        );

        let td = TunnelData {
            tid: TunnelId(1),
            data: [0x77; 1024],
        };
        tunnel.handle_tunnel_data(td);

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, next_router);
        match &sent[0].1.payload {
            MessagePayload::TunnelData(forwarded) => {
                assert_eq!(forwarded.tid, TunnelId(2));
                // One layer was added; undoing it restores the original
                let mut undone = forwarded.clone();
                LayerCipher::new(&iv_key, layer_key).decrypt_layer(&mut undone);
                assert_eq!(&undone.data[..], &[0x77; 1024][..]);
            }
            p => panic!("Unexpected payload: {:?}", p),
        }
        assert_eq!(tunnel.transferred_bytes(), TUNNEL_DATA_LEN);
    }

    #[test]
    fn expiry() {
        let tunnel = TransitTunnel::new(
            TunnelId(1),
            Hash([3; 32]),
            TunnelId(2),
            SessionKey::generate(),
            &SessionKey::generate(),
            Arc::new(MockTransport::new()),
        );
        let now = util::seconds_since_epoch();
        assert!(!tunnel.is_expired(now));
        assert!(tunnel.is_expired(now + TUNNEL_LIFETIME + 1));
    }
}
