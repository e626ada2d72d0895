//! Tunnels: unidirectional chains of relaying peers over which the local
//! router sends and receives messages anonymously.
//!
//! A tunnel is negotiated with the layered build protocol in [`build`],
//! carries fixed-size frames under the per-hop cipher discipline of
//! [`encryption`], and lives in the tables of the [`manager`] worker until
//! it expires.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::data::{Hash, TunnelId};
use crate::i2np::{Message, MessagePayload, TunnelData, BUILD_RECORD_LEN};
use crate::router::types::{InboundMessageHandler, Transport};
use crate::util;

mod build;
mod config;
mod encryption;
mod endpoint;
mod frame;
mod gateway;
mod manager;
mod pool;
mod transit;

pub use self::config::{Direction, HopConfig, TunnelConfig};
pub use self::endpoint::InboundEndpoint;
pub use self::gateway::{GatewayError, TunnelGateway};
pub use self::manager::{PendingTunnel, TunnelManager, TUNNEL_POOL_TARGET};
pub use self::pool::TunnelPool;
pub use self::transit::TransitTunnel;

/// The lifetime of a tunnel. Always 10 minutes for current tunnels.
pub const TUNNEL_LIFETIME: u64 = 10 * 60;

/// The size of a tunnel data frame on the wire: 4 bytes of tunnel ID and
/// 1024 bytes of layered payload.
pub const TUNNEL_DATA_LEN: u64 = 1028;

#[derive(Debug, PartialEq)]
enum TunnelMessageDeliveryType {
    Local,
    Tunnel(TunnelId, Hash),
    Router(Hash),
}

/// The delivery instructions included with the first fragment of a message,
/// or an unfragmented message.
///
/// The delay and extended options flag bits are not implemented.
#[derive(Debug, PartialEq)]
struct FirstFragmentDeliveryInstructions {
    delivery_type: TunnelMessageDeliveryType,
    msg_id: Option<u32>,
}

/// The delivery instructions included with the second and subsequent
/// fragments of a message.
#[derive(Debug, PartialEq)]
struct FollowOnFragmentDeliveryInstructions {
    fragment_number: u8,
    last_fragment: bool,
    msg_id: u32,
}

#[derive(Debug, PartialEq)]
enum TunnelMessageDeliveryInstructions {
    First(FirstFragmentDeliveryInstructions),
    FollowOn(FollowOnFragmentDeliveryInstructions),
}

impl TunnelMessageDeliveryInstructions {
    fn byte_len(&self) -> usize {
        match self {
            TunnelMessageDeliveryInstructions::First(di) => {
                let mut len = 1 + match di.delivery_type {
                    TunnelMessageDeliveryType::Local => 0,
                    TunnelMessageDeliveryType::Tunnel(_, _) => 36,
                    TunnelMessageDeliveryType::Router(_) => 32,
                };
                if di.msg_id.is_some() {
                    len += 4;
                }
                len
            }
            TunnelMessageDeliveryInstructions::FollowOn(_) => 5,
        }
    }
}

/// A set of message fragments that serializes to at most 1003 bytes.
/// Forms the plaintext inside a [`TunnelData`] frame.
#[derive(Debug, PartialEq)]
struct TunnelMessage<'a>(Vec<(TunnelMessageDeliveryInstructions, &'a [u8])>);

impl<'a> TunnelMessage<'a> {
    fn byte_len(&self) -> usize {
        self.0
            .iter()
            .fold(0, |acc, (tmdi, frag)| acc + tmdi.byte_len() + 2 + frag.len())
    }
}

/// State common to both tunnel directions: the hop configuration, pool
/// membership, and lifecycle flags.
pub struct TunnelCore {
    pub(super) config: Mutex<TunnelConfig>,
    pool: Mutex<Option<Arc<TunnelPool>>>,
    established: AtomicBool,
    failed: AtomicBool,
    pub(super) creation_time: u64,
}

impl TunnelCore {
    fn new(config: TunnelConfig) -> Self {
        TunnelCore {
            config: Mutex::new(config),
            pool: Mutex::new(None),
            established: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            creation_time: util::seconds_since_epoch(),
        }
    }

    pub(super) fn config(&self) -> MutexGuard<'_, TunnelConfig> {
        self.config.lock().unwrap()
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    pub(super) fn set_established(&self, established: bool) {
        self.established.store(established, Ordering::Release);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(super) fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::Release);
    }

    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.creation_time + TUNNEL_LIFETIME
    }

    pub fn pool(&self) -> Option<Arc<TunnelPool>> {
        self.pool.lock().unwrap().clone()
    }

    pub fn set_pool(&self, pool: Option<Arc<TunnelPool>>) {
        *self.pool.lock().unwrap() = pool;
    }

    /// Apply the originator's layer pass: every hop's cipher in
    /// endpoint-to-first order.
    ///
    /// For outbound tunnels this wraps a frame so that each hop's encrypt
    /// pass peels one layer; for inbound tunnels the same routine removes
    /// the layers the hops added on the way to us.
    pub(super) fn encrypt_tunnel_msg(&self, td: &mut TunnelData) {
        let config = self.config();
        for hop in config.hops().iter().rev() {
            hop.decryption.decrypt_layer(td);
        }
    }

    /// Process a build response, promoting the hop ciphers on success.
    pub(super) fn handle_build_response(&self, records: &mut [[u8; BUILD_RECORD_LEN]]) -> bool {
        let established = build::process_build_response(&mut self.config(), records);
        self.set_established(established);
        if !established {
            self.set_failed(true);
        }
        established
    }
}

/// A tunnel that delivers messages to the local router.
pub struct InboundTunnel {
    core: TunnelCore,
    endpoint: InboundEndpoint,
    tunnel_id: TunnelId,
    received: AtomicU64,
}

impl InboundTunnel {
    pub(super) fn new(config: TunnelConfig, handler: Arc<dyn InboundMessageHandler>) -> Self {
        let tunnel_id = config.receive_tunnel_id();
        InboundTunnel {
            core: TunnelCore::new(config),
            endpoint: InboundEndpoint::new(handler),
            tunnel_id,
            received: AtomicU64::new(0),
        }
    }

    pub fn core(&self) -> &TunnelCore {
        &self.core
    }

    /// The ID the local router receives this tunnel's frames on.
    pub fn tunnel_id(&self) -> TunnelId {
        self.tunnel_id
    }

    pub fn received_bytes(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// The entry point peers use to send into this tunnel.
    pub fn gateway(&self) -> (Hash, TunnelId) {
        self.core.config().gateway()
    }

    pub(super) fn handle_tunnel_data(&self, mut td: TunnelData) {
        // Incoming messages mean the tunnel is alive
        if self.core.is_failed() {
            self.core.set_failed(false);
        }
        self.received.fetch_add(TUNNEL_DATA_LEN, Ordering::Relaxed);

        self.core.encrypt_tunnel_msg(&mut td);
        self.endpoint.handle_decrypted(&td);
    }
}

/// A tunnel the local router sends messages through.
pub struct OutboundTunnel {
    core: TunnelCore,
    tunnel_id: TunnelId,
    first_hop: Hash,
    /// Guards the gateway buffer; sends on one tunnel are serialized.
    gateway: Mutex<TunnelGateway>,
    transport: Arc<dyn Transport>,
    sent: AtomicU64,
}

impl OutboundTunnel {
    pub(super) fn new(config: TunnelConfig, transport: Arc<dyn Transport>) -> Self {
        let (first_hop, tunnel_id) = config.gateway();
        OutboundTunnel {
            core: TunnelCore::new(config),
            tunnel_id,
            first_hop,
            gateway: Mutex::new(TunnelGateway::new(tunnel_id)),
            transport,
            sent: AtomicU64::new(0),
        }
    }

    pub fn core(&self) -> &TunnelCore {
        &self.core
    }

    /// The ID the first hop receives this tunnel's frames on.
    pub fn tunnel_id(&self) -> TunnelId {
        self.tunnel_id
    }

    pub fn sent_bytes(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Send `msg` through this tunnel.
    ///
    /// `gateway` addresses the far end: `None` delivers locally at the
    /// endpoint, `Some((hash, None))` delivers to a router, and
    /// `Some((hash, Some(tid)))` delivers into another tunnel's gateway.
    pub fn send_tunnel_data_msg(
        &self,
        gateway: Option<(Hash, Option<TunnelId>)>,
        msg: &Message,
    ) -> Result<(), GatewayError> {
        let delivery_type = match gateway {
            None => TunnelMessageDeliveryType::Local,
            Some((hash, None)) => TunnelMessageDeliveryType::Router(hash),
            Some((hash, Some(tid))) => TunnelMessageDeliveryType::Tunnel(tid, hash),
        };

        let gateway = self.gateway.lock().unwrap();
        let mut td = gateway.prepare(delivery_type, msg)?;
        self.core.encrypt_tunnel_msg(&mut td);
        self.sent.fetch_add(TUNNEL_DATA_LEN, Ordering::Relaxed);
        self.transport
            .send(
                self.first_hop.clone(),
                Message::from_payload(MessagePayload::TunnelData(td)),
            )
            .map_err(GatewayError::Transport)
    }
}
