//! Per-hop and per-tunnel build-time configuration.

use rand::rngs::OsRng;
use rand::Rng;

use super::encryption::LayerCipher;
use crate::crypto::SessionKey;
use crate::data::{Hash, RouterInfo, TunnelId};
use crate::i2np::ParticipantType;

/// Which way traffic flows through a tunnel, seen from the local router.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// The configuration of a particular hop in a tunnel.
///
/// Tunnels have a maximum lifetime of 10 minutes, so the [`RouterInfo`] of
/// each hop is looked up at tunnel build time and cached here.
pub struct HopConfig {
    /// The peer filling this hop.
    pub router: RouterInfo,
    /// The ID this hop receives tunnel messages on.
    pub tunnel_id: TunnelId,
    /// The successor this hop forwards to. For the terminal hop this is the
    /// local router (inbound) or the reply path's gateway (outbound), which
    /// the final build record needs for reply routing.
    pub next_router: Hash,
    pub next_tunnel_id: TunnelId,
    pub layer_key: SessionKey,
    pub layer_iv_key: SessionKey,
    pub reply_key: SessionKey,
    pub reply_iv: [u8; 16],
    pub is_gateway: bool,
    pub is_endpoint: bool,
    /// Data-plane cipher state. Bound to the reply material until the build
    /// response promotes it to the layer keys.
    pub(super) decryption: LayerCipher,
}

impl HopConfig {
    fn new(router: RouterInfo) -> Self {
        let layer_key = SessionKey::generate();
        let layer_iv_key = SessionKey::generate();
        let reply_key = SessionKey::generate();
        let mut reply_iv = [0u8; 16];
        OsRng.fill(&mut reply_iv[..]);
        let decryption = LayerCipher::new(&reply_key, reply_key.clone());
        HopConfig {
            router,
            tunnel_id: TunnelId::generate(),
            next_router: Hash([0u8; 32]),
            next_tunnel_id: TunnelId(0),
            layer_key,
            layer_iv_key,
            reply_key,
            reply_iv,
            is_gateway: false,
            is_endpoint: false,
            decryption,
        }
    }

    /// Switch the data-plane cipher from the reply material to the layer
    /// keys. Called once the hop has accepted the build.
    pub(super) fn bind_layer_cipher(&mut self) {
        self.decryption = LayerCipher::new(&self.layer_iv_key, self.layer_key.clone());
    }
}

/// An ordered sequence of hops, in originator-to-endpoint order.
pub struct TunnelConfig {
    direction: Direction,
    /// The local router's identity hash; inbound tunnels terminate here.
    local: Hash,
    hops: Vec<HopConfig>,
}

impl TunnelConfig {
    /// Configuration for a tunnel we will receive through. `peers` runs from
    /// the inbound gateway to the hop that forwards to us.
    pub fn inbound(peers: Vec<RouterInfo>, local: Hash) -> Self {
        let reply = (local.clone(), TunnelId::generate());
        TunnelConfig::assemble(peers, local, Direction::Inbound, reply)
    }

    /// Configuration for a tunnel we will send through, replying into the
    /// gateway of `reply_path`.
    pub fn outbound(peers: Vec<RouterInfo>, local: Hash, reply_path: &TunnelConfig) -> Self {
        let reply = reply_path.gateway();
        TunnelConfig::assemble(peers, local, Direction::Outbound, reply)
    }

    fn assemble(
        peers: Vec<RouterInfo>,
        local: Hash,
        direction: Direction,
        last_next: (Hash, TunnelId),
    ) -> Self {
        assert!(!peers.is_empty(), "a tunnel has at least one hop");

        let mut hops: Vec<HopConfig> = peers.into_iter().map(HopConfig::new).collect();
        let n = hops.len();
        for i in 0..n - 1 {
            hops[i].next_router = hops[i + 1].router.hash();
            hops[i].next_tunnel_id = hops[i + 1].tunnel_id;
        }
        hops[n - 1].next_router = last_next.0;
        hops[n - 1].next_tunnel_id = last_next.1;
        hops[0].is_gateway = true;
        hops[n - 1].is_endpoint = true;

        TunnelConfig {
            direction,
            local,
            hops,
        }
    }

    /// A configuration for the opposite direction through the same peers:
    /// reversed order, fresh tunnel IDs and keys.
    ///
    /// Inverting an inbound tunnel yields the outbound path whose replies
    /// route into this tunnel's gateway; inverting an outbound tunnel yields
    /// the inbound path back to us.
    pub fn invert(&self) -> TunnelConfig {
        let peers: Vec<RouterInfo> = self.hops.iter().rev().map(|h| h.router.clone()).collect();
        match self.direction {
            Direction::Inbound => TunnelConfig::assemble(
                peers,
                self.local.clone(),
                Direction::Outbound,
                self.gateway(),
            ),
            Direction::Outbound => {
                let reply = (self.local.clone(), TunnelId::generate());
                TunnelConfig::assemble(peers, self.local.clone(), Direction::Inbound, reply)
            }
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn num_hops(&self) -> usize {
        self.hops.len()
    }

    pub fn hops(&self) -> &[HopConfig] {
        &self.hops
    }

    pub(super) fn hops_mut(&mut self) -> &mut [HopConfig] {
        &mut self.hops
    }

    /// The entry point of this tunnel: the first hop's router and the ID it
    /// receives on.
    pub fn gateway(&self) -> (Hash, TunnelId) {
        let first = &self.hops[0];
        (first.router.hash(), first.tunnel_id)
    }

    /// The ID the local router receives frames on; meaningful for inbound
    /// tunnels, whose terminal hop forwards to us under this ID.
    pub fn receive_tunnel_id(&self) -> TunnelId {
        self.hops[self.hops.len() - 1].next_tunnel_id
    }

    /// The wire-level role of the hop at `index`.
    ///
    /// The originator itself never has a build record, so inbound tunnels
    /// flag their first hop as the gateway and outbound tunnels flag their
    /// last hop as the endpoint; every other hop is an intermediate.
    pub(super) fn hop_type(&self, index: usize) -> ParticipantType {
        match self.direction {
            Direction::Inbound if self.hops[index].is_gateway => ParticipantType::InboundGateway,
            Direction::Outbound if self.hops[index].is_endpoint => {
                ParticipantType::OutboundEndpoint
            }
            _ => ParticipantType::Intermediate,
        }
    }
}
