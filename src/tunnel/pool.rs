//! Tunnel pools: per-destination sets of tunnels.
//!
//! The replenishment and testing strategies belong to the pool's owning
//! client; the engine only drives the hooks once per management cycle and
//! reports lifecycle events.

use std::sync::Mutex;

use crate::data::{Hash, TunnelId};

#[derive(Default)]
struct PoolStats {
    created: usize,
    expired: usize,
}

/// A set of tunnels owned by one local destination.
pub struct TunnelPool {
    dest: Hash,
    stats: Mutex<PoolStats>,
}

impl TunnelPool {
    pub(super) fn new(dest: Hash) -> Self {
        TunnelPool {
            dest,
            stats: Mutex::new(PoolStats::default()),
        }
    }

    /// The identity hash of the destination this pool serves.
    pub fn dest(&self) -> &Hash {
        &self.dest
    }

    /// A freshly built tunnel was promoted into the live tables.
    pub(super) fn tunnel_created(&self, tid: TunnelId) {
        debug!("Pool {}: tunnel {} created", self.dest, tid);
        self.stats.lock().unwrap().created += 1;
    }

    /// A member tunnel aged out of the live tables.
    pub(super) fn tunnel_expired(&self, tid: TunnelId) {
        debug!("Pool {}: tunnel {} expired", self.dest, tid);
        self.stats.lock().unwrap().expired += 1;
    }

    /// Replenishment hook, invoked once per management cycle.
    pub fn create_tunnels(&self) {
        trace!("Pool {}: create_tunnels", self.dest);
    }

    /// Self-test hook, invoked once per management cycle.
    pub fn test_tunnels(&self) {
        trace!("Pool {}: test_tunnels", self.dest);
    }

    pub fn created_count(&self) -> usize {
        self.stats.lock().unwrap().created
    }

    pub fn expired_count(&self) -> usize {
        self.stats.lock().unwrap().expired
    }
}
