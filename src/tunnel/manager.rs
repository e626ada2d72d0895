//! The tunnel lifecycle manager.
//!
//! A single dedicated worker owns the tunnel tables: it drains the dispatch
//! queue, ages out expired tunnels, abandons unanswered builds, and keeps a
//! steady pool of usable tunnels in each direction. Producers interact with
//! it only through the thread-safe queue and the lock-guarded operations
//! below.

use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{build, InboundTunnel, OutboundTunnel, TransitTunnel, TunnelConfig, TunnelPool};
use crate::data::{Hash, RouterInfo, TunnelId};
use crate::i2np::{Message, MessagePayload};
use crate::router::types::{InboundMessageHandler, NetworkDatabase, Transport};
use crate::router::Context;
use crate::util;

/// How many live tunnels to aim for in each direction.
pub const TUNNEL_POOL_TARGET: usize = 5;

/// Seconds between management passes.
const TUNNEL_MANAGE_INTERVAL: u64 = 15;

/// How long the dispatch loop waits for a message before checking timers.
const QUEUE_POLL_INTERVAL: u64 = 1;

/// First reply message ID handed out. Any sequence that avoids collisions
/// with outstanding builds would do.
const INITIAL_REPLY_MSG_ID: u32 = 555;

enum DispatchItem {
    Data(Message),
    Wake,
}

/// A tunnel awaiting its build response. Ownership moves back out of the
/// pending table when the response arrives or the next sweep abandons it.
pub enum PendingTunnel {
    Inbound(Arc<InboundTunnel>),
    Outbound(Arc<OutboundTunnel>),
}

struct TunnelTables {
    /// Insertion order is kept; selection is random among the live entries.
    outbound: Vec<Arc<OutboundTunnel>>,
    inbound: HashMap<TunnelId, Arc<InboundTunnel>>,
    transit: HashMap<TunnelId, Arc<TransitTunnel>>,
    pending: HashMap<u32, PendingTunnel>,
    pools: HashMap<Hash, Arc<TunnelPool>>,
    exploratory_pool: Option<Hash>,
    next_reply_msg_id: u32,
}

impl TunnelTables {
    fn new() -> Self {
        TunnelTables {
            outbound: Vec::new(),
            inbound: HashMap::new(),
            transit: HashMap::new(),
            pending: HashMap::new(),
            pools: HashMap::new(),
            exploratory_pool: None,
            next_reply_msg_id: INITIAL_REPLY_MSG_ID,
        }
    }
}

struct TunnelManagerInner {
    ctx: Arc<Context>,
    netdb: Arc<dyn NetworkDatabase>,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn InboundMessageHandler>,
    queue_tx: Mutex<Sender<DispatchItem>>,
    queue_rx: Mutex<Option<Receiver<DispatchItem>>>,
    state: Mutex<TunnelTables>,
    running: AtomicBool,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Handle to the tunnel engine. Cheap to clone; every clone drives the same
/// worker and tables.
#[derive(Clone)]
pub struct TunnelManager {
    inner: Arc<TunnelManagerInner>,
}

impl TunnelManager {
    pub fn new(
        ctx: Arc<Context>,
        netdb: Arc<dyn NetworkDatabase>,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn InboundMessageHandler>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel();
        TunnelManager {
            inner: Arc::new(TunnelManagerInner {
                ctx,
                netdb,
                transport,
                handler,
                queue_tx: Mutex::new(queue_tx),
                queue_rx: Mutex::new(Some(queue_rx)),
                state: Mutex::new(TunnelTables::new()),
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Spawn the dedicated worker.
    pub fn start(&self) {
        let queue_rx = match self.inner.queue_rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => {
                warn!("Tunnel manager already started");
                return;
            }
        };
        self.inner.running.store(true, Ordering::Release);
        let inner = self.inner.clone();
        let worker = thread::Builder::new()
            .name("tunnel-manager".to_owned())
            .spawn(move || inner.run(queue_rx))
            .expect("failed to spawn tunnel manager worker");
        *self.inner.worker.lock().unwrap() = Some(worker);
    }

    /// Stop the worker: clear the running flag, wake the queue, join.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        let _ = self.inner.queue_tx.lock().unwrap().send(DispatchItem::Wake);
        if let Some(worker) = self.inner.worker.lock().unwrap().take() {
            if worker.join().is_err() {
                error!("Tunnel manager worker panicked");
            }
        }
    }

    /// Enqueue an inbound tunnel data message. Non-blocking; safe from any
    /// thread.
    pub fn post_tunnel_data(&self, msg: Message) {
        if self
            .inner
            .queue_tx
            .lock()
            .unwrap()
            .send(DispatchItem::Data(msg))
            .is_err()
        {
            warn!("Tunnel manager queue is gone, dropping message");
        }
    }

    /// Consume a tunnel build response (or a request that completed its loop
    /// back to us), correlated by the reply message ID.
    pub fn handle_build_reply(&self, msg: &Message) {
        let mut records = match &msg.payload {
            MessagePayload::VariableTunnelBuild(r)
            | MessagePayload::VariableTunnelBuildReply(r) => r.clone(),
            payload => {
                debug!("Ignoring non-build message: {:?}", payload);
                return;
            }
        };

        match self.get_pending(msg.id) {
            Some(PendingTunnel::Inbound(tunnel)) => {
                if tunnel.core().handle_build_response(&mut records) {
                    info!("Inbound tunnel {} established", tunnel.tunnel_id());
                    let mut state = self.inner.state.lock().unwrap();
                    self.inner.add_inbound(&mut state, tunnel);
                } else {
                    warn!("Inbound tunnel {} build declined", tunnel.tunnel_id());
                }
            }
            Some(PendingTunnel::Outbound(tunnel)) => {
                if tunnel.core().handle_build_response(&mut records) {
                    info!("Outbound tunnel {} established", tunnel.tunnel_id());
                    let mut state = self.inner.state.lock().unwrap();
                    self.inner.add_outbound(&mut state, tunnel);
                } else {
                    warn!("Outbound tunnel {} build declined", tunnel.tunnel_id());
                }
            }
            None => debug!("Build reply {} matches no pending tunnel, dropping", msg.id),
        }
    }

    /// Remove and return the tunnel awaiting this build reply, if any.
    pub fn get_pending(&self, reply_msg_id: u32) -> Option<PendingTunnel> {
        self.inner
            .state
            .lock()
            .unwrap()
            .pending
            .remove(&reply_msg_id)
    }

    pub fn get_inbound(&self, tid: TunnelId) -> Option<Arc<InboundTunnel>> {
        self.inner.state.lock().unwrap().inbound.get(&tid).cloned()
    }

    pub fn get_transit(&self, tid: TunnelId) -> Option<Arc<TransitTunnel>> {
        self.inner.state.lock().unwrap().transit.get(&tid).cloned()
    }

    /// The live inbound tunnel with the least traffic so far, steering load
    /// toward under-used paths. Failed tunnels are skipped.
    pub fn next_inbound(&self) -> Option<Arc<InboundTunnel>> {
        TunnelManagerInner::next_inbound_locked(&self.inner.state.lock().unwrap())
    }

    /// A uniformly random live outbound tunnel. Failed tunnels are skipped.
    pub fn next_outbound(&self) -> Option<Arc<OutboundTunnel>> {
        TunnelManagerInner::next_outbound_locked(&self.inner.state.lock().unwrap())
    }

    pub fn create_pool(&self, dest: Hash) -> Arc<TunnelPool> {
        let pool = Arc::new(TunnelPool::new(dest.clone()));
        self.inner
            .state
            .lock()
            .unwrap()
            .pools
            .insert(dest, pool.clone());
        pool
    }

    pub fn delete_pool(&self, pool: &Arc<TunnelPool>) {
        let mut state = self.inner.state.lock().unwrap();
        state.pools.remove(pool.dest());
        if state.exploratory_pool.as_ref() == Some(pool.dest()) {
            state.exploratory_pool = None;
        }
    }

    /// Register a tunnel another router built through us.
    pub fn add_transit_tunnel(&self, tunnel: TransitTunnel) {
        let mut state = self.inner.state.lock().unwrap();
        state.transit.insert(tunnel.tunnel_id(), Arc::new(tunnel));
    }

    /// Start building an inbound tunnel through `peers` (gateway first).
    pub fn create_inbound_tunnel(&self, peers: Vec<RouterInfo>) -> Arc<InboundTunnel> {
        let mut state = self.inner.state.lock().unwrap();
        self.inner.create_inbound(&mut state, peers)
    }

    /// Start building an outbound tunnel through `peers`, with `reply_path`
    /// as the return route for the build response.
    pub fn create_outbound_tunnel(
        &self,
        peers: Vec<RouterInfo>,
        reply_path: &InboundTunnel,
    ) -> Arc<OutboundTunnel> {
        let mut state = self.inner.state.lock().unwrap();
        let config = TunnelConfig::outbound(
            peers,
            self.inner.ctx.hash(),
            &reply_path.core().config(),
        );
        let tunnel = Arc::new(OutboundTunnel::new(config, self.inner.transport.clone()));
        self.inner
            .build_tunnel(&mut state, PendingTunnel::Outbound(tunnel.clone()), None);
        tunnel
    }

    pub fn inbound_count(&self) -> usize {
        self.inner.state.lock().unwrap().inbound.len()
    }

    pub fn outbound_count(&self) -> usize {
        self.inner.state.lock().unwrap().outbound.len()
    }

    pub fn transit_count(&self) -> usize {
        self.inner.state.lock().unwrap().transit.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().unwrap().pending.len()
    }

    #[cfg(test)]
    pub(crate) fn manage_now(&self) {
        self.inner.manage_tunnels(util::seconds_since_epoch());
    }
}

impl TunnelManagerInner {
    fn run(&self, queue_rx: Receiver<DispatchItem>) {
        // Give the other router components a moment to come up
        thread::sleep(Duration::from_secs(1));

        let mut last_ts = 0;
        while self.running.load(Ordering::Acquire) {
            let iteration = catch_unwind(AssertUnwindSafe(|| {
                match queue_rx.recv_timeout(Duration::from_secs(QUEUE_POLL_INTERVAL)) {
                    Ok(mut item) => loop {
                        if let DispatchItem::Data(msg) = item {
                            self.dispatch(msg);
                        }
                        match queue_rx.try_recv() {
                            Ok(next) => item = next,
                            Err(_) => break,
                        }
                    },
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        self.running.store(false, Ordering::Release);
                    }
                }

                let ts = util::seconds_since_epoch();
                if ts >= last_ts + TUNNEL_MANAGE_INTERVAL {
                    self.manage_tunnels(ts);
                    last_ts = ts;
                }
            }));
            if iteration.is_err() {
                error!("Tunnel manager iteration panicked");
            }
        }
    }

    /// Route one queued message to the tunnel listening on its ID.
    fn dispatch(&self, msg: Message) {
        match msg.payload {
            MessagePayload::TunnelData(td) => {
                let tid = td.tid;
                let (inbound, transit) = {
                    let state = self.state.lock().unwrap();
                    (
                        state.inbound.get(&tid).cloned(),
                        state.transit.get(&tid).cloned(),
                    )
                };
                if let Some(tunnel) = inbound {
                    tunnel.handle_tunnel_data(td);
                } else if let Some(tunnel) = transit {
                    tunnel.handle_tunnel_data(td);
                } else {
                    warn!("Tunnel {} not found, dropping message", tid);
                }
            }
            payload => debug!("Unexpected message on tunnel queue: {:?}", payload),
        }
    }

    fn manage_tunnels(&self, ts: u64) {
        let mut state = self.state.lock().unwrap();

        // Check pending tunnels: anything still here was not responded to
        // within a whole management period and will not be
        for (reply_msg_id, _) in state.pending.drain() {
            warn!(
                "Pending tunnel build request {} has not been responded, deleted",
                reply_msg_id
            );
        }

        self.manage_inbound(&mut state, ts);
        self.manage_outbound(&mut state, ts);
        self.manage_transit(&mut state, ts);
        self.manage_pools(&mut state);
    }

    fn manage_inbound(&self, state: &mut TunnelTables, ts: u64) {
        state.inbound.retain(|tid, tunnel| {
            if tunnel.core().is_expired(ts) {
                info!("Tunnel {} expired", tid);
                if let Some(pool) = tunnel.core().pool() {
                    pool.tunnel_expired(*tid);
                }
                false
            } else {
                true
            }
        });

        if state.inbound.is_empty() {
            info!("Creating zero hops inbound tunnel...");
            self.create_zero_hops_inbound(state);
            if state.exploratory_pool.is_none() {
                let dest = self.ctx.hash();
                state
                    .pools
                    .insert(dest.clone(), Arc::new(TunnelPool::new(dest.clone())));
                state.exploratory_pool = Some(dest);
            }
            return;
        }

        if state.outbound.is_empty() || state.inbound.len() < TUNNEL_POOL_TARGET {
            match self.netdb.get_random_router() {
                Some(peer) if peer.hash() != self.ctx.hash() => {
                    info!("Creating one hop inbound tunnel...");
                    self.create_inbound(state, vec![peer]);
                }
                _ => debug!("No suitable peer for an inbound tunnel"),
            }
        }
    }

    fn manage_outbound(&self, state: &mut TunnelTables, ts: u64) {
        state.outbound.retain(|tunnel| {
            if tunnel.core().is_expired(ts) {
                info!("Tunnel {} expired", tunnel.tunnel_id());
                if let Some(pool) = tunnel.core().pool() {
                    pool.tunnel_expired(tunnel.tunnel_id());
                }
                false
            } else {
                true
            }
        });

        if state.outbound.len() < TUNNEL_POOL_TARGET {
            // An outbound build needs an inbound return path for its response
            let reply_path = match Self::next_inbound_locked(state) {
                Some(tunnel) => tunnel,
                None => return,
            };
            match self.netdb.get_random_router() {
                Some(peer) if peer.hash() != self.ctx.hash() => {
                    info!("Creating one hop outbound tunnel...");
                    let config = TunnelConfig::outbound(
                        vec![peer],
                        self.ctx.hash(),
                        &reply_path.core().config(),
                    );
                    let tunnel = Arc::new(OutboundTunnel::new(config, self.transport.clone()));
                    self.build_tunnel(state, PendingTunnel::Outbound(tunnel), None);
                }
                _ => debug!("No suitable peer for an outbound tunnel"),
            }
        }
    }

    fn manage_transit(&self, state: &mut TunnelTables, ts: u64) {
        state.transit.retain(|tid, tunnel| {
            if tunnel.is_expired(ts) {
                info!("Transit tunnel {} expired", tid);
                false
            } else {
                true
            }
        });
    }

    fn manage_pools(&self, state: &mut TunnelTables) {
        for pool in state.pools.values() {
            pool.create_tunnels();
            pool.test_tunnels();
        }
    }

    /// A degenerate tunnel whose only hop is ourselves. There is nothing to
    /// negotiate, so it goes straight into the live table.
    fn create_zero_hops_inbound(&self, state: &mut TunnelTables) {
        let config = TunnelConfig::inbound(vec![self.ctx.router_info().clone()], self.ctx.hash());
        let tunnel = Arc::new(InboundTunnel::new(config, self.handler.clone()));
        tunnel.core().set_established(true);
        state.inbound.insert(tunnel.tunnel_id(), tunnel);
    }

    fn create_inbound(
        &self,
        state: &mut TunnelTables,
        peers: Vec<RouterInfo>,
    ) -> Arc<InboundTunnel> {
        let config = TunnelConfig::inbound(peers, self.ctx.hash());
        let tunnel = Arc::new(InboundTunnel::new(config, self.handler.clone()));
        self.build_tunnel(state, PendingTunnel::Inbound(tunnel.clone()), None);
        tunnel
    }

    /// Allocate a reply message ID, file the tunnel as pending, and send the
    /// assembled build request to the new tunnel's first hop, through
    /// `via` when a detour through an existing outbound tunnel is wanted.
    fn build_tunnel(
        &self,
        state: &mut TunnelTables,
        tunnel: PendingTunnel,
        via: Option<Arc<OutboundTunnel>>,
    ) {
        let reply_msg_id = state.next_reply_msg_id;
        state.next_reply_msg_id = state.next_reply_msg_id.wrapping_add(1);

        let (request, first_hop) = {
            let config = match &tunnel {
                PendingTunnel::Inbound(t) => t.core().config(),
                PendingTunnel::Outbound(t) => t.core().config(),
            };
            (
                build::create_build_request(&config, reply_msg_id),
                config.gateway().0,
            )
        };

        match request {
            Ok(msg) => {
                state.pending.insert(reply_msg_id, tunnel);
                match via {
                    Some(outbound) => {
                        if let Err(e) =
                            outbound.send_tunnel_data_msg(Some((first_hop, None)), &msg)
                        {
                            error!("Could not send tunnel build request: {}", e);
                        }
                    }
                    None => {
                        if let Err(e) = self.transport.send(first_hop, msg) {
                            error!("Could not send tunnel build request: {}", e);
                        }
                    }
                }
            }
            Err(e) => error!("Could not assemble tunnel build request: {}", e),
        }
    }

    /// Promote a freshly established inbound tunnel. Pool-less tunnels
    /// opportunistically trigger a symmetric outbound build through the
    /// inverted configuration.
    fn add_inbound(&self, state: &mut TunnelTables, tunnel: Arc<InboundTunnel>) {
        state.inbound.insert(tunnel.tunnel_id(), tunnel.clone());
        match tunnel.core().pool() {
            Some(pool) => pool.tunnel_created(tunnel.tunnel_id()),
            None => {
                let config = tunnel.core().config().invert();
                let via = Self::next_outbound_locked(state);
                let outbound = Arc::new(OutboundTunnel::new(config, self.transport.clone()));
                self.build_tunnel(state, PendingTunnel::Outbound(outbound), via);
            }
        }
    }

    fn add_outbound(&self, state: &mut TunnelTables, tunnel: Arc<OutboundTunnel>) {
        state.outbound.push(tunnel.clone());
        if let Some(pool) = tunnel.core().pool() {
            pool.tunnel_created(tunnel.tunnel_id());
        }
    }

    fn next_inbound_locked(state: &TunnelTables) -> Option<Arc<InboundTunnel>> {
        state
            .inbound
            .values()
            .filter(|tunnel| !tunnel.core().is_failed())
            .min_by_key(|tunnel| tunnel.received_bytes())
            .cloned()
    }

    fn next_outbound_locked(state: &TunnelTables) -> Option<Arc<OutboundTunnel>> {
        let candidates: Vec<&Arc<OutboundTunnel>> = state
            .outbound
            .iter()
            .filter(|tunnel| !tunnel.core().is_failed())
            .collect();
        if candidates.is_empty() {
            None
        } else {
            Some(candidates[thread_rng().gen_range(0..candidates.len())].clone())
        }
    }
}
