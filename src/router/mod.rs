//! Router-level state shared with the tunnel engine.

use crate::data::{Hash, RouterInfo, RouterSecretKeys};

pub mod mock;
pub mod types;

/// The local router's long-lived state: its secret keys and published
/// RouterInfo.
pub struct Context {
    pub keys: RouterSecretKeys,
    router_info: RouterInfo,
}

impl Context {
    pub fn new() -> Self {
        let keys = RouterSecretKeys::new();
        let mut router_info = RouterInfo::new(keys.rid.clone());
        router_info.sign(&keys.signing_private_key);
        Context { keys, router_info }
    }

    /// Our identity hash.
    pub fn hash(&self) -> Hash {
        self.keys.rid.hash()
    }

    /// Our own RouterInfo, for use as a tunnel hop.
    pub fn router_info(&self) -> &RouterInfo {
        &self.router_info
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
