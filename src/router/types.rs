//! The traits for the various router components.

use std::fmt;

use crate::data::{Hash, RouterInfo};
use crate::i2np::Message;

/// Transport errors
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    NoRoute(Hash),
    Shutdown,
}

#[cfg_attr(tarpaulin, skip)]
impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NoRoute(hash) => write!(f, "No transport route to {}", hash),
            TransportError::Shutdown => "Transport is shut down".fmt(f),
        }
    }
}

/// Sends framed messages to peers by identity hash.
///
/// Implementations own connection management; the tunnel engine only ever
/// hands them a peer hash and a message.
pub trait Transport: Send + Sync {
    fn send(&self, peer: Hash, msg: Message) -> Result<(), TransportError>;
}

/// Handles I2NP messages delivered out of our inbound tunnel endpoints.
pub trait InboundMessageHandler: Send + Sync {
    fn handle(&self, msg: Message);
}

/// Defines the mechanism for interacting with the network database.
pub trait NetworkDatabase: Send + Sync {
    /// Returns the number of RouterInfos that this database contains.
    fn known_routers(&self) -> usize;

    /// Returns a uniformly random router, for tunnel path selection.
    fn get_random_router(&self) -> Option<RouterInfo>;

    /// Stores a RouterInfo locally.
    ///
    /// Returns the RouterInfo that was previously at this key.
    fn store_router_info(
        &self,
        key: Hash,
        ri: RouterInfo,
    ) -> Result<Option<RouterInfo>, crate::netdb::StoreError>;
}
