//! The local network database.

use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::crypto;
use crate::data::{Hash, RouterInfo};
use crate::router::types::NetworkDatabase;

/// Network database store errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    Crypto(crypto::Error),
    InvalidKey,
}

impl From<crypto::Error> for StoreError {
    fn from(e: crypto::Error) -> Self {
        StoreError::Crypto(e)
    }
}

#[cfg_attr(tarpaulin, skip)]
impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Crypto(e) => e.fmt(f),
            StoreError::InvalidKey => "Key does not match RouterInfo's RouterIdentity".fmt(f),
        }
    }
}

/// A NetworkDatabase that never publishes data to the network.
pub struct LocalNetworkDatabase {
    ri_ds: Mutex<HashMap<Hash, RouterInfo>>,
}

impl LocalNetworkDatabase {
    pub fn new() -> Self {
        LocalNetworkDatabase {
            ri_ds: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LocalNetworkDatabase {
    fn default() -> Self {
        LocalNetworkDatabase::new()
    }
}

impl NetworkDatabase for LocalNetworkDatabase {
    fn known_routers(&self) -> usize {
        self.ri_ds.lock().unwrap().len()
    }

    fn get_random_router(&self) -> Option<RouterInfo> {
        let ri_ds = self.ri_ds.lock().unwrap();
        if ri_ds.is_empty() {
            return None;
        }
        let ind = thread_rng().gen_range(0..ri_ds.len());
        ri_ds.values().nth(ind).cloned()
    }

    fn store_router_info(
        &self,
        key: Hash,
        ri: RouterInfo,
    ) -> Result<Option<RouterInfo>, StoreError> {
        // Validate the RouterInfo
        if key != ri.router_id.hash() {
            return Err(StoreError::InvalidKey);
        }
        ri.verify()?;

        debug!("Storing RouterInfo at key {}", key);
        Ok(self.ri_ds.lock().unwrap().insert(key, ri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RouterSecretKeys;

    fn signed_router_info() -> RouterInfo {
        let rsk = RouterSecretKeys::new();
        let mut ri = RouterInfo::new(rsk.rid);
        ri.sign(&rsk.signing_private_key);
        ri
    }

    #[test]
    fn store_and_select() {
        let netdb = LocalNetworkDatabase::new();

        assert_eq!(netdb.known_routers(), 0);
        assert_eq!(netdb.get_random_router(), None);

        let ri = signed_router_info();
        let key = ri.hash();

        // Storing with an invalid key should fail
        assert_eq!(
            netdb.store_router_info(Hash([0u8; 32]), ri.clone()),
            Err(StoreError::InvalidKey)
        );

        // Storing the new RouterInfo should return no data
        assert_eq!(netdb.store_router_info(key.clone(), ri.clone()), Ok(None));
        assert_eq!(netdb.known_routers(), 1);

        // With a single entry, selection is deterministic
        assert_eq!(netdb.get_random_router(), Some(ri));
    }

    #[test]
    fn unsigned_router_info_rejected() {
        let netdb = LocalNetworkDatabase::new();
        let ri = RouterInfo::new(RouterSecretKeys::new().rid);
        assert!(netdb.store_router_info(ri.hash(), ri).is_err());
    }
}
