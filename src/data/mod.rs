//! Core data types used across the engine.

use data_encoding::BASE32;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::crypto::{
    EncType, PrivateKey, PublicKey, SigType, Signature, SigningPrivateKey, SigningPublicKey,
};
use crate::util;

pub(crate) mod frame;

//
// Simple data types
//

/// A SHA-256 digest, usually of a router identity.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn from_bytes(buf: &[u8; 32]) -> Self {
        let mut x = [0u8; 32];
        x.copy_from_slice(buf);
        Hash(x)
    }

    pub fn digest(buf: &[u8]) -> Self {
        let hash = Sha256::digest(buf);
        Hash::from_bytes(array_ref![hash.as_slice(), 0, 32])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE32.encode(&self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

/// The ID of a tunnel at a particular hop. Local to each hop's inbound side.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TunnelId(pub u32);

impl TunnelId {
    /// A fresh random tunnel ID.
    pub fn generate() -> Self {
        TunnelId(OsRng.gen())
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The number of milliseconds since midnight on January 1, 1970 in the GMT
/// timezone. If the number is 0, the date is undefined or null.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct I2PDate(pub u64);

impl I2PDate {
    pub fn from_system_time(t: SystemTime) -> Self {
        let d = t
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::new(0, 0));
        I2PDate(d.as_secs() * 1_000 + u64::from(d.subsec_millis()))
    }

    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.0)
    }
}

//
// Router identities
//

/// The public identity of a router: its encryption and signing keys.
///
/// Build request records are ElGamal-encrypted to the identity's public key;
/// the SHA-256 hash of the serialized identity is the router's address on
/// the network.
#[derive(Clone, Debug)]
pub struct RouterIdentity {
    pub public_key: PublicKey,
    padding: Vec<u8>,
    pub signing_key: SigningPublicKey,
}

impl RouterIdentity {
    fn from_secrets(private_key: &PrivateKey, signing_private_key: &SigningPrivateKey) -> Self {
        let public_key = PublicKey::from_secret(private_key);
        let signing_key = SigningPublicKey::from_secret(signing_private_key);
        let padding = {
            let mut rng = OsRng;
            let mut padding = vec![0u8; SigType::Ed25519.pad_len(EncType::ElGamal2048)];
            rng.fill(&mut padding[..]);
            padding
        };
        RouterIdentity {
            public_key,
            padding,
            signing_key,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        util::serialize(frame::gen_router_identity(self))
    }

    pub fn hash(&self) -> Hash {
        Hash::digest(&self.to_bytes()[..])
    }
}

/// The secret counterpart of a [`RouterIdentity`].
pub struct RouterSecretKeys {
    pub rid: RouterIdentity,
    pub private_key: PrivateKey,
    pub signing_private_key: SigningPrivateKey,
}

impl RouterSecretKeys {
    pub fn new() -> Self {
        let private_key = PrivateKey::new();
        let signing_private_key = SigningPrivateKey::new();
        RouterSecretKeys {
            rid: RouterIdentity::from_secrets(&private_key, &signing_private_key),
            private_key,
            signing_private_key,
        }
    }
}

impl Default for RouterSecretKeys {
    fn default() -> Self {
        RouterSecretKeys::new()
    }
}

/// A published router record: identity plus publish date, signed.
#[derive(Clone, Debug)]
pub struct RouterInfo {
    pub router_id: RouterIdentity,
    pub(crate) published: I2PDate,
    signature: Option<Signature>,
}

impl RouterInfo {
    pub fn new(rid: RouterIdentity) -> Self {
        RouterInfo {
            router_id: rid,
            published: I2PDate::from_system_time(SystemTime::now()),
            signature: None,
        }
    }

    pub fn hash(&self) -> Hash {
        self.router_id.hash()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        util::serialize(frame::gen_router_info(self))
    }

    fn signature_bytes(&self) -> Vec<u8> {
        util::serialize(frame::gen_router_info_minus_sig(self))
    }

    pub fn sign(&mut self, spk: &SigningPrivateKey) {
        let sig_msg = self.signature_bytes();
        self.signature = Some(spk.sign(&sig_msg));
    }

    pub fn verify(&self) -> Result<(), crate::crypto::Error> {
        match self.signature.as_ref() {
            Some(s) => {
                let sig_msg = self.signature_bytes();
                self.router_id.signing_key.verify(&sig_msg, s)
            }
            None => Err(crate::crypto::Error::InvalidSignature),
        }
    }
}

impl PartialEq for RouterInfo {
    fn eq(&self, other: &Self) -> bool {
        self.router_id.hash() == other.router_id.hash()
    }
}
