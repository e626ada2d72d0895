//! ElGamal public-key encryption over the 2048-bit MODP DH group.
//!
//! Original implementation in Java I2P was based on algorithms 8.17 and 8.18
//! specified in section 8.4.1 of the Handbook of Applied Cryptography.

use num_bigint::{BigUint, RandBigInt};
use num_traits::Zero;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::{math::rectify, Error, PrivateKey, PublicKey};
use crate::constants::{ELGAMAL_G, ELGAMAL_P, ELGAMAL_PM1, ELGAMAL_PM2};

/// The data portion of an ElGamal block: one nonzero prefix byte, a SHA-256
/// digest of the payload, then the payload itself.
pub const ELGAMAL_PLAINTEXT_LEN: usize = 222;

const ELGAMAL_BLOCK_LEN: usize = 255;
const ELGAMAL_CIPHERTEXT_LEN: usize = 512;

fn gen_gamma_k() -> (BigUint, BigUint) {
    let mut rng = OsRng;

    // Select a random integer k, 1 <= k <= p - 2
    let k = loop {
        let k = rng.gen_biguint(2048);
        if !k.is_zero() && k <= *ELGAMAL_PM2 {
            break k;
        }
    };

    // γ = α^k mod p
    let gamma = ELGAMAL_G.modpow(&k, &ELGAMAL_P);

    (k, gamma)
}

/// Generates ElGamal keypairs.
pub struct KeyPairGenerator;

impl KeyPairGenerator {
    /// ElGamal key generation, following algorithm 8.17.
    pub fn generate() -> (PrivateKey, PublicKey) {
        // Select a random integer a, 1 <= a <= p - 2
        // Public key is α^a mod p
        let (a, alpha_a) = gen_gamma_k();

        let priv_key = {
            let buf = rectify(&a, 256);
            let mut x = [0u8; 256];
            x.copy_from_slice(&buf[..]);
            PrivateKey(x)
        };

        let pub_key = {
            let buf = rectify(&alpha_a, 256);
            let mut x = [0u8; 256];
            x.copy_from_slice(&buf[..]);
            PublicKey(x)
        };

        (priv_key, pub_key)
    }
}

/// Encrypts short messages to an ElGamal public key.
#[derive(Clone)]
pub struct Encryptor(BigUint);

impl From<&PublicKey> for Encryptor {
    fn from(pub_key: &PublicKey) -> Self {
        Encryptor(BigUint::from_bytes_be(&pub_key.0[..]))
    }
}

impl Encryptor {
    /// ElGamal encryption, following algorithm 8.18 1).
    ///
    /// The message is laid out in a 255-byte block as
    /// `nonzero byte ‖ SHA-256(block[33..255]) ‖ msg ‖ zero padding`
    /// and must be at most [`ELGAMAL_PLAINTEXT_LEN`] bytes.
    pub fn encrypt(&self, msg: &[u8]) -> Result<[u8; ELGAMAL_CIPHERTEXT_LEN], Error> {
        if msg.len() > ELGAMAL_PLAINTEXT_LEN {
            return Err(Error::InvalidMessage);
        }

        let mut block = [0u8; ELGAMAL_BLOCK_LEN];
        let mut rng = OsRng;
        block[0] = loop {
            let b: u8 = rng.gen();
            if b != 0 {
                break b;
            }
        };
        block[33..33 + msg.len()].copy_from_slice(msg);
        let hash = Sha256::digest(&block[33..]);
        block[1..33].copy_from_slice(&hash);

        // m < p is guaranteed: the block is 2040 bits and p has its top bit set
        let m = BigUint::from_bytes_be(&block[..]);

        // γ = α^k mod p, δ = m · (α^a)^k mod p
        let (k, gamma) = gen_gamma_k();
        let delta = (&m * self.0.modpow(&k, &ELGAMAL_P)) % &(*ELGAMAL_P);

        let mut ct = [0u8; ELGAMAL_CIPHERTEXT_LEN];
        ct[..256].copy_from_slice(&rectify(&gamma, 256));
        ct[256..].copy_from_slice(&rectify(&delta, 256));
        Ok(ct)
    }
}

/// Decrypts ElGamal blocks with the matching private key.
#[derive(Clone)]
pub struct Decryptor(BigUint);

impl From<&PrivateKey> for Decryptor {
    fn from(priv_key: &PrivateKey) -> Self {
        Decryptor(BigUint::from_bytes_be(&priv_key.0[..]))
    }
}

impl Decryptor {
    /// ElGamal decryption, following algorithm 8.18 2).
    ///
    /// Returns the full 222-byte payload region; the integrity hash covers
    /// any zero padding the encryptor added.
    pub fn decrypt(
        &self,
        ct: &[u8; ELGAMAL_CIPHERTEXT_LEN],
    ) -> Result<[u8; ELGAMAL_PLAINTEXT_LEN], Error> {
        let gamma = BigUint::from_bytes_be(&ct[..256]);
        let delta = BigUint::from_bytes_be(&ct[256..]);
        if gamma >= *ELGAMAL_P || delta >= *ELGAMAL_P {
            return Err(Error::InvalidCiphertext);
        }

        // m = δ · γ^(p-1-a) mod p
        let exp = &(*ELGAMAL_PM1) - (&self.0 % &(*ELGAMAL_PM1));
        let m = (&delta * gamma.modpow(&exp, &ELGAMAL_P)) % &(*ELGAMAL_P);
        if m.bits() > (ELGAMAL_BLOCK_LEN as u64) * 8 {
            return Err(Error::InvalidCiphertext);
        }

        let block = rectify(&m, ELGAMAL_BLOCK_LEN);
        let hash = Sha256::digest(&block[33..]);
        if block[0] == 0 || hash[..] != block[1..33] {
            return Err(Error::InvalidCiphertext);
        }

        let mut msg = [0u8; ELGAMAL_PLAINTEXT_LEN];
        msg.copy_from_slice(&block[33..]);
        Ok(msg)
    }
}
