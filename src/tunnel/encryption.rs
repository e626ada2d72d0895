//! Tunnel encryption operations.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};

use crate::crypto::{SessionKey, AES_BLOCK_SIZE};
use crate::i2np::TunnelData;

/// Per-hop cipher for the 1024-byte region of a tunnel frame.
///
/// A frame opens with a 16-byte IV that is masked with AES-256/ECB under the
/// hop's IV key on both sides of the payload pass, so neighbouring hops never
/// observe the same IV bytes. In between, the masked IV seeds an
/// AES-256-CBC pass over the remaining 1008 bytes under the layer key.
///
/// Both key schedules are expanded once, at binding time; a tunnel runs the
/// same two keys for its whole lifetime.
#[derive(Clone)]
pub struct LayerCipher {
    iv_cipher: aes::Aes256,
    layer_cipher: aes::Aes256,
}

impl LayerCipher {
    pub fn new(iv_key: &SessionKey, layer_key: SessionKey) -> Self {
        LayerCipher {
            iv_cipher: aes::Aes256::new(GenericArray::from_slice(&iv_key.0)),
            layer_cipher: aes::Aes256::new(GenericArray::from_slice(&layer_key.0)),
        }
    }

    /// The participant direction: add this hop's layer to a [`TunnelData`]
    /// frame as it passes through.
    pub fn encrypt_layer(&self, td: &mut TunnelData) {
        let (iv, payload) = td.data.split_at_mut(AES_BLOCK_SIZE);
        self.iv_cipher
            .encrypt_block(GenericArray::from_mut_slice(iv));

        let mut chain = *array_ref![iv, 0, AES_BLOCK_SIZE];
        for block in payload.chunks_exact_mut(AES_BLOCK_SIZE) {
            for (b, c) in block.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            self.layer_cipher
                .encrypt_block(GenericArray::from_mut_slice(block));
            chain.copy_from_slice(block);
        }

        self.iv_cipher
            .encrypt_block(GenericArray::from_mut_slice(iv));
    }

    /// The originator direction: the exact inverse, applied once per hop
    /// when wrapping an outgoing frame or unwrapping a received one.
    pub fn decrypt_layer(&self, td: &mut TunnelData) {
        let (iv, payload) = td.data.split_at_mut(AES_BLOCK_SIZE);
        self.iv_cipher
            .decrypt_block(GenericArray::from_mut_slice(iv));

        let mut chain = *array_ref![iv, 0, AES_BLOCK_SIZE];
        for block in payload.chunks_exact_mut(AES_BLOCK_SIZE) {
            let ciphertext = *array_ref![block, 0, AES_BLOCK_SIZE];
            self.layer_cipher
                .decrypt_block(GenericArray::from_mut_slice(block));
            for (b, c) in block.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            chain = ciphertext;
        }

        self.iv_cipher
            .decrypt_block(GenericArray::from_mut_slice(iv));
    }

    /// Whether the payload pass runs under `key`, checked by comparing one
    /// block of keystream rather than keeping raw key bytes around.
    #[cfg(test)]
    pub(crate) fn is_bound_to(&self, key: &SessionKey) -> bool {
        let mut ours = GenericArray::from([0u8; AES_BLOCK_SIZE]);
        let mut theirs = ours;
        self.layer_cipher.encrypt_block(&mut ours);
        aes::Aes256::new(GenericArray::from_slice(&key.0)).encrypt_block(&mut theirs);
        ours == theirs
    }
}

#[cfg(test)]
mod tests {
    use super::LayerCipher;
    use crate::crypto::SessionKey;
    use crate::data::TunnelId;
    use crate::i2np::TunnelData;

    fn patterned_frame() -> TunnelData {
        let mut data = [0u8; 1024];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }
        TunnelData {
            tid: TunnelId(1234),
            data,
        }
    }

    #[test]
    fn layer_is_invertible_in_both_orders() {
        let cipher = LayerCipher::new(&SessionKey([1; 32]), SessionKey([2; 32]));
        let reference = patterned_frame();

        // Participant adds a layer, originator removes it
        let mut td = patterned_frame();
        cipher.encrypt_layer(&mut td);
        assert!(td.data[..] != reference.data[..]);
        cipher.decrypt_layer(&mut td);
        assert_eq!(&td.data[..], &reference.data[..]);

        // Originator pre-wraps, participant peels
        cipher.decrypt_layer(&mut td);
        assert!(td.data[..] != reference.data[..]);
        cipher.encrypt_layer(&mut td);
        assert_eq!(&td.data[..], &reference.data[..]);
    }

    #[test]
    fn iv_changes_at_every_hop() {
        let cipher = LayerCipher::new(&SessionKey([1; 32]), SessionKey([2; 32]));
        let mut td = patterned_frame();
        let iv_before: Vec<u8> = td.data[..16].to_vec();
        cipher.encrypt_layer(&mut td);
        assert_ne!(&td.data[..16], &iv_before[..]);
    }

    #[test]
    fn layers_commute_with_their_inverse_only() {
        let cipher_a = LayerCipher::new(&SessionKey([1; 32]), SessionKey([2; 32]));
        let cipher_b = LayerCipher::new(&SessionKey([3; 32]), SessionKey([4; 32]));

        let mut td = TunnelData {
            tid: TunnelId(1),
            data: [0x5a; 1024],
        };

        cipher_a.decrypt_layer(&mut td);
        cipher_b.decrypt_layer(&mut td);
        cipher_b.encrypt_layer(&mut td);
        cipher_a.encrypt_layer(&mut td);
        assert_eq!(&td.data[..], &[0x5a; 1024][..]);
    }

    #[test]
    fn binding_probe_identifies_layer_key() {
        let layer_key = SessionKey([9; 32]);
        let cipher = LayerCipher::new(&SessionKey([1; 32]), layer_key.clone());
        assert!(cipher.is_bound_to(&layer_key));
        assert!(!cipher.is_bound_to(&SessionKey([1; 32])));
    }
}
