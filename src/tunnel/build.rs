//! Assembly of tunnel build requests and processing of their responses.

use rand::{thread_rng, Rng};

use super::config::TunnelConfig;
use crate::crypto::{elgamal, Aes256Cbc};
use crate::i2np::{
    frame, BuildRequestError, BuildRequestRecord, Message, MessagePayload, BUILD_RECORD_LEN,
    MAX_BUILD_RECORDS,
};
use crate::util;

/// Assemble the variable tunnel build message for `config`.
///
/// The final hop's `send_msg_id` is `reply_msg_id`, correlating the response
/// with the pending build; every other hop gets a fresh random one.
pub(super) fn create_build_request(
    config: &TunnelConfig,
    reply_msg_id: u32,
) -> Result<Message, BuildRequestError> {
    let num_records = config.num_hops();
    if num_records > MAX_BUILD_RECORDS {
        return Err(BuildRequestError::TooManyRecords(num_records));
    }

    let request_time = (util::seconds_since_epoch() / 3600) as u32;
    let mut records: Vec<[u8; BUILD_RECORD_LEN]> = Vec::with_capacity(num_records);
    for (i, hop) in config.hops().iter().enumerate() {
        let record = BuildRequestRecord {
            receive_tid: hop.tunnel_id,
            our_ident: hop.router.hash(),
            next_tid: hop.next_tunnel_id,
            next_ident: hop.next_router.clone(),
            layer_key: hop.layer_key.clone(),
            iv_key: hop.layer_iv_key.clone(),
            reply_key: hop.reply_key.clone(),
            reply_iv: hop.reply_iv,
            hop_type: config.hop_type(i),
            request_time,
            send_msg_id: if i + 1 == num_records {
                reply_msg_id
            } else {
                thread_rng().gen()
            },
        };
        let encryptor = elgamal::Encryptor::from(&hop.router.router_id.public_key);
        records.push(record.encrypt(&encryptor)?);
    }

    // Pre-compensate for the reply-key decryption pass each hop applies to
    // every record after its own while forwarding the request, so that each
    // hop finds its own record still in clean ElGamal form. Records are
    // ciphered independently: the IV restarts at each 528-byte boundary.
    for j in (0..num_records.saturating_sub(1)).rev() {
        let hop = &config.hops()[j];
        for record in records.iter_mut().skip(j + 1) {
            Aes256Cbc::new(&hop.reply_key, &hop.reply_iv).decrypt_blocks(&mut record[..]);
        }
    }

    Ok(Message::from_payload(MessagePayload::VariableTunnelBuild(
        records,
    )))
}

/// Unwrap and evaluate a build response.
///
/// Each hop AES-CBC-encrypted the full response block with its reply key
/// before forwarding back, so the response accumulated nested encryptions in
/// forward order; the unwrap is the mirror, endpoint hop first with the
/// record prefix shrinking by one per peel. Returns whether every hop
/// accepted, rebinding the data-plane ciphers to the layer keys on success.
pub(super) fn process_build_response(
    config: &mut TunnelConfig,
    records: &mut [[u8; BUILD_RECORD_LEN]],
) -> bool {
    if records.len() != config.num_hops() {
        warn!(
            "Build response has {} records for {} hops, dropping",
            records.len(),
            config.num_hops()
        );
        return false;
    }

    let mut num = records.len();
    for hop in config.hops().iter().rev() {
        for record in records.iter_mut().take(num) {
            Aes256Cbc::new(&hop.reply_key, &hop.reply_iv).decrypt_blocks(&mut record[..]);
        }
        num -= 1;
    }

    let mut established = true;
    for (i, record) in records.iter().enumerate() {
        match frame::build_response_record(&record[..]) {
            Ok((_, brr)) => {
                debug!("Build record {} ret code={}", i, brr.reply);
                // If any participant declined, the tunnel is not established
                if brr.reply != 0 {
                    established = false;
                }
            }
            Err(_) => {
                warn!("Malformed build response record {}", i);
                established = false;
            }
        }
    }

    if established {
        // Change reply keys to layer keys
        for hop in config.hops_mut() {
            hop.bind_layer_cipher();
        }
    }
    established
}

/// Layer a set of response records the way the network would: each hop, in
/// forward order, encrypts the records up to and including its own with its
/// reply key.
#[cfg(test)]
pub(crate) fn encode_build_response(
    config: &TunnelConfig,
    replies: &[u8],
) -> Vec<[u8; BUILD_RECORD_LEN]> {
    assert_eq!(replies.len(), config.num_hops());

    let mut records: Vec<[u8; BUILD_RECORD_LEN]> = replies
        .iter()
        .map(|&reply| {
            let buf = util::serialize(frame::gen_build_response_record(
                &crate::i2np::BuildResponseRecord { reply },
            ));
            let mut record = [0u8; BUILD_RECORD_LEN];
            record.copy_from_slice(&buf);
            record
        })
        .collect();

    for (h, hop) in config.hops().iter().enumerate() {
        for record in records.iter_mut().take(h + 1) {
            Aes256Cbc::new(&hop.reply_key, &hop.reply_iv).encrypt_blocks(&mut record[..]);
        }
    }
    records
}
