//! Messages passed between routers.
//!
//! The subset of the I2P Network Protocol (I2NP) that the tunnel engine
//! speaks: tunnel data frames, the variable tunnel build exchange, and a
//! generic data payload for endpoints.
//!
//! [I2NP specification](https://geti2p.net/spec/i2np)

use rand::{thread_rng, Rng};
use std::fmt;
use std::time::{Duration, SystemTime};

use crate::crypto::{self, elgamal, SessionKey};
use crate::data::{Hash, I2PDate, TunnelId};
use crate::util;

pub(crate) mod frame;

const MESSAGE_EXPIRATION_MS: u64 = 60 * 1000;

/// The on-the-wire size of one build record, request or response.
pub const BUILD_RECORD_LEN: usize = 528;

/// A variable tunnel build holds between 1 and 8 records.
pub const MAX_BUILD_RECORDS: usize = 8;

/// Errors that can occur while processing a build request record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildRequestError {
    Crypto(crypto::Error),
    InvalidRecord,
    TooManyRecords(usize),
}

impl From<crypto::Error> for BuildRequestError {
    fn from(e: crypto::Error) -> Self {
        BuildRequestError::Crypto(e)
    }
}

#[cfg_attr(tarpaulin, skip)]
impl fmt::Display for BuildRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildRequestError::Crypto(e) => e.fmt(f),
            BuildRequestError::InvalidRecord => "Malformed build request record".fmt(f),
            BuildRequestError::TooManyRecords(n) => {
                write!(f, "{} records do not fit in a build message", n)
            }
        }
    }
}

/// The role a peer is asked to fill in a tunnel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParticipantType {
    Intermediate,
    InboundGateway,
    OutboundEndpoint,
}

/// One record in a set of multiple records to request the creation of one
/// hop in the tunnel.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildRequestRecord {
    pub receive_tid: TunnelId,
    /// Identity of the peer this record is for. Only the first 16 bytes
    /// travel in clear, as the record's address label.
    pub our_ident: Hash,
    pub next_tid: TunnelId,
    pub next_ident: Hash,
    pub layer_key: SessionKey,
    pub iv_key: SessionKey,
    pub reply_key: SessionKey,
    pub reply_iv: [u8; 16],
    pub hop_type: ParticipantType,
    /// Hours since the epoch.
    pub request_time: u32,
    pub send_msg_id: u32,
}

impl BuildRequestRecord {
    /// ElGamal-encrypt this record to the target peer's public key, in the
    /// 528-byte wire form: 16-byte identity-hash prefix then the 512-byte
    /// ElGamal block.
    pub fn encrypt(
        &self,
        enc: &elgamal::Encryptor,
    ) -> Result<[u8; BUILD_RECORD_LEN], BuildRequestError> {
        let cleartext = util::serialize(frame::gen_build_request_record(self));
        let ct = enc.encrypt(&cleartext)?;

        let mut record = [0u8; BUILD_RECORD_LEN];
        record[..16].copy_from_slice(&self.our_ident.0[..16]);
        record[16..].copy_from_slice(&ct);
        Ok(record)
    }

    /// Decrypt a 528-byte record addressed to us.
    pub fn decrypt(
        record: &[u8; BUILD_RECORD_LEN],
        dec: &elgamal::Decryptor,
    ) -> Result<Self, BuildRequestError> {
        let cleartext = dec.decrypt(array_ref![record, 16, 512])?;
        match frame::build_request_record(&cleartext) {
            Ok((_, brr)) => Ok(brr),
            Err(_) => Err(BuildRequestError::InvalidRecord),
        }
    }
}

/// Reply to a BuildRequestRecord stating whether or not a particular hop
/// agrees to participate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildResponseRecord {
    pub reply: u8,
}

/// A message sent from a tunnel's gateway or participant to the next
/// participant or endpoint. The data is of fixed length, containing I2NP
/// messages that are batched, padded, and encrypted.
#[derive(Clone, Debug)]
pub struct TunnelData {
    pub tid: TunnelId,
    pub data: [u8; 1024],
}

impl TunnelData {
    pub fn from(tid: TunnelId, data: &[u8; 1024]) -> Self {
        let mut x = [0u8; 1024];
        x.copy_from_slice(data);
        TunnelData { tid, data: x }
    }
}

impl PartialEq for TunnelData {
    fn eq(&self, other: &Self) -> bool {
        self.tid == other.tid && self.data[..] == other.data[..]
    }
}

#[derive(PartialEq)]
pub enum MessagePayload {
    /// Arbitrary data, delivered as-is at tunnel endpoints.
    Data(Vec<u8>),
    TunnelData(TunnelData),
    VariableTunnelBuild(Vec<[u8; BUILD_RECORD_LEN]>),
    VariableTunnelBuildReply(Vec<[u8; BUILD_RECORD_LEN]>),
}

impl fmt::Debug for MessagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagePayload::Data(d) => write!(f, "Data ({} bytes)", d.len()),
            MessagePayload::TunnelData(td) => write!(f, "TunnelData (tid: {})", td.tid),
            MessagePayload::VariableTunnelBuild(vtb) => {
                write!(f, "VariableTunnelBuild ({} records)", vtb.len())
            }
            MessagePayload::VariableTunnelBuildReply(vtbr) => {
                write!(f, "VariableTunnelBuildReply ({} records)", vtbr.len())
            }
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Message {
    pub id: u32,
    pub expiration: I2PDate,
    pub payload: MessagePayload,
}

impl Message {
    pub fn from_payload(payload: MessagePayload) -> Self {
        Message {
            id: thread_rng().gen(),
            expiration: I2PDate::from_system_time(
                SystemTime::now() + Duration::from_millis(MESSAGE_EXPIRATION_MS),
            ),
            payload,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        util::serialize(frame::gen_message(self))
    }
}
