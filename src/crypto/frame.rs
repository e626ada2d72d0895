use cookie_factory::{combinator::slice as gen_slice, SerializeFn};
use nom::{
    bytes::streaming::take,
    combinator::{map, map_opt, map_res},
    number::streaming::be_u16,
    IResult,
};
use std::convert::TryInto;
use std::io::Write;

use crate::constants;
use crate::crypto::{EncType, PublicKey, SessionKey, SigType, Signature, SigningPublicKey};

pub fn sig_type(i: &[u8]) -> IResult<&[u8], SigType> {
    map_opt(be_u16, |sig_type| match sig_type {
        constants::ED25519 => Some(SigType::Ed25519),
        _ => None,
    })(i)
}

pub fn gen_sig_type<W: Write>(sig_type: SigType) -> impl SerializeFn<W> {
    cookie_factory::bytes::be_u16(sig_type.code())
}

pub fn enc_type(i: &[u8]) -> IResult<&[u8], EncType> {
    map_opt(be_u16, |enc_type| match enc_type {
        constants::ELGAMAL2048 => Some(EncType::ElGamal2048),
        _ => None,
    })(i)
}

pub fn gen_enc_type<W: Write>(enc_type: EncType) -> impl SerializeFn<W> {
    cookie_factory::bytes::be_u16(enc_type.code())
}

pub fn session_key(i: &[u8]) -> IResult<&[u8], SessionKey> {
    map(take(32usize), |k: &[u8]| {
        SessionKey::from_bytes(k.try_into().unwrap())
    })(i)
}

pub fn gen_session_key<'a, W: 'a + Write>(k: &'a SessionKey) -> impl SerializeFn<W> + 'a {
    gen_slice(&k.0)
}

pub fn public_key(i: &[u8]) -> IResult<&[u8], PublicKey> {
    map(take(256usize), |k: &[u8]| {
        PublicKey::from_bytes(k.try_into().unwrap())
    })(i)
}

pub fn gen_public_key<'a, W: 'a + Write>(key: &'a PublicKey) -> impl SerializeFn<W> + 'a {
    gen_slice(&key.0)
}

pub fn signing_key(i: &[u8]) -> IResult<&[u8], SigningPublicKey> {
    map_res(take(SigType::Ed25519.pubkey_len()), SigningPublicKey::from_bytes)(i)
}

pub fn gen_signing_key<'a, W: 'a + Write>(key: &'a SigningPublicKey) -> impl SerializeFn<W> + 'a {
    gen_slice(key.as_bytes())
}

pub fn signature(i: &[u8]) -> IResult<&[u8], Signature> {
    map_res(take(SigType::Ed25519.sig_len()), Signature::from_bytes)(i)
}

pub fn gen_signature<'a, W: 'a + Write>(sig: &Signature) -> impl SerializeFn<W> + 'a {
    gen_slice(sig.to_bytes())
}

#[cfg(test)]
mod tests {
    use cookie_factory::gen_simple;

    use super::*;

    #[test]
    fn session_key_round_trip() {
        let k = SessionKey([0xab; 32]);
        let buf = gen_simple(gen_session_key(&k), Vec::new()).unwrap();
        assert_eq!(buf.len(), 32);
        let (rest, k2) = session_key(&buf).unwrap();
        assert!(rest.is_empty());
        assert_eq!(k2, k);
    }
}
