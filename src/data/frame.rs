use cookie_factory::{
    bytes::{be_u16 as gen_be_u16, be_u32 as gen_be_u32, be_u64 as gen_be_u64, be_u8 as gen_be_u8},
    combinator::slice as gen_slice,
    sequence::tuple as gen_tuple,
    SerializeFn,
};
use nom::{
    bytes::streaming::take,
    combinator::{map, verify},
    number::streaming::{be_u16, be_u32, be_u64, be_u8},
    sequence::pair,
    IResult,
};
use std::convert::TryInto;
use std::io::Write;

use super::{Hash, I2PDate, RouterIdentity, RouterInfo, TunnelId};
use crate::constants;
use crate::crypto::{
    frame::{
        enc_type, gen_enc_type, gen_public_key, gen_sig_type, gen_signature, gen_signing_key,
        public_key, sig_type, signature, signing_key,
    },
    EncType, SigType,
};

//
// Simple data types
//

pub fn hash(i: &[u8]) -> IResult<&[u8], Hash> {
    map(take(32usize), |h: &[u8]| {
        Hash::from_bytes(h.try_into().unwrap())
    })(i)
}

pub fn gen_hash<'a, W: 'a + Write>(h: &'a Hash) -> impl SerializeFn<W> + 'a {
    gen_slice(&h.0)
}

pub fn tunnel_id(i: &[u8]) -> IResult<&[u8], TunnelId> {
    map(be_u32, TunnelId)(i)
}

pub fn gen_tunnel_id<W: Write>(tid: &TunnelId) -> impl SerializeFn<W> {
    gen_be_u32(tid.0)
}

pub fn i2p_date(i: &[u8]) -> IResult<&[u8], I2PDate> {
    map(be_u64, I2PDate)(i)
}

pub fn gen_i2p_date<W: Write>(date: &I2PDate) -> impl SerializeFn<W> {
    gen_be_u64(date.0)
}

//
// Router identities
//

fn key_certificate(i: &[u8]) -> IResult<&[u8], (SigType, EncType)> {
    let (i, _) = verify(be_u8, |c| *c == constants::KEY_CERT)(i)?;
    let (i, _) = verify(be_u16, |len| *len == 4)(i)?;
    pair(sig_type, enc_type)(i)
}

fn gen_key_certificate<W: Write>() -> impl SerializeFn<W> {
    gen_tuple((
        gen_be_u8(constants::KEY_CERT),
        gen_be_u16(4),
        gen_sig_type(SigType::Ed25519),
        gen_enc_type(EncType::ElGamal2048),
    ))
}

pub fn router_identity(i: &[u8]) -> IResult<&[u8], RouterIdentity> {
    let (i, public_key) = public_key(i)?;
    let (i, padding) = take(SigType::Ed25519.pad_len(EncType::ElGamal2048))(i)?;
    let (i, signing_key) = signing_key(i)?;
    let (i, _) = key_certificate(i)?;
    Ok((
        i,
        RouterIdentity {
            public_key,
            padding: padding.to_vec(),
            signing_key,
        },
    ))
}

pub fn gen_router_identity<'a, W: 'a + Write>(
    rid: &'a RouterIdentity,
) -> impl SerializeFn<W> + 'a {
    gen_tuple((
        gen_public_key(&rid.public_key),
        gen_slice(&rid.padding),
        gen_signing_key(&rid.signing_key),
        gen_key_certificate(),
    ))
}

pub fn router_info(i: &[u8]) -> IResult<&[u8], RouterInfo> {
    let (i, router_id) = router_identity(i)?;
    let (i, published) = i2p_date(i)?;
    let (i, sig) = signature(i)?;
    Ok((
        i,
        RouterInfo {
            router_id,
            published,
            signature: Some(sig),
        },
    ))
}

pub fn gen_router_info_minus_sig<'a, W: 'a + Write>(
    ri: &'a RouterInfo,
) -> impl SerializeFn<W> + 'a {
    gen_tuple((gen_router_identity(&ri.router_id), gen_i2p_date(&ri.published)))
}

pub fn gen_router_info<'a, W: 'a + Write>(ri: &'a RouterInfo) -> impl SerializeFn<W> + 'a {
    move |w: cookie_factory::WriteContext<W>| match ri.signature.as_ref() {
        Some(sig) => gen_tuple((gen_router_info_minus_sig(ri), gen_signature(sig)))(w),
        None => Err(cookie_factory::GenError::CustomError(1)),
    }
}

#[cfg(test)]
mod tests {
    use cookie_factory::gen_simple;

    use super::*;
    use crate::data::RouterSecretKeys;

    #[test]
    fn hash_round_trip() {
        let h = Hash([0x5a; 32]);
        let buf = gen_simple(gen_hash(&h), Vec::new()).unwrap();
        assert_eq!(hash(&buf), Ok((&[][..], h)));
    }

    #[test]
    fn tunnel_id_round_trip() {
        let tid = TunnelId(0xdead_beef);
        let buf = gen_simple(gen_tunnel_id(&tid), Vec::new()).unwrap();
        assert_eq!(buf, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(tunnel_id(&buf), Ok((&[][..], tid)));
    }

    #[test]
    fn router_identity_round_trip() {
        let rid = RouterSecretKeys::new().rid;
        let buf = gen_simple(gen_router_identity(&rid), Vec::new()).unwrap();
        assert_eq!(buf.len(), 391);

        let (rest, parsed) = router_identity(&buf).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.hash(), rid.hash());
    }

    #[test]
    fn unsigned_router_info_does_not_serialize() {
        let ri = RouterInfo::new(RouterSecretKeys::new().rid);
        assert!(gen_simple(gen_router_info(&ri), Vec::new()).is_err());
    }
}
