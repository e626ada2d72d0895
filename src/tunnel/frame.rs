use cookie_factory::{
    bytes::{be_u16 as gen_be_u16, be_u32 as gen_be_u32, be_u8 as gen_be_u8},
    combinator::{back_to_the_buffer, cond as gen_cond, slice as gen_slice},
    gen_simple,
    multi::many_ref as gen_many_ref,
    sequence::{pair as gen_pair, tuple as gen_tuple},
    Seek, SerializeFn, WriteContext,
};
use nom::{
    bits::{bits, streaming::take as take_bits},
    bytes::streaming::{take, take_until},
    combinator::{complete, cond, map, peek},
    error::{Error as NomError, ErrorKind},
    multi::{length_data, many0},
    number::streaming::{be_u16, be_u32},
    sequence::{pair, tuple},
    Err, IResult,
};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use std::io::Write;

use super::{
    FirstFragmentDeliveryInstructions, FollowOnFragmentDeliveryInstructions, TunnelMessage,
    TunnelMessageDeliveryInstructions, TunnelMessageDeliveryType,
};
use crate::data::frame::{gen_hash, gen_tunnel_id, hash, tunnel_id};
use crate::util;

// Checksum

fn checksum(buf: &[u8], iv: &[u8]) -> u32 {
    let mut hasher = Sha256::default();
    hasher.update(buf);
    hasher.update(iv);
    let mut cs = [0; 4];
    cs.copy_from_slice(&hasher.finalize()[0..4]);
    u32::from_be_bytes(cs)
}

fn validate_checksum<'a>(input: &'a [u8], cs: u32, buf: &[u8], iv: &[u8]) -> IResult<&'a [u8], ()> {
    if cs == checksum(buf, iv) {
        Ok((input, ()))
    } else {
        Err(Err::Error(NomError::new(input, ErrorKind::Verify)))
    }
}

// Padding

fn gen_nonzero_padding<W: Write>(length: usize) -> impl SerializeFn<W> {
    let mut rng = OsRng;
    let mut padding = vec![0u8; length];
    for b in padding.iter_mut() {
        while *b == 0 {
            *b = rng.gen();
        }
    }
    gen_slice(padding)
}

// FirstFragmentDeliveryInstructions

const DELIVERY_TYPE_LOCAL: u8 = 0;
const DELIVERY_TYPE_TUNNEL: u8 = 1;
const DELIVERY_TYPE_ROUTER: u8 = 2;

fn first_frag_di(i: &[u8]) -> IResult<&[u8], FirstFragmentDeliveryInstructions> {
    let (i, (delivery_type, fragmented)) = map(
        bits::<_, (u8, u8, u8, u8, u8), NomError<_>, _, _>(tuple((
            take_bits(1u8),
            take_bits(2u8),
            take_bits(1u8),
            take_bits(1u8),
            take_bits(3u8),
        ))),
        |(_, delivery_type, _, fragmented, _)| (delivery_type, fragmented > 0),
    )(i)?;

    let (i, delivery_type) = match delivery_type {
        DELIVERY_TYPE_LOCAL => Ok((i, TunnelMessageDeliveryType::Local)),
        DELIVERY_TYPE_TUNNEL => map(pair(tunnel_id, hash), |(tid, to)| {
            TunnelMessageDeliveryType::Tunnel(tid, to)
        })(i),
        DELIVERY_TYPE_ROUTER => map(hash, TunnelMessageDeliveryType::Router)(i),
        _ => Err(Err::Error(NomError::new(i, ErrorKind::Char))),
    }?;

    let (i, msg_id) = cond(fragmented, be_u32)(i)?;

    Ok((
        i,
        FirstFragmentDeliveryInstructions {
            delivery_type,
            msg_id,
        },
    ))
}

fn gen_first_frag_di<'a, W: 'a + Write>(
    di: &'a FirstFragmentDeliveryInstructions,
) -> impl SerializeFn<W> + 'a {
    let mut flags = 0u8;
    flags |= (match di.delivery_type {
        TunnelMessageDeliveryType::Local => DELIVERY_TYPE_LOCAL,
        TunnelMessageDeliveryType::Tunnel(_, _) => DELIVERY_TYPE_TUNNEL,
        TunnelMessageDeliveryType::Router(_) => DELIVERY_TYPE_ROUTER,
    } << 5)
        & 0b110_0000;
    if di.msg_id.is_some() {
        flags |= 0b1000;
    }
    move |w: WriteContext<W>| {
        let msg_id = gen_cond(
            di.msg_id.is_some(),
            gen_be_u32(di.msg_id.unwrap_or_default()),
        );
        match &di.delivery_type {
            TunnelMessageDeliveryType::Local => gen_pair(gen_be_u8(flags), msg_id)(w),
            TunnelMessageDeliveryType::Tunnel(tid, to) => gen_tuple((
                gen_be_u8(flags),
                gen_tunnel_id(tid),
                gen_hash(to),
                msg_id,
            ))(w),
            TunnelMessageDeliveryType::Router(to) => {
                gen_tuple((gen_be_u8(flags), gen_hash(to), msg_id))(w)
            }
        }
    }
}

// FollowOnFragmentDeliveryInstructions

fn follow_on_frag_di(i: &[u8]) -> IResult<&[u8], FollowOnFragmentDeliveryInstructions> {
    map(
        pair(
            map(
                bits::<_, (u8, u8, u8), NomError<_>, _, _>(tuple((
                    take_bits(1u8),
                    take_bits(6u8),
                    take_bits(1u8),
                ))),
                |(_, fragment_number, last_fragment)| (fragment_number, last_fragment > 0),
            ),
            be_u32,
        ),
        |(flags, msg_id)| FollowOnFragmentDeliveryInstructions {
            fragment_number: flags.0,
            last_fragment: flags.1,
            msg_id,
        },
    )(i)
}

fn gen_follow_on_frag_di<'a, W: 'a + Write>(
    di: &FollowOnFragmentDeliveryInstructions,
) -> impl SerializeFn<W> + 'a {
    let mut flags = 0b1000_0000;
    flags |= (di.fragment_number << 1) & 0b0111_1110;
    if di.last_fragment {
        flags |= 0b1;
    }
    gen_pair(gen_be_u8(flags), gen_be_u32(di.msg_id))
}

// TunnelMessageDeliveryInstructions

fn tmdi(i: &[u8]) -> IResult<&[u8], TunnelMessageDeliveryInstructions> {
    let (_, first_bit) =
        peek(bits::<_, u8, NomError<_>, _, _>(take_bits(1u8)))(i)?;
    if first_bit == 0 {
        map(first_frag_di, TunnelMessageDeliveryInstructions::First)(i)
    } else {
        map(follow_on_frag_di, TunnelMessageDeliveryInstructions::FollowOn)(i)
    }
}

fn gen_tmdi<'a, W: 'a + Write>(
    tmdi: &'a TunnelMessageDeliveryInstructions,
) -> impl SerializeFn<W> + 'a {
    move |w: WriteContext<W>| match tmdi {
        TunnelMessageDeliveryInstructions::First(di) => gen_first_frag_di(di)(w),
        TunnelMessageDeliveryInstructions::FollowOn(di) => gen_follow_on_frag_di(di)(w),
    }
}

// TunnelMessage

pub(super) fn tunnel_message(i: &[u8]) -> IResult<&[u8], TunnelMessage<'_>> {
    let (i, iv) = take(16usize)(i)?;
    let (i, cs) = be_u32(i)?;
    let (i, padding) = take_until(&b"\x00"[..])(i)?;
    let (i, _) = take(1usize)(i)?;
    let (i, msg_bytes) = peek(take(1008 - 4 - padding.len() - 1))(i)?;
    let (i, _) = validate_checksum(i, cs, msg_bytes, iv)?;
    let (i, msg) = many0(complete(pair(tmdi, length_data(be_u16))))(i)?;
    Ok((i, TunnelMessage(msg)))
}

fn gen_tmdi_fragment_pair<'a, W: 'a + Write>(
    pair: &'a (TunnelMessageDeliveryInstructions, &'a [u8]),
) -> impl SerializeFn<W> + 'a {
    gen_tuple((
        gen_tmdi(&pair.0),
        gen_be_u16(pair.1.len() as u16),
        gen_slice(pair.1),
    ))
}

pub(super) fn gen_tunnel_message<'a, W: 'a + Seek>(
    iv: &'a [u8; 16],
    tm: &'a TunnelMessage<'_>,
) -> impl SerializeFn<W> + 'a {
    gen_pair(
        gen_slice(&iv[..]),
        back_to_the_buffer(
            4,
            move |buf| {
                let content = util::serialize(gen_many_ref(&tm.0, gen_tmdi_fragment_pair));
                gen_simple(
                    gen_tuple((
                        gen_nonzero_padding(1008 - 4 - 1 - content.len()),
                        gen_be_u8(0),
                        gen_slice(&content),
                    )),
                    buf,
                )
                .map(|w| (w, content))
            },
            move |buf, content| gen_simple(gen_be_u32(checksum(&content, &iv[..])), buf),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Hash, TunnelId};

    macro_rules! bake_and_eat {
        ($oven:expr, $monster:expr, $value:expr, $expected:expr) => {
            let res = util::serialize($oven(&$value));
            assert_eq!(&res, &$expected);
            match $monster(&res) {
                Ok((_, m)) => assert_eq!(m, $value),
                Err(e) => panic!("Unexpected error: {:?}", e),
            }
        };
    }

    #[test]
    fn test_validate_checksum() {
        let a = b"payloadspam";
        let iv = [0; 16];
        assert_eq!(
            validate_checksum(&a[..], 0xfc82_13b7, &a[..7], &iv[..]),
            Ok((&a[..], ()))
        );
        assert_eq!(
            validate_checksum(&a[..], 0xfc82_13b7, &a[..8], &iv[..]),
            Err(Err::Error(NomError::new(&a[..], ErrorKind::Verify)))
        );
    }

    #[test]
    fn test_first_frag_di() {
        macro_rules! eval {
            ($value:expr, $expected:expr) => {
                bake_and_eat!(gen_first_frag_di, first_frag_di, $value, $expected)
            };
        }

        eval!(
            FirstFragmentDeliveryInstructions {
                delivery_type: TunnelMessageDeliveryType::Local,
                msg_id: None,
            },
            [0]
        );

        eval!(
            FirstFragmentDeliveryInstructions {
                delivery_type: TunnelMessageDeliveryType::Local,
                msg_id: Some(123_456_789),
            },
            [0x08, 0x07, 0x5b, 0xcd, 0x15]
        );

        let mut tunnel_delivery = vec![0x28u8];
        tunnel_delivery.extend_from_slice(&[0, 0, 0, 42]);
        tunnel_delivery.extend_from_slice(&[7; 32]);
        tunnel_delivery.extend_from_slice(&[0x07, 0x5b, 0xcd, 0x15]);
        eval!(
            FirstFragmentDeliveryInstructions {
                delivery_type: TunnelMessageDeliveryType::Tunnel(TunnelId(42), Hash([7; 32])),
                msg_id: Some(123_456_789),
            },
            tunnel_delivery[..]
        );

        let mut router_delivery = vec![0x40u8];
        router_delivery.extend_from_slice(&[9; 32]);
        eval!(
            FirstFragmentDeliveryInstructions {
                delivery_type: TunnelMessageDeliveryType::Router(Hash([9; 32])),
                msg_id: None,
            },
            router_delivery[..]
        );
    }

    #[test]
    fn test_follow_on_frag_di() {
        macro_rules! eval {
            ($value:expr, $expected:expr) => {
                bake_and_eat!(gen_follow_on_frag_di, follow_on_frag_di, $value, $expected)
            };
        }

        eval!(
            FollowOnFragmentDeliveryInstructions {
                fragment_number: 1,
                last_fragment: false,
                msg_id: 123_456_789,
            },
            [0x82, 0x07, 0x5b, 0xcd, 0x15]
        );

        eval!(
            FollowOnFragmentDeliveryInstructions {
                fragment_number: 37,
                last_fragment: true,
                msg_id: 123_456_789,
            },
            [0xcb, 0x07, 0x5b, 0xcd, 0x15]
        );
    }

    #[test]
    fn test_tunnel_message() {
        let iv = [0xaa; 16];

        macro_rules! eval {
            ($value:expr, $expected:expr) => {
                let res = util::serialize(gen_tunnel_message(&iv, &$value));
                assert_eq!(res.len(), 1024);
                // IV
                assert_eq!(&res[0..16], &iv[..]);
                // Non-zero padding
                res[20..1024 - $value.byte_len() - 1]
                    .iter()
                    .for_each(|b| assert!(*b != 0));
                // Zero byte
                assert_eq!(res[1024 - $value.byte_len() - 1], 0);
                // Expected content
                assert_eq!(&res[1024 - $value.byte_len()..], &$expected[..]);
                match tunnel_message(&res) {
                    Ok((_, m)) => assert_eq!(m, $value),
                    Err(e) => panic!("Unexpected error: {:?}", e),
                }
            };
        }

        eval!(
            TunnelMessage(vec![
                (
                    TunnelMessageDeliveryInstructions::First(FirstFragmentDeliveryInstructions {
                        delivery_type: TunnelMessageDeliveryType::Local,
                        msg_id: Some(123_456_789),
                    }),
                    &[0x12, 0x34, 0x56, 0x78][..]
                ),
                (
                    TunnelMessageDeliveryInstructions::FollowOn(
                        FollowOnFragmentDeliveryInstructions {
                            fragment_number: 1,
                            last_fragment: false,
                            msg_id: 123_456_789,
                        }
                    ),
                    &[0x9a, 0xbc, 0xde][..]
                )
            ]),
            [
                0x08, 0x07, 0x5b, 0xcd, 0x15, 0x00, 0x04, 0x12, 0x34, 0x56, 0x78, 0x82, 0x07,
                0x5b, 0xcd, 0x15, 0x00, 0x03, 0x9a, 0xbc, 0xde
            ]
        );

        eval!(
            TunnelMessage(vec![(
                TunnelMessageDeliveryInstructions::First(FirstFragmentDeliveryInstructions {
                    delivery_type: TunnelMessageDeliveryType::Local,
                    msg_id: None,
                }),
                &[0xff, 0xff, 0xff, 0xff, 0xff][..]
            )]),
            [0x00, 0x00, 0x05, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_tunnel_message_corrupt_checksum() {
        let iv = [0x11; 16];
        let tm = TunnelMessage(vec![(
            TunnelMessageDeliveryInstructions::First(FirstFragmentDeliveryInstructions {
                delivery_type: TunnelMessageDeliveryType::Local,
                msg_id: None,
            }),
            &[1, 2, 3][..]
        )]);
        let mut res = util::serialize(gen_tunnel_message(&iv, &tm));
        res[1023] ^= 0x01;
        assert!(tunnel_message(&res).is_err());
    }
}
