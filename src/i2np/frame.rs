use cookie_factory::{
    bytes::{be_u16 as gen_be_u16, be_u32 as gen_be_u32, be_u8 as gen_be_u8},
    combinator::{back_to_the_buffer, slice as gen_slice},
    gen_simple,
    multi::many_ref as gen_many_ref,
    sequence::{pair as gen_pair, tuple as gen_tuple},
    SerializeFn, Seek, WriteContext,
};
use nom::{
    bits::{bits, streaming::take as take_bits},
    bytes::streaming::take,
    combinator::{map, map_opt, peek, verify},
    error::{Error as NomError, ErrorKind},
    multi::length_count,
    number::streaming::{be_u16, be_u32, be_u8},
    sequence::{preceded, terminated, tuple},
    Err, IResult,
};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use std::io::Write;

use super::{
    BuildRequestRecord, BuildResponseRecord, Message, MessagePayload, ParticipantType, TunnelData,
    BUILD_RECORD_LEN,
};
use crate::crypto::frame::{gen_session_key, session_key};
use crate::data::frame::{gen_hash, gen_i2p_date, gen_tunnel_id, hash, i2p_date, tunnel_id};
use crate::data::Hash;

//
// Utils
//

fn iv(input: &[u8]) -> IResult<&[u8], [u8; 16]> {
    let (i, iv) = take(16usize)(input)?;
    let mut x = [0u8; 16];
    x.copy_from_slice(iv);
    Ok((i, x))
}

fn build_record(input: &[u8]) -> IResult<&[u8], [u8; BUILD_RECORD_LEN]> {
    let (i, r) = take(BUILD_RECORD_LEN)(input)?;
    let mut x = [0u8; BUILD_RECORD_LEN];
    x.copy_from_slice(r);
    Ok((i, x))
}

//
// Common structures
//

pub fn build_request_record(i: &[u8]) -> IResult<&[u8], BuildRequestRecord> {
    map(
        terminated(
            tuple((
                tunnel_id,
                hash,
                tunnel_id,
                hash,
                session_key,
                session_key,
                session_key,
                iv,
                map(
                    verify(
                        map(
                            bits(terminated(
                                tuple((take_bits(1u8), take_bits(1u8))),
                                take_bits::<_, u8, _, NomError<_>>(6u8),
                            )),
                            |(ibgw, obep): (u8, u8)| (ibgw > 0, obep > 0),
                        ),
                        |(ibgw, obep)| !(*ibgw && *obep),
                    ),
                    |(ibgw, obep)| match (ibgw, obep) {
                        (false, false) => ParticipantType::Intermediate,
                        (true, false) => ParticipantType::InboundGateway,
                        (false, true) => ParticipantType::OutboundEndpoint,
                        (true, true) => unreachable!(),
                    },
                ),
                be_u32,
                be_u32,
            )),
            take(29usize),
        ),
        |(
            receive_tid,
            our_ident,
            next_tid,
            next_ident,
            layer_key,
            iv_key,
            reply_key,
            reply_iv,
            hop_type,
            request_time,
            send_msg_id,
        )| BuildRequestRecord {
            receive_tid,
            our_ident,
            next_tid,
            next_ident,
            layer_key,
            iv_key,
            reply_key,
            reply_iv,
            hop_type,
            request_time,
            send_msg_id,
        },
    )(i)
}

pub fn gen_build_request_record<'a, W: 'a + Write>(
    brr: &'a BuildRequestRecord,
) -> impl SerializeFn<W> + 'a {
    let flags: u8 = match brr.hop_type {
        ParticipantType::Intermediate => 0b0000_0000,
        ParticipantType::InboundGateway => 0b1000_0000,
        ParticipantType::OutboundEndpoint => 0b0100_0000,
    };
    let mut padding = [0; 29];
    let mut rng = OsRng;
    rng.fill(&mut padding[..]);
    move |w: WriteContext<W>| {
        gen_tuple((
            gen_tunnel_id(&brr.receive_tid),
            gen_hash(&brr.our_ident),
            gen_tunnel_id(&brr.next_tid),
            gen_hash(&brr.next_ident),
            gen_session_key(&brr.layer_key),
            gen_session_key(&brr.iv_key),
            gen_session_key(&brr.reply_key),
            gen_slice(&brr.reply_iv),
            gen_be_u8(flags),
            gen_be_u32(brr.request_time),
            gen_be_u32(brr.send_msg_id),
            gen_slice(&padding),
        ))(w)
    }
}

fn calculate_build_response_record_hash(padding: &[u8], reply: u8) -> [u8; 32] {
    let mut hasher = Sha256::default();
    hasher.update(padding);
    hasher.update([reply]);
    hasher.finalize().into()
}

pub fn build_response_record(i: &[u8]) -> IResult<&[u8], BuildResponseRecord> {
    map_opt(
        tuple((hash, take(495usize), be_u8)),
        |(hash, padding, reply)| {
            let res = calculate_build_response_record_hash(padding, reply);
            if hash.eq(&Hash::from_bytes(&res)) {
                Some(BuildResponseRecord { reply })
            } else {
                None
            }
        },
    )(i)
}

pub fn gen_build_response_record<'a, W: 'a + Write>(
    brr: &BuildResponseRecord,
) -> impl SerializeFn<W> + 'a {
    let mut padding = vec![0; 495];
    let mut rng = OsRng;
    rng.fill(&mut padding[..]);
    let hash = calculate_build_response_record_hash(&padding, brr.reply);
    let reply = brr.reply;
    gen_tuple((gen_slice(hash), gen_slice(padding), gen_be_u8(reply)))
}

//
// Message payloads
//

// TunnelData

fn tunnel_data(i: &[u8]) -> IResult<&[u8], MessagePayload> {
    map(
        tuple((tunnel_id, take(1024usize))),
        |(tid, data): (_, &[u8])| {
            MessagePayload::TunnelData(TunnelData::from(tid, array_ref![data, 0, 1024]))
        },
    )(i)
}

fn gen_tunnel_data<'a, W: 'a + Write>(td: &'a TunnelData) -> impl SerializeFn<W> + 'a {
    gen_pair(gen_tunnel_id(&td.tid), gen_slice(&td.data[..]))
}

// Data

fn data(i: &[u8]) -> IResult<&[u8], MessagePayload> {
    map(nom::multi::length_data(be_u32), |d: &[u8]| {
        MessagePayload::Data(Vec::from(d))
    })(i)
}

fn gen_data<'a, W: 'a + Write>(d: &'a [u8]) -> impl SerializeFn<W> + 'a {
    gen_pair(gen_be_u32(d.len() as u32), gen_slice(d))
}

// VariableTunnelBuild

fn variable_tunnel_build(i: &[u8]) -> IResult<&[u8], MessagePayload> {
    map(length_count(be_u8, build_record), |r| {
        MessagePayload::VariableTunnelBuild(r)
    })(i)
}

fn gen_variable_tunnel_build<'a, W: 'a + Write>(
    tb: &'a [[u8; BUILD_RECORD_LEN]],
) -> impl SerializeFn<W> + 'a {
    gen_pair(
        gen_be_u8(tb.len() as u8),
        gen_many_ref(tb, |r| gen_slice(&r[..])),
    )
}

// VariableTunnelBuildReply

fn variable_tunnel_build_reply(i: &[u8]) -> IResult<&[u8], MessagePayload> {
    map(length_count(be_u8, build_record), |r| {
        MessagePayload::VariableTunnelBuildReply(r)
    })(i)
}

fn gen_variable_tunnel_build_reply<'a, W: 'a + Write>(
    tbr: &'a [[u8; BUILD_RECORD_LEN]],
) -> impl SerializeFn<W> + 'a {
    gen_pair(
        gen_be_u8(tbr.len() as u8),
        gen_many_ref(tbr, |r| gen_slice(&r[..])),
    )
}

//
// Message framing
//

fn checksum(buf: &[u8]) -> u8 {
    Sha256::digest(buf)[0]
}

fn gen_checksum<W: Write>(content: &[u8]) -> impl SerializeFn<W> {
    gen_be_u8(checksum(content))
}

fn header(i: &[u8]) -> IResult<&[u8], (u8, u32, crate::data::I2PDate, u16, u8)> {
    // (msg_type, msg_id, expiration, size, cs)
    tuple((be_u8, be_u32, i2p_date, be_u16, be_u8))(i)
}

fn payload(msg_type: u8) -> impl Fn(&[u8]) -> IResult<&[u8], MessagePayload> {
    move |i: &[u8]| match msg_type {
        18 => tunnel_data(i),
        20 => data(i),
        23 => variable_tunnel_build(i),
        24 => variable_tunnel_build_reply(i),
        _ => Err(Err::Error(NomError::new(i, ErrorKind::Switch))),
    }
}

pub fn message(i: &[u8]) -> IResult<&[u8], Message> {
    let (i, (msg_type, id, expiration, size, cs)) = header(i)?;
    map(
        preceded(
            peek(verify(take(size), move |buf: &[u8]| checksum(buf) == cs)),
            payload(msg_type),
        ),
        move |payload| Message {
            id,
            expiration,
            payload,
        },
    )(i)
}

fn gen_message_type<'a, W: 'a + Write>(msg: &Message) -> impl SerializeFn<W> + 'a {
    let msg_type = match msg.payload {
        MessagePayload::TunnelData(_) => 18,
        MessagePayload::Data(_) => 20,
        MessagePayload::VariableTunnelBuild(_) => 23,
        MessagePayload::VariableTunnelBuildReply(_) => 24,
    };
    gen_be_u8(msg_type)
}

fn gen_payload<'a, W: 'a + Seek>(payload: &'a MessagePayload) -> impl SerializeFn<W> + 'a {
    move |w: WriteContext<W>| match payload {
        MessagePayload::Data(d) => gen_data(d)(w),
        MessagePayload::TunnelData(td) => gen_tunnel_data(td)(w),
        MessagePayload::VariableTunnelBuild(vtb) => gen_variable_tunnel_build(vtb)(w),
        MessagePayload::VariableTunnelBuildReply(vtbr) => {
            gen_variable_tunnel_build_reply(vtbr)(w)
        }
    }
}

pub fn gen_message<'a, W: 'a + Seek>(msg: &'a Message) -> impl SerializeFn<W> + 'a {
    gen_tuple((
        gen_message_type(msg),
        gen_be_u32(msg.id),
        gen_i2p_date(&msg.expiration),
        back_to_the_buffer(
            3,
            move |buf| {
                let content = crate::util::serialize(gen_payload(&msg.payload));
                gen_simple(gen_slice(&content), buf).map(|w| (w, content))
            },
            move |buf, content| {
                gen_simple(
                    gen_pair(gen_be_u16(content.len() as u16), gen_checksum(&content)),
                    buf,
                )
            },
        ),
    ))
}
