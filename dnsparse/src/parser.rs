use std::{convert::TryFrom, net::Ipv4Addr};

use crate::{
    types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, Opcode, QueryType, ResponseCode},
    utils::{escape_label, fqdn},
};
use log::trace;
use nom::{
    bytes::complete::take as take_bytes,
    error::{ErrorKind, ParseError},
    multi::count,
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};

const JUMP_REQUIRED_FLAG: u8 = 0xc0;
const NULL_BYTE: u8 = 0x00;
const MAX_LABEL_LEN: u8 = 0x3f;
// A well formed name never needs more pointers than it has labels; anything past this is a loop.
const MAX_JUMPS: usize = 64;

fn failure<'a, E>(input: &'a [u8], kind: ErrorKind) -> nom::Err<E>
where
    E: ParseError<&'a [u8]>,
{
    nom::Err::Failure(E::from_error_kind(input, kind))
}

fn ipv4<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Ipv4Addr, E>
where
    E: ParseError<&'a [u8]>,
{
    |rest| {
        let (rest, quad0) = be_u8(rest)?;
        let (rest, quad1) = be_u8(rest)?;
        let (rest, quad2) = be_u8(rest)?;
        let (rest, quad3) = be_u8(rest)?;

        Ok((rest, Ipv4Addr::new(quad0, quad1, quad2, quad3)))
    }
}

// Reads a (possibly compressed) name. The remaining input handed back is the one following the
// name at its original position, not wherever the last pointer led.
fn domain_name<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], String, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| {
        let mut labels = Vec::new();
        let mut cursor = input;
        let mut resume = None;
        let mut jumps = 0;

        loop {
            let (rest, len) = be_u8(cursor)?;

            if len == NULL_BYTE {
                let domain = fqdn(&labels);
                trace!("Result: {}", domain);
                return Ok((resume.unwrap_or(rest), domain));
            }

            if len & JUMP_REQUIRED_FLAG == JUMP_REQUIRED_FLAG {
                let (rest, low) = be_u8(rest)?;
                let offset = (((len & !JUMP_REQUIRED_FLAG) as usize) << 8) | low as usize;
                trace!("Jumping to {}", offset);

                jumps += 1;
                if jumps > MAX_JUMPS || offset >= original.len() {
                    return Err(failure(input, ErrorKind::TooLarge));
                }
                if resume.is_none() {
                    resume = Some(rest);
                }
                cursor = &original[offset..];
                continue;
            }

            // 0x40 and 0x80 prefixes are reserved label types
            if len > MAX_LABEL_LEN {
                return Err(failure(input, ErrorKind::Verify));
            }

            let (rest, label) = take_bytes(len as usize)(rest)?;
            labels.push(escape_label(label));
            cursor = rest;
        }
    }
}

fn header<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsHeader, E>
where
    E: ParseError<&'a [u8]>,
{
    |input| {
        // network order is big endian
        let (rest, id) = be_u16(input)?;

        let (rest, a) = be_u8(rest)?;
        let (rest, b) = be_u8(rest)?;

        let recursion_desired = (a & (1 << 0)) > 0;
        let truncated_message = (a & (1 << 1)) > 0;
        let authoritative_answer = (a & (1 << 2)) > 0;
        let opcode = Opcode::from_num((a >> 3) & 0x0F);
        let response = (a & (1 << 7)) > 0;
        let rescode = ResponseCode::from_num(b & 0x0F);
        let checking_disabled = (b & (1 << 4)) > 0;
        let authed_data = (b & (1 << 5)) > 0;
        let z = (b & (1 << 6)) > 0;
        let recursion_available = (b & (1 << 7)) > 0;

        let (rest, questions) = be_u16(rest)?;
        let (rest, answers) = be_u16(rest)?;
        let (rest, authoritative_entries) = be_u16(rest)?;
        let (rest, resource_entries) = be_u16(rest)?;

        let dns_header = DnsHeader {
            id,

            response,
            opcode,
            authoritative_answer,
            truncated_message,
            recursion_desired,

            recursion_available,
            z,
            authed_data,
            checking_disabled,
            rescode,

            questions,
            answers,
            authoritative_entries,
            resource_entries,
        };

        Ok((rest, dns_header))
    }
}

fn question<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsQuestion, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| {
        let (rest, name) = domain_name(original)(input)?;
        let (rest, qtype) = be_u16(rest)?;
        let (rest, _qclass) = be_u16(rest)?;

        let question = DnsQuestion {
            name,
            qtype: QueryType::from_num(qtype),
        };

        Ok((rest, question))
    }
}

fn record<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsRecord, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| {
        let (rest, domain) = domain_name(original)(input)?;
        let (rest, qnum) = be_u16(rest)?;
        let (rest, _qclass) = be_u16(rest)?;
        let (rest, ttl) = be_u32(rest)?;
        let (rest, data_len) = be_u16(rest)?;
        let (rest, record_bytes) = take_bytes(data_len as usize)(rest)?;

        let record = match QueryType::from_num(qnum) {
            QueryType::A if data_len == 4 => {
                let (_rest, addr) = ipv4()(record_bytes)?;
                DnsRecord::A { domain, addr, ttl }
            }
            _ => DnsRecord::UNKNOWN {
                domain,
                qtype: qnum,
                data_len,
                ttl,
            },
        };

        Ok((rest, record))
    }
}

pub fn packet<'a>(input: &'a [u8], original: &'a [u8]) -> IResult<&'a [u8], DnsPacket> {
    let (rest, header) = header()(input)?;
    let (rest, questions) = count(question(original), header.questions as usize)(rest)?;
    let (rest, answers) = count(record(original), header.answers as usize)(rest)?;
    let (rest, authorities) = count(record(original), header.authoritative_entries as usize)(rest)?;
    let (rest, resources) = count(record(original), header.resource_entries as usize)(rest)?;

    let dns_packet = DnsPacket {
        header,
        questions,
        answers,
        authorities,
        resources,
        compress: false,
    };

    Ok((rest, dns_packet))
}

/// Reads only the fixed 12 byte header, for packets whose body is unreadable.
pub fn packet_header(input: &[u8]) -> Option<DnsHeader> {
    header::<nom::error::Error<&[u8]>>()(input)
        .ok()
        .map(|(_rest, header)| header)
}

impl<'a> TryFrom<&'a [u8]> for DnsPacket {
    type Error = String;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        match packet(value, value) {
            Ok(([], cl)) => Ok(cl),
            Ok((s, _)) => Err(format!(
                "Parsing Error: Unable to parse the whole dns packet\nRemaining Tokens: {:?}",
                s
            )),
            Err(e) => Err(format!("Parsing Error: {:?}", e)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(input: &[u8]) -> IResult<&[u8], DnsHeader> {
        super::header()(input)
    }

    fn question(input: &[u8]) -> IResult<&[u8], DnsQuestion> {
        super::question(input)(input)
    }

    fn record<'a>(input: &'a [u8], original: &'a [u8]) -> IResult<&'a [u8], DnsRecord> {
        super::record(original)(input)
    }

    fn domain(input: &[u8]) -> IResult<&[u8], String> {
        super::domain_name(input)(input)
    }

    #[rustfmt::skip]
    fn web_query() -> [u8; 28] {
        [
            0xa8, 0x4f, // identifier
            0x01, 0x20, // flags
            0x00, 0x01, // question count
            0x00, 0x00, // answer count
            0x00, 0x00, // authority count
            0x00, 0x00, // additional count
            0x03, 0x77, 0x65, 0x62, 0x06, 0x64, 0x6f, 0x63, 0x6b, 0x65, 0x72, 0x00, // web.docker
            0x00, 0x01, // query type
            0x00, 0x01, // query class
        ]
    }

    #[rustfmt::skip]
    fn web_answer() -> [u8; 44] {
        [
            0xa8, 0x4f, // identifier
            0x81, 0x20, // flags
            0x00, 0x01, // question count
            0x00, 0x01, // answer count
            0x00, 0x00, // authority count
            0x00, 0x00, // additional count
            0x03, 0x77, 0x65, 0x62, 0x06, 0x64, 0x6f, 0x63, 0x6b, 0x65, 0x72, 0x00, // web.docker
            0x00, 0x01, // query type
            0x00, 0x01, // query class
            0xc0, 0x0c, // name (Jump point)
            0x00, 0x01, // record type
            0x00, 0x01, // record class
            0x00, 0x00, 0x00, 0x01, // ttl
            0x00, 0x04, // len
            0xac, 0x11, 0x00, 0x02, // ip
        ]
    }

    fn web_header(response: bool, answers: u16) -> DnsHeader {
        DnsHeader {
            id: 43087,

            response,
            opcode: Opcode::Query,
            authoritative_answer: false,
            truncated_message: false,
            recursion_desired: true,

            recursion_available: false,
            z: false,
            authed_data: true,
            checking_disabled: false,
            rescode: ResponseCode::NOERROR,

            questions: 1,
            answers,
            authoritative_entries: 0,
            resource_entries: 0,
        }
    }

    fn web_question() -> DnsQuestion {
        DnsQuestion {
            name: "web.docker.".to_string(),
            qtype: QueryType::A,
        }
    }

    #[test]
    fn dns_header_parsing_works() {
        let (_, result) = header(&web_query()[..12]).unwrap();

        assert_eq!(result, web_header(false, 0));
    }

    #[test]
    fn header_only_parsing_ignores_body() {
        let result = packet_header(&web_answer()[..20]);

        assert_eq!(result, Some(web_header(true, 1)));
        assert_eq!(packet_header(&web_answer()[..7]), None);
    }

    #[test]
    fn domain_name_is_fully_qualified() {
        let query = web_query();
        let (rest, result) = domain(&query[12..]).unwrap();

        assert_eq!(result, "web.docker.");
        assert_eq!(rest, &[0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn root_name_parses_as_dot() {
        let (_, result) = domain(&[0x00]).unwrap();

        assert_eq!(result, ".");
    }

    #[rustfmt::skip]
    #[test]
    fn unusual_label_bytes_are_escaped() {
        let input = [
            0x03, b'a', b'.', b'b', // label with a dot in it
            0x02, 0xff, b'\\', // non-ascii byte and a backslash
            0x00,
        ];

        let (_, result) = domain(&input).unwrap();

        assert_eq!(result, "a\\.b.\\255\\\\.");
    }

    #[test]
    fn dns_question_parsing_works() {
        let (_, result) = question(&web_query()[12..]).unwrap();

        assert_eq!(result, web_question());
    }

    #[test]
    fn compressed_record_parsing_works() {
        let expected = DnsRecord::A {
            domain: "web.docker.".to_string(),
            addr: Ipv4Addr::new(172, 17, 0, 2),
            ttl: 1,
        };

        let answer = web_answer();
        let (rest, result) = record(&answer[28..], &answer).unwrap();

        assert_eq!(result, expected);
        assert!(rest.is_empty());
    }

    #[test]
    fn dns_packet_parsing_works_on_question() {
        let expected = DnsPacket::builder()
            .header(web_header(false, 0))
            .questions(vec![web_question()])
            .build();

        let result = DnsPacket::try_from(&web_query()[..]).unwrap();

        assert_eq!(result, expected);
    }

    #[test]
    fn dns_packet_parsing_works_on_answer() {
        let record = DnsRecord::A {
            domain: "web.docker.".to_string(),
            addr: Ipv4Addr::new(172, 17, 0, 2),
            ttl: 1,
        };
        let expected = DnsPacket::builder()
            .header(web_header(true, 1))
            .questions(vec![web_question()])
            .answers(vec![record])
            .build();

        let result = DnsPacket::try_from(&web_answer()[..]).unwrap();

        assert_eq!(result, expected);
    }

    #[rustfmt::skip]
    fn edns_query() -> [u8; 39] {
        [
            0x13, 0x37, // identifier
            0x01, 0x00, // flags
            0x00, 0x01, // question count
            0x00, 0x00, // answer count
            0x00, 0x00, // authority count
            0x00, 0x01, // additional count
            0x03, 0x77, 0x65, 0x62, 0x06, 0x64, 0x6f, 0x63, 0x6b, 0x65, 0x72, 0x00, // web.docker
            0x00, 0x01, // query type
            0x00, 0x01, // query class
            // OPT pseudo-record
            0x00, // root
            0x00, 0x29, // type 41
            0x10, 0x00, // udp payload size
            0x00, 0x00, 0x00, 0x00, // extended rcode and flags
            0x00, 0x00, // len
        ]
    }

    #[test]
    fn opt_records_parse_as_unknown() {
        let result = DnsPacket::try_from(&edns_query()[..]).unwrap();

        assert_eq!(result.questions, vec![web_question()]);
        assert_eq!(
            result.resources,
            vec![DnsRecord::UNKNOWN {
                domain: ".".to_string(),
                qtype: 41,
                data_len: 0,
                ttl: 0,
            }]
        );
    }

    #[rustfmt::skip]
    #[test]
    fn pointer_loops_are_rejected() {
        let looping = [
            0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // header
            0xc0, 0x0c, // points at itself
            0x00, 0x01, 0x00, 0x01,
        ];

        assert!(DnsPacket::try_from(&looping[..]).is_err());
    }

    #[rustfmt::skip]
    #[test]
    fn reserved_label_types_are_rejected() {
        let extended = [
            0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // header
            0x41, 0x00, // 0x40 label type
            0x00, 0x01, 0x00, 0x01,
        ];

        assert!(DnsPacket::try_from(&extended[..]).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = web_query().to_vec();
        buf.push(0xff);

        assert!(DnsPacket::try_from(&buf[..]).is_err());
    }
}
