use std::net::Ipv4Addr;
use typed_builder::TypedBuilder;

// All communications inside of the domain protocol are carried in a single
// format called a message.  The top level format of message is divided
// into 5 sections (some of which are empty in certain cases) shown below:
//
//     +---------------------+
//     |        Header       |
//     +---------------------+
//     |       Question      | the question for the name server
//     +---------------------+
//     |        Answer       | RRs answering the question
//     +---------------------+
//     |      Authority      | RRs pointing toward an authority
//     +---------------------+
//     |      Additional     | RRs holding additional information
//     +---------------------+
//
// Section counts in the header are recomputed from the vectors when the packet is written, so
// callers only ever fill the sections.
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsPacket {
    pub header: DnsHeader,

    #[builder(default = vec![])]
    pub questions: Vec<DnsQuestion>,
    #[builder(default = vec![])]
    pub answers: Vec<DnsRecord>,
    #[builder(default = vec![])]
    pub authorities: Vec<DnsRecord>,
    #[builder(default = vec![])]
    pub resources: Vec<DnsRecord>,

    // Whether the writer may replace repeated names with pointers (RFC 1035 4.1.4).
    #[builder(default = false)]
    pub compress: bool,
}

// The header contains the following fields:
//                                  1  1  1  1  1  1
//    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                      ID                       |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    QDCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ANCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    NSCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ARCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsHeader {
    // Response packets must carry the id of the query they answer.
    pub id: u16,

    // 0 for queries, 1 for responses.
    #[builder(default = false)]
    pub response: bool,
    #[builder(default = Opcode::Query)]
    pub opcode: Opcode,
    #[builder(default = false)]
    pub authoritative_answer: bool,
    #[builder(default = false)]
    pub truncated_message: bool,
    // Copied from the query into the response.
    #[builder(default = false)]
    pub recursion_desired: bool,
    #[builder(default = false)]
    pub recursion_available: bool,
    #[builder(default = false)]
    pub z: bool,
    #[builder(default = false)]
    pub authed_data: bool,
    #[builder(default = false)]
    pub checking_disabled: bool,
    #[builder(default = ResponseCode::NOERROR)]
    pub rescode: ResponseCode, // 4 bits

    #[builder(default = 0)]
    pub questions: u16,
    #[builder(default = 0)]
    pub answers: u16,
    #[builder(default = 0)]
    pub authoritative_entries: u16,
    #[builder(default = 0)]
    pub resource_entries: u16,
}

impl DnsHeader {
    pub fn flags(&self) -> u16 {
        (self.rescode as u16)
            | ((self.checking_disabled as u16) << 4)
            | ((self.authed_data as u16) << 5)
            | ((self.z as u16) << 6)
            | ((self.recursion_available as u16) << 7)
            | ((self.recursion_desired as u16) << 8)
            | ((self.truncated_message as u16) << 9)
            | ((self.authoritative_answer as u16) << 10)
            | ((self.opcode.to_num() as u16) << 11)
            | ((self.response as u16) << 15)
    }
}

// A four bit field that specifies kind of query in this message.  This value is set by the
// originator of a query and copied into the response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // a standard query (QUERY)
    Query,
    // an inverse query (IQUERY), obsoleted by RFC 3425
    IQuery,
    // a server status request (STATUS)
    Status,
    // zone change notification (RFC 1996)
    Notify,
    // dynamic update (RFC 2136)
    Update,
    Unknown(u8),
}

impl Opcode {
    pub fn to_num(self) -> u8 {
        match self {
            Opcode::Query => 0,
            Opcode::IQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unknown(x) => x & 0x0F,
        }
    }

    pub fn from_num(num: u8) -> Opcode {
        match num {
            0 => Opcode::Query,
            1 => Opcode::IQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            _ => Opcode::Unknown(num),
        }
    }
}

//  Response code - this 4 bit field is set as part of responses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    // No error condition
    NOERROR = 0,
    // Format error - The name server was unable to interpret the query.
    FORMERR = 1,
    // Server failure
    SERVFAIL = 2,
    // Name Error - the domain name referenced in the query does not exist.
    NXDOMAIN = 3,
    // Not Implemented - The name server does not support the requested kind of query.
    NOTIMP = 4,
    // Refused - The name server refuses to perform the specified operation for policy reasons.
    REFUSED = 5,
}

impl ResponseCode {
    pub fn from_num(num: u8) -> ResponseCode {
        match num {
            1 => ResponseCode::FORMERR,
            2 => ResponseCode::SERVFAIL,
            3 => ResponseCode::NXDOMAIN,
            4 => ResponseCode::NOTIMP,
            5 => ResponseCode::REFUSED,
            _ => ResponseCode::NOERROR,
        }
    }
}

// The question section carries the parameters that define what is being asked:
//                                  1  1  1  1  1  1
//    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  /                     QNAME                     /
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                     QTYPE                     |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                     QCLASS                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    // Fully qualified, e.g. "web.docker." (the root is ".")
    pub name: String,
    pub qtype: QueryType,
    // The class is almost always set to 1, so we will not represent it here
}

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum QueryType {
    UNKNOWN(u16),
    A,
    NS,
    CNAME,
    MX,
    TXT,
    AAAA,
    SRV,
    ANY,
}

impl QueryType {
    pub fn to_num(self) -> u16 {
        match self {
            QueryType::UNKNOWN(x) => x,
            QueryType::A => 1,
            QueryType::NS => 2,
            QueryType::CNAME => 5,
            QueryType::MX => 15,
            QueryType::TXT => 16,
            QueryType::AAAA => 28,
            QueryType::SRV => 33,
            QueryType::ANY => 255,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            15 => QueryType::MX,
            16 => QueryType::TXT,
            28 => QueryType::AAAA,
            33 => QueryType::SRV,
            255 => QueryType::ANY,
            _ => QueryType::UNKNOWN(num),
        }
    }
}

// Resource records share one layout:
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     /                      NAME                     /
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                      TYPE                     |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                     CLASS                     |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                      TTL                      |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//     |                   RDLENGTH                    |
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
//     /                     RDATA                     /
//     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//
// Only A records are ever produced here. Everything else a client might send along (EDNS OPT
// pseudo-records, for one) is kept as UNKNOWN and dropped when writing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DnsRecord {
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: u32,
    },
    UNKNOWN {
        domain: String,
        qtype: u16,
        data_len: u16,
        ttl: u32,
    },
}

impl DnsPacket {
    /// Starts a reply to `request`: same id, opcode, recursion-desired bit and question section.
    pub fn response_to(request: &DnsPacket) -> DnsPacket {
        let header = DnsHeader::builder()
            .id(request.header.id)
            .response(true)
            .opcode(request.header.opcode)
            .recursion_desired(request.header.recursion_desired)
            .checking_disabled(request.header.checking_disabled)
            .questions(request.questions.len() as u16)
            .build();

        DnsPacket::builder()
            .header(header)
            .questions(request.questions.clone())
            .build()
    }

    /// Header and question section only, with TC set, for replies that do not fit a datagram.
    pub fn truncated(&self) -> DnsPacket {
        let mut header = self.header.clone();
        header.truncated_message = true;

        DnsPacket::builder()
            .header(header)
            .questions(self.questions.clone())
            .compress(self.compress)
            .build()
    }

    pub fn has_answers(&self) -> bool {
        !self.answers.is_empty()
    }

    pub fn rescode(&self) -> ResponseCode {
        self.header.rescode
    }

    pub fn a_records(&self) -> impl Iterator<Item = (&str, Ipv4Addr, u32)> {
        self.answers.iter().filter_map(|r| match r {
            DnsRecord::A { domain, addr, ttl } => Some((domain.as_str(), *addr, *ttl)),
            _ => None,
        })
    }
}
