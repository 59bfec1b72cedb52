use std::{net::Ipv4Addr, sync::Arc};

use log::{debug, info, warn};

use crate::{
    container_id, packet_header, ContainerInspector, ContainerResolver, DnsHeader, DnsPacket,
    DnsQuestion, DnsRecord, Opcode, QueryType, ResolveError, ResponseCode, RECORD_TTL,
};

/// What one question contributed to a reply.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Answers {
    pub records: Vec<DnsRecord>,
    // An address could not be turned into a record; the whole reply is refused.
    pub refused: bool,
}

/// Answers a single question. Never fails: a question that cannot be resolved yields no
/// records, and the reason goes to the log.
#[derive(Clone)]
pub struct QueryHandler {
    resolver: ContainerResolver,
}

impl QueryHandler {
    pub fn new(resolver: ContainerResolver) -> QueryHandler {
        QueryHandler { resolver }
    }

    pub async fn handle(&self, question: &DnsQuestion) -> Answers {
        match question.qtype {
            QueryType::A => {}
            qtype => {
                debug!("No {:?} records for {}", qtype, question.name);
                return Answers::default();
            }
        }

        let addresses = match self.lookup(&question.name).await {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!("{}: {}", question.name, e);
                return Answers::default();
            }
        };

        let mut answers = Answers::default();
        for address in addresses {
            match a_record(&question.name, &address) {
                Ok(record) => answers.records.push(record),
                Err(e) => {
                    warn!("{}: {}", question.name, e);
                    answers.refused = true;
                }
            }
        }

        answers
    }

    async fn lookup(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        let id = container_id(name)?;
        self.resolver.resolve(id).await
    }
}

fn a_record(name: &str, address: &str) -> Result<DnsRecord, ResolveError> {
    let addr = address
        .parse::<Ipv4Addr>()
        .map_err(|source| ResolveError::RecordConstruction {
            name: name.to_string(),
            address: address.to_string(),
            source,
        })?;

    Ok(DnsRecord::A {
        domain: name.to_string(),
        addr,
        ttl: RECORD_TTL,
    })
}

/// Builds the reply to one request: opcode check, every question in order, final rcode.
pub struct RequestDispatcher {
    handler: QueryHandler,
}

impl RequestDispatcher {
    pub fn new(inspector: Arc<dyn ContainerInspector>) -> RequestDispatcher {
        RequestDispatcher {
            handler: QueryHandler::new(ContainerResolver::new(inspector)),
        }
    }

    pub async fn dispatch(&self, request: &DnsPacket) -> DnsPacket {
        let mut reply = DnsPacket::response_to(request);
        reply.compress = false;

        if request.header.opcode != Opcode::Query {
            info!(
                "Request {} has opcode {:?}, not implemented",
                request.header.id, request.header.opcode
            );
            reply.header.rescode = ResponseCode::NOTIMP;
            return reply;
        }

        for question in &request.questions {
            let answers = self.handler.handle(question).await;
            if answers.refused {
                reply.header.rescode = ResponseCode::REFUSED;
            }
            reply.answers.extend(answers.records);
        }

        // We never recurse, so an empty answer is refused outright: clients then give up or
        // move on to their next resolver instead of retrying us.
        if !reply.has_answers() {
            reply.header.rescode = ResponseCode::REFUSED;
        }

        reply.header.answers = reply.answers.len() as u16;
        reply
    }

    /// A FORMERR reply for a request whose header is readable but whose body is not. Nothing is
    /// sent back for fragments shorter than a header, or for anything that is itself a response.
    pub fn format_error(request: &[u8]) -> Option<DnsPacket> {
        let header = packet_header(request).filter(|header| !header.response)?;

        let header = DnsHeader::builder()
            .id(header.id)
            .response(true)
            .opcode(header.opcode)
            .recursion_desired(header.recursion_desired)
            .rescode(ResponseCode::FORMERR)
            .build();

        Some(DnsPacket::builder().header(header).build())
    }
}
