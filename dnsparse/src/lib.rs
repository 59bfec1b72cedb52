mod parser;
mod types;
mod utils;
mod writer;

pub use types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, Opcode, QueryType, ResponseCode};

pub use parser::packet_header;
pub use utils::fqdn;
pub use writer::write as write_packet;
