pub use dnsparse::{
    packet_header, write_packet, DnsHeader, DnsPacket, DnsQuestion, DnsRecord, Opcode, QueryType,
    ResponseCode,
};

mod config;
mod docker;
mod error;
mod handler;
mod name;
mod resolver;
mod server;
mod utils;

pub use config::Config;
pub use docker::{ContainerInspector, ContainerNetworkInfo, DockerInspector};
pub use error::{ResolveError, ServerError, Transport};
pub use handler::{Answers, QueryHandler, RequestDispatcher};
pub use name::container_id;
pub use resolver::ContainerResolver;
pub use server::Server;
pub use utils::{read_packet, write_reply};

/// Container addresses change whenever a container restarts, so answers are only good for a
/// second.
pub const RECORD_TTL: u32 = 1;
pub const MAX_UDP_PACKET_SIZE: usize = 512;
pub const MAX_TCP_PACKET_SIZE: usize = 65535;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.11";
pub const DNS_PORT: u16 = 53;
