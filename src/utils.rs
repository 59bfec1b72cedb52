use std::convert::TryFrom;

use log::debug;

use crate::{write_packet, DnsPacket};

pub fn read_packet(bytes: &[u8]) -> anyhow::Result<DnsPacket> {
    DnsPacket::try_from(bytes).map_err(anyhow::Error::msg)
}

/// Serializes `reply` into at most `max_size` bytes. A reply that does not fit is sent as its
/// header and question section with the TC bit set, so the client retries over TCP.
pub fn write_reply(reply: &DnsPacket, max_size: usize) -> anyhow::Result<Vec<u8>> {
    let mut buf = vec![0u8; max_size];

    let size = match write_packet(&mut buf, reply) {
        Ok(size) => size,
        Err(e) => {
            debug!("Reply {} does not fit in {} bytes: {}", reply.header.id, max_size, e);
            write_packet(&mut buf, &reply.truncated())?
        }
    };

    buf.truncate(size);
    Ok(buf)
}
