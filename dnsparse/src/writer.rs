use std::collections::HashMap;

use log::warn;

use crate::{
    types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryType},
    utils::labels,
};

const CLASS_IN: u16 = 1;
// Pointers only have 14 bits of offset.
const MAX_POINTER_OFFSET: usize = 0x3fff;

struct BytePacketBuffer<'a> {
    buf: &'a mut [u8],
    pos: usize,
    // Offsets of names already written, keyed by their (lowercased) suffix labels. Only filled
    // when compression is on.
    names: Option<HashMap<Vec<Vec<u8>>, usize>>,
}

impl<'a> BytePacketBuffer<'a> {
    /// Writes go into `buffer`; its length is the size limit of the packet.
    pub fn new(buffer: &'a mut [u8], compress: bool) -> BytePacketBuffer<'a> {
        BytePacketBuffer {
            buf: buffer,
            pos: 0,
            names: if compress { Some(HashMap::new()) } else { None },
        }
    }

    fn write(&mut self, val: u8) -> anyhow::Result<()> {
        if self.pos >= self.buf.len() {
            anyhow::bail!("End of buffer ({} bytes)", self.buf.len())
        }
        self.buf[self.pos] = val;
        self.pos += 1;
        Ok(())
    }

    fn write_u8(&mut self, val: u8) -> anyhow::Result<()> {
        self.write(val)
    }

    fn write_u16(&mut self, val: u16) -> anyhow::Result<()> {
        for b in &val.to_be_bytes() {
            self.write(*b)?;
        }

        Ok(())
    }

    fn write_u32(&mut self, val: u32) -> anyhow::Result<()> {
        for b in &val.to_be_bytes() {
            self.write(*b)?;
        }

        Ok(())
    }

    // Offset of an earlier copy of this suffix, or None after remembering where this one starts.
    fn seen_suffix(&mut self, suffix: &[Vec<u8>]) -> Option<usize> {
        let pos = self.pos;
        let names = self.names.as_mut()?;
        let key: Vec<Vec<u8>> = suffix.iter().map(|label| label.to_ascii_lowercase()).collect();

        if let Some(&offset) = names.get(&key) {
            return Some(offset);
        }
        if pos <= MAX_POINTER_OFFSET {
            names.insert(key, pos);
        }

        None
    }

    fn write_qname(&mut self, qname: &str) -> anyhow::Result<()> {
        let labels = labels(qname)?;

        for i in 0..labels.len() {
            if let Some(offset) = self.seen_suffix(&labels[i..]) {
                return self.write_u16(0xc000 | offset as u16);
            }

            let label = &labels[i];
            if label.len() > 0x3f {
                anyhow::bail!("Single label exceeds 63 characters")
            }

            self.write_u8(label.len() as u8)?;
            for b in label {
                self.write_u8(*b)?;
            }
        }

        self.write_u8(0)
    }
}

pub fn write(buf: &mut [u8], packet: &DnsPacket) -> anyhow::Result<usize> {
    let mut buffer = BytePacketBuffer::new(buf, packet.compress);

    let answers = writable(&packet.answers);
    let authorities = writable(&packet.authorities);
    let resources = writable(&packet.resources);

    let mut header = packet.header.clone();
    header.questions = packet.questions.len() as u16;
    header.answers = answers.len() as u16;
    header.authoritative_entries = authorities.len() as u16;
    header.resource_entries = resources.len() as u16;

    write_header(&header, &mut buffer)?;

    for question in &packet.questions {
        write_question(question, &mut buffer)?;
    }

    for rec in answers.into_iter().chain(authorities).chain(resources) {
        write_record(rec, &mut buffer)?;
    }

    Ok(buffer.pos)
}

fn writable(records: &[DnsRecord]) -> Vec<&DnsRecord> {
    records
        .iter()
        .filter(|record| match record {
            DnsRecord::UNKNOWN { .. } => {
                warn!("Skipping record: {:?}", record);
                false
            }
            _ => true,
        })
        .collect()
}

fn write_header(header: &DnsHeader, buffer: &mut BytePacketBuffer) -> anyhow::Result<()> {
    buffer.write_u16(header.id)?;
    buffer.write_u16(header.flags())?;
    buffer.write_u16(header.questions)?;
    buffer.write_u16(header.answers)?;
    buffer.write_u16(header.authoritative_entries)?;
    buffer.write_u16(header.resource_entries)?;

    Ok(())
}

fn write_question(question: &DnsQuestion, buffer: &mut BytePacketBuffer) -> anyhow::Result<()> {
    buffer.write_qname(&question.name)?;
    buffer.write_u16(question.qtype.to_num())?;
    buffer.write_u16(CLASS_IN)?;

    Ok(())
}

fn write_record(record: &DnsRecord, buffer: &mut BytePacketBuffer) -> anyhow::Result<usize> {
    let start_pos = buffer.pos;

    match *record {
        DnsRecord::A {
            ref domain,
            ref addr,
            ttl,
        } => {
            buffer.write_qname(domain)?;
            buffer.write_u16(QueryType::A.to_num())?;
            buffer.write_u16(CLASS_IN)?;
            buffer.write_u32(ttl)?;
            buffer.write_u16(4)?;

            for octet in &addr.octets() {
                buffer.write_u8(*octet)?;
            }
        }
        DnsRecord::UNKNOWN { .. } => {
            warn!("Skipping record: {:?}", record);
        }
    }

    Ok(buffer.pos - start_pos)
}
