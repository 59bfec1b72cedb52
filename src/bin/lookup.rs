use log::debug;
use std::{
    io::{Read, Write},
    net::{IpAddr, SocketAddr, TcpStream, UdpSocket},
};
use structopt::StructOpt;

use cdns::{
    read_packet, write_packet, DnsHeader, DnsPacket, DnsQuestion, QueryType, MAX_TCP_PACKET_SIZE,
    MAX_UDP_PACKET_SIZE,
};

fn mk_query(id: u16, qname: &str, qtype: QueryType) -> DnsPacket {
    let header = DnsHeader::builder()
        .id(id)
        .questions(1)
        .recursion_desired(true)
        .build();

    let question = DnsQuestion {
        name: qname.to_string(),
        qtype,
    };

    DnsPacket::builder()
        .header(header)
        .questions(vec![question])
        .build()
}

#[derive(Debug, StructOpt)]
#[structopt(name = "cdns-lookup", about = "Ask a cdns resolver for a container's addresses")]
struct Opt {
    /// Name to look up, e.g. 4f2a9c.docker
    name: String,

    #[structopt(short, long, default_value = "127.0.0.11")]
    server: IpAddr,

    #[structopt(short, long, default_value = "53")]
    port: u16,

    /// Query over TCP instead of UDP
    #[structopt(long)]
    tcp: bool,

    /// Numeric record type to ask for
    #[structopt(short, long, default_value = "1")]
    qtype: u16,
}

fn exchange_udp(server: SocketAddr, request: &[u8]) -> anyhow::Result<Vec<u8>> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.send_to(request, server)?;

    let mut response_buffer = vec![0u8; MAX_UDP_PACKET_SIZE];
    let (size, _src) = socket.recv_from(&mut response_buffer)?;
    response_buffer.truncate(size);

    Ok(response_buffer)
}

fn exchange_tcp(server: SocketAddr, request: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(server)?;
    stream.write_all(&(request.len() as u16).to_be_bytes())?;
    stream.write_all(request)?;

    let mut len = [0u8; 2];
    stream.read_exact(&mut len)?;
    let mut response_buffer = vec![0u8; u16::from_be_bytes(len) as usize];
    stream.read_exact(&mut response_buffer)?;

    Ok(response_buffer)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    debug!("args {:?}", opt);

    let request = mk_query(rand::random(), &opt.name, QueryType::from_num(opt.qtype));
    debug!("Request: {:#?}", request);

    let mut req_buffer = vec![0u8; MAX_TCP_PACKET_SIZE];
    let size = write_packet(&mut req_buffer, &request)?;

    let server = SocketAddr::new(opt.server, opt.port);
    let response = if opt.tcp {
        exchange_tcp(server, &req_buffer[..size])?
    } else {
        exchange_udp(server, &req_buffer[..size])?
    };

    print_packet(&read_packet(&response)?);

    Ok(())
}

fn print_packet(packet: &DnsPacket) {
    println!("{:#?}", packet.header);

    for q in &packet.questions {
        println!("{:#?}", q);
    }
    for rec in &packet.answers {
        println!("{:#?}", rec);
    }
}
