use std::net::{IpAddr, SocketAddr};

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "cdns",
    about = "Resolve <container-id>.<anything> to the container's IP addresses"
)]
pub struct Config {
    /// Address both the UDP and the TCP listener bind to
    #[structopt(long, env = "BIND_ADDRESS", default_value = "127.0.0.11")]
    pub bind_address: IpAddr,

    #[structopt(long, env = "BIND_PORT", default_value = "53")]
    pub port: u16,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
