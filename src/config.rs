use clap::Parser;
use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

pub const DHCP_SERVER_PORT: u16 = 67;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The IPv4 address to listen on
    #[arg(short, long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    pub address: Ipv4Addr,

    /// The UDP port to listen on
    #[arg(short, long, default_value_t = DHCP_SERVER_PORT)]
    pub port: u16,

    /// Pin the socket to a network interface (e.g., 'eth0'), Linux only
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    pub interface: Option<String>,
    /// How long one socket read may block before the loop checks for shutdown.
    pub read_timeout: Duration,
    /// Datagrams longer than this are cut short by the socket read.
    pub recv_buffer_size: usize,
}

impl ServerConfig {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self {
            address,
            port,
            interface: None,
            read_timeout: Duration::from_secs(1),
            recv_buffer_size: 4096,
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn bind_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, DHCP_SERVER_PORT)
    }
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        let config = Self::new(args.address, args.port);
        match &args.interface {
            Some(interface) => config.with_interface(interface.clone()),
            None => config,
        }
    }
}
