use crate::dhcp::{DhcpMessage, DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
use log::debug;
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;
use thiserror::Error;

/// Bound on every blocking wait so an external interrupt is observed
/// promptly.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Larger than any DHCP datagram the tool sends or expects back.
pub const RECV_BUFFER_SIZE: usize = 2048;

/// Socket setup failures that stop the run. Each variant renders its
/// own remedy so the caller can print one line and exit.
#[derive(Error, Debug)]
pub enum BindError {
    #[error(
        "UDP port {port} is already in use: \
         stop the DHCP service holding it and retry"
    )]
    PortInUse { port: u16 },

    #[error("binding UDP port {port} requires root privileges")]
    PermissionDenied { port: u16 },

    #[error("unable to bind UDP port {port}: {source}")]
    Io { port: u16, source: io::Error },
}

impl BindError {
    fn from_io(port: u16, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::AddrInUse => BindError::PortInUse { port },
            io::ErrorKind::PermissionDenied => {
                BindError::PermissionDenied { port }
            }
            _ => BindError::Io { port, source: err },
        }
    }
}

/// Datagram endpoint the engines drive. Implemented over UDP for real
/// traffic and scripted in tests.
pub trait DhcpSocket {
    fn send_to(&mut self, payload: &[u8], dst: SocketAddrV4) -> io::Result<()>;

    /// Wait up to `timeout` for one datagram. An elapsed window is
    /// `Ok(None)`, never an error.
    fn recv_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddrV4)>>;
}

pub struct UdpDhcpSocket {
    socket: UdpSocket,
}

impl UdpDhcpSocket {
    /// Broadcast-capable UDP socket with the reuse flags set so the
    /// tool can coexist with an OS DHCP client. `iface` adds a
    /// best-effort SO_BINDTODEVICE.
    pub fn open(
        addr: SocketAddrV4,
        iface: Option<&str>,
    ) -> Result<Self, BindError> {
        let port = addr.port();
        return setup_udp_socket(addr, iface)
            .map(|socket| Self { socket })
            .map_err(|e| BindError::from_io(port, e));
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        return self.socket.local_addr();
    }
}

fn setup_udp_socket(
    addr: SocketAddrV4,
    iface: Option<&str>,
) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;

    if let Some(name) = iface {
        // Scoping to one interface only reduces noise, so a refusal
        // is not fatal.
        if let Err(e) = socket.bind_device(Some(name.as_bytes())) {
            debug!("Cannot bind socket to {}: {}", name, e);
        }
    }

    socket.bind(&SocketAddr::V4(addr).into())?;
    return Ok(socket.into());
}

impl DhcpSocket for UdpDhcpSocket {
    fn send_to(&mut self, payload: &[u8], dst: SocketAddrV4) -> io::Result<()> {
        self.socket.send_to(payload, SocketAddr::V4(dst))?;
        return Ok(());
    }

    fn recv_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddrV4)>> {
        if timeout.as_nanos() == 0 {
            return Ok(None);
        }
        self.socket.set_read_timeout(Some(timeout))?;

        return match self.socket.recv_from(buf) {
            Ok((len, src)) => match src {
                SocketAddr::V4(src) => Ok(Some((len, src))),
                SocketAddr::V6(_) => Ok(None),
            },
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
}

fn is_timeout(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::Interrupted => true,
        _ => false,
    }
}

/// Receive side of a datalink capture. The discover sniffer mode uses
/// it to see replies addressed to a MAC the host does not own.
pub struct SnifferChannel {
    rx: Box<dyn DataLinkReceiver>,
}

impl SnifferChannel {
    pub fn open(
        iface: &NetworkInterface,
        poll: Duration,
    ) -> Result<Self, String> {
        let mut config = Config::default();
        config.read_timeout = Some(poll);

        let rx = match datalink::channel(iface, config) {
            Ok(Channel::Ethernet(_, rx)) => rx,
            Ok(_) => {
                return Err(
                    "Error creating capture channel: Unknown channel type"
                        .to_string(),
                )
            }
            Err(e) => return Err(format!("Error creating capture channel: {}", e)),
        };

        return Ok(Self { rx });
    }

    /// One poll slice: Ok(None) when nothing arrived in time.
    pub fn recv_frame(&mut self) -> io::Result<Option<&[u8]>> {
        return match self.rx.next() {
            Ok(frame) => Ok(Some(frame)),
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
}

/// Dissect a captured frame into the server-to-client DHCP message it
/// may carry: IPv4 ethertype, UDP protocol, source port 67 and
/// destination port 68, and a payload long enough to parse. Anything
/// else is None.
pub fn dhcp_reply_from_frame(
    frame: &[u8],
) -> Option<(std::net::Ipv4Addr, DhcpMessage)> {
    let ether_packet = EthernetPacket::new(frame)?;
    if ether_packet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ip_packet = Ipv4Packet::new(ether_packet.payload())?;
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }

    let udp_packet = UdpPacket::new(ip_packet.payload())?;
    if udp_packet.get_source() != DHCP_SERVER_PORT
        || udp_packet.get_destination() != DHCP_CLIENT_PORT
    {
        return None;
    }

    let msg = DhcpMessage::parse(udp_packet.payload()).ok()?;
    return Some((ip_packet.get_source(), msg));
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted endpoint for driving the engines in tests: queued
    /// inbound datagrams are handed out one per receive call, sends
    /// are recorded.
    pub struct ScriptedSocket {
        pub inbound: VecDeque<(Vec<u8>, SocketAddrV4)>,
        pub sent: Vec<(Vec<u8>, SocketAddrV4)>,
    }

    impl ScriptedSocket {
        pub fn new() -> Self {
            return Self {
                inbound: VecDeque::new(),
                sent: Vec::new(),
            };
        }

        pub fn push_inbound(&mut self, payload: Vec<u8>, src: SocketAddrV4) {
            self.inbound.push_back((payload, src));
        }
    }

    impl DhcpSocket for ScriptedSocket {
        fn send_to(
            &mut self,
            payload: &[u8],
            dst: SocketAddrV4,
        ) -> io::Result<()> {
            self.sent.push((payload.to_vec(), dst));
            return Ok(());
        }

        fn recv_timeout(
            &mut self,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> io::Result<Option<(usize, SocketAddrV4)>> {
            return match self.inbound.pop_front() {
                Some((payload, src)) => {
                    let len = payload.len().min(buf.len());
                    buf[..len].copy_from_slice(&payload[..len]);
                    Ok(Some((len, src)))
                }
                None => Ok(None),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::DhcpMessageTypes;
    use pnet::packet::ethernet::{EtherType, MutableEthernetPacket};
    use pnet::packet::ipv4::{self, MutableIpv4Packet};
    use pnet::packet::udp::MutableUdpPacket;
    use pnet::util::MacAddr;
    use std::net::Ipv4Addr;

    fn build_frame(
        ethertype: EtherType,
        proto: pnet::packet::ip::IpNextHeaderProtocol,
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut udp_packet =
            MutableUdpPacket::owned(vec![0u8; 8 + payload.len()]).unwrap();
        udp_packet.set_source(src_port);
        udp_packet.set_destination(dst_port);
        udp_packet.set_length((8 + payload.len()) as u16);
        udp_packet.set_payload(payload);
        let udp_packet = udp_packet.consume_to_immutable();

        let ip_len = 20 + udp_packet.packet().len();
        let mut ip_packet =
            MutableIpv4Packet::owned(vec![0u8; ip_len]).unwrap();
        ip_packet.set_version(4);
        ip_packet.set_header_length(5);
        ip_packet.set_total_length(ip_len as u16);
        ip_packet.set_ttl(64);
        ip_packet.set_next_level_protocol(proto);
        ip_packet.set_source(Ipv4Addr::new(192, 168, 1, 1));
        ip_packet.set_destination(Ipv4Addr::BROADCAST);
        ip_packet.set_checksum(ipv4::checksum(&ip_packet.to_immutable()));
        ip_packet.set_payload(udp_packet.packet());
        let ip_packet = ip_packet.consume_to_immutable();

        let mut ether_packet = MutableEthernetPacket::owned(vec![
            0u8;
            EthernetPacket::minimum_packet_size()
                + ip_packet.packet().len()
        ])
        .unwrap();
        ether_packet.set_destination(MacAddr::new(2, 0x11, 0x22, 0x33, 0x44, 0x55));
        ether_packet.set_source(MacAddr::new(0, 0x50, 0x56, 1, 2, 3));
        ether_packet.set_ethertype(ethertype);
        ether_packet.set_payload(ip_packet.packet());

        return ether_packet.packet().to_vec();
    }

    fn offer_bytes() -> Vec<u8> {
        let mut offer = DhcpMessage::new_reply();
        offer.xid = 0xCAFE0001;
        offer.yiaddr = Ipv4Addr::new(192, 168, 1, 77);
        offer.add_dhcp_msg_type(DhcpMessageTypes::OFFER);
        offer.add_dhcp_server_id(Ipv4Addr::new(192, 168, 1, 1));
        return offer.build();
    }

    #[test]
    fn frame_filter_accepts_server_reply() {
        let frame = build_frame(
            EtherTypes::Ipv4,
            IpNextHeaderProtocols::Udp,
            DHCP_SERVER_PORT,
            DHCP_CLIENT_PORT,
            &offer_bytes(),
        );

        let (src_ip, msg) = dhcp_reply_from_frame(&frame).unwrap();
        assert_eq!(Ipv4Addr::new(192, 168, 1, 1), src_ip);
        assert_eq!(0xCAFE0001, msg.xid);
        assert_eq!(Ipv4Addr::new(192, 168, 1, 77), msg.yiaddr);
    }

    #[test]
    fn frame_filter_rejects_non_ipv4_frames() {
        let frame = build_frame(
            EtherTypes::Arp,
            IpNextHeaderProtocols::Udp,
            DHCP_SERVER_PORT,
            DHCP_CLIENT_PORT,
            &offer_bytes(),
        );
        assert!(dhcp_reply_from_frame(&frame).is_none());
    }

    #[test]
    fn frame_filter_rejects_non_udp_packets() {
        let frame = build_frame(
            EtherTypes::Ipv4,
            IpNextHeaderProtocols::Tcp,
            DHCP_SERVER_PORT,
            DHCP_CLIENT_PORT,
            &offer_bytes(),
        );
        assert!(dhcp_reply_from_frame(&frame).is_none());
    }

    #[test]
    fn frame_filter_rejects_wrong_ports() {
        let client_to_server = build_frame(
            EtherTypes::Ipv4,
            IpNextHeaderProtocols::Udp,
            DHCP_CLIENT_PORT,
            DHCP_SERVER_PORT,
            &offer_bytes(),
        );
        assert!(dhcp_reply_from_frame(&client_to_server).is_none());

        let odd_destination = build_frame(
            EtherTypes::Ipv4,
            IpNextHeaderProtocols::Udp,
            DHCP_SERVER_PORT,
            6868,
            &offer_bytes(),
        );
        assert!(dhcp_reply_from_frame(&odd_destination).is_none());
    }

    #[test]
    fn frame_filter_rejects_short_dhcp_payload() {
        let frame = build_frame(
            EtherTypes::Ipv4,
            IpNextHeaderProtocols::Udp,
            DHCP_SERVER_PORT,
            DHCP_CLIENT_PORT,
            &[0u8; 48],
        );
        assert!(dhcp_reply_from_frame(&frame).is_none());
    }

    #[test]
    fn bind_error_distinguishes_port_in_use() {
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        match UdpDhcpSocket::open(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, port),
            None,
        ) {
            Err(BindError::PortInUse { port: reported }) => {
                assert_eq!(port, reported)
            }
            Err(other) => panic!("expected PortInUse, got: {}", other),
            Ok(_) => panic!("bind unexpectedly succeeded"),
        }
    }

    #[test]
    fn udp_recv_timeout_elapses_quietly() {
        let mut socket = UdpDhcpSocket::open(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            None,
        )
        .unwrap();

        let mut buf = [0u8; 64];
        let got = socket
            .recv_timeout(&mut buf, Duration::from_millis(20))
            .unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn udp_socket_delivers_datagrams_with_source() {
        let mut receiver = UdpDhcpSocket::open(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            None,
        )
        .unwrap();
        let rx_port = match receiver.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr.port(),
            SocketAddr::V6(_) => panic!("bound an IPv6 socket"),
        };

        let mut sender = UdpDhcpSocket::open(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            None,
        )
        .unwrap();
        sender
            .send_to(
                b"ping",
                SocketAddrV4::new(Ipv4Addr::LOCALHOST, rx_port),
            )
            .unwrap();

        let mut buf = [0u8; 64];
        let (len, src) = receiver
            .recv_timeout(&mut buf, Duration::from_millis(500))
            .unwrap()
            .expect("datagram did not arrive");
        assert_eq!(b"ping", &buf[..len]);
        assert_eq!(Ipv4Addr::LOCALHOST, *src.ip());
    }
}
