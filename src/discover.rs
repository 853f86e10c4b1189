use crate::args;
use crate::dhcp::{
    join, DhcpMessage, DhcpMessageTypes, DhcpOption, OptionCodes,
    DHCP_SERVER_PORT,
};
use crate::helpers::is_privileged_user;
use crate::transport::{
    dhcp_reply_from_frame, DhcpSocket, SnifferChannel, UdpDhcpSocket,
    POLL_INTERVAL, RECV_BUFFER_SIZE,
};
use log::debug;
use pnet::util::MacAddr;
use rand::Rng;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

/// Vendor classes the probe draws from when the caller does not pin one.
pub const VENDOR_CLASS_CANDIDATES: [&str; 3] =
    ["android-dhcp-16", "MSFT 5.0", "dhcptoolset-test"];

const HOSTNAME_PREFIX: &str = "FAKE-";
const HOSTNAME_SUFFIX_LEN: usize = 8;
const HOSTNAME_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Upper bound for hostname and vendor class bytes on the wire.
const TEXT_OPTION_LIMIT: usize = 63;

/// Identity the probe presents on the wire. Generated per invocation
/// unless the caller pins individual fields.
pub struct ProbeIdentity {
    pub mac: MacAddr,
    pub hostname: String,
    pub vendor_class: String,
    pub xid: u32,
}

/// One answering server. `key` is the server identifier option when the
/// reply carries one, the reply source address otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub key: Ipv4Addr,
    pub source_ip: Ipv4Addr,
    pub reply: DhcpMessage,
}

impl Detection {
    pub fn offered_ip(&self) -> Ipv4Addr {
        return self.reply.yiaddr;
    }
}

pub fn main(args: args::discover::Arguments) -> Result<(), String> {
    let identity =
        synthesize_identity(args.mac, args.hostname, args.vendor_class);

    println!(
        "Sending DISCOVER from {} (hostname: {}, vendor class: {}) on {}",
        identity.mac, identity.hostname, identity.vendor_class, args.iface.name
    );

    let detections = if args.sniff {
        if !is_privileged_user() {
            return Err(format!(
                "Root privileges are required to capture on {}",
                args.iface.name
            ));
        }

        // The capture must be running before the DISCOVER leaves, or a
        // fast server could answer into the void.
        let mut sniffer = SnifferChannel::open(&args.iface, POLL_INTERVAL)?;

        let mut socket = open_probe_socket(&args.iface.name)?;
        send_discover(&mut socket, &identity)
            .map_err(|e| format!("Error sending DISCOVER: {}", e))?;

        probe_sniffer(&mut sniffer, &identity, args.timeout)
            .map_err(|e| format!("Error capturing replies: {}", e))?
    } else {
        let mut socket = open_probe_socket(&args.iface.name)?;
        send_discover(&mut socket, &identity)
            .map_err(|e| format!("Error sending DISCOVER: {}", e))?;

        probe_udp(&mut socket, &identity, args.timeout)
            .map_err(|e| format!("Error receiving replies: {}", e))?
    };

    if detections.is_empty() {
        println!("No DHCP responses (OFFER/ACK) detected");
        return Ok(());
    }

    for detection in detections.iter() {
        println!("");
        print_detection(detection);
    }

    return Ok(());
}

pub fn synthesize_identity(
    mac: Option<MacAddr>,
    hostname: Option<String>,
    vendor_class: Option<String>,
) -> ProbeIdentity {
    return ProbeIdentity {
        mac: mac.unwrap_or_else(random_laa_mac),
        hostname: hostname.unwrap_or_else(random_hostname),
        vendor_class: vendor_class.unwrap_or_else(random_vendor_class),
        xid: rand::thread_rng().gen(),
    };
}

/// Locally administered unicast MAC: local bit set, multicast bit clear.
fn random_laa_mac() -> MacAddr {
    let mut rng = rand::thread_rng();
    return MacAddr::new(
        (rng.gen::<u8>() | 0x02) & 0xFE,
        rng.gen(),
        rng.gen(),
        rng.gen(),
        rng.gen(),
        rng.gen(),
    );
}

fn random_hostname() -> String {
    let mut rng = rand::thread_rng();
    let mut hostname = String::from(HOSTNAME_PREFIX);
    for _ in 0..HOSTNAME_SUFFIX_LEN {
        let index = rng.gen_range(0..HOSTNAME_CHARSET.len());
        hostname.push(HOSTNAME_CHARSET[index] as char);
    }
    return hostname;
}

fn random_vendor_class() -> String {
    let mut rng = rand::thread_rng();
    let index = rng.gen_range(0..VENDOR_CLASS_CANDIDATES.len());
    return VENDOR_CLASS_CANDIDATES[index].to_string();
}

/// DISCOVER for the synthesized identity: message type, hostname,
/// vendor class, then the parameter request list.
pub fn build_discover(identity: &ProbeIdentity) -> DhcpMessage {
    let mut discover = DhcpMessage::new_request();
    discover.xid = identity.xid;
    discover.set_client_mac(identity.mac);

    discover.add_dhcp_msg_type(DhcpMessageTypes::DISCOVER);
    add_wire_text(&mut discover, OptionCodes::HOSTNAME, &identity.hostname);
    add_wire_text(
        &mut discover,
        OptionCodes::VENDOR_CLASS,
        &identity.vendor_class,
    );
    discover.add_parameter_request_list(vec![
        OptionCodes::SUBNET_MASK,
        OptionCodes::ROUTER,
        OptionCodes::DOMAIN_SERVER,
        OptionCodes::NTP_SERVER,
    ]);

    return discover;
}

fn add_wire_text(message: &mut DhcpMessage, code: u8, text: &str) {
    let mut data = text.as_bytes().to_vec();
    data.truncate(TEXT_OPTION_LIMIT);
    message.options.push(DhcpOption::new(code, data));
}

/// An OS DHCP client commonly owns port 68, so the probe sends from an
/// ephemeral port instead.
fn open_probe_socket(iface_name: &str) -> Result<UdpDhcpSocket, String> {
    let socket = UdpDhcpSocket::open(
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
        Some(iface_name),
    )
    .map_err(|e| format!("{}", e))?;

    if let Ok(local) = socket.local_addr() {
        debug!("Probe socket bound to {}", local);
    }

    return Ok(socket);
}

pub fn send_discover<S: DhcpSocket>(
    socket: &mut S,
    identity: &ProbeIdentity,
) -> io::Result<()> {
    let discover = build_discover(identity);
    return socket.send_to(
        &discover.build(),
        SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_SERVER_PORT),
    );
}

/// Collect answers from the probe socket until the window closes.
/// Only datagrams sent from port 67 with a matching transaction id are
/// considered.
pub fn probe_udp<S: DhcpSocket>(
    socket: &mut S,
    identity: &ProbeIdentity,
    window: Duration,
) -> io::Result<Vec<Detection>> {
    let mut detections = Vec::new();
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let deadline = Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.as_nanos() == 0 {
            break;
        }

        let (len, src) = match socket.recv_timeout(&mut buf, remaining)? {
            Some(received) => received,
            None => break,
        };

        if src.port() != DHCP_SERVER_PORT {
            debug!("Datagram from non-server port {}, skipping", src.port());
            continue;
        }

        let reply = match DhcpMessage::parse(&buf[..len]) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Dropping undecodable datagram from {}: {}", src, e);
                continue;
            }
        };

        if reply.xid != identity.xid {
            debug!("Reply for foreign transaction {:#010x}, skipping", reply.xid);
            continue;
        }

        accept_reply(&mut detections, *src.ip(), reply);
    }

    return Ok(detections);
}

/// Collect answers from a datalink capture until the window closes.
/// The frame filter already proved 67 to 68 UDP; on top of that the
/// reply must match the probe transaction id and MAC, since the capture
/// sees every client's traffic on the segment.
pub fn probe_sniffer(
    channel: &mut SnifferChannel,
    identity: &ProbeIdentity,
    window: Duration,
) -> io::Result<Vec<Detection>> {
    let mut detections = Vec::new();
    let deadline = Instant::now() + window;

    while Instant::now() < deadline {
        let frame = match channel.recv_frame()? {
            Some(frame) => frame,
            None => continue,
        };

        let (source_ip, reply) = match dhcp_reply_from_frame(frame) {
            Some(parsed) => parsed,
            None => continue,
        };

        if !matches_probe(&reply, identity) {
            continue;
        }

        accept_reply(&mut detections, source_ip, reply);
    }

    return Ok(detections);
}

fn matches_probe(reply: &DhcpMessage, identity: &ProbeIdentity) -> bool {
    return reply.xid == identity.xid && reply.client_mac() == identity.mac;
}

/// Keep the reply if it is an OFFER or ACK from a server not seen yet.
fn accept_reply(
    detections: &mut Vec<Detection>,
    source_ip: Ipv4Addr,
    reply: DhcpMessage,
) {
    match reply.dhcp_msg_type() {
        Some(DhcpMessageTypes::OFFER) | Some(DhcpMessageTypes::ACK) => {}
        other => {
            debug!("Ignoring reply type {:?} from {}", other, source_ip);
            return;
        }
    }

    let key = reply.dhcp_server_id().unwrap_or(source_ip);
    if detections.iter().any(|d| d.key == key) {
        debug!("Duplicate answer from server {}, skipping", key);
        return;
    }

    detections.push(Detection {
        key,
        source_ip,
        reply,
    });
}

fn print_detection(detection: &Detection) {
    let reply = &detection.reply;
    let type_name = reply
        .dhcp_msg_type()
        .and_then(DhcpMessageTypes::name)
        .unwrap_or("Unknown");

    println!("DHCP server detected: {} ({})", detection.key, type_name);
    println!("Source IP: {}", detection.source_ip);
    println!("Offered IP: {}", detection.offered_ip());

    if let Some(mask) = reply.subnet_mask() {
        println!("Subnet mask: {}", mask);
    }
    if let Some(routers) = reply.routers() {
        println!("Routers: {}", join(&routers, ", "));
    }
    if let Some(servers) = reply.domain_servers() {
        println!("DNS servers: {}", join(&servers, ", "));
    }
    if let Some(lease) = reply.ip_address_lease_time() {
        println!("Lease time: {}s", lease);
    }
}
