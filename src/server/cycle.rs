use super::config::OfferConfig;
use crate::dhcp::{join, DhcpMessage, DhcpMessageTypes, OptionCodes, TransactionKey};
use crate::transport::{DhcpSocket, POLL_INTERVAL, RECV_BUFFER_SIZE};
use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Repeated DISCOVERs tolerated within one negotiation. Reaching this
/// count means the client never intends to send a REQUEST.
const DISCOVER_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// ACK sent, negotiation finished.
    Done,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// No matching REQUEST arrived before the deadline.
    RequestTimeout,
    /// The client kept repeating its DISCOVER instead of requesting.
    TooManyDiscovers,
    /// External interrupt.
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::RequestTimeout => {
                write!(f, "no REQUEST before the deadline")
            }
            AbortReason::TooManyDiscovers => {
                write!(f, "too many repeated DISCOVERs")
            }
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One negotiation in flight: its identity, the OFFER to repeat if
/// the client retries, and the port replies go back to.
struct ServerCycle {
    key: TransactionKey,
    offer: DhcpMessage,
    reply_addr: SocketAddrV4,
    discover_count: u32,
}

/// Drive one DISCOVER/OFFER/REQUEST/ACK negotiation to completion.
/// Waits without bound for the first DISCOVER, then holds the client
/// to the configured REQUEST deadline. Messages from other
/// negotiations are left alone.
pub fn run_cycle<S: DhcpSocket>(
    socket: &mut S,
    config: &OfferConfig,
    running: &AtomicBool,
) -> io::Result<CycleOutcome> {
    let (discover, src) = match await_discover(socket, running)? {
        Some(start) => start,
        None => return Ok(CycleOutcome::Aborted(AbortReason::Cancelled)),
    };

    let client_mac = discover.client_mac();
    match discover.hostname() {
        Some(name) => info!("DISCOVER from {} ({})", client_mac, name),
        None => info!("DISCOVER from {}", client_mac),
    }

    if let Some(request_list) = discover.parameter_request_list() {
        debug!("Requested options: {}", join(request_list, ","));
    }

    let offer = new_offer(&discover, config);

    // BOOTP convention: replies are broadcast on the port the request
    // came from, also for the later ACK.
    let reply_addr = SocketAddrV4::new(Ipv4Addr::BROADCAST, src.port());

    socket.send_to(&offer.build(), reply_addr)?;
    info!("OFFER {} to {}", config.offer_ip, client_mac);

    let mut cycle = ServerCycle {
        key: TransactionKey::of(&discover),
        offer,
        reply_addr,
        discover_count: 1,
    };

    return await_request(socket, &mut cycle, config, running);
}

fn await_discover<S: DhcpSocket>(
    socket: &mut S,
    running: &AtomicBool,
) -> io::Result<Option<(DhcpMessage, SocketAddrV4)>> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        if !running.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let (len, src) = match socket.recv_timeout(&mut buf, POLL_INTERVAL)? {
            Some(datagram) => datagram,
            None => continue,
        };

        let message = match DhcpMessage::parse(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping undecodable datagram from {}: {}", src, e);
                continue;
            }
        };

        match message.dhcp_msg_type() {
            Some(DhcpMessageTypes::DISCOVER) => {
                return Ok(Some((message, src)));
            }
            _ => continue,
        }
    }
}

fn await_request<S: DhcpSocket>(
    socket: &mut S,
    cycle: &mut ServerCycle,
    config: &OfferConfig,
    running: &AtomicBool,
) -> io::Result<CycleOutcome> {
    let deadline = Instant::now() + config.request_deadline;
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        if !running.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Aborted(AbortReason::Cancelled));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.as_nanos() == 0 {
            warn!(
                "No REQUEST from {} within {:?}",
                cycle.key.client_mac, config.request_deadline
            );
            return Ok(CycleOutcome::Aborted(AbortReason::RequestTimeout));
        }

        let (len, src) =
            match socket.recv_timeout(&mut buf, remaining.min(POLL_INTERVAL))? {
                Some(datagram) => datagram,
                None => continue,
            };

        let message = match DhcpMessage::parse(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping undecodable datagram from {}: {}", src, e);
                continue;
            }
        };

        let msg_type = match message.dhcp_msg_type() {
            Some(msg_type) => msg_type,
            None => continue,
        };
        let key = TransactionKey::of(&message);

        match msg_type {
            DhcpMessageTypes::DISCOVER => {
                if key != cycle.key {
                    debug!(
                        "Ignoring DISCOVER from another client {}",
                        key.client_mac
                    );
                    continue;
                }

                cycle.discover_count += 1;

                if cycle.discover_count >= DISCOVER_LIMIT {
                    warn!(
                        "{} DISCOVERs from {} and still no REQUEST, giving up",
                        cycle.discover_count, key.client_mac
                    );
                    return Ok(CycleOutcome::Aborted(
                        AbortReason::TooManyDiscovers,
                    ));
                }

                warn!(
                    "Repeated DISCOVER ({}) from {}, offering again",
                    cycle.discover_count, key.client_mac
                );
                socket.send_to(&cycle.offer.build(), cycle.reply_addr)?;
            }
            DhcpMessageTypes::REQUEST => {
                if key != cycle.key {
                    warn!(
                        "Ignoring REQUEST from {} not matching the current \
                         negotiation",
                        key.client_mac
                    );
                    continue;
                }

                let ack = new_ack(&cycle.offer, &message);
                socket.send_to(&ack.build(), cycle.reply_addr)?;
                info!("ACK {} to {}", ack.yiaddr, key.client_mac);
                return Ok(CycleOutcome::Done);
            }
            _ => {
                debug!("Ignoring message type {} during negotiation", msg_type);
            }
        }
    }
}

/// OFFER answering a DISCOVER: the offered address in yiaddr, this
/// server in siaddr, plus the advertised network parameters.
pub fn new_offer(discover: &DhcpMessage, config: &OfferConfig) -> DhcpMessage {
    let mut offer = DhcpMessage::new_reply();
    offer.xid = discover.xid;
    offer.chaddr = discover.chaddr;
    offer.yiaddr = config.offer_ip;
    offer.siaddr = config.server_ip;

    offer.add_dhcp_msg_type(DhcpMessageTypes::OFFER);
    offer.add_subnet_mask(config.net_mask);
    offer.add_router(&[config.router]);
    offer.add_ip_address_lease_time(config.lease_time);
    offer.add_dhcp_server_id(config.server_ip);
    offer.add_domain_server(&config.domain_servers);

    return offer;
}

/// ACK built from the OFFER: same addresses and options with the
/// message type replaced, identity taken from the REQUEST.
pub fn new_ack(offer: &DhcpMessage, request: &DhcpMessage) -> DhcpMessage {
    let mut ack = DhcpMessage::new_reply();
    ack.xid = request.xid;
    ack.chaddr = request.chaddr;
    ack.yiaddr = offer.yiaddr;
    ack.siaddr = offer.siaddr;

    ack.add_dhcp_msg_type(DhcpMessageTypes::ACK);
    for option in &offer.options {
        if option.code != OptionCodes::DHCP_MSG_TYPE {
            ack.options.push(option.clone());
        }
    }

    return ack;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::BOOT_REPLY;
    use crate::transport::testing::ScriptedSocket;
    use pnet::util::MacAddr;
    use std::time::Duration;

    const CLIENT_MAC: MacAddr = MacAddr(0x02, 0x11, 0x22, 0x33, 0x44, 0x55);
    const XID: u32 = 0xAABBCCDD;

    fn test_config() -> OfferConfig {
        return OfferConfig {
            server_ip: Ipv4Addr::new(10, 0, 0, 2),
            router: Ipv4Addr::new(10, 0, 0, 1),
            net_mask: Ipv4Addr::new(255, 255, 255, 0),
            domain_servers: vec![Ipv4Addr::new(10, 0, 0, 2)],
            offer_ip: Ipv4Addr::new(10, 0, 0, 50),
            lease_time: 86400,
            request_deadline: Duration::from_millis(40),
        };
    }

    fn discover_bytes(xid: u32, mac: MacAddr) -> Vec<u8> {
        let mut discover = DhcpMessage::new_request();
        discover.xid = xid;
        discover.set_client_mac(mac);
        discover.add_dhcp_msg_type(DhcpMessageTypes::DISCOVER);
        return discover.build();
    }

    fn request_bytes(xid: u32, mac: MacAddr) -> Vec<u8> {
        let mut request = DhcpMessage::new_request();
        request.xid = xid;
        request.set_client_mac(mac);
        request.add_dhcp_msg_type(DhcpMessageTypes::REQUEST);
        return request.build();
    }

    fn client_addr(port: u16) -> SocketAddrV4 {
        return SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), port);
    }

    fn run(socket: &mut ScriptedSocket) -> CycleOutcome {
        let running = AtomicBool::new(true);
        return run_cycle(socket, &test_config(), &running).unwrap();
    }

    fn sent_message(socket: &ScriptedSocket, index: usize) -> DhcpMessage {
        return DhcpMessage::parse(&socket.sent[index].0).unwrap();
    }

    #[test]
    fn offer_and_ack_complete_a_negotiation() {
        let mut socket = ScriptedSocket::new();
        socket.push_inbound(discover_bytes(XID, CLIENT_MAC), client_addr(68));
        socket.push_inbound(request_bytes(XID, CLIENT_MAC), client_addr(68));

        assert_eq!(CycleOutcome::Done, run(&mut socket));
        assert_eq!(2, socket.sent.len());

        let offer = sent_message(&socket, 0);
        assert_eq!(BOOT_REPLY, offer.op);
        assert_eq!(Some(DhcpMessageTypes::OFFER), offer.dhcp_msg_type());
        assert_eq!(Ipv4Addr::new(10, 0, 0, 50), offer.yiaddr);
        assert_eq!(Ipv4Addr::new(10, 0, 0, 2), offer.siaddr);
        assert_eq!(Some(Ipv4Addr::new(10, 0, 0, 2)), offer.dhcp_server_id());
        assert_eq!(
            Some(Ipv4Addr::new(255, 255, 255, 0)),
            offer.subnet_mask()
        );
        assert_eq!(Some(vec![Ipv4Addr::new(10, 0, 0, 1)]), offer.routers());
        assert_eq!(Some(86400), offer.ip_address_lease_time());
        assert_eq!(XID, offer.xid);
        assert_eq!(CLIENT_MAC, offer.client_mac());

        let ack = sent_message(&socket, 1);
        assert_eq!(Some(DhcpMessageTypes::ACK), ack.dhcp_msg_type());
        assert_eq!(offer.yiaddr, ack.yiaddr);
        assert_eq!(XID, ack.xid);
        assert_eq!(CLIENT_MAC, ack.client_mac());
        assert_eq!(offer.dhcp_server_id(), ack.dhcp_server_id());

        // Both replies are broadcast on the port the DISCOVER used.
        assert_eq!(
            SocketAddrV4::new(Ipv4Addr::BROADCAST, 68),
            socket.sent[0].1
        );
        assert_eq!(
            SocketAddrV4::new(Ipv4Addr::BROADCAST, 68),
            socket.sent[1].1
        );
    }

    #[test]
    fn replies_reuse_the_discover_source_port() {
        let mut socket = ScriptedSocket::new();
        socket.push_inbound(discover_bytes(XID, CLIENT_MAC), client_addr(6868));
        socket.push_inbound(request_bytes(XID, CLIENT_MAC), client_addr(68));

        assert_eq!(CycleOutcome::Done, run(&mut socket));
        assert_eq!(6868, socket.sent[0].1.port());
        assert_eq!(6868, socket.sent[1].1.port());
    }

    #[test]
    fn request_with_wrong_xid_gets_no_ack() {
        let mut socket = ScriptedSocket::new();
        socket.push_inbound(discover_bytes(XID, CLIENT_MAC), client_addr(68));
        socket.push_inbound(request_bytes(0x01020304, CLIENT_MAC), client_addr(68));

        assert_eq!(
            CycleOutcome::Aborted(AbortReason::RequestTimeout),
            run(&mut socket)
        );
        assert_eq!(1, socket.sent.len());
    }

    #[test]
    fn request_from_another_mac_gets_no_ack() {
        let mut socket = ScriptedSocket::new();
        socket.push_inbound(discover_bytes(XID, CLIENT_MAC), client_addr(68));
        socket.push_inbound(
            request_bytes(XID, MacAddr(0x02, 9, 9, 9, 9, 9)),
            client_addr(68),
        );

        assert_eq!(
            CycleOutcome::Aborted(AbortReason::RequestTimeout),
            run(&mut socket)
        );
        assert_eq!(1, socket.sent.len());
    }

    #[test]
    fn fifth_discover_aborts_without_another_offer() {
        let mut socket = ScriptedSocket::new();
        for _ in 0..5 {
            socket.push_inbound(
                discover_bytes(XID, CLIENT_MAC),
                client_addr(68),
            );
        }

        assert_eq!(
            CycleOutcome::Aborted(AbortReason::TooManyDiscovers),
            run(&mut socket)
        );

        // Initial OFFER plus one per tolerated repeat; the fifth
        // DISCOVER aborts instead of offering again.
        assert_eq!(4, socket.sent.len());
        for index in 0..4 {
            assert_eq!(
                Some(DhcpMessageTypes::OFFER),
                sent_message(&socket, index).dhcp_msg_type()
            );
        }
    }

    #[test]
    fn foreign_discover_does_not_disturb_the_negotiation() {
        let mut socket = ScriptedSocket::new();
        socket.push_inbound(discover_bytes(XID, CLIENT_MAC), client_addr(68));
        socket.push_inbound(
            discover_bytes(0x0BADF00D, MacAddr(0x02, 7, 7, 7, 7, 7)),
            client_addr(68),
        );
        socket.push_inbound(request_bytes(XID, CLIENT_MAC), client_addr(68));

        assert_eq!(CycleOutcome::Done, run(&mut socket));
        assert_eq!(2, socket.sent.len());
    }

    #[test]
    fn garbage_datagrams_are_skipped() {
        let mut socket = ScriptedSocket::new();
        socket.push_inbound(vec![0u8; 10], client_addr(68));
        socket.push_inbound(discover_bytes(XID, CLIENT_MAC), client_addr(68));
        socket.push_inbound(vec![0xFF; 100], client_addr(68));
        socket.push_inbound(request_bytes(XID, CLIENT_MAC), client_addr(68));

        assert_eq!(CycleOutcome::Done, run(&mut socket));
        assert_eq!(2, socket.sent.len());
    }

    #[test]
    fn cancellation_stops_the_wait_for_a_discover() {
        let mut socket = ScriptedSocket::new();
        let running = AtomicBool::new(false);

        let outcome =
            run_cycle(&mut socket, &test_config(), &running).unwrap();
        assert_eq!(
            CycleOutcome::Aborted(AbortReason::Cancelled),
            outcome
        );
        assert!(socket.sent.is_empty());
    }
}
