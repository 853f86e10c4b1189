use crate::args;
use crate::dhcp::{self, DhcpMessage, DhcpMessageTypes};
use crate::fingerprint::{DeviceClassifier, FingerprintHint, OuiClassifier};
use crate::helpers::is_privileged_user;
use crate::transport::{
    DhcpSocket, UdpDhcpSocket, POLL_INTERVAL, RECV_BUFFER_SIZE,
};
use log::debug;
use pnet::util::MacAddr;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Everything learned about one client MAC over the capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    pub mac: MacAddr,
    pub device: &'static str,
    pub hostname: Option<String>,
    pub vendor_class: Option<String>,
    pub message_types: HashSet<u8>,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
    pub packet_count: u64,
}

/// Per-MAC aggregation of observed client traffic. The classifier runs
/// on first sight and again whenever a fingerprint field (hostname or
/// vendor class) first becomes available.
pub struct ClientTable<C: DeviceClassifier> {
    classifier: C,
    records: HashMap<MacAddr, ClientRecord>,
}

impl<C: DeviceClassifier> ClientTable<C> {
    pub fn new(classifier: C) -> Self {
        return Self {
            classifier,
            records: HashMap::new(),
        };
    }

    /// Fold one message into the table and return the touched record.
    /// Messages that are not client-originated are dropped.
    pub fn observe(
        &mut self,
        message: &DhcpMessage,
        now: SystemTime,
    ) -> Option<&ClientRecord> {
        let msg_type = match message.dhcp_msg_type() {
            Some(t) if DhcpMessageTypes::CLIENT_ORIGINATED.contains(&t) => t,
            other => {
                debug!("Ignoring non-client message type {:?}", other);
                return None;
            }
        };

        let mac = message.client_mac();
        let hostname = message.hostname();
        let vendor_class = message.vendor_class();

        if self.records.contains_key(&mac) {
            if let Some(record) = self.records.get_mut(&mac) {
                let gained_fingerprint = (hostname.is_some()
                    && record.hostname.is_none())
                    || (vendor_class.is_some()
                        && record.vendor_class.is_none());

                if hostname.is_some() {
                    record.hostname = hostname;
                }
                if vendor_class.is_some() {
                    record.vendor_class = vendor_class;
                }

                record.message_types.insert(msg_type);
                record.last_seen = now;
                record.packet_count += 1;

                if gained_fingerprint {
                    record.device =
                        self.classifier.classify(&FingerprintHint {
                            mac,
                            hostname: record.hostname.as_deref(),
                            vendor_class: record.vendor_class.as_deref(),
                        });
                }
            }
        } else {
            let device = self.classifier.classify(&FingerprintHint {
                mac,
                hostname: hostname.as_deref(),
                vendor_class: vendor_class.as_deref(),
            });

            let mut message_types = HashSet::new();
            message_types.insert(msg_type);

            self.records.insert(
                mac,
                ClientRecord {
                    mac,
                    device,
                    hostname,
                    vendor_class,
                    message_types,
                    first_seen: now,
                    last_seen: now,
                    packet_count: 1,
                },
            );
        }

        return self.records.get(&mac);
    }
}

pub fn main(args: args::listen::Arguments) -> Result<(), String> {
    if !is_privileged_user() {
        return Err(format!(
            "Root privileges are required to bind UDP port {}",
            dhcp::DHCP_SERVER_PORT
        ));
    }

    let iface_name = args.iface.as_ref().map(|iface| iface.name.as_str());
    let mut socket = UdpDhcpSocket::open(
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, dhcp::DHCP_SERVER_PORT),
        iface_name,
    )
    .map_err(|e| format!("{}", e))?;

    let running = Arc::new(AtomicBool::new(true));
    let run_c = running.clone();

    ctrlc::set_handler(move || {
        run_c.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    println!("Listening for DHCP clients on port 67...");

    let mut table = ClientTable::new(OuiClassifier);
    run_listener(&mut socket, &mut table, &running)
        .map_err(|e| format!("Error while listening: {}", e))?;

    return Ok(());
}

/// Receive loop: never transmits, prints one line for every accepted
/// message until the flag clears.
pub fn run_listener<S: DhcpSocket, C: DeviceClassifier>(
    socket: &mut S,
    table: &mut ClientTable<C>,
    running: &AtomicBool,
) -> io::Result<()> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    while running.load(Ordering::SeqCst) {
        let (len, src) = match socket.recv_timeout(&mut buf, POLL_INTERVAL)? {
            Some(received) => received,
            None => continue,
        };

        let message = match DhcpMessage::parse(&buf[..len]) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping undecodable datagram from {}: {}", src, e);
                continue;
            }
        };

        if let Some(record) = table.observe(&message, SystemTime::now()) {
            print_record(record);
        }
    }

    return Ok(());
}

fn print_record(record: &ClientRecord) {
    let mut types: Vec<u8> = record.message_types.iter().copied().collect();
    types.sort();
    let names: Vec<&str> = types
        .iter()
        .filter_map(|&t| DhcpMessageTypes::name(t))
        .collect();

    let span = record
        .last_seen
        .duration_since(record.first_seen)
        .unwrap_or_default();

    println!(
        "{} [{}] hostname: {} vendor: {} types: {} packets: {} over {}s",
        record.mac,
        record.device,
        record.hostname.as_deref().unwrap_or("-"),
        record.vendor_class.as_deref().unwrap_or("-"),
        names.join(","),
        record.packet_count,
        span.as_secs()
    );
}
