use pnet::ipnetwork::{IpNetwork, Ipv4Network};
use pnet::datalink::NetworkInterface;
use rand::Rng;
use std::fs;
use std::net::Ipv4Addr;

const PROC_NET_ROUTE: &str = "/proc/net/route";
const RANDOM_HOST_ATTEMPTS: usize = 32;

/// Effective uid 0 is required to bind the DHCP server port
/// and to open raw capture channels.
pub fn is_privileged_user() -> bool {
    return unsafe { libc::geteuid() } == 0;
}

pub fn get_iface_ipv4_network(
    iface: &NetworkInterface,
) -> Option<&Ipv4Network> {
    iface.ips.iter().find(|ip| ip.is_ipv4()).map(|ip| match ip {
        IpNetwork::V4(net) => net,
        _ => unreachable!(),
    })
}

/// Default gateway of the given interface, taken from the kernel
/// routing table.
pub fn get_default_gateway(iface_name: &str) -> Option<Ipv4Addr> {
    let route_table = fs::read_to_string(PROC_NET_ROUTE).ok()?;
    return parse_default_gateway(&route_table, iface_name);
}

/// Route entries store addresses as little-endian hex words, so
/// 192.168.1.1 appears as "0101A8C0".
fn parse_default_gateway(
    route_table: &str,
    iface_name: &str,
) -> Option<Ipv4Addr> {
    for line in route_table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields.len() < 3 || fields[0] != iface_name {
            continue;
        }

        if fields[1] != "00000000" {
            continue;
        }

        let gateway = match u32::from_str_radix(fields[2], 16) {
            Ok(word) => word,
            Err(_) => continue,
        };

        if gateway == 0 {
            continue;
        }

        return Some(Ipv4Addr::from(gateway.to_le_bytes()));
    }

    return None;
}

/// Random usable address inside the network, skipping the network
/// and broadcast addresses and anything in `exclude`. Networks
/// smaller than /30 have no usable hosts.
pub fn random_host_address(
    net: &Ipv4Network,
    exclude: &[Ipv4Addr],
) -> Option<Ipv4Addr> {
    let host_bits = 32 - u32::from(net.prefix());
    if host_bits < 2 {
        return None;
    }

    let count = 1u64 << host_bits;
    let base = u64::from(u32::from(net.network()));
    let mut rng = rand::thread_rng();

    for _ in 0..RANDOM_HOST_ATTEMPTS {
        let offset = rng.gen_range(1..count - 1);
        let candidate = Ipv4Addr::from((base + offset) as u32);
        if !exclude.contains(&candidate) {
            return Some(candidate);
        }
    }

    for offset in 1..count - 1 {
        let candidate = Ipv4Addr::from((base + offset) as u32);
        if !exclude.contains(&candidate) {
            return Some(candidate);
        }
    }

    return None;
}
