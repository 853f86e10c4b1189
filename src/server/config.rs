use crate::args;
use crate::helpers::{
    get_default_gateway, get_iface_ipv4_network, random_host_address,
};
use pnet::ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::time::Duration;

/// How long a client gets to turn an OFFER into a REQUEST.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(3);

/// Everything one negotiation advertises to the client. Resolved once
/// at startup, immutable afterwards.
pub struct OfferConfig {
    pub server_ip: Ipv4Addr,
    pub router: Ipv4Addr,
    pub net_mask: Ipv4Addr,
    pub domain_servers: Vec<Ipv4Addr>,
    pub offer_ip: Ipv4Addr,
    pub lease_time: u32,
    pub request_deadline: Duration,
}

pub fn generate_offer_config(
    args: &args::server::Arguments,
) -> Result<OfferConfig, String> {
    let iface = &args.iface;

    let iface_net = get_iface_ipv4_network(iface).ok_or_else(|| {
        format!("Unable to get the network of {} interface", iface.name)
    })?;

    let gateway = get_default_gateway(&iface.name);

    return resolve_offer_config(args, iface_net, gateway);
}

/// Unset arguments fall back to the environment: the real gateway
/// poses as server and router, the interface supplies the netmask,
/// and the offered address is drawn from the interface network.
fn resolve_offer_config(
    args: &args::server::Arguments,
    iface_net: &Ipv4Network,
    gateway: Option<Ipv4Addr>,
) -> Result<OfferConfig, String> {
    let server_ip = match args.server_ip {
        Some(ip) => ip,
        None => gateway.unwrap_or_else(|| iface_net.ip()),
    };

    let router = match args.router {
        Some(ip) => ip,
        None => gateway.unwrap_or(server_ip),
    };

    let net_mask = match args.net_mask {
        Some(mask) => mask,
        None => iface_net.mask(),
    };

    let offer_ip = match args.offer_ip {
        Some(ip) => ip,
        None => {
            let taken = [iface_net.ip(), server_ip, router];
            random_host_address(iface_net, &taken).ok_or_else(|| {
                format!("Unable to pick an address to offer in {}", iface_net)
            })?
        }
    };

    let domain_servers = match &args.dns {
        Some(ips) => ips.clone(),
        None => vec![server_ip],
    };

    return Ok(OfferConfig {
        server_ip,
        router,
        net_mask,
        domain_servers,
        offer_ip,
        lease_time: args.lease_time,
        request_deadline: REQUEST_DEADLINE,
    });
}
