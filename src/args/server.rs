use clap::{App, Arg, ArgMatches, SubCommand};
use pnet::datalink::NetworkInterface;
use std::net::Ipv4Addr;

use super::helpers;

pub const COMMAND_NAME: &str = "server";

pub fn command() -> App<'static, 'static> {
    SubCommand::with_name(COMMAND_NAME)
        .about("Rogue DHCP server")
        .arg(
            Arg::with_name("iface")
                .long("iface")
                .short("I")
                .required(true)
                .takes_value(true)
                .validator(helpers::is_interface)
                .help("Interface to listen requests"),
        )
        .arg(
            Arg::with_name("server")
                .long("server")
                .short("s")
                .takes_value(true)
                .value_name("ip")
                .validator(helpers::is_ip)
                .help("DHCP server IP to announce. If none, the default gateway or the interface IP will be used"),
        )
        .arg(
            Arg::with_name("router")
                .long("router")
                .visible_alias("gateway")
                .short("r")
                .takes_value(true)
                .value_name("ip")
                .validator(helpers::is_ip)
                .help("Gateway IP to offer. If none, the default gateway or the server IP will be used"),
        )
        .arg(
            Arg::with_name("mask")
                .long("mask")
                .short("m")
                .takes_value(true)
                .value_name("ip")
                .validator(helpers::is_ip)
                .help("Net mask. If none, the interface mask will be used"),
        )
        .arg(
            Arg::with_name("dns")
                .long("dns")
                .short("D")
                .takes_value(true)
                .value_name("ip")
                .use_delimiter(true)
                .validator(helpers::is_ip)
                .help("DNS server IPs. If none, the DHCP server IP will be used"),
        )
        .arg(
            Arg::with_name("offer")
                .long("offer")
                .short("o")
                .takes_value(true)
                .value_name("ip")
                .validator(helpers::is_ip)
                .help("IP to offer. If none, a random address of the interface network will be used"),
        )
        .arg(
            Arg::with_name("lease-time")
                .long("lease-time")
                .short("l")
                .takes_value(true)
                .default_value("86400")
                .value_name("seconds")
                .validator(helpers::is_u32)
                .help("Lease time in seconds to announce"),
        )
        .arg(
            Arg::with_name("once")
                .long("once")
                .help("Serve a single negotiation and exit"),
        )
        .arg(
            Arg::with_name("verbosity")
                .short("v")
                .multiple(true)
                .help("Increase message verbosity"),
        )
}

pub struct Arguments {
    pub iface: NetworkInterface,
    pub server_ip: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub net_mask: Option<Ipv4Addr>,
    pub dns: Option<Vec<Ipv4Addr>>,
    pub offer_ip: Option<Ipv4Addr>,
    pub lease_time: u32,
    pub once: bool,
    pub verbosity: usize,
}

impl<'a> Arguments {
    pub fn parse(matches: &'a ArgMatches) -> Arguments {
        let iface =
            helpers::lookup_interface(matches.value_of("iface").unwrap())
                .unwrap();

        Self {
            iface,
            server_ip: helpers::parse_ip(matches, "server"),
            router: helpers::parse_ip(matches, "router"),
            net_mask: helpers::parse_ip(matches, "mask"),
            dns: helpers::parse_ips(matches, "dns"),
            offer_ip: helpers::parse_ip(matches, "offer"),
            lease_time: matches
                .value_of("lease-time")
                .unwrap()
                .parse()
                .unwrap(),
            once: matches.is_present("once"),
            verbosity: matches.occurrences_of("verbosity") as usize,
        }
    }
}
