use std::time::Duration;

use clap::{App, Arg, ArgMatches, SubCommand};
use pnet::{datalink::NetworkInterface, util::MacAddr};

use super::helpers;

pub const COMMAND_NAME: &str = "discover";

pub fn command() -> App<'static, 'static> {
    SubCommand::with_name(COMMAND_NAME)
        .about("Probe for DHCP servers with a fake client")
        .arg(
            Arg::with_name("iface")
                .long("iface")
                .short("I")
                .required(true)
                .takes_value(true)
                .validator(helpers::is_interface)
                .help("Interface to send the probe"),
        )
        .arg(
            Arg::with_name("mac")
                .long("mac")
                .short("m")
                .takes_value(true)
                .validator(helpers::is_mac)
                .help("MAC to present. If none, a random locally administered MAC will be used"),
        )
        .arg(
            Arg::with_name("hostname")
                .long("hostname")
                .short("H")
                .takes_value(true)
                .help("Hostname to present. If none, a random FAKE-XXXXXXXX name will be used"),
        )
        .arg(
            Arg::with_name("vendor-class")
                .long("vendor-class")
                .takes_value(true)
                .help("Vendor class to present. If none, a common client string will be used"),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .short("t")
                .takes_value(true)
                .default_value("3000")
                .value_name("millis")
                .validator(helpers::is_u64)
                .help("Time to wait for responses in milliseconds"),
        )
        .arg(
            Arg::with_name("sniff")
                .long("sniff")
                .help("Capture replies at the link layer instead of reading the UDP socket. Sees replies addressed to the fake MAC, but requires root"),
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
    pub mac: Option<MacAddr>,
    pub hostname: Option<String>,
    pub vendor_class: Option<String>,
    pub timeout: Duration,
    pub sniff: bool,
    pub verbosity: usize,
}

impl<'a> Arguments {
    pub fn parse(matches: &'a ArgMatches) -> Arguments {
        let iface =
            helpers::lookup_interface(matches.value_of("iface").unwrap())
                .unwrap();

        Self {
            iface,
            mac: helpers::parse_mac(matches, "mac"),
            hostname: helpers::parse_string(matches, "hostname"),
            vendor_class: helpers::parse_string(matches, "vendor-class"),
            timeout: Duration::from_millis(
                matches.value_of("timeout").unwrap().parse().unwrap(),
            ),
            sniff: matches.is_present("sniff"),
            verbosity: matches.occurrences_of("verbosity") as usize,
        }
    }
}
