use clap::{App, Arg, ArgMatches, SubCommand};
use pnet::datalink::NetworkInterface;

use super::helpers;

pub const COMMAND_NAME: &str = "listen";

pub fn command() -> App<'static, 'static> {
    SubCommand::with_name(COMMAND_NAME)
        .about("Passively inventory DHCP clients")
        .arg(
            Arg::with_name("iface")
                .long("iface")
                .short("I")
                .takes_value(true)
                .validator(helpers::is_interface)
                .help("Interface to listen on. If none, all interfaces"),
        )
        .arg(
            Arg::with_name("verbosity")
                .short("v")
                .multiple(true)
                .help("Increase message verbosity"),
        )
}

pub struct Arguments {
    pub iface: Option<NetworkInterface>,
    pub verbosity: usize,
}

impl<'a> Arguments {
    pub fn parse(matches: &'a ArgMatches) -> Arguments {
        let iface = matches
            .value_of("iface")
            .and_then(helpers::lookup_interface);

        Self {
            iface,
            verbosity: matches.occurrences_of("verbosity") as usize,
        }
    }
}
