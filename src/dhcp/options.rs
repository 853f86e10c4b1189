use super::err::IResult;
use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use std::fmt::Display;
use std::net::Ipv4Addr;

/// One option as it appears on the wire. Values are kept raw so that
/// unrecognized codes survive a parse/build round-trip untouched;
/// typed access to the recognized codes lives on `DhcpMessage`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DhcpOption {
    pub code: u8,
    pub data: Vec<u8>,
}

impl DhcpOption {
    pub fn new(code: u8, data: Vec<u8>) -> Self {
        return Self { code, data };
    }

    pub fn from_addrs(code: u8, addrs: &[Ipv4Addr]) -> Self {
        let mut data = Vec::new();
        for a in addrs {
            data.extend(a.octets().iter());
        }

        return Self { code, data };
    }

    /// Wire form: code, length, value. The caller keeps values at 255
    /// bytes or less.
    pub fn build(&self) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.push(self.code);
        raw.push(self.data.len() as u8);
        raw.extend(&self.data);

        return raw;
    }
}

/// Walk a TLV options region. The walk ends at END, skips PAD bytes
/// (which carry no length octet) and stops silently when a declared
/// length overruns the remaining bytes, keeping whatever was recovered
/// before that point. END and PAD are never stored as options.
pub fn parse_options(region: &[u8]) -> Vec<DhcpOption> {
    let mut options = Vec::new();
    let mut input = region;

    while let Ok((rest, code)) = next_byte(input) {
        input = rest;
        match code {
            OptionCodes::END => break,
            OptionCodes::PAD => continue,
            _ => {}
        }

        let (rest, len) = match next_byte(input) {
            Ok(parsed) => parsed,
            Err(_) => break,
        };
        let (rest, data) = match take_value(rest, len) {
            Ok(parsed) => parsed,
            Err(_) => break,
        };

        options.push(DhcpOption {
            code,
            data: data.to_vec(),
        });
        input = rest;
    }

    return options;
}

fn next_byte(input: &[u8]) -> IResult<&[u8], u8> {
    be_u8(input)
}

fn take_value(input: &[u8], len: u8) -> IResult<&[u8], &[u8]> {
    take(len)(input)
}

pub fn join<I: Display>(v: &[I], separator: &str) -> String {
    v.iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join(separator)
}

#[allow(non_snake_case)]
pub mod OptionCodes {

    pub const PAD: u8 = 0;

    pub const SUBNET_MASK: u8 = 1;

    pub const ROUTER: u8 = 3;

    pub const DOMAIN_SERVER: u8 = 6;

    pub const HOSTNAME: u8 = 12;

    pub const NTP_SERVER: u8 = 42;

    pub const IP_ADDRESS_LEASE_TIME: u8 = 51;

    pub const DHCP_MSG_TYPE: u8 = 53;
    pub const DHCP_SERVER_ID: u8 = 54;
    pub const PARAMETER_REQUEST_LIST: u8 = 55;

    pub const VENDOR_CLASS: u8 = 60;

    pub const END: u8 = 255;
}

#[allow(non_snake_case)]
pub mod DhcpMessageTypes {
    /// Client broadcast to locate available servers.
    pub const DISCOVER: u8 = 1;

    /// Server to client in response to DHCPDISCOVER with offer of
    /// configuration parameters.
    pub const OFFER: u8 = 2;

    /// Client message to servers either (a) requesting offered parameters
    /// from one server and
    /// implicitly declining offers from all others, (b) confirming correctness
    /// of previously
    /// allocated address after, e.g., system reboot, or (c) extending the
    /// lease on a particular
    /// network address.
    pub const REQUEST: u8 = 3;

    /// Client to server indicating network address is already in use.
    pub const DECLINE: u8 = 4;

    /// Server to client with configuration parameters, including committed
    /// network address.
    pub const ACK: u8 = 5;

    /// Server to client indicating client's notion of network address is
    /// incorrect (e.g., client
    /// has moved to new subnet) or client's lease as expired.
    pub const NAK: u8 = 6;

    /// Client to server relinquishing network address and cancelling remaining
    /// lease.
    pub const RELEASE: u8 = 7;

    /// Client to server, asking only for local configuration parameters;
    /// client already has
    /// externally configured network address.
    pub const INFORM: u8 = 8;

    /// Message types that only ever originate from a client.
    pub const CLIENT_ORIGINATED: [u8; 4] = [DISCOVER, REQUEST, RELEASE, INFORM];

    pub fn name(msg_type: u8) -> Option<&'static str> {
        match msg_type {
            DISCOVER => Some("Discover"),
            OFFER => Some("Offer"),
            REQUEST => Some("Request"),
            DECLINE => Some("Decline"),
            ACK => Some("Ack"),
            NAK => Some("Nak"),
            RELEASE => Some("Release"),
            INFORM => Some("Inform"),
            _ => None,
        }
    }
}
