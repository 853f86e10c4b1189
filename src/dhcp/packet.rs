use super::err::{FormatError, IResult};
use super::helpers::{decode_utf8, parse_ipv4, parse_ipv4s};
use super::options::{parse_options, DhcpOption, OptionCodes};
use nom::bytes::complete::{tag, take};
use nom::number::complete::{be_u16, be_u32, be_u8};
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

const DHCP_COOKIE: [u8; 4] = [99, 130, 83, 99];

pub const BOOT_REQUEST: u8 = 1; // From Client;
pub const BOOT_REPLY: u8 = 2; // From Server;

pub const ETHERNET_TYPE: u8 = 1;

pub const ETHERNET_ADDRESS_LEN: u8 = 6;

/// Size of the fixed BOOTP header including the cookie. Anything
/// shorter cannot be parsed at all.
pub const DHCP_FIXED_HEADER_SIZE: usize = 240;

/// Classic BOOTP minimum message size; built packets are zero-padded
/// up to it so short replies are not dropped by picky clients.
pub const DHCP_PACKET_MIN_SIZE: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct DhcpMessage {
    /// Message op code.
    pub op: u8,

    /// Hardware address type; 1 for 10mb ethernet.
    pub htype: u8,

    /// Hardware address length; 6 for 10mb ethernet.
    pub hlen: u8,

    /// Client sets to zero, optionally used by relay agents
    /// when booting via a relay agent.
    pub hops: u8,

    /// Transaction ID, a random number chosen by the
    /// client, used by the client and server to associate
    /// messages and responses between a client and a
    /// server.
    pub xid: u32,

    /// Filled in by client, seconds elapsed since client
    /// began address acquisition or renewal process.
    pub secs: u16,

    /// Used to indicate if message is unicast or broadcast.
    pub flags: u16,

    /// Client IP address; only filled in if client is in
    /// BOUND, RENEW or REBINDING state and can respond
    /// to ARP requests.
    pub ciaddr: Ipv4Addr,

    /// 'your' (client) IP address.
    pub yiaddr: Ipv4Addr,

    /// IP address of next server to use in bootstrap;
    /// returned in DHCPOFFER, DHCPACK by server.
    pub siaddr: Ipv4Addr,

    /// Relay agent IP address, used in booting via a
    /// relay agent.
    pub giaddr: Ipv4Addr,

    /// Client hardware address. 16 bytes on the wire; for ethernet
    /// only the first 6 carry the MAC and the tail is padding, kept
    /// as received.
    pub chaddr: [u8; 16],

    /// Optional server host name, null terminated string.
    pub sname: [u8; 64],

    /// Boot file name, null terminated string; "generic"
    /// name or null in DHCPDISCOVER, fully qualified
    /// directory-path name in DHCPOFFER.
    pub file: [u8; 128],

    pub options: Vec<DhcpOption>,
}

macro_rules! get_u8_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&self) -> Option<u8> {
            let data = self.find_option($code)?;
            let parsed: IResult<&[u8], u8> = be_u8(data);
            return parsed.ok().map(|(_, v)| v);
        }
    };
}

macro_rules! get_u32_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&self) -> Option<u32> {
            let data = self.find_option($code)?;
            let parsed: IResult<&[u8], u32> = be_u32(data);
            return parsed.ok().map(|(_, v)| v);
        }
    };
}

macro_rules! get_ipv4_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&self) -> Option<Ipv4Addr> {
            let data = self.find_option($code)?;
            return parse_ipv4(data).ok().map(|(_, addr)| addr);
        }
    };
}

macro_rules! get_ipv4s_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&self) -> Option<Vec<Ipv4Addr>> {
            let data = self.find_option($code)?;
            return Some(parse_ipv4s(data));
        }
    };
}

macro_rules! get_string_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&self) -> Option<String> {
            let data = self.find_option($code)?;
            return Some(decode_utf8(data));
        }
    };
}

macro_rules! add_u8_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&mut self, value: u8) {
            self.options.push(DhcpOption::new($code, vec![value]));
        }
    };
}

macro_rules! add_u32_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&mut self, value: u32) {
            self.options
                .push(DhcpOption::new($code, value.to_be_bytes().to_vec()));
        }
    };
}

macro_rules! add_ipv4_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&mut self, addr: Ipv4Addr) {
            self.options
                .push(DhcpOption::new($code, addr.octets().to_vec()));
        }
    };
}

macro_rules! add_ipv4s_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&mut self, addrs: &[Ipv4Addr]) {
            self.options.push(DhcpOption::from_addrs($code, addrs));
        }
    };
}

macro_rules! add_string_option {
    ($fn:ident, $code:expr) => {
        pub fn $fn(&mut self, value: &str) {
            self.options
                .push(DhcpOption::new($code, value.as_bytes().to_vec()));
        }
    };
}

impl DhcpMessage {
    pub fn new_reply() -> Self {
        let mut p = Self::default();
        p.op = BOOT_REPLY;
        return p;
    }

    pub fn new_request() -> Self {
        let mut p = Self::default();
        p.op = BOOT_REQUEST;
        return p;
    }

    /// The MAC carried in the chaddr prefix.
    pub fn client_mac(&self) -> MacAddr {
        let c = &self.chaddr;
        return MacAddr::new(c[0], c[1], c[2], c[3], c[4], c[5]);
    }

    /// Place a MAC in the chaddr prefix, zeroing the 10 padding bytes.
    pub fn set_client_mac(&mut self, mac: MacAddr) {
        self.chaddr = [0; 16];
        self.chaddr[..6].copy_from_slice(&mac.octets());
    }

    /// First match wins; duplicate codes are not merged.
    pub fn find_option(&self, code: u8) -> Option<&[u8]> {
        for opt in &self.options {
            if opt.code == code {
                return Some(&opt.data);
            }
        }
        return None;
    }

    get_u8_option!(dhcp_msg_type, OptionCodes::DHCP_MSG_TYPE);
    get_u32_option!(ip_address_lease_time, OptionCodes::IP_ADDRESS_LEASE_TIME);
    get_ipv4_option!(dhcp_server_id, OptionCodes::DHCP_SERVER_ID);
    get_ipv4_option!(subnet_mask, OptionCodes::SUBNET_MASK);
    get_ipv4s_option!(routers, OptionCodes::ROUTER);
    get_ipv4s_option!(domain_servers, OptionCodes::DOMAIN_SERVER);
    get_string_option!(hostname, OptionCodes::HOSTNAME);
    get_string_option!(vendor_class, OptionCodes::VENDOR_CLASS);

    pub fn parameter_request_list(&self) -> Option<&[u8]> {
        return self.find_option(OptionCodes::PARAMETER_REQUEST_LIST);
    }

    add_u8_option!(add_dhcp_msg_type, OptionCodes::DHCP_MSG_TYPE);
    add_u32_option!(
        add_ip_address_lease_time,
        OptionCodes::IP_ADDRESS_LEASE_TIME
    );
    add_ipv4_option!(add_dhcp_server_id, OptionCodes::DHCP_SERVER_ID);
    add_ipv4_option!(add_subnet_mask, OptionCodes::SUBNET_MASK);
    add_ipv4s_option!(add_router, OptionCodes::ROUTER);
    add_ipv4s_option!(add_domain_server, OptionCodes::DOMAIN_SERVER);
    add_string_option!(add_hostname, OptionCodes::HOSTNAME);
    add_string_option!(add_vendor_class, OptionCodes::VENDOR_CLASS);

    pub fn add_parameter_request_list(&mut self, codes: Vec<u8>) {
        self.options
            .push(DhcpOption::new(OptionCodes::PARAMETER_REQUEST_LIST, codes));
    }

    /// Serialize to wire bytes: fixed header, cookie, options, one END
    /// marker, zero padding up to the BOOTP minimum. Deterministic for
    /// a given message.
    pub fn build(&self) -> Vec<u8> {
        let mut raw = Vec::new();

        raw.push(self.op);
        raw.push(self.htype);
        raw.push(self.hlen);
        raw.push(self.hops);
        raw.extend(&self.xid.to_be_bytes());
        raw.extend(&self.secs.to_be_bytes());
        raw.extend(&self.flags.to_be_bytes());
        raw.extend(&self.ciaddr.octets());
        raw.extend(&self.yiaddr.octets());
        raw.extend(&self.siaddr.octets());
        raw.extend(&self.giaddr.octets());
        raw.extend(&self.chaddr);
        raw.extend(&self.sname[..]);
        raw.extend(&self.file[..]);

        raw.extend(&DHCP_COOKIE);

        for opt in &self.options {
            raw.extend(&opt.build());
        }

        raw.push(OptionCodes::END);

        while raw.len() < DHCP_PACKET_MIN_SIZE {
            raw.push(0);
        }

        return raw;
    }

    /// Parse wire bytes. Only a buffer shorter than the fixed header
    /// is an error; a missing cookie or a damaged options region
    /// degrades to a message with fewer (or no) options.
    pub fn parse(raw: &[u8]) -> Result<Self, FormatError> {
        if raw.len() < DHCP_FIXED_HEADER_SIZE {
            return Err(FormatError::Truncated {
                len: raw.len(),
                min: DHCP_FIXED_HEADER_SIZE,
            });
        }

        return match Self::parse_fields(raw) {
            Ok((_, msg)) => Ok(msg),
            Err(_) => Err(FormatError::Truncated {
                len: raw.len(),
                min: DHCP_FIXED_HEADER_SIZE,
            }),
        };
    }

    fn parse_fields(raw: &[u8]) -> IResult<&[u8], Self> {
        let (raw, op) = be_u8(raw)?;
        let (raw, htype) = be_u8(raw)?;
        let (raw, hlen) = be_u8(raw)?;
        let (raw, hops) = be_u8(raw)?;
        let (raw, xid) = be_u32(raw)?;
        let (raw, secs) = be_u16(raw)?;
        let (raw, flags) = be_u16(raw)?;
        let (raw, ciaddr) = parse_ipv4(raw)?;
        let (raw, yiaddr) = parse_ipv4(raw)?;
        let (raw, siaddr) = parse_ipv4(raw)?;
        let (raw, giaddr) = parse_ipv4(raw)?;
        let (raw, chaddr_bytes) = take(16u8)(raw)?;
        let (raw, sname_bytes) = take(64u8)(raw)?;
        let (raw, file_bytes) = take(128u8)(raw)?;

        // Without the DHCP cookie this is plain BOOTP and the trailing
        // bytes are not an options region.
        let cookie: IResult<&[u8], &[u8]> = tag(DHCP_COOKIE)(raw);
        let options = match cookie {
            Ok((region, _)) => parse_options(region),
            Err(_) => Vec::new(),
        };

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(chaddr_bytes);
        let mut sname = [0u8; 64];
        sname.copy_from_slice(sname_bytes);
        let mut file = [0u8; 128];
        file.copy_from_slice(file_bytes);

        return Ok((
            &[],
            Self {
                op,
                htype,
                hlen,
                hops,
                xid,
                secs,
                flags,
                ciaddr,
                yiaddr,
                siaddr,
                giaddr,
                chaddr,
                sname,
                file,
                options,
            },
        ));
    }
}

impl Default for DhcpMessage {
    fn default() -> Self {
        return DhcpMessage {
            op: BOOT_REPLY,
            htype: ETHERNET_TYPE,
            hlen: ETHERNET_ADDRESS_LEN,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::from(0),
            yiaddr: Ipv4Addr::from(0),
            siaddr: Ipv4Addr::from(0),
            giaddr: Ipv4Addr::from(0),
            chaddr: [0; 16],
            sname: [0; 64],
            file: [0; 128],
            options: Vec::new(),
        };
    }
}

/// Identity of one negotiation: the transaction id together with the
/// client MAC from the chaddr prefix. Binds unrelated traffic apart on
/// a shared broadcast domain.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct TransactionKey {
    pub xid: u32,
    pub client_mac: MacAddr,
}

impl TransactionKey {
    pub fn of(msg: &DhcpMessage) -> Self {
        return Self {
            xid: msg.xid,
            client_mac: msg.client_mac(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::options::DhcpMessageTypes;

    #[test]
    fn parse_rejects_short_buffers() {
        for len in &[0usize, 1, 100, 239] {
            let raw = vec![0u8; *len];
            let err = DhcpMessage::parse(&raw).unwrap_err();
            assert_eq!(
                FormatError::Truncated {
                    len: *len,
                    min: DHCP_FIXED_HEADER_SIZE
                },
                err
            );
        }
    }

    #[test]
    fn parse_discover_reports_op_xid_and_msg_type() {
        let mut discover = DhcpMessage::new_request();
        discover.xid = 0xAABBCCDD;
        discover.set_client_mac(MacAddr::new(0x02, 0x11, 0x22, 0x33, 0x44, 0x55));
        discover.add_dhcp_msg_type(DhcpMessageTypes::DISCOVER);

        let raw = discover.build();
        let parsed = DhcpMessage::parse(&raw).unwrap();

        assert_eq!(BOOT_REQUEST, parsed.op);
        assert_eq!(0xAABBCCDD, parsed.xid);
        assert_eq!(
            MacAddr::new(0x02, 0x11, 0x22, 0x33, 0x44, 0x55),
            parsed.client_mac()
        );
        assert_eq!(Some(&[1u8][..]), parsed.find_option(53));
    }

    #[test]
    fn build_then_parse_round_trips_every_field() {
        let mut msg = DhcpMessage::new_reply();
        msg.hops = 2;
        msg.xid = 0x01020304;
        msg.secs = 7;
        msg.flags = 0x8000;
        msg.ciaddr = Ipv4Addr::new(10, 0, 0, 9);
        msg.yiaddr = Ipv4Addr::new(10, 0, 0, 50);
        msg.siaddr = Ipv4Addr::new(10, 0, 0, 1);
        msg.giaddr = Ipv4Addr::new(10, 0, 0, 254);
        msg.set_client_mac(MacAddr::new(0xde, 0xad, 0xbe, 0xef, 0x00, 0x01));
        msg.chaddr[6] = 0x55; // padding survives as-is
        msg.sname[..4].copy_from_slice(b"srv1");
        msg.file[..8].copy_from_slice(b"boot.img");
        msg.add_dhcp_msg_type(DhcpMessageTypes::OFFER);
        msg.add_subnet_mask(Ipv4Addr::new(255, 255, 255, 0));
        msg.add_router(&[Ipv4Addr::new(10, 0, 0, 1)]);
        msg.add_domain_server(&[Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(1, 1, 1, 1)]);
        msg.add_ip_address_lease_time(86400);
        msg.add_dhcp_server_id(Ipv4Addr::new(10, 0, 0, 1));
        msg.add_hostname("gateway");
        msg.options.push(DhcpOption::new(43, vec![0x01, 0x02]));

        let parsed = DhcpMessage::parse(&msg.build()).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn typed_accessors_decode_option_values() {
        let mut msg = DhcpMessage::new_reply();
        msg.add_dhcp_msg_type(DhcpMessageTypes::ACK);
        msg.add_ip_address_lease_time(0x00015180);
        msg.add_dhcp_server_id(Ipv4Addr::new(192, 168, 1, 1));
        msg.add_domain_server(&[Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)]);
        msg.add_hostname("printer-2f");
        msg.add_vendor_class("MSFT 5.0");
        msg.add_parameter_request_list(vec![1, 3, 6, 42]);

        let parsed = DhcpMessage::parse(&msg.build()).unwrap();
        assert_eq!(Some(DhcpMessageTypes::ACK), parsed.dhcp_msg_type());
        assert_eq!(Some(86400), parsed.ip_address_lease_time());
        assert_eq!(Some(Ipv4Addr::new(192, 168, 1, 1)), parsed.dhcp_server_id());
        assert_eq!(
            Some(vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)]),
            parsed.domain_servers()
        );
        assert_eq!(Some("printer-2f".to_string()), parsed.hostname());
        assert_eq!(Some("MSFT 5.0".to_string()), parsed.vendor_class());
        assert_eq!(Some(&[1u8, 3, 6, 42][..]), parsed.parameter_request_list());
    }

    #[test]
    fn find_option_returns_first_match() {
        let mut msg = DhcpMessage::new_request();
        msg.add_dhcp_msg_type(DhcpMessageTypes::DISCOVER);
        msg.add_dhcp_msg_type(DhcpMessageTypes::REQUEST);
        assert_eq!(Some(DhcpMessageTypes::DISCOVER), msg.dhcp_msg_type());
    }

    #[test]
    fn damaged_cookie_means_no_options() {
        let mut discover = DhcpMessage::new_request();
        discover.add_dhcp_msg_type(DhcpMessageTypes::DISCOVER);
        let mut raw = discover.build();
        raw[236] = 0;

        let parsed = DhcpMessage::parse(&raw).unwrap();
        assert!(parsed.options.is_empty());
    }

    #[test]
    fn fixed_header_alone_parses_with_no_options() {
        let discover = DhcpMessage::new_request();
        let raw = discover.build();
        let parsed = DhcpMessage::parse(&raw[..DHCP_FIXED_HEADER_SIZE]).unwrap();
        assert!(parsed.options.is_empty());
        assert_eq!(BOOT_REQUEST, parsed.op);
    }

    #[test]
    fn build_pads_to_bootp_minimum_after_end_marker() {
        let mut discover = DhcpMessage::new_request();
        discover.add_dhcp_msg_type(DhcpMessageTypes::DISCOVER);
        let raw = discover.build();

        assert_eq!(DHCP_PACKET_MIN_SIZE, raw.len());
        // fixed header + one 3-byte option, then END
        assert_eq!(OptionCodes::END, raw[243]);
        assert!(raw[244..].iter().all(|b| *b == 0));
    }

    #[test]
    fn transaction_key_takes_xid_and_chaddr_prefix() {
        let mut msg = DhcpMessage::new_request();
        msg.xid = 0x11223344;
        msg.set_client_mac(MacAddr::new(2, 0, 0, 0, 0, 9));
        msg.chaddr[15] = 0x77; // padding is not part of the key

        let key = TransactionKey::of(&msg);
        assert_eq!(0x11223344, key.xid);
        assert_eq!(MacAddr::new(2, 0, 0, 0, 0, 9), key.client_mac);
    }
}
