use clap::ArgMatches;
use pnet::{
    datalink::{self, NetworkInterface},
    util::MacAddr,
};
use regex::Regex;
use std::net::Ipv4Addr;
use std::str::FromStr;

pub fn is_u64(v: String) -> Result<(), String> {
    v.parse::<u64>().map_err(|_| {
        format!(
            "Incorrect value '{}' must be an unsigned integer of 64 bits (u64)",
            v
        )
    })?;

    return Ok(());
}

pub fn is_u32(v: String) -> Result<(), String> {
    v.parse::<u32>().map_err(|_| {
        format!(
            "Incorrect value '{}' must be an unsigned integer of 32 bits (u32)",
            v
        )
    })?;

    return Ok(());
}

/// MACs are accepted with colon, dash or space separators.
fn normalize_mac(v: &str) -> String {
    let re = Regex::new(r"-| ").unwrap();
    return re.replace_all(v, ":").to_string();
}

pub fn is_mac(v: String) -> Result<(), String> {
    match MacAddr::from_str(&normalize_mac(&v)) {
        Ok(_) => Ok(()),
        Err(_) => Err(format!("'{}' is not a valid MAC address", v)),
    }
}

pub fn parse_mac(matches: &ArgMatches, name: &str) -> Option<MacAddr> {
    matches
        .value_of(name)
        .map(|mac| MacAddr::from_str(&normalize_mac(mac)).unwrap())
}

pub fn is_interface(v: String) -> Result<(), String> {
    let iface = lookup_interface(&v);
    if iface.is_none() {
        return Err(format!("Interface '{}' not found in the system", v));
    }

    return Ok(());
}

pub fn lookup_interface(iface_name: &str) -> Option<NetworkInterface> {
    return datalink::interfaces()
        .into_iter()
        .find(|iface| &iface.name == iface_name);
}

pub fn is_ip(v: String) -> Result<(), String> {
    v.parse::<Ipv4Addr>()
        .map_err(|_| format!("'{}' is not a valid IPv4", v))?;
    return Ok(());
}

pub fn parse_ip(matches: &ArgMatches, name: &str) -> Option<Ipv4Addr> {
    matches.value_of(name).map(|ip| ip.parse().unwrap())
}

pub fn parse_ips(matches: &ArgMatches, name: &str) -> Option<Vec<Ipv4Addr>> {
    match matches.values_of(name) {
        None => None,
        Some(ips) => {
            if ips.len() == 0 {
                return None;
            }
            return Some(
                ips.into_iter().map(|ip| ip.parse().unwrap()).collect(),
            );
        }
    }
}

pub fn parse_string(matches: &ArgMatches, name: &str) -> Option<String> {
    matches.value_of(name).map(|s| s.into())
}
