use super::err::IResult;
use nom::multi::many0;
use nom::number::complete::be_u32;
use std::net::Ipv4Addr;

pub fn parse_ipv4(raw: &[u8]) -> IResult<&[u8], Ipv4Addr> {
    be_u32(raw).map(|(r, i)| (r, Ipv4Addr::from(i)))
}

/// Address-list option values are 4-byte addresses back to back; a
/// trailing fragment shorter than 4 bytes is dropped.
pub fn parse_ipv4s(raw: &[u8]) -> Vec<Ipv4Addr> {
    many0(parse_ipv4)(raw)
        .map(|(_, addrs)| addrs)
        .unwrap_or_default()
}

/// Decode text option values leniently: invalid UTF-8 sequences are
/// dropped and the remaining text is kept.
pub fn decode_utf8(mut raw: &[u8]) -> String {
    let mut text = String::new();
    loop {
        match std::str::from_utf8(raw) {
            Ok(s) => {
                text.push_str(s);
                return text;
            }
            Err(err) => {
                if let Ok(valid) = std::str::from_utf8(&raw[..err.valid_up_to()]) {
                    text.push_str(valid);
                }
                raw = match err.error_len() {
                    Some(skip) => &raw[err.valid_up_to() + skip..],
                    None => &[],
                };
            }
        }
    }
}
