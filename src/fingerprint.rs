use pnet::util::MacAddr;

pub const UNKNOWN_DEVICE: &str = "Unknown device";

/// Identity material gathered from one client packet. The text
/// fields are only present when the client sent option 12 or 60.
pub struct FingerprintHint<'a> {
    pub mac: MacAddr,
    pub hostname: Option<&'a str>,
    pub vendor_class: Option<&'a str>,
}

pub trait DeviceClassifier {
    fn classify(&self, hint: &FingerprintHint) -> &'static str;
}

/// Coarse guess from vendor-class/hostname substrings first, the
/// MAC OUI second. No online lookups.
pub struct OuiClassifier;

impl DeviceClassifier for OuiClassifier {
    fn classify(&self, hint: &FingerprintHint) -> &'static str {
        if let Some(vendor_class) = hint.vendor_class {
            if let Some(label) = match_fingerprint(vendor_class) {
                return label;
            }
        }

        if let Some(hostname) = hint.hostname {
            if let Some(label) = match_fingerprint(hostname) {
                return label;
            }
        }

        if let Some(label) = match_oui(hint.mac) {
            return label;
        }

        return UNKNOWN_DEVICE;
    }
}

const FINGERPRINT_RULES: &[(&str, &str)] = &[
    ("android", "Android device"),
    ("iphone", "Apple iOS device"),
    ("ipad", "Apple iOS device"),
    ("ios", "Apple iOS device"),
    ("msft", "Windows device"),
    ("windows", "Windows device"),
    ("darwin", "Apple macOS device"),
    ("macbook", "Apple macOS device"),
    ("chromecast", "Google Chromecast"),
    ("playstation", "Sony PlayStation"),
    ("xbox", "Microsoft Xbox"),
    ("printer", "Network printer"),
];

fn match_fingerprint(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();

    for &(needle, label) in FINGERPRINT_RULES {
        if lowered.contains(needle) {
            return Some(label);
        }
    }

    return None;
}

const OUI_TABLE: &[([u8; 3], &str)] = &[
    ([0xb8, 0x27, 0xeb], "Raspberry Pi"),
    ([0xdc, 0xa6, 0x32], "Raspberry Pi"),
    ([0xe4, 0x5f, 0x01], "Raspberry Pi"),
    ([0x00, 0x0c, 0x29], "VMware VM"),
    ([0x00, 0x50, 0x56], "VMware VM"),
    ([0x08, 0x00, 0x27], "VirtualBox VM"),
    ([0x52, 0x54, 0x00], "QEMU/KVM VM"),
    ([0x00, 0x15, 0x5d], "Hyper-V VM"),
    ([0xf0, 0x18, 0x98], "Apple device"),
    ([0xa4, 0x83, 0xe7], "Apple device"),
    ([0x3c, 0x22, 0xfb], "Apple device"),
    ([0x24, 0x0a, 0xc4], "Espressif IoT device"),
    ([0x30, 0xae, 0xa4], "Espressif IoT device"),
    ([0xf4, 0xf5, 0xd8], "Google device"),
    ([0x44, 0x65, 0x0d], "Amazon device"),
    ([0x8c, 0x71, 0xf8], "Samsung device"),
];

fn match_oui(mac: MacAddr) -> Option<&'static str> {
    let prefix = [mac.0, mac.1, mac.2];

    for &(oui, label) in OUI_TABLE {
        if prefix == oui {
            return Some(label);
        }
    }

    return None;
}
